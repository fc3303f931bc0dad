//! Extension and contribution registry with scoped resolution for Trellis.
//!
//! Applications customize Trellis model objects without subclassing them by
//! registering classes against extension points:
//!
//! - **Extensions** wrap an owner model object and intercept its behavior
//! - **Contributions** are injected as additional children of a container
//! - **Moves** relocate ordered model objects to a new container or position
//!
//! Registrations are addressed by [`ClassIdentifier`] containment paths and
//! resolved through a layered [`Scope`] index: single-segment identifiers
//! match by supertype polymorphism, multi-segment identifiers additionally
//! require the surrounding containment chain to match. During model
//! construction a thread-local scope stack narrows resolution to the owners
//! currently being built; [`ExtensionContextBackup`] carries that context
//! onto other executions.
//!
//! # Example
//!
//! ```
//! use std::any::Any;
//! use std::sync::Arc;
//!
//! use trellis_core::meta::{ClassGraph, ClassInfo, ClassToken};
//! use trellis_core::object::ModelObject;
//! use trellis_extension::{AnyExtension, ConstructorRegistry, ExtensionRegistry};
//!
//! struct SalaryForm;
//! struct SalaryFormExtension;
//!
//! impl ModelObject for SalaryForm {
//!     fn class_token(&self) -> ClassToken { ClassToken::of::<SalaryForm>() }
//!     fn as_any(&self) -> &dyn Any { self }
//!     fn as_any_mut(&mut self) -> &mut dyn Any { self }
//! }
//!
//! impl AnyExtension for SalaryFormExtension {
//!     fn class_token(&self) -> ClassToken { ClassToken::of::<SalaryFormExtension>() }
//!     fn as_any(&self) -> &dyn Any { self }
//! }
//!
//! let graph = Arc::new(ClassGraph::new());
//! graph.register_info(ClassInfo::new::<SalaryForm>());
//! graph.register_info(ClassInfo::new::<SalaryFormExtension>().extension_of::<SalaryForm>());
//!
//! let mut constructors = ConstructorRegistry::new();
//! constructors.insert_simple::<SalaryFormExtension, _>(|| SalaryFormExtension);
//!
//! let registry = ExtensionRegistry::new(graph, Arc::new(constructors));
//! registry.register(ClassToken::of::<SalaryFormExtension>())?;
//!
//! let created = registry.create_extensions_for(&SalaryForm)?;
//! assert_eq!(created.len(), 1);
//! # Ok::<(), trellis_extension::ExtensionError>(())
//! ```

mod context;
mod error;
pub mod factory;
pub mod identifier;
pub mod item;
pub mod logging;
pub mod move_handler;
pub mod registry;
pub mod scope;

pub use context::ExtensionContextBackup;
pub use error::{ExtensionError, Result};
pub use factory::{
    AnyExtension, ConstructorError, ConstructorRegistry, CreationContext, InstanceFactory,
};
pub use identifier::ClassIdentifier;
pub use item::{ExtensionItem, MoveItem, RegistryItem};
pub use move_handler::{ModelTreeAdapter, MoveDescriptor, MoveModelObjectHandler};
pub use registry::{
    ExtensionList, ExtensionRegistry, GraphCapabilityValidator, RegistrationValidator,
};
pub use scope::{Scope, ScopeItem};
