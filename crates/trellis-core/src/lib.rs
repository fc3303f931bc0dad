//! Core model-object systems for Trellis.
//!
//! This crate provides the foundational components of the Trellis UI framework
//! that the extension subsystem builds on:
//!
//! - **Class Metadata Graph**: Runtime type descriptors with supertype and
//!   trait edges, plus memoized assignability closures
//! - **Model Objects**: The base trait for configurable model objects
//!   (table columns, form fields, pages) and a tree arena that stores them
//! - **Well-Known Markers**: Capability types used by the extension registry
//!   (ordered objects, contribution holders, the move-to-root marker)
//!
//! # Class Graph Example
//!
//! ```
//! use trellis_core::meta::{ClassGraph, ClassInfo, ClassToken};
//!
//! struct FormField;
//! struct SmartField;
//!
//! let graph = ClassGraph::new();
//! graph.register_info(ClassInfo::new::<FormField>());
//! graph.register_info(ClassInfo::new::<SmartField>().extends_class::<FormField>());
//!
//! // SmartField is assignable to FormField through the declared edge.
//! assert!(graph.is_assignable(ClassToken::of::<SmartField>(), ClassToken::of::<FormField>()));
//! ```
//!
//! # Model Arena Example
//!
//! ```
//! use trellis_core::object::{ModelArena, ModelObject};
//! use trellis_core::meta::ClassToken;
//! use std::any::Any;
//!
//! struct Group;
//! impl ModelObject for Group {
//!     fn class_token(&self) -> ClassToken { ClassToken::of::<Group>() }
//!     fn as_any(&self) -> &dyn Any { self }
//!     fn as_any_mut(&mut self) -> &mut dyn Any { self }
//! }
//!
//! let mut arena = ModelArena::new();
//! let root = arena.insert_root(Box::new(Group));
//! let child = arena.insert_child(root, Box::new(Group)).unwrap();
//! assert_eq!(arena.parent(child), Some(root));
//! ```

mod error;
pub mod logging;
pub mod meta;
pub mod object;

pub use error::{ModelError, Result};
pub use meta::{
    contribution_holder_token, extension_token, move_to_root_token, ordered_token, root_token,
    ClassGraph, ClassInfo, ClassToken, ExtendsSpec, ModelClass,
};
pub use object::{ModelArena, ModelKey, ModelObject};
