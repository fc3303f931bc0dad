//! Instance creation for registered extension and contribution classes.
//!
//! The registry treats instantiation as an opaque collaborator call. The
//! [`InstanceFactory`] trait is that collaborator's contract; the provided
//! [`ConstructorRegistry`] implements it as a polymorphic map from class
//! token to constructor closure, since the closed set of registered classes
//! is known at build time of the consuming application.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use trellis_core::meta::ClassToken;
use trellis_core::object::ModelObject;

use crate::error::{ExtensionError, Result};

/// Trait object surface of a constructed extension or contribution instance.
pub trait AnyExtension: Any + Send + Sync {
    /// Returns the class token of the concrete instance type.
    fn class_token(&self) -> ClassToken;

    /// Upcast for downcasting to the concrete type.
    fn as_any(&self) -> &dyn Any;
}

impl std::fmt::Debug for dyn AnyExtension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnyExtension")
            .field("class_token", &self.class_token())
            .finish()
    }
}

/// Everything a constructor needs to build one instance.
pub struct CreationContext<'a> {
    /// The class to instantiate.
    pub target: ClassToken,
    /// The owner (extension) or container (contribution) model object.
    pub owner: &'a dyn ModelObject,
    /// The live enclosing extension instance, present only for
    /// declaring-class-scoped extensions.
    pub declaring_instance: Option<&'a Arc<dyn AnyExtension>>,
    /// Explicit order accompanying the registration, applied by the
    /// constructor to ordered instances.
    pub order: Option<f64>,
}

/// External collaborator that produces constructed instances.
pub trait InstanceFactory: Send + Sync {
    /// Creates an instance of `ctx.target`.
    ///
    /// Fails with an instantiation fault if no compatible constructor
    /// exists.
    fn create(&self, ctx: CreationContext<'_>) -> Result<Arc<dyn AnyExtension>>;
}

/// Failure raised by a constructor closure.
///
/// The factory wraps it in [`ExtensionError::Instantiation`], preserving it
/// as the error source.
pub type ConstructorError = Box<dyn std::error::Error + Send + Sync + 'static>;

type Constructor = Box<
    dyn Fn(&CreationContext<'_>) -> std::result::Result<Arc<dyn AnyExtension>, ConstructorError>
        + Send
        + Sync,
>;

/// An [`InstanceFactory`] backed by a map of constructor closures.
#[derive(Default)]
pub struct ConstructorRegistry {
    constructors: HashMap<ClassToken, Constructor>,
}

impl ConstructorRegistry {
    /// Creates an empty constructor registry.
    pub fn new() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// Registers a constructor for `T`, replacing any previous one.
    pub fn insert<T: 'static>(
        &mut self,
        constructor: impl Fn(&CreationContext<'_>) -> std::result::Result<Arc<dyn AnyExtension>, ConstructorError>
            + Send
            + Sync
            + 'static,
    ) -> &mut Self {
        self.constructors.insert(ClassToken::of::<T>(), Box::new(constructor));
        self
    }

    /// Registers a constructor that ignores the creation context.
    pub fn insert_simple<T: 'static, E>(&mut self, constructor: impl Fn() -> E + Send + Sync + 'static) -> &mut Self
    where
        E: AnyExtension,
    {
        self.insert::<T>(move |_| Ok(Arc::new(constructor())))
    }
}

impl InstanceFactory for ConstructorRegistry {
    fn create(&self, ctx: CreationContext<'_>) -> Result<Arc<dyn AnyExtension>> {
        let constructor = self.constructors.get(&ctx.target).ok_or(ExtensionError::NoConstructor {
            target: ctx.target.name(),
        })?;
        constructor(&ctx).map_err(|source| ExtensionError::Instantiation {
            target: ctx.target.name(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Owner;
    impl ModelObject for Owner {
        fn class_token(&self) -> ClassToken {
            ClassToken::of::<Owner>()
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    struct Ext;
    impl AnyExtension for Ext {
        fn class_token(&self) -> ClassToken {
            ClassToken::of::<Ext>()
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[test]
    fn test_constructor_lookup() {
        let mut registry = ConstructorRegistry::new();
        registry.insert_simple::<Ext, _>(|| Ext);

        let owner = Owner;
        let instance = registry
            .create(CreationContext {
                target: ClassToken::of::<Ext>(),
                owner: &owner,
                declaring_instance: None,
                order: None,
            })
            .unwrap();
        assert_eq!(instance.class_token(), ClassToken::of::<Ext>());
    }

    #[test]
    fn test_constructor_failure_wraps_the_cause() {
        let mut registry = ConstructorRegistry::new();
        registry.insert::<Ext>(|_| Err(std::io::Error::other("no free channel").into()));

        let owner = Owner;
        let err = registry
            .create(CreationContext {
                target: ClassToken::of::<Ext>(),
                owner: &owner,
                declaring_instance: None,
                order: None,
            })
            .unwrap_err();
        assert!(matches!(err, ExtensionError::Instantiation { .. }));
        let source = std::error::Error::source(&err).unwrap();
        assert_eq!(source.to_string(), "no free channel");
    }

    #[test]
    fn test_missing_constructor_is_a_fault() {
        let registry = ConstructorRegistry::new();
        let owner = Owner;
        let err = registry
            .create(CreationContext {
                target: ClassToken::of::<Ext>(),
                owner: &owner,
                declaring_instance: None,
                order: None,
            })
            .unwrap_err();
        assert!(matches!(err, ExtensionError::NoConstructor { .. }));
    }
}
