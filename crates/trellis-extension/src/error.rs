//! Error types for the extension subsystem.
//!
//! Registration errors are synchronous faults raised to the caller of the
//! `register*` operations. Move-resolution failures are accumulated across a
//! whole batch and raised once, after every resolvable move has been applied.
//! Context-discipline violations (unbalanced push/pop) are panics, not `Err`
//! values: they indicate a caller bug.

/// Result type alias for extension operations.
pub type Result<T> = std::result::Result<T, ExtensionError>;

/// Errors that can occur in the extension subsystem.
#[derive(Debug, thiserror::Error)]
pub enum ExtensionError {
    /// The class has no descriptor in the class graph.
    #[error("class '{class_name}' has no descriptor in the class graph")]
    UnknownClass {
        /// Name of the unregistered class.
        class_name: &'static str,
    },

    /// No owner could be determined for a registration.
    #[error("no owner could be determined for '{target}'")]
    MissingOwner {
        /// Name of the class being registered.
        target: &'static str,
    },

    /// The owner is not compatible with the extension's declared owner type.
    #[error("owner '{owner}' is not compatible with declared owner type '{declared}' of extension '{target}'")]
    IncompatibleOwner {
        /// Name of the extension class.
        target: &'static str,
        /// Name of the resolved owner class.
        owner: &'static str,
        /// Name of the declared owner type parameter.
        declared: &'static str,
    },

    /// The contribution was rejected for the given container.
    #[error("contribution '{target}' is not authorized for container '{container}'")]
    UnauthorizedContribution {
        /// Name of the contribution class.
        target: &'static str,
        /// Name of the container class.
        container: &'static str,
    },

    /// The move was rejected for the given container.
    #[error("move of '{model}' into container '{container}' is not authorized")]
    UnauthorizedMove {
        /// Name of the model class.
        model: &'static str,
        /// Name of the requested container class.
        container: &'static str,
    },

    /// A declarative container path declared more than one segment.
    #[error("container path for '{target}' may declare at most one segment, got {got}")]
    DeepLinkTooLong {
        /// Name of the class being registered.
        target: &'static str,
        /// Number of declared segments.
        got: usize,
    },

    /// A move registration specified neither a new order nor a new container.
    #[error("move registration for '{model}' must specify a new order or a new container")]
    EmptyMove {
        /// Name of the model class.
        model: &'static str,
    },

    /// The class is not position-aware but the operation requires it.
    #[error("'{class_name}' is not an ordered model type")]
    NotOrdered {
        /// Name of the offending class.
        class_name: &'static str,
    },

    /// A move registration named the model type as its own container.
    #[error("move container for '{model}' must be a different type")]
    SelfContainer {
        /// Name of the model class.
        model: &'static str,
    },

    /// No constructor is registered for the target class.
    #[error("no constructor registered for '{target}'")]
    NoConstructor {
        /// Name of the target class.
        target: &'static str,
    },

    /// Instantiation of an extension or contribution failed.
    #[error("failed to instantiate '{target}'")]
    Instantiation {
        /// Name of the target class.
        target: &'static str,
        /// The underlying instantiation fault.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },

    /// A declaring-class-scoped extension found no enclosing instance on the
    /// extension stack.
    #[error("no enclosing instance of '{declaring}' active while creating '{target}'")]
    EnclosingInstanceNotFound {
        /// Name of the target class.
        target: &'static str,
        /// Name of the declaring class.
        declaring: &'static str,
    },

    /// One or more move containers could not be resolved.
    ///
    /// Raised once per batch, after all resolvable moves were applied.
    #[error("could not resolve move container(s): {details}")]
    UnresolvedMoveContainers {
        /// Accumulated per-object failure descriptions.
        details: String,
    },
}
