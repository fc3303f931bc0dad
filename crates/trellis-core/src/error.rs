//! Error types for the core model systems.

/// Result type alias for model operations.
pub type Result<T> = std::result::Result<T, ModelError>;

/// Errors that can occur when manipulating the model arena.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    /// The model key is invalid or the object has been removed.
    #[error("invalid or removed model key")]
    InvalidKey,

    /// Attempted to attach an object to itself or one of its descendants.
    #[error("cannot attach an object to itself or one of its descendants")]
    CircularParentage,

    /// The object does not expose an order field.
    #[error("model object '{class_name}' is not order-aware")]
    NotOrdered {
        /// Name of the offending class.
        class_name: &'static str,
    },
}
