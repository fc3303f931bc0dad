//! Logging facilities for the extension subsystem.
//!
//! See `trellis_core::logging` for subscriber setup.

/// Target names for log filtering.
pub mod targets {
    /// Extension crate target.
    pub const EXTENSION: &str = "trellis_extension";
    /// Registry facade target.
    pub const REGISTRY: &str = "trellis_extension::registry";
    /// Scope index target.
    pub const SCOPE: &str = "trellis_extension::scope";
    /// Thread-local context target.
    pub const CONTEXT: &str = "trellis_extension::context";
    /// Move handler target.
    pub const MOVE: &str = "trellis_extension::move_handler";
}
