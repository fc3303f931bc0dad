//! Logging facilities for the Trellis core crate.
//!
//! Trellis uses the `tracing` crate for instrumentation. To see logs, install
//! a tracing subscriber in your application:
//!
//! ```ignore
//! tracing_subscriber::fmt::init();
//! ```

/// Target names for log filtering.
///
/// Use these with `tracing` directives to filter logs by subsystem.
pub mod targets {
    /// Core crate target.
    pub const CORE: &str = "trellis_core";
    /// Class metadata graph target.
    pub const META: &str = "trellis_core::meta";
    /// Model arena target.
    pub const OBJECT: &str = "trellis_core::object";
}
