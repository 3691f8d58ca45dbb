//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! access.rs middleware (one line per request, written on response or abort)
//! health/active.rs → tracing   (one line per probe)
//!     → logging.rs (EnvFilter → fmt text/json → non-blocking stdout)
//! ```

pub mod access;
pub mod logging;
