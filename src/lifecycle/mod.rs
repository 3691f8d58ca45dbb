//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Load config → Validate → Build pool → Bind listener → Serve + probe
//!
//! Shutdown:
//!     signals.rs (SIGINT/SIGTERM)
//!     → shutdown.rs broadcast
//!     → listener stops accepting, in-flight exchanges drain
//!     → prober leaves its loop
//! ```
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal and exits non-zero
//! - Listener starts last (traffic only when ready)

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
