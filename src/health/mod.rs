//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! sleep(interval) ← sweep done
//!     → active.rs: GET {base}{path} per backend, in order
//!     → 200 OK → record_success, anything else → record_failure
//!     → backend.rs flips `alive` once a threshold is met
//! ```
//!
//! # Design Decisions
//! - Default thresholds of 1: one probe outcome flips the flag
//! - The prober is the only writer of liveness; forwarding errors never are
//! - The prober has its own HTTP client

pub mod active;

pub use active::{HealthMonitor, ProbeError};
