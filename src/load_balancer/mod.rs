//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound request
//!     → pool.rs (frozen backend list)
//!     → round_robin.rs (claim cursor, scan for the first alive backend)
//!     → backend.rs (liveness flag written by the prober)
//!     → Arc<Backend> or None (503)
//! ```
//!
//! # Design Decisions
//! - The backend list never changes after startup; no locks on the hot path
//! - Liveness is one atomic flag per backend
//! - Forwarding failures never touch liveness; only the prober does

pub mod backend;
pub mod pool;
pub mod round_robin;

pub use backend::{Backend, BackendUrlError};
pub use pool::BackendPool;

/// Errors raised while building the pool.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("backend pool must contain at least one backend")]
    Empty,

    #[error("invalid backend url {url:?}: {source}")]
    InvalidBackend {
        url: String,
        #[source]
        source: BackendUrlError,
    },
}
