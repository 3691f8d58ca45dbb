//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection (axum::serve, HTTP/1.1)
//!     → server.rs (middleware, proxy_handler)
//!     → load balancer picks an alive backend (or 503)
//!     → forward.rs (rewrite URI + headers, stream body upstream)
//!     → forward.rs (scrub response headers, stream body back)
//!     → access log
//! ```

pub mod forward;
pub mod server;

pub use forward::{ForwardError, Target};
pub use server::{HttpServer, NO_AVAILABLE_SERVERS};
