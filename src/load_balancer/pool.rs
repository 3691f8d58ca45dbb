//! Backend pool management.
//!
//! # Responsibilities
//! - Own the frozen, ordered backend list
//! - Select the next alive backend in round-robin order
//! - Expose liveness reads and writes for the prober

use std::sync::Arc;

use crate::load_balancer::{backend::Backend, round_robin::RoundRobin, PoolError};

/// The fixed set of backends known at startup.
#[derive(Debug)]
pub struct BackendPool {
    backends: Vec<Arc<Backend>>,
    strategy: RoundRobin,
}

impl BackendPool {
    /// Build a pool from backends in declaration order.
    pub fn new(backends: Vec<Backend>) -> Result<Self, PoolError> {
        if backends.is_empty() {
            return Err(PoolError::Empty);
        }
        Ok(Self {
            backends: backends.into_iter().map(Arc::new).collect(),
            strategy: RoundRobin::new(),
        })
    }

    /// Parse configured URLs and build the pool.
    pub fn from_urls<I, S>(urls: I) -> Result<Self, PoolError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let backends = urls
            .into_iter()
            .map(|raw| {
                let raw = raw.as_ref();
                Backend::parse(raw).map_err(|source| PoolError::InvalidBackend {
                    url: raw.to_string(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(backends)
    }

    /// Next alive backend in round-robin order, or `None` if all are down.
    pub fn select(&self) -> Option<Arc<Backend>> {
        let selected = self.strategy.next_alive(&self.backends);
        if selected.is_none() {
            tracing::debug!(backend_count = self.backends.len(), "No alive backends in pool");
        }
        selected
    }

    /// Set a backend's liveness flag. Idempotent.
    pub fn mark(&self, backend: &Backend, alive: bool) {
        backend.set_alive(alive);
    }

    pub fn is_alive(&self, backend: &Backend) -> bool {
        backend.is_alive()
    }

    /// All backends in declaration order.
    pub fn backends(&self) -> &[Arc<Backend>] {
        &self.backends
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    /// Always false; an empty pool cannot be constructed.
    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    /// `(url, alive)` for every backend, in declaration order.
    pub fn snapshot(&self) -> Vec<(String, bool)> {
        self.backends
            .iter()
            .map(|b| (b.to_string(), b.is_alive()))
            .collect()
    }
}
