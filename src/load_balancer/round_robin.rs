//! Round-robin selection that skips dead backends.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::load_balancer::backend::Backend;

/// Round-robin selector.
///
/// Each call claims a distinct cursor value with one `fetch_add`, so N
/// concurrent callers on a healthy pool start their scans at N different
/// backends.
#[derive(Debug, Default)]
pub struct RoundRobin {
    cursor: AtomicU64,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pick the first alive backend at or after the next cursor position.
    ///
    /// Scans at most `backends.len()` entries; returns `None` when every
    /// scanned backend is dead.
    pub fn next_alive(&self, backends: &[Arc<Backend>]) -> Option<Arc<Backend>> {
        let len = backends.len();
        if len == 0 {
            return None;
        }

        // Unsigned modulo keeps the index valid across counter wrap-around.
        let start = (self.cursor.fetch_add(1, Ordering::Relaxed) % len as u64) as usize;

        (0..len)
            .map(|offset| &backends[(start + offset) % len])
            .find(|backend| backend.is_alive())
            .cloned()
    }

    #[cfg(test)]
    fn cursor(&self) -> u64 {
        self.cursor.load(Ordering::Relaxed)
    }

    #[cfg(test)]
    fn starting_at(cursor: u64) -> Self {
        Self {
            cursor: AtomicU64::new(cursor),
        }
    }
}
