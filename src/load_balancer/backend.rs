//! Backend abstraction.
//!
//! # Responsibilities
//! - Represent a single origin server by its parsed base URL
//! - Track liveness (alive/dead) with lock-free reads
//! - Count consecutive probe outcomes for the prober's thresholds

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use url::Url;

/// Why a configured backend URL was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendUrlError {
    #[error("{0}")]
    Parse(#[from] url::ParseError),

    #[error("unsupported scheme {0:?}, expected http")]
    Scheme(String),

    #[error("missing host")]
    MissingHost,

    #[error("credentials are not allowed in backend urls")]
    Credentials,

    #[error("fragments are not allowed in backend urls")]
    Fragment,
}

/// Parse and check a backend base URL.
pub fn parse_backend_url(raw: &str) -> Result<Url, BackendUrlError> {
    let url = Url::parse(raw.trim())?;
    if url.scheme() != "http" {
        return Err(BackendUrlError::Scheme(url.scheme().to_string()));
    }
    match url.host_str() {
        Some(host) if !host.is_empty() => {}
        _ => return Err(BackendUrlError::MissingHost),
    }
    if !url.username().is_empty() || url.password().is_some() {
        return Err(BackendUrlError::Credentials);
    }
    if url.fragment().is_some() {
        return Err(BackendUrlError::Fragment);
    }
    Ok(url)
}

/// A single origin server.
///
/// The URL is immutable; only the liveness flag and the probe counters
/// change, and only the prober writes them.
#[derive(Debug)]
pub struct Backend {
    url: Url,
    /// Starts true: optimistic until the first probe says otherwise.
    alive: AtomicBool,
    consecutive_failures: AtomicU32,
    consecutive_successes: AtomicU32,
}

impl Backend {
    /// Create a backend from an already validated URL.
    pub fn new(url: Url) -> Self {
        Self {
            url,
            alive: AtomicBool::new(true),
            consecutive_failures: AtomicU32::new(0),
            consecutive_successes: AtomicU32::new(0),
        }
    }

    /// Parse a configured URL and create the backend.
    pub fn parse(raw: &str) -> Result<Self, BackendUrlError> {
        parse_backend_url(raw).map(Self::new)
    }

    /// The backend's base URL.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// `host[:port]` as written in the URL; used for the outbound `Host` header.
    pub fn authority(&self) -> String {
        let host = self.url.host_str().unwrap_or_default();
        match self.url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        }
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Set the liveness flag. Returns the previous value.
    pub fn set_alive(&self, alive: bool) -> bool {
        self.alive.swap(alive, Ordering::AcqRel)
    }

    /// Record a successful probe.
    ///
    /// Returns true when this probe flipped the backend from dead to alive.
    pub fn record_success(&self, healthy_threshold: u32) -> bool {
        self.consecutive_failures.store(0, Ordering::Relaxed);
        let successes = bump(&self.consecutive_successes);
        successes >= healthy_threshold && !self.set_alive(true)
    }

    /// Record a failed probe.
    ///
    /// Returns true when this probe flipped the backend from alive to dead.
    pub fn record_failure(&self, unhealthy_threshold: u32) -> bool {
        self.consecutive_successes.store(0, Ordering::Relaxed);
        let failures = bump(&self.consecutive_failures);
        failures >= unhealthy_threshold && self.set_alive(false)
    }
}

fn bump(counter: &AtomicU32) -> u32 {
    let prev = counter
        .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| Some(n.saturating_add(1)))
        .unwrap_or(u32::MAX);
    prev.saturating_add(1)
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.url.as_str().trim_end_matches('/'))
    }
}
