//! Configuration schema definitions.
//!
//! Every section carries defaults so a config file only needs to list the
//! backends. All types derive Serde traits for deserialization from TOML.

use serde::{Deserialize, Serialize};

/// Root configuration for the load balancer.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Ordered backend base URLs, e.g. `http://10.0.0.5:8081`.
    pub backends: Vec<String>,

    /// Health prober settings.
    pub health_check: HealthCheckConfig,

    /// Forwarder timeouts.
    pub timeouts: TimeoutConfig,

    /// Inbound request limits.
    pub limits: LimitsConfig,

    /// Logging settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Health prober configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Run the background prober.
    pub enabled: bool,

    /// Pause between the end of one sweep and the start of the next, in seconds.
    pub interval_secs: u64,

    /// Deadline for a single probe (connect, headers and body), in seconds.
    pub timeout_secs: u64,

    /// Path appended to each backend base URL.
    pub path: String,

    /// Consecutive failed probes before a backend is marked dead.
    pub unhealthy_threshold: u32,

    /// Consecutive successful probes before a backend is marked alive.
    pub healthy_threshold: u32,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 5,
            timeout_secs: 10,
            path: "/user/list".to_string(),
            unhealthy_threshold: 1,
            healthy_threshold: 1,
        }
    }
}

/// Timeouts applied by the forwarder. Unset means no deadline.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Upstream connection establishment timeout in seconds.
    pub connect_secs: Option<u64>,

    /// Inbound request deadline in seconds, measured until response headers.
    pub request_secs: Option<u64>,
}

/// Inbound request limits. Unset means unlimited.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum inbound request body size in bytes.
    pub max_body_bytes: Option<usize>,
}

/// Output format of the stdout log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    pub log_level: String,

    /// Text or JSON lines.
    pub log_format: LogFormat,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
        }
    }
}
