//! Configuration validation.
//!
//! Semantic checks only; serde handles syntax. Every problem is reported,
//! not just the first.

use std::net::SocketAddr;

use crate::config::schema::ProxyConfig;
use crate::load_balancer::backend::parse_backend_url;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("at least one backend is required")]
    NoBackends,

    #[error("backend #{index} ({url:?}): {reason}")]
    Backend {
        index: usize,
        url: String,
        reason: String,
    },

    #[error("invalid bind address {0:?}")]
    BindAddress(String),

    #[error("health check path must start with '/', got {0:?}")]
    HealthPath(String),

    #[error("health_check.{0} must be greater than zero")]
    Zero(&'static str),
}

/// Validate a fully-layered configuration.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.backends.is_empty() {
        errors.push(ValidationError::NoBackends);
    }
    for (index, url) in config.backends.iter().enumerate() {
        if let Err(e) = parse_backend_url(url) {
            errors.push(ValidationError::Backend {
                index,
                url: url.clone(),
                reason: e.to_string(),
            });
        }
    }

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(
            config.listener.bind_address.clone(),
        ));
    }

    let health = &config.health_check;
    if !health.path.starts_with('/') {
        errors.push(ValidationError::HealthPath(health.path.clone()));
    }
    if health.interval_secs == 0 {
        errors.push(ValidationError::Zero("interval_secs"));
    }
    if health.timeout_secs == 0 {
        errors.push(ValidationError::Zero("timeout_secs"));
    }
    if health.unhealthy_threshold == 0 {
        errors.push(ValidationError::Zero("unhealthy_threshold"));
    }
    if health.healthy_threshold == 0 {
        errors.push(ValidationError::Zero("healthy_threshold"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
