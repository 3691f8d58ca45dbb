//! Active health checking.
//!
//! # Responsibilities
//! - Sweep every backend sequentially, in declaration order
//! - Probe `GET {base_url}{path}` and expect exactly 200 OK
//! - Update each backend's liveness flag from the outcome

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header::USER_AGENT, Request, StatusCode};
use http_body_util::BodyExt;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use tokio::sync::broadcast;
use tokio::time;

use crate::config::HealthCheckConfig;
use crate::http::forward::join_path;
use crate::load_balancer::{Backend, BackendPool};

const PROBE_USER_AGENT: &str = "lb-proxy-health-check";

/// Why a single probe counted as a failure.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("invalid probe request: {0}")]
    Request(#[from] axum::http::Error),

    #[error("connection error: {0}")]
    Connect(#[from] hyper_util::client::legacy::Error),

    #[error("error reading body: {0}")]
    Body(#[from] hyper::Error),

    #[error("unexpected status {0}")]
    Status(StatusCode),

    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

/// Background prober that owns the only writes to backend liveness.
pub struct HealthMonitor {
    pool: Arc<BackendPool>,
    config: HealthCheckConfig,
    client: Client<HttpConnector, Body>,
}

impl HealthMonitor {
    pub fn new(pool: Arc<BackendPool>, config: HealthCheckConfig) -> Self {
        // Separate from the forwarding client: different timeouts and reuse policy.
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(Duration::from_secs(config.timeout_secs)));
        let client = Client::builder(TokioExecutor::new()).build(connector);

        Self {
            pool,
            config,
            client,
        }
    }

    /// Sweep, pause, repeat until shutdown.
    ///
    /// The pause runs from the end of one sweep to the start of the next, so
    /// sweeps never overlap.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        if !self.config.enabled {
            tracing::info!("Active health checks disabled");
            return;
        }

        tracing::info!(
            interval_secs = self.config.interval_secs,
            timeout_secs = self.config.timeout_secs,
            path = %self.config.path,
            backends = self.pool.len(),
            "Health monitor starting"
        );

        let pause = Duration::from_secs(self.config.interval_secs);
        loop {
            tokio::select! {
                _ = self.sweep() => {}
                _ = shutdown.recv() => break,
            }
            tokio::select! {
                _ = time::sleep(pause) => {}
                _ = shutdown.recv() => break,
            }
        }

        tracing::info!("Health monitor stopped");
    }

    /// Probe every backend once, in declaration order.
    pub async fn sweep(&self) {
        for backend in self.pool.backends() {
            let outcome = self.probe(backend).await;
            self.apply(backend, outcome);
        }
    }

    /// Probe one backend; the deadline covers connect, headers and body.
    pub async fn probe(&self, backend: &Backend) -> Result<(), ProbeError> {
        let timeout = Duration::from_secs(self.config.timeout_secs);
        match time::timeout(timeout, self.exchange(backend)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(ProbeError::Timeout(timeout)),
        }
    }

    async fn exchange(&self, backend: &Backend) -> Result<(), ProbeError> {
        let request = Request::get(probe_uri(backend, &self.config.path))
            .header(USER_AGENT, PROBE_USER_AGENT)
            .body(Body::empty())?;

        let response = self.client.request(request).await?;
        let status = response.status();

        // Drain so the connection can be reused; nothing is kept.
        let mut body = response.into_body();
        while let Some(frame) = body.frame().await {
            frame?;
        }

        if status == StatusCode::OK {
            Ok(())
        } else {
            Err(ProbeError::Status(status))
        }
    }

    fn apply(&self, backend: &Backend, outcome: Result<(), ProbeError>) {
        match outcome {
            Ok(()) => {
                tracing::info!(target: "lb_proxy::health", backend = %backend, "Backend working");
                if backend.record_success(self.config.healthy_threshold) {
                    tracing::info!(target: "lb_proxy::health", backend = %backend, "Backend marked alive");
                }
            }
            Err(cause) => {
                tracing::warn!(target: "lb_proxy::health", backend = %backend, cause = %cause, "Backend not working");
                if backend.record_failure(self.config.unhealthy_threshold) {
                    tracing::info!(target: "lb_proxy::health", backend = %backend, "Backend marked dead");
                }
            }
        }
    }
}

/// `{base_url}{path}` with exactly one `/` at the join.
pub fn probe_uri(backend: &Backend, path: &str) -> String {
    let url = backend.url();
    format!(
        "{}://{}{}",
        url.scheme(),
        backend.authority(),
        join_path(url.path(), path)
    )
}
