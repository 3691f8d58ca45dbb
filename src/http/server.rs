//! HTTP server setup and request dispatch.
//!
//! # Responsibilities
//! - Create the Axum router: every method, every path, one handler
//! - Wire up middleware (tracing, access log, optional timeout and body limit)
//! - Spawn the health monitor alongside the listener
//! - Select a backend per request and relay the exchange
//! - Drain in-flight exchanges on shutdown

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Request, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{limit::RequestBodyLimitLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::ProxyConfig;
use crate::health::HealthMonitor;
use crate::http::forward::{self, UpstreamClient};
use crate::lifecycle::shutdown;
use crate::load_balancer::{BackendPool, PoolError};
use crate::observability::access::{self, BackendSlot};

/// Body returned when every backend is down.
pub const NO_AVAILABLE_SERVERS: &str = "No available servers";

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub pool: Arc<BackendPool>,
    pub client: UpstreamClient,
}

/// HTTP server for the load balancer.
pub struct HttpServer {
    router: Router,
    config: ProxyConfig,
    pool: Arc<BackendPool>,
}

impl HttpServer {
    /// Build the pool from `config.backends` and the router around it.
    pub fn new(config: ProxyConfig) -> Result<Self, PoolError> {
        let pool = Arc::new(BackendPool::from_urls(&config.backends)?);
        Ok(Self::with_pool(config, pool))
    }

    /// Use an already built pool; `config.backends` is ignored.
    pub fn with_pool(config: ProxyConfig, pool: Arc<BackendPool>) -> Self {
        let client = forward::upstream_client(config.timeouts.connect_secs.map(Duration::from_secs));

        let state = AppState {
            pool: pool.clone(),
            client,
        };

        let router = Self::build_router(&config, state);
        Self {
            router,
            config,
            pool,
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ProxyConfig, state: AppState) -> Router {
        let mut router = Router::new().fallback(proxy_handler).with_state(state);

        if let Some(limit) = config.limits.max_body_bytes {
            router = router.layer(RequestBodyLimitLayer::new(limit));
        }
        if let Some(secs) = config.timeouts.request_secs {
            router = router.layer(TimeoutLayer::new(Duration::from_secs(secs)));
        }

        router
            .layer(middleware::from_fn(access::access_log))
            .layer(TraceLayer::new_for_http())
    }

    /// Serve until `shutdown` fires, then drain in-flight exchanges.
    pub async fn run(
        self,
        listener: TcpListener,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            backends = self.pool.len(),
            "HTTP server starting"
        );

        let monitor = HealthMonitor::new(self.pool.clone(), self.config.health_check.clone());
        let monitor_task = tokio::spawn(monitor.run(shutdown.resubscribe()));

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        let served = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown::wait(shutdown))
            .await;

        monitor_task.abort();
        served?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Shared handle to the backend pool.
    pub fn pool(&self) -> Arc<BackendPool> {
        self.pool.clone()
    }
}

/// Select a backend and relay the exchange.
async fn proxy_handler(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response {
    let Some(backend) = state.pool.select() else {
        tracing::warn!(path = %request.uri().path(), "No available servers");
        return (StatusCode::SERVICE_UNAVAILABLE, NO_AVAILABLE_SERVERS).into_response();
    };
    if let Some(slot) = request.extensions().get::<BackendSlot>() {
        slot.set(&backend);
    }

    match forward::forward(&state.client, &backend, request, peer.ip()).await {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!(backend = %backend, error = %e, "Forwarding failed");
            e.into_response()
        }
    }
}
