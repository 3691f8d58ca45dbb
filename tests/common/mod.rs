//! Shared utilities for integration tests.
#![allow(dead_code)]

use std::collections::BTreeMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{HeaderMap, Method, Request, StatusCode},
    response::{IntoResponse, Response},
    Router,
};
use lb_proxy::config::ProxyConfig;
use lb_proxy::{BackendPool, HttpServer, Shutdown};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

pub const HEALTH_PATH: &str = "/user/list";

/// A request as seen by a mock backend.
#[derive(Debug, Clone)]
pub struct Observed {
    pub method: Method,
    pub uri: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

#[derive(Clone)]
struct MockState {
    name: &'static str,
    body: Bytes,
    healthy: Arc<AtomicBool>,
    seen: Arc<Mutex<Vec<Observed>>>,
}

/// An HTTP backend that records every request it receives.
///
/// - `GET /user/list` answers 200 while healthy, 500 otherwise
/// - `/status/{code}` answers with that status
/// - anything else answers 200 with the configured body and `x-backend: {name}`
pub struct MockBackend {
    pub addr: SocketAddr,
    pub name: &'static str,
    state: MockState,
    stop: Option<oneshot::Sender<()>>,
}

impl MockBackend {
    pub async fn start(name: &'static str) -> Self {
        Self::with_body(name, Bytes::from_static(name.as_bytes())).await
    }

    pub async fn with_body(name: &'static str, body: Bytes) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = MockState {
            name,
            body,
            healthy: Arc::new(AtomicBool::new(true)),
            seen: Arc::new(Mutex::new(Vec::new())),
        };

        let app = Router::new().fallback(handle).with_state(state.clone());
        let (stop, stopped) = oneshot::channel::<()>();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = stopped.await;
                })
                .await;
        });

        Self {
            addr,
            name,
            state,
            stop: Some(stop),
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Requests other than health probes.
    pub fn requests(&self) -> Vec<Observed> {
        self.state
            .seen
            .lock()
            .unwrap()
            .iter()
            .filter(|o| !o.uri.starts_with(HEALTH_PATH))
            .cloned()
            .collect()
    }

    pub fn probe_count(&self) -> usize {
        self.state
            .seen
            .lock()
            .unwrap()
            .iter()
            .filter(|o| o.uri.starts_with(HEALTH_PATH))
            .count()
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.state.healthy.store(healthy, Ordering::SeqCst);
    }

    /// Stop accepting connections and close idle ones.
    pub fn kill(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }
}

async fn handle(State(state): State<MockState>, request: Request<Body>) -> Response {
    let (parts, body) = request.into_parts();
    let body = axum::body::to_bytes(body, usize::MAX).await.unwrap_or_default();
    state.seen.lock().unwrap().push(Observed {
        method: parts.method.clone(),
        uri: parts.uri.to_string(),
        headers: parts.headers.clone(),
        body,
    });

    let path = parts.uri.path();
    if path == HEALTH_PATH {
        return if state.healthy.load(Ordering::SeqCst) {
            (StatusCode::OK, "ok").into_response()
        } else {
            (StatusCode::INTERNAL_SERVER_ERROR, "unhealthy").into_response()
        };
    }
    if let Some(code) = path.strip_prefix("/status/") {
        let status = code
            .parse::<u16>()
            .ok()
            .and_then(|c| StatusCode::from_u16(c).ok())
            .unwrap_or(StatusCode::BAD_REQUEST);
        return (status, [("x-backend", state.name)], state.name).into_response();
    }

    ([("x-backend", state.name)], state.body.clone()).into_response()
}

/// Read from `socket` until the end of the request head.
pub async fn read_request_head(socket: &mut TcpStream) -> Vec<u8> {
    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        match socket.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => head.extend_from_slice(&buf[..n]),
        }
    }
    head
}

/// Start a raw TCP backend; `f` handles each accepted connection.
pub async fn start_raw_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn(TcpStream) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            tokio::spawn(f(socket));
        }
    });
    addr
}

/// A backend that drops the connection halfway through the response headers.
pub async fn start_truncating_backend() -> SocketAddr {
    start_raw_backend(|mut socket| async move {
        read_request_head(&mut socket).await;
        let _ = socket.write_all(b"HTTP/1.1 200 OK\r\nContent-Le").await;
        let _ = socket.shutdown().await;
    })
    .await
}

/// A backend that accepts and then never answers.
pub async fn start_silent_backend() -> SocketAddr {
    start_raw_backend(|mut socket| async move {
        read_request_head(&mut socket).await;
        tokio::time::sleep(Duration::from_secs(60)).await;
        drop(socket);
    })
    .await
}

/// An address nothing listens on.
pub fn closed_addr() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

/// Proxy config for tests; the prober is off unless `health` is set.
pub fn proxy_config(backends: &[String], health: bool) -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.backends = backends.to_vec();
    config.health_check.enabled = health;
    config.health_check.interval_secs = 1;
    config.health_check.timeout_secs = 1;
    config
}

/// A running proxy on an ephemeral port.
pub struct ProxyHandle {
    pub addr: SocketAddr,
    pub pool: Arc<BackendPool>,
    shutdown: Shutdown,
    task: JoinHandle<Result<(), std::io::Error>>,
}

impl ProxyHandle {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Trigger shutdown and wait for the server to finish draining.
    pub async fn stop(self) -> Result<(), std::io::Error> {
        self.shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(5), self.task)
            .await
            .expect("proxy did not shut down")
            .expect("proxy task panicked")
    }
}

pub async fn start_proxy(config: ProxyConfig) -> ProxyHandle {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = HttpServer::new(config).unwrap();
    let pool = server.pool();
    let shutdown = Shutdown::new();
    let task = tokio::spawn(server.run(listener, shutdown.subscribe()));

    ProxyHandle {
        addr,
        pool,
        shutdown,
        task,
    }
}

/// HTTP client that never goes through an environment proxy.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

/// Poll `condition` every 50ms until it holds or `within` elapses.
pub async fn eventually<F>(within: Duration, condition: F) -> bool
where
    F: Fn() -> bool,
{
    let deadline = tokio::time::Instant::now() + within;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    condition()
}

/// Collects `lb_proxy::access` events as field maps.
#[derive(Clone, Default)]
pub struct AccessCapture {
    records: Arc<Mutex<Vec<BTreeMap<String, String>>>>,
}

impl AccessCapture {
    /// Install for the current thread; events stop being captured when the
    /// guard drops.
    pub fn install() -> (Self, tracing::dispatcher::DefaultGuard) {
        use tracing_subscriber::layer::SubscriberExt;
        use tracing_subscriber::util::SubscriberInitExt;

        let capture = Self::default();
        let guard = tracing_subscriber::registry()
            .with(capture.clone())
            .set_default();
        (capture, guard)
    }

    pub fn records(&self) -> Vec<BTreeMap<String, String>> {
        self.records.lock().unwrap().clone()
    }

    /// Records whose `path` field equals `path`.
    pub fn for_path(&self, path: &str) -> Vec<BTreeMap<String, String>> {
        self.records()
            .into_iter()
            .filter(|r| r.get("path").map(String::as_str) == Some(path))
            .collect()
    }
}

impl<S: Subscriber> Layer<S> for AccessCapture {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if event.metadata().target() != "lb_proxy::access" {
            return;
        }
        let mut fields = FieldMap::default();
        event.record(&mut fields);
        self.records.lock().unwrap().push(fields.0);
    }
}

#[derive(Default)]
struct FieldMap(BTreeMap<String, String>);

impl Visit for FieldMap {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.0.insert(field.name().to_string(), value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.0.insert(field.name().to_string(), format!("{value:?}"));
    }
}
