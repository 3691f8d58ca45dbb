//! Access log.
//!
//! One record per inbound request, whatever the outcome: relayed, rejected
//! by a middleware layer, or abandoned by the client. The timestamp comes
//! from the subscriber.

use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{Method, Request},
    middleware::Next,
    response::Response,
};

use crate::http::forward;

/// Marker used in place of a backend when none was selected.
pub const NO_BACKEND: &str = "-";

/// Status logged when the client went away before a response was produced.
pub const CLIENT_CLOSED_REQUEST: u16 = 499;

/// Where the handler reports the backend it chose.
///
/// Inserted into request extensions by [`access_log`]; unset means no
/// backend was selected.
#[derive(Debug, Clone, Default)]
pub struct BackendSlot(Arc<OnceLock<String>>);

impl BackendSlot {
    /// Record the chosen backend. Only the first call has an effect.
    pub fn set(&self, backend: impl ToString) {
        let _ = self.0.set(backend.to_string());
    }

    pub fn get(&self) -> &str {
        self.0.get().map(String::as_str).unwrap_or(NO_BACKEND)
    }
}

/// An exchange in progress. Logged exactly once: by [`finish`](Self::finish),
/// or on drop if the exchange never finished.
#[derive(Debug)]
pub struct AccessRecord {
    client_ip: String,
    method: Method,
    path: String,
    backend: BackendSlot,
    started: Instant,
    logged: bool,
}

impl AccessRecord {
    pub fn start(request: &Request<Body>, peer: IpAddr, backend: BackendSlot) -> Self {
        Self {
            client_ip: forward::client_ip(request.headers(), peer),
            method: request.method().clone(),
            path: request.uri().path().to_string(),
            backend,
            started: Instant::now(),
            logged: false,
        }
    }

    pub fn finish(mut self, status: u16) {
        self.emit(status);
    }

    fn emit(&mut self, status: u16) {
        self.logged = true;
        tracing::info!(
            target: "lb_proxy::access",
            client_ip = %self.client_ip,
            method = %self.method,
            path = %self.path,
            backend = %self.backend.get(),
            status,
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            "Request completed"
        );
    }
}

impl Drop for AccessRecord {
    fn drop(&mut self) {
        if !self.logged {
            self.emit(CLIENT_CLOSED_REQUEST);
        }
    }
}

/// Middleware writing the access record for every request it wraps.
///
/// Sits outside the body-limit and timeout layers so their rejections are
/// logged too.
pub async fn access_log(
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let slot = BackendSlot::default();
    request.extensions_mut().insert(slot.clone());
    let record = AccessRecord::start(&request, peer.ip(), slot);

    let response = next.run(request).await;
    record.finish(response.status().as_u16());
    response
}
