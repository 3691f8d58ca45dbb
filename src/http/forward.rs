//! Single-host reverse-proxy relay.
//!
//! # Responsibilities
//! - Rewrite an inbound request onto one backend (scheme, authority, path prefix)
//! - Scrub hop-by-hop headers in both directions
//! - Maintain `X-Forwarded-For` / `X-Forwarded-Proto`
//! - Stream bodies through without buffering
//!
//! # Design Decisions
//! - One upstream attempt per request; no retries, no body replay
//! - Transport failures become 502, never a liveness change
//! - The forwarder owns its own client; the prober never shares it

use std::net::IpAddr;
use std::str::FromStr;
use std::time::Duration;

use axum::{
    body::Body,
    http::{
        header::{CONNECTION, HOST, TE},
        uri::{Authority, Scheme},
        Extensions, HeaderMap, HeaderName, HeaderValue, Request, Response, StatusCode, Uri,
        Version,
    },
    response::IntoResponse,
};
use hyper::body::Incoming;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};

use crate::load_balancer::Backend;

pub const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
pub const X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");

/// Headers that apply to a single transport hop and are never relayed.
pub const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
    "transfer-encoding",
    "upgrade",
];

/// Body returned with a 502.
pub const BAD_GATEWAY_BODY: &str = "Upstream request failed";

/// HTTP/1.1 client used for forwarding.
pub type UpstreamClient = Client<HttpConnector, Body>;

/// Errors local to a single forwarded exchange.
#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    /// The backend URL could not be turned into a request target.
    #[error("{0}")]
    InvalidTarget(String),

    /// Dial, write or response-header failure talking to the backend.
    #[error("upstream request failed: {0}")]
    Upstream(#[from] hyper_util::client::legacy::Error),
}

impl ForwardError {
    pub fn status(&self) -> StatusCode {
        match self {
            ForwardError::InvalidTarget(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ForwardError::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ForwardError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        match self {
            ForwardError::InvalidTarget(msg) => (status, msg).into_response(),
            ForwardError::Upstream(_) => (status, BAD_GATEWAY_BODY).into_response(),
        }
    }
}

/// Build the forwarding client.
pub fn upstream_client(connect_timeout: Option<Duration>) -> UpstreamClient {
    let mut connector = HttpConnector::new();
    connector.set_connect_timeout(connect_timeout);
    connector.set_nodelay(true);
    Client::builder(TokioExecutor::new()).build(connector)
}

/// Where a request is rewritten to.
#[derive(Debug, Clone)]
pub struct Target {
    scheme: Scheme,
    authority: Authority,
    base_path: String,
    base_query: Option<String>,
}

impl Target {
    /// Derive the rewrite target from a backend's base URL.
    pub fn for_backend(backend: &Backend) -> Result<Self, ForwardError> {
        let url = backend.url();
        let scheme =
            Scheme::from_str(url.scheme()).map_err(|e| ForwardError::InvalidTarget(e.to_string()))?;
        let authority = Authority::from_str(&backend.authority())
            .map_err(|e| ForwardError::InvalidTarget(e.to_string()))?;
        Ok(Self {
            scheme,
            authority,
            base_path: url.path().to_string(),
            base_query: url.query().filter(|q| !q.is_empty()).map(str::to_string),
        })
    }

    /// Map an inbound request-URI onto the backend.
    ///
    /// The inbound path and raw query are kept verbatim; a base path is
    /// prepended and a base query is joined with `&`.
    pub fn rewrite_uri(&self, inbound: &Uri) -> Result<Uri, ForwardError> {
        let path = join_path(&self.base_path, inbound.path());
        let query = match (self.base_query.as_deref(), inbound.query()) {
            (Some(base), Some(q)) if !q.is_empty() => Some(format!("{base}&{q}")),
            (Some(base), _) => Some(base.to_string()),
            (None, q) => q.map(str::to_string),
        };
        let path_and_query = match query {
            Some(q) => format!("{path}?{q}"),
            None => path,
        };

        Uri::builder()
            .scheme(self.scheme.clone())
            .authority(self.authority.clone())
            .path_and_query(path_and_query)
            .build()
            .map_err(|e| ForwardError::InvalidTarget(e.to_string()))
    }

    /// Turn an inbound request into the outbound one.
    ///
    /// Method, remaining headers and the streaming body pass through.
    pub fn upstream_request(
        &self,
        request: Request<Body>,
        peer: IpAddr,
    ) -> Result<Request<Body>, ForwardError> {
        let (mut parts, body) = request.into_parts();

        parts.uri = self.rewrite_uri(&parts.uri)?;
        parts.version = Version::HTTP_11;
        parts.extensions = Extensions::new();

        let wants_trailers = accepts_trailers(&parts.headers);
        remove_hop_by_hop(&mut parts.headers);
        if wants_trailers {
            parts.headers.insert(TE, HeaderValue::from_static("trailers"));
        }

        let host = HeaderValue::from_str(self.authority.as_str())
            .map_err(|e| ForwardError::InvalidTarget(e.to_string()))?;
        parts.headers.insert(HOST, host);
        append_forwarded_for(&mut parts.headers, peer);
        // The listener only speaks plain HTTP.
        parts
            .headers
            .insert(X_FORWARDED_PROTO, HeaderValue::from_static("http"));

        Ok(Request::from_parts(parts, body))
    }
}

/// Send `request` to `backend` and relay the response.
pub async fn forward(
    client: &UpstreamClient,
    backend: &Backend,
    request: Request<Body>,
    peer: IpAddr,
) -> Result<Response<Body>, ForwardError> {
    let target = Target::for_backend(backend)?;
    let upstream = target.upstream_request(request, peer)?;
    let response = client.request(upstream).await?;
    Ok(relay_response(response))
}

/// Strip hop-by-hop headers from a backend response and stream its body.
pub fn relay_response(response: Response<Incoming>) -> Response<Body> {
    let (mut parts, body) = response.into_parts();
    remove_hop_by_hop(&mut parts.headers);
    Response::from_parts(parts, Body::new(body))
}

/// Join two path segments with exactly one `/` between them.
pub fn join_path(base: &str, path: &str) -> String {
    match (base.ends_with('/'), path.starts_with('/')) {
        (true, true) => format!("{base}{}", &path[1..]),
        (false, false) => format!("{base}/{path}"),
        _ => format!("{base}{path}"),
    }
}

/// Remove hop-by-hop headers, including any listed in `Connection`.
pub fn remove_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();
    for name in listed {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

fn accepts_trailers(headers: &HeaderMap) -> bool {
    headers
        .get_all(TE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|token| token.trim().eq_ignore_ascii_case("trailers"))
}

/// Append `peer` to `X-Forwarded-For`, folding any existing values into one.
///
/// Prior values are copied as raw bytes, so non-ASCII entries survive.
pub fn append_forwarded_for(headers: &mut HeaderMap, peer: IpAddr) {
    let mut chain: Vec<u8> = Vec::new();
    for prior in headers.get_all(&X_FORWARDED_FOR) {
        chain.extend_from_slice(prior.as_bytes());
        chain.extend_from_slice(b", ");
    }
    chain.extend_from_slice(peer.to_string().as_bytes());

    match HeaderValue::from_bytes(&chain) {
        Ok(value) => {
            headers.insert(X_FORWARDED_FOR, value);
        }
        Err(e) => tracing::debug!(error = %e, "Unable to extend X-Forwarded-For"),
    }
}

/// Client IP for logging: leftmost `X-Forwarded-For` entry, else the peer.
pub fn client_ip(headers: &HeaderMap, peer: IpAddr) -> String {
    headers
        .get(&X_FORWARDED_FOR)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| peer.to_string())
}
