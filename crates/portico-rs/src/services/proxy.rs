//! Upstream request forwarding.
//!
//! The forwarder builds the upstream URL from the selected target and the
//! route's rewrite rules, copies request headers minus hop-by-hop fields,
//! injects the forwarding headers, and streams both request and response
//! bodies without buffering. Dropping the returned future (client
//! disconnect, per-call timeout) aborts the upstream call.

use std::sync::Arc;
use std::time::Duration;

use std::collections::HashSet;

use actix_web::dev::Payload;
use actix_web::http::Method as ActixMethod;
use actix_web::{HttpRequest, HttpResponse};
use futures_util::StreamExt;
use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::{HeaderMap as ReqwestHeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method as ReqwestMethod};

use crate::models::error::GatewayError;
use crate::models::route::ProxyConfig;
use crate::services::load_balancer::ConnectionGuard;
use crate::utils::path::{build_upstream_url, rewrite_path};

/// Headers scoped to a single transport connection, never forwarded in
/// either direction (RFC 7230 section 6.1).
static HOP_BY_HOP_HEADERS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "connection",
        "keep-alive",
        "proxy-authenticate",
        "proxy-authorization",
        "te",
        "trailer",
        "transfer-encoding",
        "upgrade",
    ]
    .into_iter()
    .collect()
});

/// Headers recomputed by the proxy rather than copied.
const RECOMPUTED_HEADERS: &[&str] = &["host", "content-length"];

/// Path derivation applied before building the upstream URL.
#[derive(Clone, Default)]
pub enum PathRewrite {
    /// Forward the incoming path untouched.
    #[default]
    None,
    /// Ordered regex substitutions.
    Rules(Vec<(Regex, String)>),
    /// User-supplied derivation function.
    Custom(Arc<dyn Fn(&str) -> String + Send + Sync>),
}

impl PathRewrite {
    pub fn apply(&self, path: &str) -> String {
        match self {
            PathRewrite::None => path.to_string(),
            PathRewrite::Rules(rules) => rewrite_path(path, rules),
            PathRewrite::Custom(derive) => derive(path),
        }
    }
}

impl std::fmt::Debug for PathRewrite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PathRewrite::None => write!(f, "PathRewrite::None"),
            PathRewrite::Rules(rules) => write!(f, "PathRewrite::Rules({})", rules.len()),
            PathRewrite::Custom(_) => write!(f, "PathRewrite::Custom"),
        }
    }
}

/// Per-request forwarding options.
///
/// Cloned from the route's template for every request so the
/// `before_request` hook can mutate headers or rewrites without affecting
/// other requests.
#[derive(Debug, Clone, Default)]
pub struct ProxyOptions {
    /// Fixed headers added to the upstream request.
    pub headers: Vec<(String, String)>,
    /// Follow upstream redirects instead of returning them verbatim.
    pub follow_redirects: bool,
    /// Redirect hop limit when following is enabled.
    pub max_redirects: u32,
    /// Path derivation.
    pub rewrite: PathRewrite,
    /// Extra query parameters appended to the upstream URL.
    pub query: Vec<(String, String)>,
}

impl ProxyOptions {
    /// Builds runtime options from validated route configuration.
    ///
    /// Rewrite patterns were syntax-checked during config validation, so
    /// compilation failures here indicate a bug and map to `ConfigInvalid`.
    pub fn from_config(config: &ProxyConfig) -> Result<Self, GatewayError> {
        let mut rules = Vec::with_capacity(config.path_rewrite.len());
        for rule in &config.path_rewrite {
            let regex = Regex::new(&rule.pattern).map_err(|e| GatewayError::ConfigInvalid {
                message: format!("path rewrite pattern '{}': {}", rule.pattern, e),
            })?;
            rules.push((regex, rule.replacement.clone()));
        }

        Ok(Self {
            headers: config
                .headers
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            follow_redirects: config.follow_redirects,
            max_redirects: config.max_redirects,
            rewrite: if rules.is_empty() {
                PathRewrite::None
            } else {
                PathRewrite::Rules(rules)
            },
            query: config
                .query_string
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        })
    }
}

/// HTTP forwarder with a pooled upstream client.
#[derive(Clone, Debug)]
pub struct Forwarder {
    client: Client,
}

impl Forwarder {
    /// Builds a forwarder. Redirect handling is a client-level policy, so
    /// routes that follow redirects get their own forwarder instance.
    pub fn new(follow_redirects: bool, max_redirects: u32) -> Self {
        let redirect = if follow_redirects {
            reqwest::redirect::Policy::limited(max_redirects as usize)
        } else {
            reqwest::redirect::Policy::none()
        };

        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(32)
            .redirect(redirect)
            .build()
            .expect("Failed to create upstream HTTP client");

        Self { client }
    }

    /// Forwards the request to `origin`, streaming the body through.
    ///
    /// Returns the raw upstream response; status normalization (5xx → 502)
    /// belongs to the circuit-breaker layer above.
    pub async fn forward(
        &self,
        req: &HttpRequest,
        payload: Payload,
        origin: &str,
        options: &ProxyOptions,
    ) -> Result<reqwest::Response, GatewayError> {
        let path = options.rewrite.apply(req.path());
        let url = build_upstream_url(origin, &path, req.query_string(), &options.query);
        debug!("Forwarding {} {} -> {}", req.method(), req.path(), url);

        let headers = self.build_headers(req, options);
        let method = convert_method(req.method());

        let mut builder = self.client.request(method, &url).headers(headers);
        if has_body(req) {
            builder = builder.body(payload_body(payload));
        }

        builder.send().await.map_err(|e| {
            if e.is_connect() {
                GatewayError::UpstreamConnect {
                    message: e.to_string(),
                    url: url.clone(),
                }
            } else if e.is_redirect() {
                GatewayError::UpstreamProtocol {
                    message: format!("redirect limit exceeded: {}", e),
                    url: url.clone(),
                }
            } else {
                GatewayError::UpstreamProtocol {
                    message: e.to_string(),
                    url: url.clone(),
                }
            }
        })
    }

    /// Copies request headers for forwarding, stripping hop-by-hop fields
    /// and injecting the configured and forwarding headers.
    fn build_headers(&self, req: &HttpRequest, options: &ProxyOptions) -> ReqwestHeaderMap {
        let mut headers = ReqwestHeaderMap::with_capacity(req.headers().len() + 4);

        for (key, value) in req.headers() {
            let name = key.as_str();
            if HOP_BY_HOP_HEADERS.contains(name) || RECOMPUTED_HEADERS.contains(&name) {
                continue;
            }
            if let (Ok(header_name), Ok(header_value)) = (
                HeaderName::from_bytes(key.as_ref()),
                HeaderValue::from_bytes(value.as_bytes()),
            ) {
                headers.append(header_name, header_value);
            }
        }

        for (key, value) in &options.headers {
            if let (Ok(header_name), Ok(header_value)) = (
                HeaderName::from_bytes(key.as_bytes()),
                HeaderValue::from_bytes(value.as_bytes()),
            ) {
                headers.insert(header_name, header_value);
            }
        }

        let connection_info = req.connection_info();

        if let Some(peer) = connection_info.peer_addr() {
            let peer_ip = peer.rsplit_once(':').map(|(host, _)| host).unwrap_or(peer);
            let forwarded_for = match req
                .headers()
                .get("x-forwarded-for")
                .and_then(|v| v.to_str().ok())
            {
                Some(existing) => format!("{}, {}", existing, peer_ip),
                None => peer_ip.to_string(),
            };
            if let Ok(value) = HeaderValue::from_str(&forwarded_for) {
                headers.insert(HeaderName::from_static("x-forwarded-for"), value);
            }
        }

        if let Ok(value) = HeaderValue::from_str(connection_info.scheme()) {
            headers.insert(HeaderName::from_static("x-forwarded-proto"), value);
        }
        if let Ok(value) = HeaderValue::from_str(connection_info.host()) {
            headers.insert(HeaderName::from_static("x-forwarded-host"), value);
        }

        headers
            .entry("user-agent")
            .or_insert_with(|| HeaderValue::from_static(concat!("portico-rs/", env!("CARGO_PKG_VERSION"))));

        headers
    }
}

impl Default for Forwarder {
    fn default() -> Self {
        Self::new(false, 0)
    }
}

/// Converts the upstream response into a client response, streaming the body
/// and stripping hop-by-hop headers.
///
/// `guard` rides inside the body stream so the target's connection count
/// stays raised until the body finishes (or the client goes away and the
/// stream is dropped).
pub fn to_client_response(
    upstream: reqwest::Response,
    guard: ConnectionGuard,
) -> HttpResponse {
    let status = actix_web::http::StatusCode::from_u16(upstream.status().as_u16())
        .unwrap_or(actix_web::http::StatusCode::BAD_GATEWAY);
    let mut builder = HttpResponse::build(status);

    for (key, value) in upstream.headers() {
        let name = key.as_str();
        if HOP_BY_HOP_HEADERS.contains(name) || name == "content-length" {
            continue;
        }
        if let Ok(header_value) = actix_web::http::header::HeaderValue::from_bytes(value.as_bytes())
        {
            builder.append_header((key.as_str(), header_value));
        }
    }

    let body = upstream.bytes_stream().map(move |chunk| {
        let _held = &guard;
        chunk
    });
    builder.streaming(body)
}

fn has_body(req: &HttpRequest) -> bool {
    let declared_length = req
        .headers()
        .get("content-length")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(0);
    declared_length > 0 || req.headers().contains_key("transfer-encoding")
}

/// Bridges the actix payload (worker-local) into a `Send` stream reqwest can
/// consume, preserving backpressure through the bounded channel.
fn payload_body(mut payload: Payload) -> reqwest::Body {
    let (tx, rx) = tokio::sync::mpsc::channel::<Result<actix_web::web::Bytes, std::io::Error>>(8);

    actix_web::rt::spawn(async move {
        while let Some(chunk) = payload.next().await {
            let item = chunk.map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()));
            if tx.send(item).await.is_err() {
                break;
            }
        }
    });

    let stream = futures_util::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    });
    reqwest::Body::wrap_stream(stream)
}

fn convert_method(method: &ActixMethod) -> ReqwestMethod {
    match *method {
        ActixMethod::GET => ReqwestMethod::GET,
        ActixMethod::POST => ReqwestMethod::POST,
        ActixMethod::PUT => ReqwestMethod::PUT,
        ActixMethod::DELETE => ReqwestMethod::DELETE,
        ActixMethod::HEAD => ReqwestMethod::HEAD,
        ActixMethod::OPTIONS => ReqwestMethod::OPTIONS,
        ActixMethod::CONNECT => ReqwestMethod::CONNECT,
        ActixMethod::PATCH => ReqwestMethod::PATCH,
        ActixMethod::TRACE => ReqwestMethod::TRACE,
        _ => ReqwestMethod::GET,
    }
}
