//! Gateway error taxonomy with HTTP response mapping.
//!
//! Every failure the request pipeline can produce is represented here as a
//! typed variant carrying enough context to render a client response and a
//! useful log line. Recoverable failures are detected by the policy layer and
//! surfaced as these variants; the pipeline renders them once, at the top,
//! so no middleware has to know about response formats.

use actix_web::http::{header, StatusCode};
use actix_web::{HttpRequest, HttpResponse};
use serde_json::json;

/// Errors produced while processing a gateway request.
///
/// The variants mirror the failure modes of the pipeline: client-side
/// validation, authentication, rate limiting, target selection, circuit
/// breaking, upstream I/O and configuration problems. Each variant maps to a
/// fixed HTTP status via [`GatewayError::status_code`].
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Bad request: {message}")]
    BadRequest { message: String },

    #[error("Request payload exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    #[error("Request URI exceeds {limit} characters")]
    UriTooLong { limit: usize },

    #[error("Request headers too large: {message}")]
    HeadersTooLarge { message: String },

    #[error("Request blocked by validation rule: {rule}")]
    ValidationBlocked { rule: String },

    #[error("Unauthorized: {message}")]
    Unauthorized { message: String },

    #[error("Forbidden: {message}")]
    Forbidden { message: String },

    #[error("Too many requests")]
    RateLimited {
        limit: u64,
        used: u64,
        reset_epoch_secs: u64,
        retry_after_secs: u64,
    },

    #[error("No healthy targets available for route {route}")]
    NoHealthyTargets { route: String },

    #[error("Circuit breaker open for route {route}")]
    CircuitOpen { route: String },

    #[error("Upstream request timed out after {timeout_ms}ms")]
    UpstreamTimeout { timeout_ms: u64 },

    #[error("Upstream connection failed: {message}")]
    UpstreamConnect { message: String, url: String },

    #[error("Upstream protocol error: {message}")]
    UpstreamProtocol { message: String, url: String },

    #[error("Upstream returned server error {status}")]
    Upstream5xx { status: u16, url: String },

    #[error("Client disconnected")]
    ClientDisconnect,

    #[error("Request canceled")]
    Canceled,

    #[error("No matching route found for path: {path}")]
    RouteNotFound { path: String },

    #[error("Method {method} not allowed for path: {path}")]
    MethodNotAllowed { method: String, path: String },

    #[error("Route {path} has no handler or target configured")]
    NotImplemented { path: String },

    #[error("Invalid configuration: {message}")]
    ConfigInvalid { message: String },

    #[error("Internal server error: {message}")]
    Internal { message: String },
}

impl GatewayError {
    /// Stable machine-readable code used in the error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::BadRequest { .. } => "bad_request",
            GatewayError::PayloadTooLarge { .. } => "payload_too_large",
            GatewayError::UriTooLong { .. } => "uri_too_long",
            GatewayError::HeadersTooLarge { .. } => "headers_too_large",
            GatewayError::ValidationBlocked { .. } => "validation_blocked",
            GatewayError::Unauthorized { .. } => "unauthorized",
            GatewayError::Forbidden { .. } => "forbidden",
            GatewayError::RateLimited { .. } => "rate_limited",
            GatewayError::NoHealthyTargets { .. } => "no_healthy_targets",
            GatewayError::CircuitOpen { .. } => "circuit_open",
            GatewayError::UpstreamTimeout { .. } => "upstream_timeout",
            GatewayError::UpstreamConnect { .. } => "upstream_connect_error",
            GatewayError::UpstreamProtocol { .. } => "upstream_protocol_error",
            GatewayError::Upstream5xx { .. } => "bad_gateway",
            GatewayError::ClientDisconnect => "client_disconnect",
            GatewayError::Canceled => "canceled",
            GatewayError::RouteNotFound { .. } => "route_not_found",
            GatewayError::MethodNotAllowed { .. } => "method_not_allowed",
            GatewayError::NotImplemented { .. } => "not_implemented",
            GatewayError::ConfigInvalid { .. } => "config_invalid",
            GatewayError::Internal { .. } => "internal_error",
        }
    }

    /// HTTP status the variant maps to on the wire.
    ///
    /// Upstream 5xx responses are normalized to 502 here; the original status
    /// is preserved in the variant for logging.
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::BadRequest { .. } | GatewayError::ValidationBlocked { .. } => {
                StatusCode::BAD_REQUEST
            }
            GatewayError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            GatewayError::UriTooLong { .. } => StatusCode::URI_TOO_LONG,
            GatewayError::HeadersTooLarge { .. } => {
                StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE
            }
            GatewayError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            GatewayError::Forbidden { .. } => StatusCode::FORBIDDEN,
            GatewayError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::NoHealthyTargets { .. } | GatewayError::CircuitOpen { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            GatewayError::UpstreamTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::UpstreamConnect { .. }
            | GatewayError::UpstreamProtocol { .. }
            | GatewayError::Upstream5xx { .. } => StatusCode::BAD_GATEWAY,
            // Nginx convention for a client that went away mid-request.
            GatewayError::ClientDisconnect | GatewayError::Canceled => {
                StatusCode::from_u16(499).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
            GatewayError::RouteNotFound { .. } => StatusCode::NOT_FOUND,
            GatewayError::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            GatewayError::NotImplemented { .. } => StatusCode::NOT_IMPLEMENTED,
            GatewayError::ConfigInvalid { .. } | GatewayError::Internal { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Renders the client-facing response for this error.
    ///
    /// The body is a JSON envelope `{"error":{"code","message","requestId"}}`
    /// when the client's `Accept` header includes `application/json`, plain
    /// text with the same fields otherwise. Rate-limit and auth variants add
    /// their protocol headers (`X-RateLimit-*`, `Retry-After`,
    /// `WWW-Authenticate`).
    pub fn to_response(&self, request_id: &str, wants_json: bool) -> HttpResponse {
        let mut builder = HttpResponse::build(self.status());

        match self {
            GatewayError::RateLimited {
                limit,
                used,
                reset_epoch_secs,
                retry_after_secs,
            } => {
                builder.insert_header(("X-RateLimit-Limit", limit.to_string()));
                builder.insert_header(("X-RateLimit-Used", used.to_string()));
                builder.insert_header((
                    "X-RateLimit-Remaining",
                    limit.saturating_sub(*used).to_string(),
                ));
                builder.insert_header(("X-RateLimit-Reset", reset_epoch_secs.to_string()));
                builder.insert_header((header::RETRY_AFTER, retry_after_secs.to_string()));
                // Fixed wire shape for throttled clients, independent of Accept.
                return builder.json(json!({
                    "error": "Too many requests",
                    "message": format!(
                        "Rate limit of {} requests exceeded, retry after {} seconds",
                        limit, retry_after_secs
                    ),
                    "requestId": request_id,
                }));
            }
            GatewayError::Unauthorized { .. } => {
                builder.insert_header((header::WWW_AUTHENTICATE, "Bearer"));
            }
            _ => {}
        }

        if wants_json {
            builder.json(json!({
                "error": {
                    "code": self.code(),
                    "message": self.to_string(),
                    "requestId": request_id,
                }
            }))
        } else {
            builder
                .content_type("text/plain; charset=utf-8")
                .body(format!(
                    "error: {}\nmessage: {}\nrequestId: {}\n",
                    self.code(),
                    self,
                    request_id
                ))
        }
    }

    /// Whether this failure counts toward the circuit breaker.
    ///
    /// Only timeouts, connect/protocol errors and upstream 5xx contribute;
    /// open-circuit rejections and client-side errors do not. Upstream 4xx
    /// (429 included) pass through without tripping the breaker.
    pub fn is_circuit_failure(&self) -> bool {
        matches!(
            self,
            GatewayError::UpstreamTimeout { .. }
                | GatewayError::UpstreamConnect { .. }
                | GatewayError::UpstreamProtocol { .. }
                | GatewayError::Upstream5xx { .. }
        )
    }
}

/// Whether the client asked for a JSON error body.
pub fn accepts_json(req: &HttpRequest) -> bool {
    req.headers()
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .map(|accept| accept.contains("application/json") || accept.contains("*/*"))
        .unwrap_or(true)
}

impl actix_web::error::ResponseError for GatewayError {
    fn status_code(&self) -> StatusCode {
        self.status()
    }

    fn error_response(&self) -> HttpResponse {
        self.to_response("unknown", true)
    }
}
