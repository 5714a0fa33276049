use serde::{Deserialize, Serialize};

/// Load balancing strategy for distributing requests across a target pool.
///
/// Each strategy selects from the currently healthy targets only. Pools with
/// zero healthy targets yield no selection; pools with exactly one healthy
/// target bypass the strategy entirely.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LoadBalancingStrategy {
    /// Round-robin (default). A monotonically increasing counter walks the
    /// healthy set in insertion order.
    RoundRobin,

    /// Uniform random pick.
    Random,

    /// Cumulative-weight roulette over the healthy set. Targets with weight 0
    /// are excluded from selection.
    Weighted,

    /// Fewest active connections; ties broken by lower average latency, then
    /// insertion order.
    LeastConnections,

    /// Argmin of `(connections + 1) / max(1, weight)`; ties broken by lower
    /// average latency.
    WeightedLeastConnections,

    /// Stable 32-bit hash of the client identifier mod healthy count. The
    /// identifier is the trusted-proxy-aware client IP, falling back to
    /// `User-Agent + Accept` when no address is available.
    IpHash,

    /// Power-of-two-choices: two distinct random picks, keep the one with
    /// fewer connections, latency as tie-break.
    #[serde(alias = "power_of_two_choices")]
    P2c,

    /// Lowest average response time; delegates to round-robin until latency
    /// data exists.
    Latency,
}

impl Default for LoadBalancingStrategy {
    fn default() -> Self {
        Self::RoundRobin
    }
}

/// A single upstream target participating in a load-balancer pool.
///
/// A target's identity is its URL (scheme + host + port).
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TargetConfig {
    /// Target origin including protocol, e.g. `http://backend-1:8080`.
    pub url: String,

    /// Static weight for weighted strategies (default: 1). Weight 0 removes
    /// the target from weighted selection without removing it from the pool.
    #[serde(default = "default_weight")]
    pub weight: u32,

    /// Optional free-form metadata attached to the target.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
}

fn default_weight() -> u32 {
    1
}

impl TargetConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !self.url.starts_with("http://") && !self.url.starts_with("https://") {
            return Err(format!(
                "Target URL must start with http:// or https://: {}",
                self.url
            ));
        }
        Ok(())
    }
}

/// Periodic health probing of a target pool.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct HealthCheckConfig {
    /// Whether probing is active for this pool.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Milliseconds between probe cycles.
    #[serde(default = "default_health_interval_ms")]
    pub interval_ms: u64,

    /// Per-probe deadline in milliseconds.
    #[serde(default = "default_health_timeout_ms")]
    pub timeout_ms: u64,

    /// Path probed on each target.
    #[serde(default = "default_health_path")]
    pub path: String,

    /// Status the probe must return to count as healthy.
    #[serde(default = "default_expected_status")]
    pub expected_status: u16,

    /// Substring the probe body must contain, if set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_body: Option<String>,

    /// HTTP method used for probing.
    #[serde(default = "default_health_method")]
    pub method: String,
}

fn default_true() -> bool {
    true
}

fn default_health_interval_ms() -> u64 {
    10_000
}

fn default_health_timeout_ms() -> u64 {
    5_000
}

fn default_health_path() -> String {
    "/health".to_string()
}

fn default_expected_status() -> u16 {
    200
}

fn default_health_method() -> String {
    "GET".to_string()
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: default_health_interval_ms(),
            timeout_ms: default_health_timeout_ms(),
            path: default_health_path(),
            expected_status: default_expected_status(),
            expected_body: None,
            method: default_health_method(),
        }
    }
}

/// Cookie-based client-to-target affinity.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct StickySessionConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Cookie carrying the opaque session id.
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,

    /// Binding time-to-live in milliseconds (default: 1 hour).
    #[serde(default = "default_session_ttl_ms")]
    pub ttl_ms: u64,
}

fn default_cookie_name() -> String {
    "lb-session".to_string()
}

fn default_session_ttl_ms() -> u64 {
    3_600_000
}

impl Default for StickySessionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cookie_name: default_cookie_name(),
            ttl_ms: default_session_ttl_ms(),
        }
    }
}

/// Target pool plus selection behavior for a route.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LoadBalancerConfig {
    #[serde(default)]
    pub strategy: LoadBalancingStrategy,

    /// At least one target is required.
    pub targets: Vec<TargetConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_check: Option<HealthCheckConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sticky_session: Option<StickySessionConfig>,
}

impl LoadBalancerConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.targets.is_empty() {
            return Err("Load balancer requires at least one target".to_string());
        }
        for (i, target) in self.targets.iter().enumerate() {
            target
                .validate()
                .map_err(|e| format!("Target {} validation failed: {}", i, e))?;
        }
        if self.strategy == LoadBalancingStrategy::Weighted
            && self.targets.iter().all(|t| t.weight == 0)
        {
            return Err(
                "Weighted strategy requires at least one target with weight > 0".to_string(),
            );
        }
        Ok(())
    }
}

/// Circuit breaker thresholds for a route's upstream calls.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CircuitBreakerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Consecutive failures before the circuit opens.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Milliseconds the circuit stays open before admitting a probe call.
    #[serde(default = "default_reset_timeout_ms")]
    pub reset_timeout_ms: u64,

    /// Deadline for each admitted upstream call, in milliseconds.
    #[serde(default = "default_per_call_timeout_ms")]
    pub per_call_timeout_ms: u64,
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_reset_timeout_ms() -> u64 {
    30_000
}

fn default_per_call_timeout_ms() -> u64 {
    30_000
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            failure_threshold: default_failure_threshold(),
            reset_timeout_ms: default_reset_timeout_ms(),
            per_call_timeout_ms: default_per_call_timeout_ms(),
        }
    }
}

/// One ordered path-rewrite substitution, applied as regex → replacement.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PathRewriteRule {
    pub pattern: String,
    pub replacement: String,
}

/// Forwarding options applied when proxying to a target.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ProxyConfig {
    /// Fixed headers injected into every upstream request.
    #[serde(default)]
    pub headers: std::collections::BTreeMap<String, String>,

    /// Upstream call timeout in milliseconds. The effective per-call deadline
    /// is the shorter of this and the circuit breaker's timeout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,

    /// Follow upstream redirects instead of returning them verbatim.
    #[serde(default)]
    pub follow_redirects: bool,

    /// Redirect hop limit when following is enabled.
    #[serde(default = "default_max_redirects")]
    pub max_redirects: u32,

    /// Ordered regex substitutions applied to the incoming path.
    #[serde(default)]
    pub path_rewrite: Vec<PathRewriteRule>,

    /// Extra query parameters appended to the upstream URL.
    #[serde(default)]
    pub query_string: std::collections::BTreeMap<String, String>,
}

fn default_max_redirects() -> u32 {
    5
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            headers: std::collections::BTreeMap::new(),
            timeout_ms: None,
            follow_redirects: false,
            max_redirects: default_max_redirects(),
            path_rewrite: Vec::new(),
            query_string: std::collections::BTreeMap::new(),
        }
    }
}

/// Authentication policy for a route.
///
/// Bearer tokens verify against exactly one key source: a symmetric
/// `secret` (HS algorithms), a PEM `public_key` (RS/PS/ES/EdDSA), or a
/// remote JWK set at `jwks_url`. `api_keys` replaces bearer auth entirely.
/// The configuration validator rejects ambiguous combinations.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AuthConfig {
    /// Symmetric secret for JWT signature verification (HS algorithms).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,

    /// PEM-encoded public key for asymmetric JWT verification
    /// (RS/PS/ES/EdDSA algorithms).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,

    /// URL of a remote JWK set. Keys are fetched and cached; the set is
    /// re-fetched when a token presents an unknown key id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwks_url: Option<String>,

    /// Accepted signing algorithms (default: HS256).
    #[serde(default = "default_algorithms")]
    pub algorithms: Vec<String>,

    /// Expected `iss` claim, validated when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,

    /// Expected `aud` claim, validated when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audience: Option<String>,

    /// Accepted API keys. Mutually exclusive with `secret`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_keys: Option<Vec<String>>,

    /// Header carrying the API key.
    #[serde(default = "default_api_key_header")]
    pub api_key_header: String,

    /// When true, absent credentials are admitted; present credentials must
    /// still verify.
    #[serde(default)]
    pub optional: bool,

    /// Roles the decoded claims must include (any match admits). Missing
    /// roles yield 403 rather than 401.
    #[serde(default)]
    pub required_roles: Vec<String>,

    /// Path prefixes exempt from authentication.
    #[serde(default)]
    pub exclude_paths: Vec<String>,
}

fn default_algorithms() -> Vec<String> {
    vec!["HS256".to_string()]
}

fn default_api_key_header() -> String {
    "x-api-key".to_string()
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret: None,
            public_key: None,
            jwks_url: None,
            algorithms: default_algorithms(),
            issuer: None,
            audience: None,
            api_keys: None,
            api_key_header: default_api_key_header(),
            optional: false,
            required_roles: Vec::new(),
            exclude_paths: Vec::new(),
        }
    }
}

impl AuthConfig {
    pub fn validate(&self) -> Result<(), String> {
        let sources = [
            self.secret.is_some(),
            self.public_key.is_some(),
            self.jwks_url.is_some(),
            self.api_keys.is_some(),
        ]
        .into_iter()
        .filter(|set| *set)
        .count();

        if sources == 0 {
            return Err(
                "Auth config requires one of 'secret', 'public_key', 'jwks_url' or 'api_keys'"
                    .to_string(),
            );
        }
        if sources > 1 {
            return Err(
                "Auth config is ambiguous: set exactly one of 'secret', 'public_key', \
                 'jwks_url' or 'api_keys'"
                    .to_string(),
            );
        }

        if let Some(secret) = &self.secret {
            if secret.len() < 32 {
                return Err("JWT secret should be at least 32 characters".to_string());
            }
        }
        if let Some(url) = &self.jwks_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(format!("jwks_url must be an http(s) URL: {}", url));
            }
        }
        if let Some(keys) = &self.api_keys {
            if keys.is_empty() {
                return Err("API key auth requires at least one key".to_string());
            }
        }

        Ok(())
    }
}

/// Fixed-window rate limiting for a route.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RateLimitConfig {
    /// Window length in milliseconds.
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,

    /// Requests admitted per key per window.
    #[serde(default = "default_rate_max")]
    pub max: u64,

    /// Path prefixes exempt from limiting.
    #[serde(default)]
    pub exclude_paths: Vec<String>,
}

fn default_window_ms() -> u64 {
    60_000
}

fn default_rate_max() -> u64 {
    100
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_ms: default_window_ms(),
            max: default_rate_max(),
            exclude_paths: Vec::new(),
        }
    }
}

/// Request size and shape limits enforced before any handler runs.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RequestLimits {
    /// Maximum declared body size in bytes (413 above).
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    /// Maximum URL length in characters (414 above).
    #[serde(default = "default_max_url_length")]
    pub max_url_length: usize,

    /// Maximum number of request headers (431 above).
    #[serde(default = "default_max_header_count")]
    pub max_header_count: usize,

    /// Maximum total header bytes, names plus values (431 above).
    #[serde(default = "default_max_header_bytes")]
    pub max_header_bytes: usize,

    /// Maximum number of query parameters (400 above).
    #[serde(default = "default_max_query_params")]
    pub max_query_params: usize,

    /// Regexes that reject matching paths with 400.
    #[serde(default)]
    pub blocked_paths: Vec<String>,
}

fn default_max_body_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_max_url_length() -> usize {
    2_048
}

fn default_max_header_count() -> usize {
    100
}

fn default_max_header_bytes() -> usize {
    16 * 1024
}

fn default_max_query_params() -> usize {
    100
}

impl Default for RequestLimits {
    fn default() -> Self {
        Self {
            max_body_bytes: default_max_body_bytes(),
            max_url_length: default_max_url_length(),
            max_header_count: default_max_header_count(),
            max_header_bytes: default_max_header_bytes(),
            max_query_params: default_max_query_params(),
            blocked_paths: Vec::new(),
        }
    }
}

/// Cross-origin resource sharing policy for a route.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CorsConfig {
    #[serde(default = "default_cors_origins")]
    pub allowed_origins: Vec<String>,

    #[serde(default = "default_cors_methods")]
    pub allowed_methods: Vec<String>,

    #[serde(default = "default_cors_headers")]
    pub allowed_headers: Vec<String>,

    #[serde(default)]
    pub expose_headers: Vec<String>,

    #[serde(default)]
    pub allow_credentials: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_age_secs: Option<u64>,
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".to_string()]
}

fn default_cors_methods() -> Vec<String> {
    ["GET", "POST", "PUT", "DELETE", "PATCH", "OPTIONS"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_cors_headers() -> Vec<String> {
    vec!["Content-Type".to_string(), "Authorization".to_string()]
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: default_cors_origins(),
            allowed_methods: default_cors_methods(),
            allowed_headers: default_cors_headers(),
            expose_headers: Vec::new(),
            allow_credentials: false,
            max_age_secs: None,
        }
    }
}

/// Configuration for one gateway route.
///
/// A route maps a request pattern to either a single target origin or a
/// load-balanced target pool, with an optional policy stack (CORS, auth,
/// rate limiting, validation limits) and proxy behavior. Routes are immutable
/// after registration; request dispatch honors registration order.
///
/// # Examples
///
/// ```json
/// {
///   "pattern": "/api/users/:id",
///   "methods": ["GET", "PUT"],
///   "load_balancer": {
///     "strategy": "weighted",
///     "targets": [
///       {"url": "http://backend-1:8080", "weight": 2},
///       {"url": "http://backend-2:8080", "weight": 1}
///     ],
///     "health_check": {"path": "/health", "interval_ms": 10000}
///   },
///   "circuit_breaker": {"failure_threshold": 3, "reset_timeout_ms": 30000}
/// }
/// ```
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Route {
    /// Request pattern. Supports literal segments, named parameters
    /// (`/:name`) and a trailing wildcard (`/*`).
    pub pattern: String,

    /// Allowed HTTP methods (default: `["GET"]`).
    #[serde(default = "default_methods")]
    pub methods: Vec<String>,

    /// Single target origin. Mutually exclusive with `load_balancer`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,

    /// Overall route timeout in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<ProxyConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub circuit_breaker: Option<CircuitBreakerConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_balancer: Option<LoadBalancerConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RateLimitConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cors: Option<CorsConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limits: Option<RequestLimits>,

    /// Free-form route metadata, passed through untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
}

fn default_methods() -> Vec<String> {
    vec!["GET".to_string()]
}

impl Route {
    /// Validates the route configuration.
    ///
    /// # Errors
    ///
    /// Returns a descriptive message when the pattern does not start with
    /// `/`, a method is unknown, both or neither of `target`/`load_balancer`
    /// semantics are violated, or a nested config fails its own validation.
    pub fn validate(&self) -> Result<(), String> {
        if !self.pattern.starts_with('/') {
            return Err("Route pattern must start with '/'".to_string());
        }

        if self.methods.is_empty() {
            return Err("At least one HTTP method must be specified".to_string());
        }

        let valid_methods = [
            "GET", "POST", "PUT", "DELETE", "HEAD", "OPTIONS", "PATCH", "TRACE",
        ];
        for method in &self.methods {
            if !valid_methods.contains(&method.as_str()) {
                return Err(format!("Invalid HTTP method: {}", method));
            }
        }

        if self.target.is_some() && self.load_balancer.is_some() {
            return Err(
                "Route cannot configure both 'target' and 'load_balancer'".to_string(),
            );
        }

        if let Some(target) = &self.target {
            if !target.starts_with("http://") && !target.starts_with("https://") {
                return Err(format!(
                    "Target must start with http:// or https://: {}",
                    target
                ));
            }
        }

        if let Some(lb) = &self.load_balancer {
            lb.validate()?;
        }

        if let Some(auth) = &self.auth {
            auth.validate()?;
        }

        if let Some(proxy) = &self.proxy {
            for rule in &proxy.path_rewrite {
                regex::Regex::new(&rule.pattern)
                    .map_err(|e| format!("Invalid path rewrite pattern '{}': {}", rule.pattern, e))?;
            }
        }

        if let Some(limits) = &self.limits {
            for pattern in &limits.blocked_paths {
                regex::Regex::new(pattern)
                    .map_err(|e| format!("Invalid blocked path pattern '{}': {}", pattern, e))?;
            }
        }

        Ok(())
    }

    /// Targets configured for this route, whether single-target or pooled.
    pub fn target_configs(&self) -> Vec<TargetConfig> {
        if let Some(lb) = &self.load_balancer {
            lb.targets.clone()
        } else if let Some(target) = &self.target {
            vec![TargetConfig {
                url: target.clone(),
                weight: 1,
                meta: None,
            }]
        } else {
            Vec::new()
        }
    }
}
