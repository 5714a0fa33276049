//! Fixed-window rate limiting.
//!
//! Counters live in a process-local store keyed by a pluggable key generator
//! (default: the trusted-proxy-aware client IP). Every limited request gains
//! `X-RateLimit-Limit/Used/Remaining/Reset` response headers; requests over
//! the window budget are rejected with 429, `Retry-After` and a JSON body.
//! Expired windows are swept opportunistically so the store stays bounded.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use actix_web::dev::Payload;
use actix_web::http::header::{HeaderName, HeaderValue};
use actix_web::{HttpRequest, HttpResponse};
use log::{debug, info, warn};

use crate::middleware::{HandlerFuture, Middleware, Next};
use crate::models::error::GatewayError;
use crate::models::route::RateLimitConfig;
use crate::utils::client_ip::{client_key, TrustedProxies};

/// Minimum spacing between store sweeps.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(300);

/// Derives the limiting key for a request.
pub type KeyGeneratorFn = Arc<dyn Fn(&HttpRequest) -> String + Send + Sync>;

/// Predicate that bypasses limiting for matching requests.
pub type SkipFn = Arc<dyn Fn(&HttpRequest) -> bool + Send + Sync>;

#[derive(Debug)]
struct WindowEntry {
    count: u64,
    window_start: Instant,
    reset_epoch_secs: u64,
}

/// Outcome of a rate-limit check, carrying everything needed for the
/// protocol headers.
#[derive(Debug, Clone)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u64,
    pub used: u64,
    pub reset_epoch_secs: u64,
    pub retry_after_secs: u64,
}

/// Process-local fixed-window counter store.
#[derive(Debug)]
pub struct FixedWindowStore {
    entries: RwLock<HashMap<String, WindowEntry>>,
    last_cleanup: Mutex<Instant>,
}

impl FixedWindowStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            last_cleanup: Mutex::new(Instant::now()),
        }
    }

    /// Counts one request against `key`, rolling the window when it has
    /// elapsed.
    pub fn check(&self, key: &str, window: Duration, max: u64) -> RateLimitDecision {
        self.cleanup(window);

        let now = Instant::now();
        let mut entries = self.entries.write().unwrap();
        let entry = entries.entry(key.to_string()).or_insert_with(|| WindowEntry {
            count: 0,
            window_start: now,
            reset_epoch_secs: epoch_secs() + window.as_secs(),
        });

        if now.duration_since(entry.window_start) >= window {
            entry.count = 0;
            entry.window_start = now;
            entry.reset_epoch_secs = epoch_secs() + window.as_secs();
        }

        entry.count += 1;
        let allowed = entry.count <= max;
        let retry_after = entry
            .reset_epoch_secs
            .saturating_sub(epoch_secs())
            .max(1);

        RateLimitDecision {
            allowed,
            limit: max,
            used: entry.count,
            reset_epoch_secs: entry.reset_epoch_secs,
            retry_after_secs: retry_after,
        }
    }

    fn cleanup(&self, window: Duration) {
        let mut last_cleanup = self.last_cleanup.lock().unwrap();
        if last_cleanup.elapsed() < CLEANUP_INTERVAL {
            return;
        }
        *last_cleanup = Instant::now();
        drop(last_cleanup);

        let now = Instant::now();
        let mut entries = self.entries.write().unwrap();
        let threshold = window * 2;
        entries.retain(|_, entry| now.duration_since(entry.window_start) < threshold);
        info!("Rate limiter cleanup: {} entries retained", entries.len());
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }
}

impl Default for FixedWindowStore {
    fn default() -> Self {
        Self::new()
    }
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Rate-limiting stage for one route.
pub struct RateLimitMiddleware {
    config: RateLimitConfig,
    store: Arc<FixedWindowStore>,
    key_generator: KeyGeneratorFn,
    skip: Option<SkipFn>,
}

impl RateLimitMiddleware {
    pub fn new(config: RateLimitConfig, trusted_proxies: TrustedProxies) -> Self {
        let trusted = Arc::new(trusted_proxies);
        let key_generator: KeyGeneratorFn =
            Arc::new(move |req: &HttpRequest| client_key(req, &trusted));
        Self {
            config,
            store: Arc::new(FixedWindowStore::new()),
            key_generator,
            skip: None,
        }
    }

    /// Replaces the default client-IP key generator.
    pub fn with_key_generator(mut self, key_generator: KeyGeneratorFn) -> Self {
        self.key_generator = key_generator;
        self
    }

    /// Installs a skip predicate consulted before any counting.
    pub fn with_skip(mut self, skip: SkipFn) -> Self {
        self.skip = Some(skip);
        self
    }

    fn is_exempt(&self, req: &HttpRequest) -> bool {
        if self
            .config
            .exclude_paths
            .iter()
            .any(|p| req.path().starts_with(p))
        {
            return true;
        }
        self.skip.as_ref().map(|skip| skip(req)).unwrap_or(false)
    }
}

fn apply_headers(resp: &mut HttpResponse, decision: &RateLimitDecision) {
    let headers = resp.headers_mut();
    let pairs = [
        ("x-ratelimit-limit", decision.limit.to_string()),
        ("x-ratelimit-used", decision.used.to_string()),
        (
            "x-ratelimit-remaining",
            decision.limit.saturating_sub(decision.used).to_string(),
        ),
        ("x-ratelimit-reset", decision.reset_epoch_secs.to_string()),
    ];
    for (name, value) in pairs {
        if let Ok(value) = HeaderValue::from_str(&value) {
            headers.insert(HeaderName::from_static(name), value);
        }
    }
}

impl Middleware for RateLimitMiddleware {
    fn process(&self, req: HttpRequest, payload: Payload, next: Next) -> HandlerFuture {
        if self.is_exempt(&req) {
            return next.run(req, payload);
        }

        let key = (self.key_generator)(&req);
        let decision = self.store.check(
            &key,
            Duration::from_millis(self.config.window_ms),
            self.config.max,
        );

        if !decision.allowed {
            warn!("Rate limit exceeded for key {}", key);
            return Box::pin(async move {
                Err(GatewayError::RateLimited {
                    limit: decision.limit,
                    used: decision.used,
                    reset_epoch_secs: decision.reset_epoch_secs,
                    retry_after_secs: decision.retry_after_secs,
                })
            });
        }

        debug!(
            "Rate limit {}/{} for key {}",
            decision.used, decision.limit, key
        );
        Box::pin(async move {
            let mut response = next.run(req, payload).await?;
            apply_headers(&mut response, &decision);
            Ok(response)
        })
    }
}
