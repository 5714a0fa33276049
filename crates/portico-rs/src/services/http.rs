//! Core request pipeline for the portico gateway.
//!
//! The [`RouteHandler`] ties the subsystems together: it matches incoming
//! requests against the route table in registration order, runs each route's
//! policy chain, selects a target through the load balancer, forwards the
//! request under circuit-breaker protection and drives the lifecycle hooks
//! in their fixed order.
//!
//! ```text
//! Client → match → policy chain → select target → circuit breaker → upstream
//!            ↓          ↓              ↓               ↓
//!           404/405   401/429/413    503 none      503 open / 504 / 502
//! ```
//!
//! All recoverable failures surface as [`GatewayError`] values and are
//! rendered exactly once, at the top of the pipeline, with the request id.

use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use actix_web::cookie::{Cookie, SameSite};
use actix_web::dev::Payload;
use actix_web::{HttpMessage, HttpRequest, HttpResponse};
use log::{debug, error, info, warn};
use uuid::Uuid;

use crate::middleware::auth::{ApiKeyValidatorFn, AuthMiddleware};
use crate::middleware::cors::CorsMiddleware;
use crate::middleware::rate_limit::{KeyGeneratorFn, RateLimitMiddleware, SkipFn};
use crate::middleware::security::SecurityHeadersMiddleware;
use crate::middleware::validation::ValidationMiddleware;
use crate::middleware::{run_chain, HandlerFuture, Middleware, TerminalFn};
use crate::models::error::{accepts_json, GatewayError};
use crate::models::route::Route;
use crate::models::settings::Settings;
use crate::services::circuit_breaker::{Admission, BreakerSettings, CircuitBreaker};
use crate::services::health::{HealthProber, ProbeHandle};
use crate::services::hooks::{CircuitOutcome, Hooks};
use crate::services::load_balancer::{ConnectionGuard, LoadBalancer};
use crate::services::proxy::{to_client_response, Forwarder, ProxyOptions};
use crate::services::session::{spawn_sweeper, SweepHandle};
use crate::utils::client_ip::{client_key, TrustedProxies};
use crate::utils::route_matcher::{MatchOutcome, PathParams, RouteMatcher};

/// Inline handler attached to a route instead of an upstream target.
pub type InlineHandlerFn = Arc<dyn Fn(HttpRequest, Payload) -> HandlerFuture + Send + Sync>;

/// Custom top-level error handler. Returning `Err` falls back to the
/// built-in renderer; the built-in renderer falling over yields a generic
/// 500.
pub type ErrorHandlerFn =
    Arc<dyn Fn(&HttpRequest, &GatewayError) -> Result<HttpResponse, GatewayError> + Send + Sync>;

/// Request-scoped context created on entry and discarded with the request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    pub received_at: Instant,
}

/// URL of the target chosen for a request, stored in extensions once
/// selection completes.
#[derive(Debug, Clone)]
pub struct SelectedTarget(pub String);

/// A route plus the runtime attachments that cannot be expressed in config:
/// inline handler, user middlewares, hooks and pluggable policy functions.
pub struct RouteDefinition {
    pub route: Route,
    pub handler: Option<InlineHandlerFn>,
    pub middlewares: Vec<Arc<dyn Middleware>>,
    pub hooks: Hooks,
    pub key_generator: Option<KeyGeneratorFn>,
    pub rate_limit_skip: Option<SkipFn>,
    pub api_key_validator: Option<ApiKeyValidatorFn>,
}

impl RouteDefinition {
    pub fn new(route: Route) -> Self {
        Self {
            route,
            handler: None,
            middlewares: Vec::new(),
            hooks: Hooks::default(),
            key_generator: None,
            rate_limit_skip: None,
            api_key_validator: None,
        }
    }

    pub fn with_handler(mut self, handler: InlineHandlerFn) -> Self {
        self.handler = Some(handler);
        self
    }

    pub fn with_middleware(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middlewares.push(middleware);
        self
    }

    pub fn with_hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn with_key_generator(mut self, key_generator: KeyGeneratorFn) -> Self {
        self.key_generator = Some(key_generator);
        self
    }

    pub fn with_rate_limit_skip(mut self, skip: SkipFn) -> Self {
        self.rate_limit_skip = Some(skip);
        self
    }

    pub fn with_api_key_validator(mut self, validator: ApiKeyValidatorFn) -> Self {
        self.api_key_validator = Some(validator);
        self
    }
}

impl From<Route> for RouteDefinition {
    fn from(route: Route) -> Self {
        Self::new(route)
    }
}

/// Gateway-level options shared by every route.
#[derive(Debug, Clone)]
pub struct GatewayOptions {
    pub trusted_proxies: Vec<String>,
    /// Default upstream timeout when a route does not set its own.
    pub default_timeout_ms: u64,
}

impl Default for GatewayOptions {
    fn default() -> Self {
        Self {
            trusted_proxies: Vec::new(),
            default_timeout_ms: 30_000,
        }
    }
}

impl From<&Settings> for GatewayOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            trusted_proxies: settings.trusted_proxies.clone(),
            default_timeout_ms: settings.server.timeout_ms,
        }
    }
}

/// Compiled per-route runtime: policies, balancer, breaker, forwarder and
/// background task handles. Dropping the runtime winds the tasks down.
struct RouteRuntime {
    route: Route,
    policies: Arc<Vec<Arc<dyn Middleware>>>,
    handler: Option<InlineHandlerFn>,
    hooks: Hooks,
    balancer: Option<Arc<LoadBalancer>>,
    breaker: Arc<CircuitBreaker>,
    proxy_template: ProxyOptions,
    forwarder: Forwarder,
    timeout: Duration,
    _prober: Option<ProbeHandle>,
    _sweeper: Option<SweepHandle>,
}

/// The gateway request handler.
///
/// Cheap to clone; all state is shared behind `Arc`s. Safe to hand to every
/// actix worker.
#[derive(Clone)]
pub struct RouteHandler {
    routes: Arc<Vec<Arc<RouteRuntime>>>,
    matcher: Arc<RouteMatcher>,
    trusted_proxies: Arc<TrustedProxies>,
    default_handler: Option<InlineHandlerFn>,
    error_handler: Option<ErrorHandlerFn>,
}

impl RouteHandler {
    /// Compiles route definitions into the runtime table.
    ///
    /// Spawns health probers and session sweepers for routes that configure
    /// them, so this must run inside the server runtime.
    pub fn new(
        definitions: Vec<RouteDefinition>,
        options: GatewayOptions,
    ) -> Result<Self, GatewayError> {
        let shared_forwarder = Forwarder::default();
        let trusted = TrustedProxies::new(&options.trusted_proxies);

        let mut patterns = Vec::with_capacity(definitions.len());
        let mut runtimes = Vec::with_capacity(definitions.len());
        for definition in definitions {
            patterns.push((
                definition.route.pattern.clone(),
                definition.route.methods.clone(),
            ));
            runtimes.push(Arc::new(Self::build_runtime(
                definition,
                &options,
                &shared_forwarder,
            )?));
        }

        let matcher =
            RouteMatcher::new(patterns).map_err(|e| GatewayError::ConfigInvalid {
                message: e.to_string(),
            })?;

        info!("Compiled {} routes", runtimes.len());

        Ok(Self {
            routes: Arc::new(runtimes),
            matcher: Arc::new(matcher),
            trusted_proxies: Arc::new(trusted),
            default_handler: None,
            error_handler: None,
        })
    }

    /// Builds a handler straight from loaded settings.
    pub fn from_settings(settings: &Settings) -> Result<Self, GatewayError> {
        let options = GatewayOptions::from(settings);
        let definitions = settings
            .routes
            .iter()
            .cloned()
            .map(RouteDefinition::new)
            .collect();
        Self::new(definitions, options)
    }

    /// Replaces the built-in 404 response for unmatched paths.
    pub fn with_default_handler(mut self, handler: InlineHandlerFn) -> Self {
        self.default_handler = Some(handler);
        self
    }

    /// Installs a custom top-level error handler.
    pub fn with_error_handler(mut self, handler: ErrorHandlerFn) -> Self {
        self.error_handler = Some(handler);
        self
    }

    /// Load-balancer statistics per route pattern, for observability
    /// endpoints.
    pub fn balancer_snapshots(
        &self,
    ) -> Vec<(String, crate::services::load_balancer::LoadBalancerStats)> {
        self.routes
            .iter()
            .filter_map(|runtime| {
                runtime
                    .balancer
                    .as_ref()
                    .map(|b| (runtime.route.pattern.clone(), b.snapshot()))
            })
            .collect()
    }

    fn build_runtime(
        definition: RouteDefinition,
        options: &GatewayOptions,
        shared_forwarder: &Forwarder,
    ) -> Result<RouteRuntime, GatewayError> {
        let RouteDefinition {
            route,
            handler,
            middlewares,
            hooks,
            key_generator,
            rate_limit_skip,
            api_key_validator,
        } = definition;

        route
            .validate()
            .map_err(|message| GatewayError::ConfigInvalid { message })?;

        // Policy chain, fixed order: CORS, auth, rate limit, validation,
        // security headers, then user middlewares.
        let mut policies: Vec<Arc<dyn Middleware>> = Vec::new();
        if let Some(cors) = route.cors.clone() {
            policies.push(Arc::new(CorsMiddleware::new(cors)));
        }
        if let Some(auth_config) = &route.auth {
            let mut auth = AuthMiddleware::from_config(auth_config)?;
            if let Some(validator) = api_key_validator {
                auth = auth.with_api_key_validator(validator);
            }
            policies.push(Arc::new(auth));
        }
        if let Some(rate_limit) = route.rate_limit.clone() {
            let mut limiter = RateLimitMiddleware::new(
                rate_limit,
                TrustedProxies::new(&options.trusted_proxies),
            );
            if let Some(key_generator) = key_generator {
                limiter = limiter.with_key_generator(key_generator);
            }
            if let Some(skip) = rate_limit_skip {
                limiter = limiter.with_skip(skip);
            }
            policies.push(Arc::new(limiter));
        }
        policies.push(Arc::new(ValidationMiddleware::from_limits(
            route.limits.clone().unwrap_or_default(),
        )?));
        policies.push(Arc::new(SecurityHeadersMiddleware::new()));
        policies.extend(middlewares);

        let pattern = route.pattern.clone();
        let (balancer, prober, sweeper) = if let Some(lb_config) = &route.load_balancer {
            let balancer = LoadBalancer::new(pattern.clone(), lb_config);
            let prober = lb_config
                .health_check
                .as_ref()
                .filter(|h| h.enabled)
                .map(|h| HealthProber::new(h.clone()).spawn(&balancer));
            let sweeper = balancer.session_store().map(spawn_sweeper);
            (Some(balancer), prober, sweeper)
        } else if let Some(target) = &route.target {
            (Some(LoadBalancer::single(pattern.clone(), target)), None, None)
        } else {
            (None, None, None)
        };

        let breaker_settings = route
            .circuit_breaker
            .as_ref()
            .map(BreakerSettings::from)
            .unwrap_or_default();
        let breaker = Arc::new(CircuitBreaker::new(pattern.clone(), breaker_settings));

        let proxy_config = route.proxy.clone().unwrap_or_default();
        let proxy_template = ProxyOptions::from_config(&proxy_config)?;
        let forwarder = if proxy_config.follow_redirects {
            Forwarder::new(true, proxy_config.max_redirects)
        } else {
            shared_forwarder.clone()
        };

        let timeout = Duration::from_millis(
            route
                .timeout_ms
                .or(proxy_config.timeout_ms)
                .unwrap_or(options.default_timeout_ms),
        );

        Ok(RouteRuntime {
            route,
            policies: Arc::new(policies),
            handler,
            hooks,
            balancer,
            breaker,
            proxy_template,
            forwarder,
            timeout,
            _prober: prober,
            _sweeper: sweeper,
        })
    }

    /// Processes one request end to end, always producing a response.
    pub async fn handle_request(&self, req: HttpRequest, payload: Payload) -> HttpResponse {
        let request_id = req
            .headers()
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        req.extensions_mut().insert(RequestContext {
            request_id: request_id.clone(),
            received_at: Instant::now(),
        });

        let outcome = self.matcher.find(req.path(), req.method().as_str());
        let result = match outcome {
            MatchOutcome::Matched { index, params } => {
                self.dispatch(index, params, req.clone(), payload).await
            }
            MatchOutcome::MethodNotAllowed => Err(GatewayError::MethodNotAllowed {
                method: req.method().to_string(),
                path: req.path().to_string(),
            }),
            MatchOutcome::NotFound => match &self.default_handler {
                Some(handler) => handler(req.clone(), payload).await,
                None => Err(GatewayError::RouteNotFound {
                    path: req.path().to_string(),
                }),
            },
        };

        match result {
            Ok(response) => response,
            Err(err) => self.render_error(&req, &request_id, err),
        }
    }

    async fn dispatch(
        &self,
        index: usize,
        params: PathParams,
        req: HttpRequest,
        payload: Payload,
    ) -> Result<HttpResponse, GatewayError> {
        req.extensions_mut().insert(params);

        let runtime = self.routes[index].clone();
        let stack = runtime.policies.clone();
        let trusted = self.trusted_proxies.clone();

        let terminal: TerminalFn = Rc::new(move |req, payload| {
            let runtime = runtime.clone();
            let trusted = trusted.clone();
            Box::pin(async move { Self::terminal(runtime, trusted, req, payload).await })
        });

        run_chain(stack, terminal, req, payload).await
    }

    /// Terminal stage: inline handler or the hook-orchestrated proxy path.
    async fn terminal(
        runtime: Arc<RouteRuntime>,
        trusted: Arc<TrustedProxies>,
        req: HttpRequest,
        payload: Payload,
    ) -> Result<HttpResponse, GatewayError> {
        if let Some(handler) = runtime.handler.clone() {
            return handler(req, payload).await;
        }

        if runtime.balancer.is_none() {
            return Err(GatewayError::NotImplemented {
                path: req.path().to_string(),
            });
        }

        match Self::proxy_request(&runtime, &trusted, &req, payload).await {
            Ok(response) => {
                runtime.hooks.fire_after_response(&req, &response);
                Ok(response)
            }
            Err(error) => match runtime.hooks.fire_on_error(&req, &error) {
                Some(response) => {
                    debug!("on_error hook produced a response for {}", req.path());
                    Ok(response)
                }
                None => Err(error),
            },
        }
    }

    /// The proxy path proper: hooks 1-5 of the lifecycle, selection,
    /// connection accounting and latency recording.
    async fn proxy_request(
        runtime: &Arc<RouteRuntime>,
        trusted: &TrustedProxies,
        req: &HttpRequest,
        payload: Payload,
    ) -> Result<HttpResponse, GatewayError> {
        let Some(balancer) = runtime.balancer.as_ref() else {
            return Err(GatewayError::NotImplemented {
                path: req.path().to_string(),
            });
        };
        let pattern = runtime.route.pattern.clone();

        let mut options = runtime.proxy_template.clone();
        runtime.hooks.fire_before_request(req, &mut options);

        let session_id = balancer
            .sticky_settings()
            .and_then(|s| req.cookie(&s.cookie_name))
            .map(|c| c.value().to_string());

        let key = client_key(req, trusted);
        let selection = balancer
            .select(&key, session_id.as_deref())
            .ok_or(GatewayError::NoHealthyTargets { route: pattern.clone() })?;

        let target_url = selection.target.url().to_string();
        req.extensions_mut().insert(SelectedTarget(target_url.clone()));
        let guard = ConnectionGuard::new(selection.target.clone());

        let settings = runtime.breaker.settings().clone();
        runtime.hooks.fire_before_circuit(req, &settings);

        if runtime.breaker.try_acquire() == Admission::Rejected {
            runtime.hooks.fire_after_circuit(
                req,
                &CircuitOutcome {
                    state: runtime.breaker.state(),
                    success: false,
                    execution_time: Duration::ZERO,
                    error: Some("circuit open".to_string()),
                },
            );
            return Err(GatewayError::CircuitOpen { route: pattern });
        }

        let deadline = settings.per_call_timeout.min(runtime.timeout);
        let started = Instant::now();
        let outcome = tokio::time::timeout(
            deadline,
            runtime.forwarder.forward(req, payload, &target_url, &options),
        )
        .await;
        let elapsed = started.elapsed();

        let result = match outcome {
            Err(_) => Err(GatewayError::UpstreamTimeout {
                timeout_ms: deadline.as_millis() as u64,
            }),
            Ok(Err(e)) => Err(e),
            Ok(Ok(upstream)) => {
                let status = upstream.status().as_u16();
                if status >= 500 {
                    warn!(
                        "Upstream {} answered {} for {} {}, surfacing 502",
                        target_url,
                        status,
                        req.method(),
                        req.path()
                    );
                    Err(GatewayError::Upstream5xx {
                        status,
                        url: target_url.clone(),
                    })
                } else {
                    Ok(upstream)
                }
            }
        };

        match result {
            Ok(upstream) => {
                runtime.breaker.on_success();
                runtime.hooks.fire_after_circuit(
                    req,
                    &CircuitOutcome {
                        state: runtime.breaker.state(),
                        success: true,
                        execution_time: elapsed,
                        error: None,
                    },
                );
                balancer.record_response(&target_url, elapsed, false);

                let mut response = to_client_response(upstream, guard);
                if let Some(assignment) = &selection.session {
                    if assignment.is_new {
                        let secure = req.connection_info().scheme() == "https";
                        let cookie = Cookie::build(assignment.cookie_name.clone(), assignment.id.clone())
                            .http_only(true)
                            .same_site(SameSite::Strict)
                            .path("/")
                            .secure(secure)
                            .finish();
                        if let Err(e) = response.add_cookie(&cookie) {
                            warn!("Failed to attach session cookie: {}", e);
                        }
                    }
                }
                Ok(response)
            }
            Err(gateway_error) => {
                // GatewayError::is_circuit_failure is the single classifier
                // for what counts against the breaker. An admitted call must
                // resolve the half-open probe either way, so errors that do
                // not count still report success to the state machine.
                if gateway_error.is_circuit_failure() {
                    runtime.breaker.on_failure();
                } else {
                    runtime.breaker.on_success();
                }
                runtime.hooks.fire_after_circuit(
                    req,
                    &CircuitOutcome {
                        state: runtime.breaker.state(),
                        success: false,
                        execution_time: elapsed,
                        error: Some(gateway_error.to_string()),
                    },
                );
                balancer.record_response(&target_url, elapsed, true);
                drop(guard);
                Err(gateway_error)
            }
        }
    }

    /// Renders an error response, consulting the custom error handler first.
    fn render_error(&self, req: &HttpRequest, request_id: &str, err: GatewayError) -> HttpResponse {
        match &err {
            GatewayError::RouteNotFound { .. } | GatewayError::MethodNotAllowed { .. } => {
                debug!("{} {} -> {}", req.method(), req.path(), err)
            }
            GatewayError::Internal { .. } | GatewayError::ConfigInvalid { .. } => {
                error!("{} {} -> {}", req.method(), req.path(), err)
            }
            _ => warn!("{} {} -> {}", req.method(), req.path(), err),
        }

        if let Some(handler) = &self.error_handler {
            match handler(req, &err) {
                Ok(response) => return response,
                Err(handler_err) => {
                    error!("Error handler failed: {}", handler_err);
                    return HttpResponse::InternalServerError()
                        .content_type("text/plain; charset=utf-8")
                        .body("internal server error");
                }
            }
        }

        err.to_response(request_id, accepts_json(req))
    }
}
