//! Lifecycle hooks fired around every proxied request.
//!
//! For a successful request the sequence is exactly: `before_request`,
//! `before_circuit`, `after_circuit`, `after_response`. Any failure from
//! `before_request` onward replaces `after_response` with a single `on_error`
//! invocation; a response returned by `on_error` becomes the client response,
//! otherwise the error renders through the gateway taxonomy.

use std::sync::Arc;
use std::time::Duration;

use actix_web::{HttpRequest, HttpResponse};

use crate::models::error::GatewayError;
use crate::services::circuit_breaker::{BreakerSettings, CircuitState};
use crate::services::proxy::ProxyOptions;

/// Outcome handed to `after_circuit` after every admission attempt,
/// rejections included.
#[derive(Debug, Clone)]
pub struct CircuitOutcome {
    pub state: CircuitState,
    pub success: bool,
    pub execution_time: Duration,
    pub error: Option<String>,
}

pub type BeforeRequestFn = Arc<dyn Fn(&HttpRequest, &mut ProxyOptions) + Send + Sync>;
pub type BeforeCircuitFn = Arc<dyn Fn(&HttpRequest, &BreakerSettings) + Send + Sync>;
pub type AfterCircuitFn = Arc<dyn Fn(&HttpRequest, &CircuitOutcome) + Send + Sync>;
pub type AfterResponseFn = Arc<dyn Fn(&HttpRequest, &HttpResponse) + Send + Sync>;
pub type OnErrorFn = Arc<dyn Fn(&HttpRequest, &GatewayError) -> Option<HttpResponse> + Send + Sync>;

/// Hook set attached to a route. All hooks are optional.
#[derive(Clone, Default)]
pub struct Hooks {
    pub before_request: Option<BeforeRequestFn>,
    pub before_circuit: Option<BeforeCircuitFn>,
    pub after_circuit: Option<AfterCircuitFn>,
    pub after_response: Option<AfterResponseFn>,
    pub on_error: Option<OnErrorFn>,
}

impl Hooks {
    pub fn fire_before_request(&self, req: &HttpRequest, options: &mut ProxyOptions) {
        if let Some(hook) = &self.before_request {
            hook(req, options);
        }
    }

    pub fn fire_before_circuit(&self, req: &HttpRequest, settings: &BreakerSettings) {
        if let Some(hook) = &self.before_circuit {
            hook(req, settings);
        }
    }

    pub fn fire_after_circuit(&self, req: &HttpRequest, outcome: &CircuitOutcome) {
        if let Some(hook) = &self.after_circuit {
            hook(req, outcome);
        }
    }

    pub fn fire_after_response(&self, req: &HttpRequest, response: &HttpResponse) {
        if let Some(hook) = &self.after_response {
            hook(req, response);
        }
    }

    /// Fires `on_error`; a returned response replaces the error on the wire.
    pub fn fire_on_error(
        &self,
        req: &HttpRequest,
        error: &GatewayError,
    ) -> Option<HttpResponse> {
        self.on_error.as_ref().and_then(|hook| hook(req, error))
    }
}

impl std::fmt::Debug for Hooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hooks")
            .field("before_request", &self.before_request.is_some())
            .field("before_circuit", &self.before_circuit.is_some())
            .field("after_circuit", &self.after_circuit.is_some())
            .field("after_response", &self.after_response.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}
