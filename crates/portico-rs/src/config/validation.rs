//! Comprehensive configuration validation with detailed reporting.
//!
//! Goes beyond the per-model `validate()` checks: cross-route consistency,
//! security posture and performance hints, reported in three buckets so the
//! gateway can refuse to start on errors while merely logging warnings and
//! recommendations.

use crate::models::settings::Settings;
use log::info;
use std::collections::HashSet;

/// Result of configuration validation.
#[derive(Debug, Clone)]
pub struct ValidationResult {
    /// Whether the configuration is usable (no errors).
    pub is_valid: bool,
    /// Problems that prevent startup.
    pub errors: Vec<String>,
    /// Issues worth fixing that do not block startup.
    pub warnings: Vec<String>,
    /// Suggestions for hardening or tuning.
    pub recommendations: Vec<String>,
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::new()
    }
}

impl ValidationResult {
    pub fn new() -> Self {
        Self {
            is_valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
            recommendations: Vec::new(),
        }
    }

    pub fn add_error(&mut self, error: String) {
        self.is_valid = false;
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: String) {
        self.warnings.push(warning);
    }

    pub fn add_recommendation(&mut self, recommendation: String) {
        self.recommendations.push(recommendation);
    }
}

/// Validator over the full settings tree.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Runs every check and returns the aggregated result.
    pub fn validate_comprehensive(settings: &Settings) -> ValidationResult {
        let mut result = ValidationResult::new();

        if let Err(e) = settings.validate() {
            result.add_error(e);
        }

        Self::check_duplicate_patterns(settings, &mut result);
        Self::check_auth_posture(settings, &mut result);
        Self::check_pools(settings, &mut result);
        Self::check_timeouts(settings, &mut result);

        info!(
            "Configuration validation: {} errors, {} warnings, {} recommendations",
            result.errors.len(),
            result.warnings.len(),
            result.recommendations.len()
        );

        result
    }

    /// Duplicate patterns are legal (registration order decides) but almost
    /// always a mistake.
    fn check_duplicate_patterns(settings: &Settings, result: &mut ValidationResult) {
        let mut seen = HashSet::new();
        for route in &settings.routes {
            let key = (route.pattern.clone(), route.methods.join(","));
            if !seen.insert(key) {
                result.add_warning(format!(
                    "Route pattern '{}' is registered more than once for the same methods; \
                     only the first registration will receive traffic",
                    route.pattern
                ));
            }
        }
    }

    fn check_auth_posture(settings: &Settings, result: &mut ValidationResult) {
        for route in &settings.routes {
            let Some(auth) = &route.auth else { continue };

            let sources = [
                auth.secret.is_some(),
                auth.public_key.is_some(),
                auth.jwks_url.is_some(),
                auth.api_keys.is_some(),
            ]
            .into_iter()
            .filter(|set| *set)
            .count();
            if sources != 1 {
                result.add_error(format!(
                    "Route '{}': auth config must set exactly one of 'secret', 'public_key', \
                     'jwks_url' or 'api_keys'",
                    route.pattern
                ));
            }
            if let Some(secret) = &auth.secret {
                if secret.len() < 32 {
                    result.add_error(format!(
                        "Route '{}': JWT secret shorter than 32 characters",
                        route.pattern
                    ));
                }
            }
            if let Some(url) = &auth.jwks_url {
                if url.starts_with("http://") {
                    result.add_warning(format!(
                        "Route '{}': jwks_url uses plain http; signing keys should come over TLS",
                        route.pattern
                    ));
                }
            }
            if auth.optional {
                result.add_recommendation(format!(
                    "Route '{}' uses optional authentication; confirm anonymous access is intended",
                    route.pattern
                ));
            }
        }

        let unauthenticated = settings
            .routes
            .iter()
            .filter(|r| r.auth.is_none())
            .count();
        if unauthenticated == settings.routes.len() && !settings.routes.is_empty() {
            result.add_recommendation(
                "No route configures authentication; consider protecting write endpoints"
                    .to_string(),
            );
        }
    }

    fn check_pools(settings: &Settings, result: &mut ValidationResult) {
        for route in &settings.routes {
            let Some(lb) = &route.load_balancer else { continue };

            let mut urls = HashSet::new();
            for target in &lb.targets {
                if !urls.insert(target.url.trim_end_matches('/')) {
                    result.add_warning(format!(
                        "Route '{}': duplicate target URL {}",
                        route.pattern, target.url
                    ));
                }
            }

            if lb.targets.iter().all(|t| t.weight == 0) {
                result.add_error(format!(
                    "Route '{}': every target has weight 0",
                    route.pattern
                ));
            }

            if lb.targets.len() > 1 && lb.health_check.is_none() {
                result.add_recommendation(format!(
                    "Route '{}' balances {} targets without health checks; \
                     unhealthy targets will keep receiving traffic",
                    route.pattern,
                    lb.targets.len()
                ));
            }

            if let Some(sticky) = &lb.sticky_session {
                if sticky.enabled && sticky.ttl_ms < 1_000 {
                    result.add_warning(format!(
                        "Route '{}': sticky session TTL of {}ms is below one second",
                        route.pattern, sticky.ttl_ms
                    ));
                }
            }
        }
    }

    fn check_timeouts(settings: &Settings, result: &mut ValidationResult) {
        for route in &settings.routes {
            if let Some(cb) = &route.circuit_breaker {
                if cb.per_call_timeout_ms == 0 {
                    result.add_error(format!(
                        "Route '{}': circuit breaker per-call timeout must be positive",
                        route.pattern
                    ));
                }
                if cb.reset_timeout_ms < 100 {
                    result.add_warning(format!(
                        "Route '{}': circuit breaker reset timeout of {}ms will flap",
                        route.pattern, cb.reset_timeout_ms
                    ));
                }
            }

            if let Some(timeout) = route.timeout_ms {
                if timeout > 300_000 {
                    result.add_warning(format!(
                        "Route '{}': timeout of {}ms exceeds five minutes",
                        route.pattern, timeout
                    ));
                }
            }
        }
    }
}
