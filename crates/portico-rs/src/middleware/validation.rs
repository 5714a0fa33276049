//! Request size and shape limits.
//!
//! All checks run before any handler: declared body size (413), URL length
//! (414), header count and total header bytes (431), query parameter count
//! and blocked path patterns (400). Limits come from route configuration
//! with conservative defaults.

use actix_web::dev::Payload;
use actix_web::HttpRequest;
use log::warn;
use regex::Regex;

use crate::middleware::{HandlerFuture, Middleware, Next};
use crate::models::error::GatewayError;
use crate::models::route::RequestLimits;

/// Validation stage for one route.
pub struct ValidationMiddleware {
    limits: RequestLimits,
    blocked: Vec<Regex>,
}

impl ValidationMiddleware {
    /// Builds the middleware, compiling the blocked-path patterns.
    pub fn from_limits(limits: RequestLimits) -> Result<Self, GatewayError> {
        let mut blocked = Vec::with_capacity(limits.blocked_paths.len());
        for pattern in &limits.blocked_paths {
            let regex = Regex::new(pattern).map_err(|e| GatewayError::ConfigInvalid {
                message: format!("blocked path pattern '{}': {}", pattern, e),
            })?;
            blocked.push(regex);
        }
        Ok(Self { limits, blocked })
    }

    fn check(&self, req: &HttpRequest) -> Result<(), GatewayError> {
        if let Some(length) = declared_content_length(req) {
            if length > self.limits.max_body_bytes {
                warn!(
                    "Rejecting request with declared body of {} bytes (limit {})",
                    length, self.limits.max_body_bytes
                );
                return Err(GatewayError::PayloadTooLarge {
                    limit: self.limits.max_body_bytes,
                });
            }
        }

        let url_length = req.uri().to_string().len();
        if url_length > self.limits.max_url_length {
            return Err(GatewayError::UriTooLong {
                limit: self.limits.max_url_length,
            });
        }

        let header_count = req.headers().len();
        if header_count > self.limits.max_header_count {
            return Err(GatewayError::HeadersTooLarge {
                message: format!(
                    "{} headers exceed the limit of {}",
                    header_count, self.limits.max_header_count
                ),
            });
        }

        let header_bytes: usize = req
            .headers()
            .iter()
            .map(|(name, value)| name.as_str().len() + value.len())
            .sum();
        if header_bytes > self.limits.max_header_bytes {
            return Err(GatewayError::HeadersTooLarge {
                message: format!(
                    "{} header bytes exceed the limit of {}",
                    header_bytes, self.limits.max_header_bytes
                ),
            });
        }

        let query_params = req
            .query_string()
            .split('&')
            .filter(|p| !p.is_empty())
            .count();
        if query_params > self.limits.max_query_params {
            return Err(GatewayError::BadRequest {
                message: format!(
                    "{} query parameters exceed the limit of {}",
                    query_params, self.limits.max_query_params
                ),
            });
        }

        for pattern in &self.blocked {
            if pattern.is_match(req.path()) {
                warn!("Blocked path {} matched pattern {}", req.path(), pattern);
                return Err(GatewayError::ValidationBlocked {
                    rule: pattern.to_string(),
                });
            }
        }

        Ok(())
    }
}

fn declared_content_length(req: &HttpRequest) -> Option<usize> {
    req.headers()
        .get("content-length")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok())
}

impl Middleware for ValidationMiddleware {
    fn process(&self, req: HttpRequest, payload: Payload, next: Next) -> HandlerFuture {
        match self.check(&req) {
            Ok(()) => next.run(req, payload),
            Err(error) => Box::pin(async move { Err(error) }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::{run_chain, TerminalFn};
    use actix_web::HttpResponse;
    use std::rc::Rc;
    use std::sync::Arc;

    fn middleware(limits: RequestLimits) -> Arc<Vec<Arc<dyn Middleware>>> {
        Arc::new(vec![
            Arc::new(ValidationMiddleware::from_limits(limits).unwrap()) as Arc<dyn Middleware>,
        ])
    }

    fn ok_terminal() -> TerminalFn {
        Rc::new(|_req, _payload| Box::pin(async { Ok(HttpResponse::Ok().finish()) }))
    }

    #[actix_web::test]
    async fn oversized_body_is_413_before_any_handler() {
        let stack = middleware(RequestLimits {
            max_body_bytes: 100,
            ..Default::default()
        });
        let terminal: TerminalFn =
            Rc::new(|_req, _payload| Box::pin(async { panic!("handler must not run") }));

        let req = actix_web::test::TestRequest::default()
            .insert_header(("content-length", "101"))
            .to_http_request();

        let result = run_chain(stack, terminal, req, Payload::None).await;
        assert!(matches!(
            result,
            Err(GatewayError::PayloadTooLarge { limit: 100 })
        ));
    }

    #[actix_web::test]
    async fn long_uri_is_414() {
        let stack = middleware(RequestLimits {
            max_url_length: 32,
            ..Default::default()
        });
        let long_path = format!("/api/{}", "x".repeat(64));
        let req = actix_web::test::TestRequest::default()
            .uri(&long_path)
            .to_http_request();

        let result = run_chain(stack, ok_terminal(), req, Payload::None).await;
        assert!(matches!(result, Err(GatewayError::UriTooLong { .. })));
    }

    #[actix_web::test]
    async fn too_many_headers_is_431() {
        let stack = middleware(RequestLimits {
            max_header_count: 2,
            ..Default::default()
        });
        let req = actix_web::test::TestRequest::default()
            .insert_header(("x-a", "1"))
            .insert_header(("x-b", "2"))
            .insert_header(("x-c", "3"))
            .to_http_request();

        let result = run_chain(stack, ok_terminal(), req, Payload::None).await;
        assert!(matches!(result, Err(GatewayError::HeadersTooLarge { .. })));
    }

    #[actix_web::test]
    async fn header_byte_budget_is_enforced() {
        let stack = middleware(RequestLimits {
            max_header_bytes: 16,
            ..Default::default()
        });
        let req = actix_web::test::TestRequest::default()
            .insert_header(("x-long-header-name", "with-a-long-value"))
            .to_http_request();

        let result = run_chain(stack, ok_terminal(), req, Payload::None).await;
        assert!(matches!(result, Err(GatewayError::HeadersTooLarge { .. })));
    }

    #[actix_web::test]
    async fn too_many_query_params_is_400() {
        let stack = middleware(RequestLimits {
            max_query_params: 2,
            ..Default::default()
        });
        let req = actix_web::test::TestRequest::default()
            .uri("/search?a=1&b=2&c=3")
            .to_http_request();

        let result = run_chain(stack, ok_terminal(), req, Payload::None).await;
        assert!(matches!(result, Err(GatewayError::BadRequest { .. })));
    }

    #[actix_web::test]
    async fn blocked_path_pattern_is_400() {
        let stack = middleware(RequestLimits {
            blocked_paths: vec![r"\.\./".to_string()],
            ..Default::default()
        });
        let req = actix_web::test::TestRequest::default()
            .uri("/files/../etc/passwd")
            .to_http_request();

        let result = run_chain(stack, ok_terminal(), req, Payload::None).await;
        assert!(matches!(result, Err(GatewayError::ValidationBlocked { .. })));
    }

    #[actix_web::test]
    async fn compliant_request_passes() {
        let stack = middleware(RequestLimits::default());
        let req = actix_web::test::TestRequest::default()
            .uri("/api/users?page=1")
            .insert_header(("content-length", "64"))
            .to_http_request();

        let result = run_chain(stack, ok_terminal(), req, Payload::None).await;
        assert!(result.is_ok());
    }
}
