//! Security response headers.
//!
//! Wraps the remainder of the chain so every response, including error
//! responses produced further down, carries the standard security header
//! set. `Strict-Transport-Security` is only emitted for TLS-terminated
//! requests.

use std::collections::BTreeMap;

use actix_web::dev::Payload;
use actix_web::http::header::{HeaderName, HeaderValue};
use actix_web::{HttpRequest, HttpResponse};

use crate::middleware::{HandlerFuture, Middleware, Next};

const BASE_HEADERS: &[(&str, &str)] = &[
    ("x-frame-options", "DENY"),
    ("x-content-type-options", "nosniff"),
    ("referrer-policy", "strict-origin-when-cross-origin"),
    ("content-security-policy", "default-src 'self'"),
    (
        "permissions-policy",
        "geolocation=(), microphone=(), camera=()",
    ),
];

const HSTS_VALUE: &str = "max-age=31536000; includeSubDomains";

/// Security header stage, shared by all routes.
#[derive(Debug, Default, Clone)]
pub struct SecurityHeadersMiddleware {
    custom: BTreeMap<String, String>,
}

impl SecurityHeadersMiddleware {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds custom headers emitted alongside the standard set. Custom values
    /// win over the defaults on name collision.
    pub fn with_custom(mut self, custom: BTreeMap<String, String>) -> Self {
        self.custom = custom;
        self
    }

    fn apply(&self, resp: &mut HttpResponse, tls: bool) {
        let headers = resp.headers_mut();
        for (name, value) in BASE_HEADERS {
            headers.insert(
                HeaderName::from_static(name),
                HeaderValue::from_static(value),
            );
        }
        if tls {
            headers.insert(
                HeaderName::from_static("strict-transport-security"),
                HeaderValue::from_static(HSTS_VALUE),
            );
        }
        for (name, value) in &self.custom {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                headers.insert(name, value);
            }
        }
    }
}

impl Middleware for SecurityHeadersMiddleware {
    fn process(&self, req: HttpRequest, payload: Payload, next: Next) -> HandlerFuture {
        let tls = req.connection_info().scheme() == "https";
        let policy = self.clone();
        Box::pin(async move {
            let mut response = next.run(req, payload).await?;
            policy.apply(&mut response, tls);
            Ok(response)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::{run_chain, TerminalFn};
    use std::rc::Rc;
    use std::sync::Arc;

    fn ok_terminal() -> TerminalFn {
        Rc::new(|_req, _payload| Box::pin(async { Ok(HttpResponse::Ok().finish()) }))
    }

    async fn run(middleware: SecurityHeadersMiddleware, req: HttpRequest) -> HttpResponse {
        let stack: Arc<Vec<Arc<dyn Middleware>>> =
            Arc::new(vec![Arc::new(middleware) as Arc<dyn Middleware>]);
        run_chain(stack, ok_terminal(), req, Payload::None)
            .await
            .unwrap()
    }

    #[actix_web::test]
    async fn standard_headers_are_present() {
        let req = actix_web::test::TestRequest::default().to_http_request();
        let resp = run(SecurityHeadersMiddleware::new(), req).await;

        assert_eq!(resp.headers().get("x-frame-options").unwrap(), "DENY");
        assert_eq!(
            resp.headers().get("x-content-type-options").unwrap(),
            "nosniff"
        );
        assert!(resp.headers().contains_key("content-security-policy"));
        // Plain HTTP requests must not advertise HSTS.
        assert!(!resp.headers().contains_key("strict-transport-security"));
    }

    #[actix_web::test]
    async fn custom_headers_are_appended() {
        let mut custom = BTreeMap::new();
        custom.insert("x-powered-by".to_string(), "portico".to_string());

        let req = actix_web::test::TestRequest::default().to_http_request();
        let resp = run(SecurityHeadersMiddleware::new().with_custom(custom), req).await;
        assert_eq!(resp.headers().get("x-powered-by").unwrap(), "portico");
    }
}
