//! Cross-origin resource sharing policy.
//!
//! Preflight requests (`OPTIONS` with `Origin` and
//! `Access-Control-Request-Method`) are answered directly and never reach
//! the rest of the chain. For all other requests the policy runs downstream
//! first and injects the response headers afterwards.

use actix_web::dev::Payload;
use actix_web::http::header;
use actix_web::http::Method;
use actix_web::{HttpRequest, HttpResponse};

use crate::middleware::{HandlerFuture, Middleware, Next};
use crate::models::route::CorsConfig;

pub struct CorsMiddleware {
    config: CorsConfig,
}

impl CorsMiddleware {
    pub fn new(config: CorsConfig) -> Self {
        Self { config }
    }

    fn allow_any_origin(&self) -> bool {
        self.config.allowed_origins.iter().any(|o| o == "*")
    }

    fn origin_allowed(&self, origin: &str) -> bool {
        self.allow_any_origin() || self.config.allowed_origins.iter().any(|o| o == origin)
    }

    /// Resolved `Access-Control-Allow-Origin` value for a request origin.
    ///
    /// Credentialed responses must echo the concrete origin; `*` is only
    /// usable without credentials.
    fn allow_origin_value(&self, origin: &str) -> Option<String> {
        if !self.origin_allowed(origin) {
            return None;
        }
        if self.allow_any_origin() && !self.config.allow_credentials {
            Some("*".to_string())
        } else {
            Some(origin.to_string())
        }
    }

    fn apply_headers(&self, resp: &mut HttpResponse, origin: &str) {
        let Some(allow_origin) = self.allow_origin_value(origin) else {
            return;
        };

        let headers = resp.headers_mut();
        if let Ok(value) = header::HeaderValue::from_str(&allow_origin) {
            headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
        }
        if self.config.allow_credentials {
            headers.insert(
                header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
                header::HeaderValue::from_static("true"),
            );
        }
        if !self.config.expose_headers.is_empty() {
            if let Ok(value) =
                header::HeaderValue::from_str(&self.config.expose_headers.join(", "))
            {
                headers.insert(header::ACCESS_CONTROL_EXPOSE_HEADERS, value);
            }
        }
        // Caches must key on the requesting origin when it is echoed back.
        if allow_origin != "*" {
            headers.insert(header::VARY, header::HeaderValue::from_static("Origin"));
        }
    }

    fn preflight_response(&self, origin: &str) -> HttpResponse {
        let Some(allow_origin) = self.allow_origin_value(origin) else {
            return HttpResponse::NoContent().finish();
        };

        let mut builder = HttpResponse::NoContent();
        builder.insert_header((header::ACCESS_CONTROL_ALLOW_ORIGIN, allow_origin.clone()));
        builder.insert_header((
            header::ACCESS_CONTROL_ALLOW_METHODS,
            self.config.allowed_methods.join(", "),
        ));
        builder.insert_header((
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            self.config.allowed_headers.join(", "),
        ));
        if self.config.allow_credentials {
            builder.insert_header((header::ACCESS_CONTROL_ALLOW_CREDENTIALS, "true"));
        }
        if let Some(max_age) = self.config.max_age_secs {
            builder.insert_header((header::ACCESS_CONTROL_MAX_AGE, max_age.to_string()));
        }
        if allow_origin != "*" {
            builder.insert_header((header::VARY, "Origin"));
        }
        builder.finish()
    }
}

fn is_preflight(req: &HttpRequest) -> bool {
    req.method() == Method::OPTIONS
        && req.headers().contains_key(header::ORIGIN)
        && req
            .headers()
            .contains_key(header::ACCESS_CONTROL_REQUEST_METHOD)
}

impl Middleware for CorsMiddleware {
    fn process(&self, req: HttpRequest, payload: Payload, next: Next) -> HandlerFuture {
        let origin = req
            .headers()
            .get(header::ORIGIN)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        if is_preflight(&req) {
            let response = self.preflight_response(origin.as_deref().unwrap_or(""));
            return Box::pin(async move { Ok(response) });
        }

        let policy = CorsMiddleware {
            config: self.config.clone(),
        };
        Box::pin(async move {
            let mut response = next.run(req, payload).await?;
            if let Some(origin) = origin {
                policy.apply_headers(&mut response, &origin);
            }
            Ok(response)
        })
    }
}
