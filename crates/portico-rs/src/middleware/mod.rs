//! Policy middleware chain for the request pipeline.
//!
//! Every registered route gets a chain built in a fixed order: CORS,
//! authentication, rate limiting, size/validation checks, security headers,
//! then any route-specific user middlewares, then the terminal handler
//! (fixed handler or proxy path). The security-critical stages always run
//! before user middlewares; the order cannot be altered.
//!
//! Middlewares implement a `process(request, payload, next)` contract and
//! compose by delegating to [`Next`], which curries the remainder of the
//! chain. Recoverable failures are returned as [`GatewayError`] values and
//! rendered once, at the top of the pipeline.
//!
//! # Module Organization
//!
//! - [`cors`] - preflight handling and response header injection
//! - [`auth`] - JWT bearer / API key authentication
//! - [`rate_limit`] - fixed-window rate limiting with `X-RateLimit-*` headers
//! - [`validation`] - request size and shape limits
//! - [`security`] - security response headers

pub mod auth;
pub mod cors;
pub mod rate_limit;
pub mod security;
pub mod validation;

use std::rc::Rc;
use std::sync::Arc;

use actix_web::dev::Payload;
use actix_web::{HttpRequest, HttpResponse};
use futures::future::LocalBoxFuture;

use crate::models::error::GatewayError;

/// Future returned by middlewares and terminal handlers.
///
/// Local (non-`Send`) because actix requests are pinned to one worker.
pub type HandlerFuture = LocalBoxFuture<'static, Result<HttpResponse, GatewayError>>;

/// Terminal stage of a chain, invoked when every middleware has passed.
pub type TerminalFn = Rc<dyn Fn(HttpRequest, Payload) -> HandlerFuture>;

/// A single middleware stage.
///
/// Implementations decide whether to short-circuit (return a response or an
/// error without running `next`) or to delegate and optionally post-process
/// the downstream response.
pub trait Middleware: Send + Sync {
    fn process(&self, req: HttpRequest, payload: Payload, next: Next) -> HandlerFuture;
}

/// The remainder of a middleware chain.
///
/// Calling [`Next::run`] executes the next middleware, or the terminal
/// handler once the stack is exhausted.
pub struct Next {
    stack: Arc<Vec<Arc<dyn Middleware>>>,
    index: usize,
    terminal: TerminalFn,
}

impl Next {
    pub fn run(self, req: HttpRequest, payload: Payload) -> HandlerFuture {
        match self.stack.get(self.index).cloned() {
            Some(middleware) => {
                let next = Next {
                    stack: self.stack,
                    index: self.index + 1,
                    terminal: self.terminal,
                };
                middleware.process(req, payload, next)
            }
            None => (self.terminal)(req, payload),
        }
    }
}

/// Runs a full chain against a request.
pub fn run_chain(
    stack: Arc<Vec<Arc<dyn Middleware>>>,
    terminal: TerminalFn,
    req: HttpRequest,
    payload: Payload,
) -> HandlerFuture {
    Next {
        stack,
        index: 0,
        terminal,
    }
    .run(req, payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Recorder {
        id: usize,
        order: Arc<std::sync::Mutex<Vec<usize>>>,
    }

    impl Middleware for Recorder {
        fn process(&self, req: HttpRequest, payload: Payload, next: Next) -> HandlerFuture {
            self.order.lock().unwrap().push(self.id);
            next.run(req, payload)
        }
    }

    struct ShortCircuit;

    impl Middleware for ShortCircuit {
        fn process(&self, _req: HttpRequest, _payload: Payload, _next: Next) -> HandlerFuture {
            Box::pin(async { Ok(HttpResponse::NoContent().finish()) })
        }
    }

    fn request() -> (HttpRequest, Payload) {
        let req = actix_web::test::TestRequest::default().to_http_request();
        (req, Payload::None)
    }

    #[actix_web::test]
    async fn chain_runs_in_order_then_terminal() {
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let stack: Arc<Vec<Arc<dyn Middleware>>> = Arc::new(vec![
            Arc::new(Recorder {
                id: 1,
                order: order.clone(),
            }),
            Arc::new(Recorder {
                id: 2,
                order: order.clone(),
            }),
        ]);

        let terminal_hits = Arc::new(AtomicUsize::new(0));
        let hits = terminal_hits.clone();
        let terminal: TerminalFn = Rc::new(move |_req, _payload| {
            hits.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Ok(HttpResponse::Ok().finish()) })
        });

        let (req, payload) = request();
        let resp = run_chain(stack, terminal, req, payload).await.unwrap();

        assert_eq!(resp.status(), actix_web::http::StatusCode::OK);
        assert_eq!(*order.lock().unwrap(), vec![1, 2]);
        assert_eq!(terminal_hits.load(Ordering::SeqCst), 1);
    }

    #[actix_web::test]
    async fn short_circuit_skips_terminal() {
        let stack: Arc<Vec<Arc<dyn Middleware>>> = Arc::new(vec![Arc::new(ShortCircuit)]);
        let terminal: TerminalFn = Rc::new(|_req, _payload| {
            Box::pin(async { panic!("terminal must not run") })
        });

        let (req, payload) = request();
        let resp = run_chain(stack, terminal, req, payload).await.unwrap();
        assert_eq!(resp.status(), actix_web::http::StatusCode::NO_CONTENT);
    }
}
