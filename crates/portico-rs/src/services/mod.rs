//! Service layer of the portico gateway.
//!
//! The services own the moving parts of request processing:
//!
//! - [`http`] - the request pipeline tying everything together
//! - [`load_balancer`] - target pools, selection strategies and counters
//! - [`session`] - sticky-session bindings and their expiry sweep
//! - [`health`] - periodic target probing
//! - [`circuit_breaker`] - per-route upstream protection
//! - [`proxy`] - upstream forwarding with streamed bodies
//! - [`hooks`] - request lifecycle hooks
//!
//! ```text
//! Client → Routes → Pipeline → Load Balancer → Circuit Breaker → Forwarder
//!   ↑                                                               ↓
//!   └────────────────────────── Response ←──────────────────────────┘
//! ```

pub mod circuit_breaker;
pub mod health;
pub mod hooks;
pub mod http;
pub mod load_balancer;
pub mod proxy;
pub mod session;
