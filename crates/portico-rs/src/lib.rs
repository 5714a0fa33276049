//! # portico-rs
//!
//! Core request-processing engine of the Portico HTTP API gateway.
//!
//! The engine receives a decoded HTTP request, matches it to a configured
//! route, runs the route's policy chain (CORS, authentication, rate
//! limiting, validation, security headers), selects a healthy upstream
//! target through the load balancer, forwards the request under
//! circuit-breaker protection and streams the response back, firing the
//! request lifecycle hooks at fixed points along the way.
//!
//! # Architecture
//!
//! ```text
//! Request → Router → Policy Chain → Load Balancer → Circuit Breaker → Forwarder
//!              │           │              │                │
//!            params     401/429/...   health probes    503/504/502
//!              └──────────── hooks fire around the upstream call ───────────┘
//! ```
//!
//! # Quick Start
//!
//! ```no_run
//! use portico_rs::models::settings::Settings;
//! use portico_rs::services::http::RouteHandler;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let settings: Settings = serde_json::from_str(
//!     r#"{
//!         "version": 1,
//!         "routes": [
//!             {"pattern": "/api/*", "target": "http://backend:8080"}
//!         ]
//!     }"#,
//! )?;
//! settings.validate().map_err(|e| e.to_string())?;
//!
//! // Inside the server runtime:
//! // let handler = RouteHandler::from_settings(&settings)?;
//! # let _ = settings;
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! - [`models`] - configuration types and the error taxonomy
//! - [`utils`] - route matching, URL building, client address resolution
//! - [`middleware`] - the policy chain
//! - [`services`] - load balancer, circuit breaker, prober, forwarder, pipeline
//! - [`config`] - settings loading and comprehensive validation
//! - [`logs`] - structured logging setup
//! - [`routes`] - actix resource registration

pub mod config;
pub mod logs;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod utils;
