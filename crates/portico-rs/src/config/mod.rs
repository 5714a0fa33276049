//! Configuration management for the portico gateway.
//!
//! - [`settings`] - configuration file loading (JSON, env-var path override)
//! - [`validation`] - comprehensive startup validation with errors, warnings
//!   and recommendations
//!
//! The loader enforces a file-size cap and runs the per-model validation;
//! [`validation::ConfigValidator`] layers cross-route and security checks on
//! top, and the gateway binary refuses to start when it reports errors.

pub mod settings;
pub mod validation;
