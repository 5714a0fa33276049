//! HTTP endpoint registration for the portico gateway.
//!
//! - [`http`] - the catch-all proxy resource backed by the request pipeline
//! - [`health`] - gateway health and target observability endpoints
//!
//! Health endpoints are registered before the catch-all so they resolve
//! without consulting the route table.

pub mod health;
pub mod http;
