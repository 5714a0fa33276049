//! Logging configuration for the portico gateway.
//!
//! - [`logger`] - structured console formatter and initialization
//!
//! Health-probe results log under the `health` target so operators can
//! filter them independently of request logs (`RUST_LOG=health=warn`).

pub mod logger;
