//! Gateway health and observability endpoints.

use actix_web::{web, HttpResponse, Result};
use serde_json::json;

use crate::services::http::RouteHandler;

/// General health check with service status, version and timestamp.
///
/// # Response Format
///
/// ```json
/// {
///   "status": "healthy",
///   "version": "0.3.2",
///   "timestamp": "2026-03-15T10:30:00Z"
/// }
/// ```
pub async fn health_check() -> Result<HttpResponse> {
    Ok(HttpResponse::Ok().json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    })))
}

/// Readiness probe endpoint for orchestrators.
pub async fn readiness_check() -> Result<HttpResponse> {
    Ok(HttpResponse::Ok().json(json!({
        "status": "ready",
        "timestamp": chrono::Utc::now().to_rfc3339()
    })))
}

/// Liveness probe endpoint for orchestrators.
pub async fn liveness_check() -> Result<HttpResponse> {
    Ok(HttpResponse::Ok().json(json!({
        "status": "alive",
        "timestamp": chrono::Utc::now().to_rfc3339()
    })))
}

/// Per-route load-balancer snapshots: target health, connection counts and
/// latency averages.
pub async fn target_health(handler: web::Data<RouteHandler>) -> Result<HttpResponse> {
    let snapshots: Vec<_> = handler
        .balancer_snapshots()
        .into_iter()
        .map(|(pattern, stats)| {
            json!({
                "route": pattern,
                "stats": stats,
            })
        })
        .collect();

    Ok(HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "routes": snapshots,
    })))
}

/// Registers the health endpoints.
///
/// - `GET /health` - general health information
/// - `GET /ready` - readiness probe
/// - `GET /live` - liveness probe
/// - `GET /health/targets` - load-balancer target snapshots
pub fn configure_health(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health_check))
        .route("/health/targets", web::get().to(target_health))
        .route("/ready", web::get().to(readiness_check))
        .route("/live", web::get().to(liveness_check));
}
