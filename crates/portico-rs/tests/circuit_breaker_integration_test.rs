//! Circuit breaker behavior through the full pipeline: opening, fast
//! rejection without upstream contact, half-open recovery and per-call
//! timeouts.

mod common;

use std::time::{Duration, Instant};

use actix_web::dev::Payload;
use actix_web::test;
use serde_json::json;

use common::spawn_upstream;
use portico_rs::models::route::Route;
use portico_rs::services::http::{GatewayOptions, RouteDefinition, RouteHandler};

fn handler_for(route: serde_json::Value) -> RouteHandler {
    let route: Route = serde_json::from_value(route).unwrap();
    RouteHandler::new(vec![RouteDefinition::new(route)], GatewayOptions::default()).unwrap()
}

fn get(path: &str) -> (actix_web::HttpRequest, Payload) {
    test::TestRequest::get()
        .uri(path)
        .peer_addr("127.0.0.1:40000".parse().unwrap())
        .to_http_parts()
}

#[actix_web::test]
async fn circuit_opens_after_threshold_then_recovers() {
    let upstream = spawn_upstream("a").await;
    upstream.set_status(500);

    let handler = handler_for(json!({
        "pattern": "/svc/*",
        "target": upstream.url(),
        "circuit_breaker": {
            "failure_threshold": 3,
            "reset_timeout_ms": 200,
            "per_call_timeout_ms": 5_000,
        },
    }));

    // Three consecutive 500s surface as 502 and trip the breaker.
    for i in 1..=3 {
        let (req, payload) = get("/svc/x");
        let resp = handler.handle_request(req, payload).await;
        assert_eq!(resp.status().as_u16(), 502, "failure {} should be 502", i);
    }
    assert_eq!(upstream.hits(), 3);

    // Open circuit: rejected with 503, upstream untouched.
    let (req, payload) = get("/svc/x");
    let resp = handler.handle_request(req, payload).await;
    assert_eq!(resp.status().as_u16(), 503);
    assert_eq!(upstream.hits(), 3, "open circuit must not contact upstream");

    // After the reset window the probe is admitted; a healthy upstream
    // closes the circuit again.
    tokio::time::sleep(Duration::from_millis(250)).await;
    upstream.set_status(200);

    let (req, payload) = get("/svc/x");
    let resp = handler.handle_request(req, payload).await;
    assert_eq!(resp.status().as_u16(), 200);

    let (req, payload) = get("/svc/x");
    let resp = handler.handle_request(req, payload).await;
    assert_eq!(resp.status().as_u16(), 200);
    assert_eq!(upstream.hits(), 5);
}

#[actix_web::test]
async fn failed_probe_reopens_the_circuit() {
    let upstream = spawn_upstream("a").await;
    upstream.set_status(500);

    let handler = handler_for(json!({
        "pattern": "/svc/*",
        "target": upstream.url(),
        "circuit_breaker": {
            "failure_threshold": 1,
            "reset_timeout_ms": 100,
            "per_call_timeout_ms": 5_000,
        },
    }));

    let (req, payload) = get("/svc/x");
    assert_eq!(handler.handle_request(req, payload).await.status().as_u16(), 502);

    tokio::time::sleep(Duration::from_millis(150)).await;

    // Probe admitted, still failing: back to open.
    let (req, payload) = get("/svc/x");
    assert_eq!(handler.handle_request(req, payload).await.status().as_u16(), 502);

    let (req, payload) = get("/svc/x");
    assert_eq!(handler.handle_request(req, payload).await.status().as_u16(), 503);
}

#[actix_web::test]
async fn per_call_timeout_yields_504_quickly() {
    let upstream = spawn_upstream("a").await;
    upstream.set_delay(Duration::from_secs(2));

    let handler = handler_for(json!({
        "pattern": "/svc/*",
        "target": upstream.url(),
        "circuit_breaker": {
            "failure_threshold": 10,
            "reset_timeout_ms": 1_000,
            "per_call_timeout_ms": 300,
        },
    }));

    let started = Instant::now();
    let (req, payload) = get("/svc/x");
    let resp = handler.handle_request(req, payload).await;
    let elapsed = started.elapsed();

    assert_eq!(resp.status().as_u16(), 504);
    assert!(
        elapsed < Duration::from_secs(1),
        "timeout took {:?}, expected ~300ms",
        elapsed
    );
}

#[actix_web::test]
async fn connect_errors_count_toward_the_threshold() {
    // Closed port: every call is a connect error.
    let handler = handler_for(json!({
        "pattern": "/svc/*",
        "target": "http://127.0.0.1:1",
        "circuit_breaker": {
            "failure_threshold": 2,
            "reset_timeout_ms": 60_000,
            "per_call_timeout_ms": 1_000,
        },
    }));

    for _ in 0..2 {
        let (req, payload) = get("/svc/x");
        assert_eq!(handler.handle_request(req, payload).await.status().as_u16(), 502);
    }

    let (req, payload) = get("/svc/x");
    assert_eq!(handler.handle_request(req, payload).await.status().as_u16(), 503);
}

#[actix_web::test]
async fn upstream_4xx_does_not_trip_the_breaker() {
    let upstream = spawn_upstream("a").await;
    upstream.set_status(429);

    let handler = handler_for(json!({
        "pattern": "/svc/*",
        "target": upstream.url(),
        "circuit_breaker": {
            "failure_threshold": 2,
            "reset_timeout_ms": 60_000,
            "per_call_timeout_ms": 5_000,
        },
    }));

    for _ in 0..5 {
        let (req, payload) = get("/svc/x");
        let resp = handler.handle_request(req, payload).await;
        assert_eq!(resp.status().as_u16(), 429, "4xx passes through");
    }
    assert_eq!(upstream.hits(), 5, "breaker must stay closed for 4xx");
}
