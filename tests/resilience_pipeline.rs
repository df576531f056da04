//! Resilience behavior through the full pipeline.
mod common;

use http::{Method, StatusCode};
use meridian::config::models::{ResilienceConfig, ResiliencePolicy, UpstreamClientConfig};
use std::sync::atomic::Ordering;

#[tokio::test(flavor = "multi_thread")]
async fn timeout_is_retried_then_answered_by_the_fallback() {
    // Backend sleeps well past the client timeout, so every attempt fails.
    let (backend, hits) = common::spawn_backend("too slow", 1_000).await;

    let gateway = common::build_gateway_with(UpstreamClientConfig {
        connect_timeout_ms: 500,
        request_timeout_ms: 150,
        ..Default::default()
    });

    let mut route = common::route("r1", "demo", "/api/**");
    route.resilience = ResilienceConfig {
        enabled: true,
        order: vec![ResiliencePolicy::Retry, ResiliencePolicy::Fallback],
        retry_enabled: true,
        max_attempts: 2,
        wait_duration_ms: 10,
        fallback_enabled: true,
        ..Default::default()
    };
    gateway.registry.update_routes(vec![route], false);
    gateway
        .registry
        .add_service_instance("demo", common::instance("i1", backend.port()));

    let (status, headers, body) = common::call(&gateway.handler, Method::GET, "/api/x").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_ref(), b"\"gateway fallback\"");
    assert_eq!(
        headers.get(http::header::CONTENT_TYPE).unwrap(),
        "application/json;charset=utf-8"
    );
    // Both attempts reached the backend before the fallback fired.
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn exhausted_failure_without_fallback_is_503() {
    let gateway = common::build_gateway_with(UpstreamClientConfig {
        connect_timeout_ms: 200,
        request_timeout_ms: 500,
        ..Default::default()
    });

    let mut route = common::route("r1", "demo", "/api/**");
    route.resilience = ResilienceConfig {
        enabled: true,
        order: vec![ResiliencePolicy::Retry],
        retry_enabled: true,
        max_attempts: 2,
        wait_duration_ms: 10,
        ..Default::default()
    };
    gateway.registry.update_routes(vec![route], false);
    // Nothing listens on port 1.
    gateway
        .registry
        .add_service_instance("demo", common::instance("i1", 1));

    let (status, _headers, body) = common::call(&gateway.handler, Method::GET, "/api/x").await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body.as_ref(), b"\"service unavailable\"");
}

#[tokio::test(flavor = "multi_thread")]
async fn resilient_success_still_runs_the_post_phase() {
    let (backend, _hits) = common::spawn_backend("resilient ok", 0).await;
    let gateway = common::build_gateway();

    let mut route = common::route("r1", "demo", "/api/**");
    route.resilience = ResilienceConfig {
        enabled: true,
        order: vec![
            ResiliencePolicy::Retry,
            ResiliencePolicy::Fallback,
            ResiliencePolicy::Bulkhead,
        ],
        retry_enabled: true,
        fallback_enabled: true,
        bulkhead_enabled: true,
        max_concurrent_calls: 8,
        ..Default::default()
    };
    gateway.registry.update_routes(vec![route], false);
    gateway
        .registry
        .add_service_instance("demo", common::instance("i1", backend.port()));

    let (status, headers, body) = common::call(&gateway.handler, Method::GET, "/api/x").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_ref(), b"resilient ok");
    // CORS post-hook ran, so the response went through the post-phase.
    assert_eq!(headers.get("access-control-allow-origin").unwrap(), "*");
}

#[tokio::test(flavor = "multi_thread")]
async fn open_breaker_rejects_through_the_fallback() {
    let gateway = common::build_gateway_with(UpstreamClientConfig {
        connect_timeout_ms: 100,
        request_timeout_ms: 300,
        ..Default::default()
    });

    let mut route = common::route("r1", "demo", "/api/**");
    route.resilience = ResilienceConfig {
        enabled: true,
        order: vec![ResiliencePolicy::Circuitbreaker, ResiliencePolicy::Fallback],
        circuit_breaker_enabled: true,
        failure_rate_threshold: 50.0,
        minimum_number_of_calls: 2,
        sliding_window_size: 4,
        wait_duration_in_open_state_ms: 60_000,
        fallback_enabled: true,
        ..Default::default()
    };
    gateway.registry.update_routes(vec![route], false);
    gateway
        .registry
        .add_service_instance("demo", common::instance("i1", 1));

    // Two connection failures trip the breaker; each is answered by the
    // fallback, as is the rejected third call.
    for _ in 0..3 {
        let (status, _, body) = common::call(&gateway.handler, Method::GET, "/api/x").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_ref(), b"\"gateway fallback\"");
    }
}
