#![allow(dead_code)]

use std::{
    net::SocketAddr,
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    },
    time::Duration,
};

use axum::{body::Body, Router};
use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode};
use meridian::{
    adapters::{IngressHandler, UpstreamClientAdapter},
    config::{
        models::{
            FilterConfig, GatewayConfig, ResilienceConfig, RouteDefinition, ServiceInstance,
            UpstreamClientConfig,
        },
        registry::DynamicConfigRegistry,
    },
    core::{build_filter_chain_factory, resilience::ResilienceExecutor},
};
use tokio::net::TcpListener;

pub fn route(id: &str, service_name: &str, uri: &str) -> RouteDefinition {
    RouteDefinition {
        id: id.to_string(),
        service_name: service_name.to_string(),
        uri: uri.to_string(),
        order: 0,
        filter_configs: Vec::new(),
        resilience: ResilienceConfig::default(),
    }
}

pub fn filter_config(name: &str, payload: serde_json::Value) -> FilterConfig {
    FilterConfig {
        name: name.to_string(),
        enable: true,
        config: payload,
    }
}

pub fn instance(id: &str, port: u16) -> ServiceInstance {
    ServiceInstance {
        instance_id: id.to_string(),
        ip: "127.0.0.1".to_string(),
        port,
        weight: 1,
        threshold: 0.0,
        enabled: true,
        gray: false,
    }
}

pub fn gray_instance(id: &str, port: u16, threshold: f64) -> ServiceInstance {
    ServiceInstance {
        gray: true,
        threshold,
        ..instance(id, port)
    }
}

/// A backend that counts hits and answers with a marker body after an
/// optional delay.
pub async fn spawn_backend(body: &'static str, delay_ms: u64) -> (SocketAddr, Arc<AtomicU32>) {
    let hits = Arc::new(AtomicU32::new(0));
    let counter = hits.clone();

    let app = Router::new().fallback(move || {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            if delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
            ([("x-backend", "mock")], body)
        }
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, hits)
}

pub struct TestGateway {
    pub registry: Arc<DynamicConfigRegistry>,
    pub handler: Arc<IngressHandler>,
}

pub fn build_gateway() -> TestGateway {
    build_gateway_with(UpstreamClientConfig::default())
}

pub fn build_gateway_with(client_config: UpstreamClientConfig) -> TestGateway {
    let config = GatewayConfig::default();
    let registry = Arc::new(DynamicConfigRegistry::new());
    let upstream = Arc::new(UpstreamClientAdapter::new(&client_config));
    let resilience = Arc::new(ResilienceExecutor::new(registry.clone()));
    let chain_factory = Arc::new(build_filter_chain_factory(
        registry.clone(),
        upstream,
        resilience,
        Vec::new(),
    ));
    let handler = Arc::new(IngressHandler::new(
        registry.clone(),
        chain_factory,
        config.server.max_content_length,
    ));
    TestGateway { registry, handler }
}

/// Run one request through the gateway handler and buffer the response.
pub async fn call(
    handler: &IngressHandler,
    method: Method,
    path: &str,
) -> (StatusCode, HeaderMap, Bytes) {
    let request = http::Request::builder()
        .method(method)
        .uri(path)
        .header(http::header::HOST, "gateway.test")
        .body(Body::empty())
        .unwrap();
    let client_addr: SocketAddr = "127.0.0.1:54321".parse().unwrap();

    let response = handler.handle(request, Some(client_addr)).await;
    let (parts, body) = response.into_parts();
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    (parts.status, parts.headers, bytes)
}
