//! Pooled upstream HTTP client built on Hyper.
//!
//! One adapter instance is shared process-wide. The connector enforces the
//! connect timeout; a whole-request timeout and a global in-flight cap wrap
//! each call. Backends are plain `ip:port` HTTP endpoints discovered at
//! runtime, so no TLS layer is wired in.
use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use axum::body::Body;
use http::{header, HeaderValue, Request, Response};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use tokio::{sync::Semaphore, time::timeout};

use crate::{
    config::models::UpstreamClientConfig,
    ports::{UpstreamClient, UpstreamError, UpstreamResult},
};

pub struct UpstreamClientAdapter {
    client: Client<HttpConnector, Body>,
    request_timeout: Duration,
    in_flight: Arc<Semaphore>,
}

impl UpstreamClientAdapter {
    pub fn new(config: &UpstreamClientConfig) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(Duration::from_millis(config.connect_timeout_ms)));
        connector.set_nodelay(true);
        connector.set_keepalive(Some(Duration::from_secs(60)));

        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_millis(config.pooled_idle_timeout_ms))
            .pool_max_idle_per_host(config.max_connections_per_host)
            .build(connector);

        tracing::info!(
            connect_timeout_ms = config.connect_timeout_ms,
            request_timeout_ms = config.request_timeout_ms,
            max_connections = config.max_connections,
            "created upstream HTTP client"
        );

        Self {
            client,
            request_timeout: Duration::from_millis(config.request_timeout_ms),
            in_flight: Arc::new(Semaphore::new(config.max_connections.max(1))),
        }
    }

    /// Hyper requires the Host header to match the target authority.
    fn set_host_header(request: &mut Request<Body>) -> UpstreamResult<()> {
        let authority = request
            .uri()
            .authority()
            .ok_or_else(|| {
                UpstreamError::InvalidRequest(format!("uri has no authority: {}", request.uri()))
            })?
            .to_string();
        let value = HeaderValue::from_str(&authority)
            .map_err(|e| UpstreamError::InvalidRequest(format!("bad authority: {e}")))?;
        request.headers_mut().insert(header::HOST, value);
        Ok(())
    }
}

#[async_trait]
impl UpstreamClient for UpstreamClientAdapter {
    async fn execute(&self, mut request: Request<Body>) -> UpstreamResult<Response<Body>> {
        Self::set_host_header(&mut request)?;

        let _permit = self
            .in_flight
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| UpstreamError::Connection("client is shutting down".to_string()))?;

        let span = tracing::info_span!(
            "backend_request",
            backend.url = %request.uri(),
            http.method = %request.method(),
            http.status_code = tracing::field::Empty,
        );
        let _enter = span.enter();

        let timeout_ms = self.request_timeout.as_millis() as u64;
        match timeout(self.request_timeout, self.client.request(request)).await {
            Ok(Ok(response)) => {
                tracing::Span::current().record("http.status_code", response.status().as_u16());
                Ok(response.map(Body::new))
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "backend request failed");
                Err(UpstreamError::Connection(e.to_string()))
            }
            Err(_) => {
                tracing::warn!(timeout_ms, "backend request timed out");
                Err(UpstreamError::Timeout(timeout_ms))
            }
        }
    }
}
