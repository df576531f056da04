//! Ingress HTTP server: accepts connections, aggregates requests, runs the
//! filter chain and writes the response back.
use std::{net::SocketAddr, sync::Arc, time::Instant};

use axum::{
    body::Body,
    extract::{ConnectInfo, Request},
    routing::any,
    Router,
};
use eyre::{Result, WrapErr};
use http::{header, request::Parts, HeaderMap, Response, Version};
use socket2::{Domain, Protocol, Socket, Type};
use tower_http::compression::CompressionLayer;
use tracing::Instrument;

use crate::{
    config::{models::GatewayConfig, registry::DynamicConfigRegistry, resolver},
    core::{
        chain::FilterChainFactory,
        context::GatewayContext,
        errors::{GatewayError, GatewayResult, ResponseCode},
        request::GatewayRequest,
        response::GatewayResponse,
    },
    tracing_setup,
    utils::GracefulShutdown,
};

const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

/// Per-request processing: context construction, chain dispatch, error
/// mapping, write-back.
pub struct IngressHandler {
    registry: Arc<DynamicConfigRegistry>,
    chain_factory: Arc<FilterChainFactory>,
    max_content_length: usize,
}

impl IngressHandler {
    pub fn new(
        registry: Arc<DynamicConfigRegistry>,
        chain_factory: Arc<FilterChainFactory>,
        max_content_length: usize,
    ) -> Self {
        Self {
            registry,
            chain_factory,
            max_content_length,
        }
    }

    pub async fn handle(&self, request: Request, client_addr: Option<SocketAddr>) -> Response<Body> {
        let started = Instant::now();
        let method = request.method().to_string();
        let path = request.uri().path().to_string();
        // One id for both the span and the request carrier, so log lines
        // correlate across the pipeline.
        let request_id = GatewayRequest::generate_id();
        let client_ip = client_addr.map(|addr| addr.ip().to_string());
        let user_agent = request
            .headers()
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(String::from);

        let span = tracing_setup::create_request_span(
            &method,
            &path,
            &request_id,
            client_ip.as_deref(),
            user_agent.as_deref(),
        );

        let response = self
            .process(request, request_id, client_addr)
            .instrument(span.clone())
            .await;

        let duration = started.elapsed();
        span.record("http.status_code", response.status().as_u16());
        span.record("duration_ms", duration.as_millis() as u64);
        tracing::info!(
            parent: &span,
            status = response.status().as_u16(),
            duration_ms = duration.as_millis() as u64,
            "request completed"
        );
        response
    }

    async fn process(
        &self,
        request: Request,
        request_id: String,
        client_addr: Option<SocketAddr>,
    ) -> Response<Body> {
        let (parts, body) = request.into_parts();
        let keep_alive = is_keep_alive(&parts);

        match self
            .run_pipeline(parts, body, request_id, client_addr, keep_alive)
            .await
        {
            Ok(response) => response,
            Err(error) => {
                tracing::error!(code = ?error.code(), error = %error, "request aborted");
                // Coded errors always close the connection.
                GatewayResponse::from_code(error.code()).into_http(false)
            }
        }
    }

    async fn run_pipeline(
        &self,
        parts: Parts,
        body: Body,
        request_id: String,
        client_addr: Option<SocketAddr>,
        keep_alive: bool,
    ) -> GatewayResult<Response<Body>> {
        let body = axum::body::to_bytes(body, self.max_content_length)
            .await
            .map_err(|e| GatewayError::Internal(format!("failed to aggregate request body: {e}")))?;

        let route = resolver::matching_route_by_uri(&self.registry, parts.uri.path())?;
        let client_ip = extract_client_ip(&parts.headers, client_addr);
        let request = GatewayRequest::with_id(
            request_id,
            route.service_name.clone(),
            &parts,
            body,
            client_ip,
        );
        let mut ctx = GatewayContext::new(request, route, keep_alive, client_addr);

        let chain = self.chain_factory.chain_for(&ctx.route);
        chain.execute(&mut ctx).await?;

        // Error write-backs close the channel; normal responses honor the
        // client's keep-alive request.
        let keep_open = ctx.keep_alive && ctx.error.is_none();
        let response = ctx
            .response
            .take()
            .unwrap_or_else(|| GatewayResponse::from_code(ResponseCode::InternalError));
        Ok(response.into_http(keep_open))
    }
}

/// Connection persistence per HTTP/1.x semantics.
fn is_keep_alive(parts: &Parts) -> bool {
    let connection = parts
        .headers
        .get(header::CONNECTION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if parts.version == Version::HTTP_10 {
        connection.eq_ignore_ascii_case("keep-alive")
    } else {
        !connection.eq_ignore_ascii_case("close")
    }
}

/// First non-empty token of the forwarding header, else the peer address.
fn extract_client_ip(headers: &HeaderMap, client_addr: Option<SocketAddr>) -> String {
    if let Some(forwarded) = headers
        .get(FORWARDED_FOR_HEADER)
        .and_then(|v| v.to_str().ok())
    {
        if let Some(first) = forwarded
            .split(',')
            .map(str::trim)
            .find(|token| !token.is_empty())
        {
            return first.to_string();
        }
    }
    client_addr
        .map(|addr| addr.ip().to_string())
        .unwrap_or_default()
}

/// The listening side: socket options per the gateway config, an axum
/// router dispatching every method and path into the handler, graceful
/// shutdown via the shared signal manager.
pub struct IngressServer {
    config: Arc<GatewayConfig>,
    handler: Arc<IngressHandler>,
}

impl IngressServer {
    pub fn new(config: Arc<GatewayConfig>, handler: Arc<IngressHandler>) -> Self {
        Self { config, handler }
    }

    fn bind(&self) -> Result<tokio::net::TcpListener> {
        let addr: SocketAddr = self
            .config
            .listen_addr
            .parse()
            .wrap_err("Failed to parse listen address")?;

        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
            .wrap_err("Failed to create listener socket")?;
        socket.set_reuse_address(true)?;
        socket.set_keepalive(true)?;
        socket.set_nodelay(true)?;
        socket.set_send_buffer_size(self.config.server.send_buffer_size)?;
        socket.set_recv_buffer_size(self.config.server.recv_buffer_size)?;
        socket.bind(&addr.into())?;
        socket.listen(self.config.server.backlog)?;
        socket.set_nonblocking(true)?;

        tokio::net::TcpListener::from_std(socket.into()).wrap_err("Failed to wrap listener")
    }

    pub async fn run(&self, shutdown: Arc<GracefulShutdown>) -> Result<()> {
        let listener = self.bind()?;
        let app = build_router(self.handler.clone());

        tracing::info!(listen_addr = %self.config.listen_addr, "ingress server started");

        tokio::select! {
            result = axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            ) => result.wrap_err("Server error"),
            reason = shutdown.wait_for_shutdown_signal() => {
                tracing::info!(?reason, "ingress server stopping");
                Ok(())
            }
        }
    }
}

fn build_router(handler: Arc<IngressHandler>) -> Router {
    let make_request_route = |handler: Arc<IngressHandler>| {
        any(
            move |ConnectInfo(client_addr): ConnectInfo<SocketAddr>, request: Request| {
                let handler = handler.clone();
                async move { handler.handle(request, Some(client_addr)).await }
            },
        )
    };

    Router::new()
        .route("/{*path}", make_request_route(handler.clone()))
        .route("/", make_request_route(handler))
        .layer(CompressionLayer::new())
}
