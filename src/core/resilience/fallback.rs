//! Fallback handlers: degrade gracefully when the upstream call fails.
use std::{collections::HashMap, sync::Arc};

use http::StatusCode;

use crate::{
    config::models::ResilienceConfig,
    core::{
        errors::{GatewayError, ResponseCode},
        response::GatewayResponse,
    },
};

pub const DEFAULT_FALLBACK_HANDLER: &str = "default";

/// Turns an exhausted failure into the response the client receives.
pub trait FallbackHandler: Send + Sync + 'static {
    fn handle(&self, error: &GatewayError, config: &ResilienceConfig) -> GatewayResponse;

    fn name(&self) -> &'static str;
}

/// Synthesizes the `GATEWAY_FALLBACK` response, optionally with the status
/// configured on the route.
pub struct DefaultFallbackHandler;

impl FallbackHandler for DefaultFallbackHandler {
    fn handle(&self, error: &GatewayError, config: &ResilienceConfig) -> GatewayResponse {
        tracing::warn!(error = %error, "upstream call fell back");
        let mut response = GatewayResponse::from_code(ResponseCode::GatewayFallback);
        if let Some(status) = config
            .fallback_status
            .and_then(|code| StatusCode::from_u16(code).ok())
        {
            response.set_status(status);
        }
        response
    }

    fn name(&self) -> &'static str {
        DEFAULT_FALLBACK_HANDLER
    }
}

/// Name-keyed handler registry with the default handler as fallback.
pub struct FallbackHandlerManager {
    handlers: HashMap<&'static str, Arc<dyn FallbackHandler>>,
    default_handler: Arc<dyn FallbackHandler>,
}

impl FallbackHandlerManager {
    pub fn new() -> Self {
        let default_handler: Arc<dyn FallbackHandler> = Arc::new(DefaultFallbackHandler);
        let mut handlers: HashMap<&'static str, Arc<dyn FallbackHandler>> = HashMap::new();
        handlers.insert(default_handler.name(), default_handler.clone());
        Self {
            handlers,
            default_handler,
        }
    }

    /// Register an additional handler under its own name.
    pub fn register(&mut self, handler: Arc<dyn FallbackHandler>) {
        self.handlers.insert(handler.name(), handler);
    }

    pub fn handler(&self, name: &str) -> Arc<dyn FallbackHandler> {
        self.handlers
            .get(name)
            .cloned()
            .unwrap_or_else(|| self.default_handler.clone())
    }
}

impl Default for FallbackHandlerManager {
    fn default() -> Self {
        Self::new()
    }
}
