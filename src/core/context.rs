//! Per-request context, the single carrier threaded through the filter
//! chain.
//!
//! The context exclusively owns the request, the eventual response, the
//! matched route and the chain progress (cursor + phase flag). It is created
//! when the ingress server accepts a request and dropped after write-back;
//! all filter invocations for one request run on one task, so no locking is
//! needed on the context itself.
use std::net::SocketAddr;

use crate::{
    config::models::RouteDefinition,
    core::{errors::GatewayError, request::GatewayRequest, response::GatewayResponse},
};

pub struct GatewayContext {
    pub request: GatewayRequest,
    pub response: Option<GatewayResponse>,
    pub route: RouteDefinition,
    /// Whether the client asked for a persistent connection.
    pub keep_alive: bool,
    /// Peer address of the inbound connection, when known.
    pub client_addr: Option<SocketAddr>,
    /// Chain cursor: next pre-filter index, or current post-filter index.
    pub cur_filter_index: i32,
    /// Phase flag: pre-hooks while true, post-hooks afterwards.
    pub is_pre_phase: bool,
    /// Failure recorded on the way, if any.
    pub error: Option<GatewayError>,
}

impl GatewayContext {
    pub fn new(
        request: GatewayRequest,
        route: RouteDefinition,
        keep_alive: bool,
        client_addr: Option<SocketAddr>,
    ) -> Self {
        Self {
            request,
            response: None,
            route,
            keep_alive,
            client_addr,
            cur_filter_index: 0,
            is_pre_phase: true,
            error: None,
        }
    }

    pub fn set_response(&mut self, response: GatewayResponse) {
        self.response = Some(response);
    }
}
