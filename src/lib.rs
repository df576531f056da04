//! Meridian - a dynamic reverse-proxy API gateway.
//!
//! Meridian terminates client HTTP connections, matches each request to a
//! declarative route, applies an ordered chain of cross-cutting policies
//! (CORS, rate limiting, gray release, load balancing, resilience),
//! forwards the request asynchronously to a backend instance discovered
//! from a remote registry, and streams the response back. Routes and
//! service topology are re-read at runtime without a restart.
//!
//! # Features
//! - Declarative routes with `**` wildcard patterns, order-based selection
//! - Per-service rate limiting (token bucket, sliding window, leaky bucket)
//! - Gray release: threshold- and client-ip-based canary routing
//! - Pluggable load balancing, including consistent hashing with virtual
//!   nodes
//! - Resilience composition: retry, fallback, circuit breaker, bulkhead,
//!   thread-pool bulkhead in configurable order
//! - Hot route/topology updates pushed from remote sources
//! - Structured tracing via `tracing`, graceful shutdown
//!
//! # Quick Example
//! ```no_run
//! use std::sync::Arc;
//!
//! use meridian::{
//!     config::{models::GatewayConfig, registry::DynamicConfigRegistry},
//!     core::{build_filter_chain_factory, resilience::ResilienceExecutor},
//!     adapters::{IngressHandler, IngressServer, UpstreamClientAdapter},
//!     utils::GracefulShutdown,
//! };
//!
//! # #[tokio::main] async fn main() -> eyre::Result<()> {
//! let config = Arc::new(GatewayConfig::default());
//! let registry = Arc::new(DynamicConfigRegistry::new());
//! let upstream = Arc::new(UpstreamClientAdapter::new(&config.http_client));
//! let resilience = Arc::new(ResilienceExecutor::new(registry.clone()));
//! let chains = Arc::new(build_filter_chain_factory(
//!     registry.clone(),
//!     upstream,
//!     resilience,
//!     Vec::new(),
//! ));
//! let handler = Arc::new(IngressHandler::new(
//!     registry,
//!     chains,
//!     config.server.max_content_length,
//! ));
//! let server = IngressServer::new(config, handler);
//! server.run(Arc::new(GracefulShutdown::new())).await?;
//! # Ok(()) }
//! ```
//!
//! # Architecture
//! The crate separates **ports** (traits) from **adapters**
//! (implementations) and keeps business logic inside `core`. The dynamic
//! registry in `config` is the authoritative in-memory view of routes and
//! topology; everything derived from a route (filter chains, limiters,
//! resilience primitives) is cached per service and invalidated through
//! route-change listeners.
//!
//! # Error Handling
//! The request path uses the domain error in [`core::errors`]; fallible
//! setup APIs return `eyre::Result` with context attached.
pub mod adapters;
pub mod config;
pub mod core;
pub mod ports;
pub mod tracing_setup;
pub mod utils;

pub use crate::{
    adapters::{
        HttpConfigSource, HttpDiscoverySource, IngressHandler, IngressServer,
        UpstreamClientAdapter,
    },
    config::registry::DynamicConfigRegistry,
    core::{build_filter_chain_factory, resilience::ResilienceExecutor},
    ports::{ConfigSource, DiscoverySource, UpstreamClient},
    utils::GracefulShutdown,
};
