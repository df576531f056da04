//! Business logic of the gateway: the request-processing pipeline and the
//! algorithms behind it. This layer performs no I/O of its own except
//! through the `ports` traits, so it stays testable in isolation.
pub mod balance;
pub mod chain;
pub mod context;
pub mod errors;
pub mod filters;
pub mod gray;
pub mod hash_ring;
pub mod limiter;
pub mod request;
pub mod resilience;
pub mod response;

use std::sync::Arc;

pub use chain::{Filter, FilterAction, FilterChain, FilterChainFactory};
pub use context::GatewayContext;
pub use errors::{GatewayError, GatewayResult, ResponseCode};
pub use request::GatewayRequest;
pub use response::GatewayResponse;

use crate::{config::registry::DynamicConfigRegistry, ports::UpstreamClient};

/// Wire the built-in filters into a chain factory. Extra filters (custom
/// policies referenced from route `filter_configs`) can be appended to
/// `extra_filters`.
pub fn build_filter_chain_factory(
    registry: Arc<DynamicConfigRegistry>,
    upstream_client: Arc<dyn UpstreamClient>,
    resilience: Arc<resilience::ResilienceExecutor>,
    extra_filters: Vec<Arc<dyn Filter>>,
) -> FilterChainFactory {
    let mut all_filters: Vec<Arc<dyn Filter>> = vec![
        Arc::new(filters::CorsFilter),
        Arc::new(filters::FlowFilter::new(registry.clone())),
        Arc::new(filters::GrayFilter::new(registry.clone())),
        Arc::new(filters::LoadBalanceFilter::new(registry.clone())),
        Arc::new(filters::RouteFilter::new(upstream_client, resilience)),
    ];
    all_filters.extend(extra_filters);

    FilterChainFactory::new(
        registry,
        all_filters,
        filters::built_in_pre_filters(),
        filters::ROUTE_FILTER_NAME,
    )
}
