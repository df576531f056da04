//! Flow control: per-service admission through a configured rate limiter.
use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    config::{
        models::{FlowFilterConfig, RouteDefinition},
        registry::DynamicConfigRegistry,
    },
    core::{
        chain::{Filter, FilterAction},
        context::GatewayContext,
        errors::GatewayResult,
        filters::{decode_filter_config, FLOW_FILTER_NAME, FLOW_FILTER_ORDER},
        limiter::{build_rate_limiter, RateLimiter},
    },
};

/// Obtains or creates the service's limiter from the route's flow config
/// and asks it to admit the request. The limiter cache is dropped by a
/// route-change listener so new config takes effect on the next request.
pub struct FlowFilter {
    registry: Arc<DynamicConfigRegistry>,
    limiters: Arc<scc::HashMap<String, Arc<dyn RateLimiter>>>,
    listened: Arc<scc::HashSet<String>>,
}

impl FlowFilter {
    pub fn new(registry: Arc<DynamicConfigRegistry>) -> Self {
        Self {
            registry,
            limiters: Arc::new(scc::HashMap::new()),
            listened: Arc::new(scc::HashSet::new()),
        }
    }

    fn limiter_for(&self, service_name: &str, config: &FlowFilterConfig) -> Arc<dyn RateLimiter> {
        if let Some(limiter) = self.limiters.read(service_name, |_, l| l.clone()) {
            return limiter;
        }

        if self.listened.insert(service_name.to_string()).is_ok() {
            let limiters = self.limiters.clone();
            self.registry.add_route_listener(
                service_name,
                Arc::new(move |route: &RouteDefinition| {
                    limiters.remove(&route.service_name);
                }),
            );
        }

        self.limiters
            .entry(service_name.to_string())
            .or_insert_with(|| build_rate_limiter(config))
            .get()
            .clone()
    }
}

#[async_trait]
impl Filter for FlowFilter {
    async fn pre_filter(&self, ctx: &mut GatewayContext) -> GatewayResult<FilterAction> {
        let config: FlowFilterConfig =
            decode_filter_config(&ctx.route.filter_configs, FLOW_FILTER_NAME).unwrap_or_default();
        if !config.enabled {
            return Ok(FilterAction::Continue);
        }

        let limiter = self.limiter_for(&ctx.request.service_name, &config);
        limiter.try_consume().await?;
        Ok(FilterAction::Continue)
    }

    fn name(&self) -> &'static str {
        FLOW_FILTER_NAME
    }

    fn order(&self) -> i32 {
        FLOW_FILTER_ORDER
    }
}
