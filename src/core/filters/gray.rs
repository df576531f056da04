//! Gray-release decision: flags the request for canary routing.
use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    config::{models::GrayFilterConfig, registry::DynamicConfigRegistry},
    core::{
        chain::{Filter, FilterAction},
        context::GatewayContext,
        errors::GatewayResult,
        filters::{decode_filter_config, find_filter_config, GRAY_FILTER_NAME, GRAY_FILTER_ORDER},
        gray::GrayStrategyManager,
    },
};

/// When any enabled gray instance exists, the configured strategy decides
/// whether this request carries the gray flag; the load-balance filter then
/// restricts its candidates accordingly. Gray is on by default when the
/// route carries no gray entry.
pub struct GrayFilter {
    registry: Arc<DynamicConfigRegistry>,
    strategies: GrayStrategyManager,
}

impl GrayFilter {
    pub fn new(registry: Arc<DynamicConfigRegistry>) -> Self {
        Self {
            registry,
            strategies: GrayStrategyManager::new(),
        }
    }
}

#[async_trait]
impl Filter for GrayFilter {
    async fn pre_filter(&self, ctx: &mut GatewayContext) -> GatewayResult<FilterAction> {
        if let Some(filter_config) = find_filter_config(&ctx.route.filter_configs, GRAY_FILTER_NAME)
        {
            if !filter_config.enable {
                return Ok(FilterAction::Continue);
            }
        }
        let config: GrayFilterConfig =
            decode_filter_config(&ctx.route.filter_configs, GRAY_FILTER_NAME).unwrap_or_default();

        let instances = self
            .registry
            .instances_by_service_name(&ctx.request.service_name);

        let is_gray = if instances.iter().any(|i| i.enabled && i.gray) {
            let strategy = self.strategies.strategy(&config.strategy_name);
            strategy.should_route_to_gray(ctx, &config, &instances)
        } else {
            false
        };
        ctx.request.is_gray = is_gray;
        if is_gray {
            tracing::debug!(request_id = %ctx.request.id, "request flagged for gray routing");
        }
        Ok(FilterAction::Continue)
    }

    fn name(&self) -> &'static str {
        GRAY_FILTER_NAME
    }

    fn order(&self) -> i32 {
        GRAY_FILTER_ORDER
    }
}
