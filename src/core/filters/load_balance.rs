//! Instance selection: rewrites the request target to one backend.
use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    config::{
        models::{LoadBalanceFilterConfig, ServiceInstance},
        registry::DynamicConfigRegistry,
    },
    core::{
        balance::{LoadBalanceStrategyManager, GRAY_STRATEGY},
        chain::{Filter, FilterAction},
        context::GatewayContext,
        errors::{GatewayError, GatewayResult, ResponseCode},
        filters::{decode_filter_config, LOAD_BALANCE_FILTER_NAME, LOAD_BALANCE_FILTER_ORDER},
    },
};

/// Gray-flagged requests select among enabled gray instances with the gray
/// strategy; everything else selects among enabled non-gray instances with
/// the strategy named on the route.
pub struct LoadBalanceFilter {
    registry: Arc<DynamicConfigRegistry>,
    strategies: LoadBalanceStrategyManager,
}

impl LoadBalanceFilter {
    pub fn new(registry: Arc<DynamicConfigRegistry>) -> Self {
        Self {
            registry,
            strategies: LoadBalanceStrategyManager::new(),
        }
    }
}

#[async_trait]
impl Filter for LoadBalanceFilter {
    async fn pre_filter(&self, ctx: &mut GatewayContext) -> GatewayResult<FilterAction> {
        let config: LoadBalanceFilterConfig =
            decode_filter_config(&ctx.route.filter_configs, LOAD_BALANCE_FILTER_NAME)
                .unwrap_or_default();

        let all_instances = self
            .registry
            .instances_by_service_name(&ctx.request.service_name);

        let (candidates, strategy) = if ctx.request.is_gray {
            let gray: Vec<ServiceInstance> = all_instances
                .into_iter()
                .filter(|i| i.enabled && i.gray)
                .collect();
            (gray, self.strategies.strategy(GRAY_STRATEGY))
        } else {
            let healthy: Vec<ServiceInstance> = all_instances
                .into_iter()
                .filter(|i| i.enabled && !i.gray)
                .collect();
            (healthy, self.strategies.strategy(&config.strategy_name))
        };

        if candidates.is_empty() {
            return Err(GatewayError::NotFound(
                ResponseCode::ServiceInstanceNotFound,
            ));
        }

        let selected = strategy
            .select_instance(ctx, &config, &candidates)
            .ok_or(GatewayError::NotFound(
                ResponseCode::ServiceInstanceNotFound,
            ))?;

        tracing::debug!(
            request_id = %ctx.request.id,
            instance = %selected.instance_id,
            address = %selected.address(),
            "selected backend instance"
        );
        ctx.request.modify_host = selected.address();
        Ok(FilterAction::Continue)
    }

    fn name(&self) -> &'static str {
        LOAD_BALANCE_FILTER_NAME
    }

    fn order(&self) -> i32 {
        LOAD_BALANCE_FILTER_ORDER
    }
}
