//! Gray-release strategies: decide whether a request goes to canary
//! instances.
//!
//! Both strategies force gray when no enabled non-gray instance exists, so a
//! fully-canary service stays reachable. Otherwise the gray share is the sum
//! of the instances' thresholds capped at `max_gray_threshold`.
use std::{collections::HashMap, sync::Arc};

use rand::Rng;

use crate::{
    config::models::{GrayFilterConfig, ServiceInstance},
    core::{context::GatewayContext, hash_ring::fnv_jenkins_hash},
};

pub const THRESHOLD_GRAY_STRATEGY: &str = "threshold";
pub const CLIENT_IP_GRAY_STRATEGY: &str = "client_ip";

pub trait GrayStrategy: Send + Sync + 'static {
    fn should_route_to_gray(
        &self,
        ctx: &GatewayContext,
        config: &GrayFilterConfig,
        instances: &[ServiceInstance],
    ) -> bool;

    fn name(&self) -> &'static str;
}

fn capped_gray_threshold(config: &GrayFilterConfig, instances: &[ServiceInstance]) -> f64 {
    let total: f64 = instances.iter().map(|i| i.threshold).sum();
    total.min(config.max_gray_threshold)
}

fn has_enabled_non_gray(instances: &[ServiceInstance]) -> bool {
    instances.iter().any(|i| i.enabled && !i.gray)
}

/// Proportional split: a uniform draw in [0, 1) against the capped gray
/// share.
pub struct ThresholdGrayStrategy;

impl GrayStrategy for ThresholdGrayStrategy {
    fn should_route_to_gray(
        &self,
        _ctx: &GatewayContext,
        config: &GrayFilterConfig,
        instances: &[ServiceInstance],
    ) -> bool {
        if !has_enabled_non_gray(instances) {
            return true;
        }
        rand::rng().random::<f64>() <= capped_gray_threshold(config, instances)
    }

    fn name(&self) -> &'static str {
        THRESHOLD_GRAY_STRATEGY
    }
}

/// Sticky split: the client address hash modulo 100 against the capped gray
/// share, so the same client keeps getting the same decision while the
/// thresholds are stable.
pub struct ClientIpGrayStrategy;

impl GrayStrategy for ClientIpGrayStrategy {
    fn should_route_to_gray(
        &self,
        ctx: &GatewayContext,
        config: &GrayFilterConfig,
        instances: &[ServiceInstance],
    ) -> bool {
        if !has_enabled_non_gray(instances) {
            return true;
        }
        let gray_threshold = capped_gray_threshold(config, instances);
        f64::from(fnv_jenkins_hash(&ctx.request.client_ip) % 100) <= gray_threshold * 100.0
    }

    fn name(&self) -> &'static str {
        CLIENT_IP_GRAY_STRATEGY
    }
}

/// Name-keyed strategy registry with the threshold strategy as default.
pub struct GrayStrategyManager {
    strategies: HashMap<&'static str, Arc<dyn GrayStrategy>>,
    default_strategy: Arc<dyn GrayStrategy>,
}

impl GrayStrategyManager {
    pub fn new() -> Self {
        let threshold: Arc<dyn GrayStrategy> = Arc::new(ThresholdGrayStrategy);
        let mut strategies: HashMap<&'static str, Arc<dyn GrayStrategy>> = HashMap::new();
        for strategy in [
            threshold.clone(),
            Arc::new(ClientIpGrayStrategy) as Arc<dyn GrayStrategy>,
        ] {
            tracing::debug!(strategy = strategy.name(), "registered gray strategy");
            strategies.insert(strategy.name(), strategy);
        }
        Self {
            strategies,
            default_strategy: threshold,
        }
    }

    pub fn strategy(&self, name: &str) -> Arc<dyn GrayStrategy> {
        self.strategies
            .get(name)
            .cloned()
            .unwrap_or_else(|| self.default_strategy.clone())
    }
}

impl Default for GrayStrategyManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use http::{Method, Request};

    use super::*;
    use crate::core::request::GatewayRequest;

    fn test_ctx(client_ip: &str) -> GatewayContext {
        let (parts, _) = Request::builder()
            .method(Method::GET)
            .uri("/api/test")
            .body(())
            .unwrap()
            .into_parts();
        let request = GatewayRequest::new(
            "demo".to_string(),
            &parts,
            Bytes::new(),
            client_ip.to_string(),
        );
        GatewayContext::new(
            request,
            crate::config::models::RouteDefinition {
                id: "r1".to_string(),
                service_name: "demo".to_string(),
                uri: "/api/**".to_string(),
                order: 0,
                filter_configs: Vec::new(),
                resilience: Default::default(),
            },
            true,
            None,
        )
    }

    fn instance(id: &str, enabled: bool, gray: bool, threshold: f64) -> ServiceInstance {
        ServiceInstance {
            instance_id: id.to_string(),
            ip: "127.0.0.1".to_string(),
            port: 8080,
            weight: 1,
            threshold,
            enabled,
            gray,
        }
    }

    #[test]
    fn all_gray_forces_gray_routing() {
        let ctx = test_ctx("10.0.0.1");
        let config = GrayFilterConfig::default();
        let instances = vec![instance("g1", true, true, 0.1)];

        assert!(ThresholdGrayStrategy.should_route_to_gray(&ctx, &config, &instances));
        assert!(ClientIpGrayStrategy.should_route_to_gray(&ctx, &config, &instances));
    }

    #[test]
    fn zero_threshold_rarely_routes_to_gray() {
        let ctx = test_ctx("10.0.0.1");
        let config = GrayFilterConfig::default();
        let instances = vec![
            instance("n1", true, false, 0.0),
            instance("g1", true, true, 0.0),
        ];

        // threshold sum is 0; the uniform draw in [0,1) can only land at 0.
        let gray_hits = (0..1_000)
            .filter(|_| ThresholdGrayStrategy.should_route_to_gray(&ctx, &config, &instances))
            .count();
        assert!(gray_hits <= 1, "gray_hits = {gray_hits}");
    }

    #[test]
    fn client_ip_decision_is_stable_per_client() {
        let config = GrayFilterConfig::default();
        let instances = vec![
            instance("n1", true, false, 0.0),
            instance("g1", true, true, 0.3),
        ];

        let ctx = test_ctx("198.51.100.88");
        let first = ClientIpGrayStrategy.should_route_to_gray(&ctx, &config, &instances);
        for _ in 0..50 {
            assert_eq!(
                ClientIpGrayStrategy.should_route_to_gray(&ctx, &config, &instances),
                first
            );
        }
    }

    #[test]
    fn threshold_sum_is_capped_by_max() {
        let ctx = test_ctx("10.0.0.1");
        let config = GrayFilterConfig {
            max_gray_threshold: 0.2,
            ..Default::default()
        };
        let instances = vec![
            instance("n1", true, false, 0.0),
            instance("g1", true, true, 0.9),
            instance("g2", true, true, 0.9),
        ];
        assert!((capped_gray_threshold(&config, &instances) - 0.2).abs() < f64::EPSILON);
        let _ = ctx;
    }

    #[test]
    fn manager_defaults_to_threshold_strategy() {
        let manager = GrayStrategyManager::new();
        assert_eq!(manager.strategy("unknown").name(), THRESHOLD_GRAY_STRATEGY);
        assert_eq!(
            manager.strategy(CLIENT_IP_GRAY_STRATEGY).name(),
            CLIENT_IP_GRAY_STRATEGY
        );
    }
}
