//! Load-balancing strategies: choose one instance from a candidate list.
//!
//! A strategy is stateless or internally synchronized and shared across
//! requests; `select_instance` runs in the hot path. The manager resolves
//! strategies by the name configured on the route, falling back to
//! round-robin.
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicI32, Ordering},
        Arc,
    },
};

use rand::Rng;
use scc::hash_map::Entry;

use crate::{
    config::models::{LoadBalanceFilterConfig, ServiceInstance},
    core::{
        context::GatewayContext,
        hash_ring::{fnv_jenkins_hash, ConsistentHashRing},
    },
};

pub const RANDOM_STRATEGY: &str = "random";
pub const ROUND_ROBIN_STRATEGY: &str = "round_robin";
pub const CLIENT_IP_STRATEGY: &str = "client_ip";
pub const CLIENT_IP_CONSISTENT_HASH_STRATEGY: &str = "client_ip_consistent_hash";
pub const WEIGHT_STRATEGY: &str = "weight";
pub const GRAY_STRATEGY: &str = "gray";

/// Counter reset point for the round-robin strategies.
const ROUND_ROBIN_THRESHOLD: i32 = i32::MAX >> 2;

pub trait LoadBalanceStrategy: Send + Sync + 'static {
    /// Pick an instance for this request, or `None` when the candidates
    /// cannot carry it (zero total weight, empty ring).
    fn select_instance(
        &self,
        ctx: &GatewayContext,
        config: &LoadBalanceFilterConfig,
        instances: &[ServiceInstance],
    ) -> Option<ServiceInstance>;

    fn name(&self) -> &'static str;
}

/// Uniform pick.
pub struct RandomStrategy;

impl LoadBalanceStrategy for RandomStrategy {
    fn select_instance(
        &self,
        _ctx: &GatewayContext,
        _config: &LoadBalanceFilterConfig,
        instances: &[ServiceInstance],
    ) -> Option<ServiceInstance> {
        if instances.is_empty() {
            return None;
        }
        let index = rand::rng().random_range(0..instances.len());
        instances.get(index).cloned()
    }

    fn name(&self) -> &'static str {
        RANDOM_STRATEGY
    }
}

/// Per-service rotating cursor. The strict variant increments an atomic
/// counter; the loose one does a read-then-write with benign races. Both
/// reset to zero once the counter crosses the threshold.
#[derive(Default)]
pub struct RoundRobinStrategy {
    strict_positions: scc::HashMap<String, Arc<AtomicI32>>,
    loose_positions: scc::HashMap<String, i32>,
}

impl RoundRobinStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    fn strict_counter(&self, service_name: &str) -> Arc<AtomicI32> {
        self.strict_positions
            .entry(service_name.to_string())
            .or_insert_with(|| Arc::new(AtomicI32::new(0)))
            .get()
            .clone()
    }
}

impl LoadBalanceStrategy for RoundRobinStrategy {
    fn select_instance(
        &self,
        ctx: &GatewayContext,
        config: &LoadBalanceFilterConfig,
        instances: &[ServiceInstance],
    ) -> Option<ServiceInstance> {
        if instances.is_empty() {
            return None;
        }
        let service_name = ctx.request.service_name.as_str();

        let instance = if config.strict_round_robin {
            let counter = self.strict_counter(service_name);
            let index = counter.fetch_add(1, Ordering::AcqRel).unsigned_abs() as usize;
            if index >= ROUND_ROBIN_THRESHOLD as usize {
                counter.store(0, Ordering::Release);
            }
            instances.get(index % instances.len()).cloned()
        } else {
            let position = self
                .loose_positions
                .read(service_name, |_, position| *position)
                .unwrap_or(0);
            let index = position.unsigned_abs() as usize;
            let next = if position + 1 >= ROUND_ROBIN_THRESHOLD {
                0
            } else {
                position + 1
            };
            match self.loose_positions.entry(service_name.to_string()) {
                Entry::Occupied(mut entry) => *entry.get_mut() = next,
                Entry::Vacant(entry) => {
                    entry.insert_entry(next);
                }
            }
            instances.get(index % instances.len()).cloned()
        };
        instance
    }

    fn name(&self) -> &'static str {
        ROUND_ROBIN_STRATEGY
    }
}

/// Same-client stickiness by hashing the client address modulo the
/// candidate count.
pub struct ClientIpStrategy;

impl LoadBalanceStrategy for ClientIpStrategy {
    fn select_instance(
        &self,
        ctx: &GatewayContext,
        _config: &LoadBalanceFilterConfig,
        instances: &[ServiceInstance],
    ) -> Option<ServiceInstance> {
        if instances.is_empty() {
            return None;
        }
        let index = fnv_jenkins_hash(&ctx.request.client_ip) as usize % instances.len();
        instances.get(index).cloned()
    }

    fn name(&self) -> &'static str {
        CLIENT_IP_STRATEGY
    }
}

/// Client stickiness that survives instance churn: a consistent-hash ring is
/// built over the instance ids with the configured virtual-node count and
/// keyed by the client address hash.
pub struct ClientIpConsistentHashStrategy;

impl LoadBalanceStrategy for ClientIpConsistentHashStrategy {
    fn select_instance(
        &self,
        ctx: &GatewayContext,
        config: &LoadBalanceFilterConfig,
        instances: &[ServiceInstance],
    ) -> Option<ServiceInstance> {
        if instances.is_empty() {
            return None;
        }
        let virtual_node_num = if config.virtual_node_num > 0 {
            config.virtual_node_num
        } else {
            1
        };

        let nodes: Vec<String> = instances
            .iter()
            .map(|instance| instance.instance_id.clone())
            .collect();
        let ring = ConsistentHashRing::new(&nodes, virtual_node_num);

        let key = fnv_jenkins_hash(&ctx.request.client_ip).to_string();
        let selected = ring.get_node(&key);

        selected
            .and_then(|node| {
                instances
                    .iter()
                    .find(|instance| instance.instance_id == node)
            })
            .or_else(|| instances.first())
            .cloned()
    }

    fn name(&self) -> &'static str {
        CLIENT_IP_CONSISTENT_HASH_STRATEGY
    }
}

/// Weighted pick: a uniform draw over the weight total, resolved by
/// cumulative subtraction.
pub struct WeightStrategy;

impl LoadBalanceStrategy for WeightStrategy {
    fn select_instance(
        &self,
        _ctx: &GatewayContext,
        _config: &LoadBalanceFilterConfig,
        instances: &[ServiceInstance],
    ) -> Option<ServiceInstance> {
        let total_weight: i64 = instances.iter().map(|i| i64::from(i.weight)).sum();
        if total_weight <= 0 {
            return None;
        }
        let mut remaining = rand::rng().random_range(0..total_weight);
        for instance in instances {
            remaining -= i64::from(instance.weight);
            if remaining < 0 {
                return Some(instance.clone());
            }
        }
        None
    }

    fn name(&self) -> &'static str {
        WEIGHT_STRATEGY
    }
}

/// Deterministic pick among gray instances, weighted by their thresholds
/// scaled to integer percent and keyed on the client address hash.
pub struct GrayLoadBalanceStrategy;

impl LoadBalanceStrategy for GrayLoadBalanceStrategy {
    fn select_instance(
        &self,
        ctx: &GatewayContext,
        _config: &LoadBalanceFilterConfig,
        instances: &[ServiceInstance],
    ) -> Option<ServiceInstance> {
        let total_threshold: i32 = instances
            .iter()
            .map(|i| (i.threshold * 100.0) as i32)
            .sum();
        if total_threshold <= 0 {
            return None;
        }
        let mut remaining = fnv_jenkins_hash(&ctx.request.client_ip) % total_threshold;
        for instance in instances {
            remaining -= (instance.threshold * 100.0) as i32;
            if remaining < 0 {
                return Some(instance.clone());
            }
        }
        None
    }

    fn name(&self) -> &'static str {
        GRAY_STRATEGY
    }
}

/// Name-keyed strategy registry with a round-robin default.
pub struct LoadBalanceStrategyManager {
    strategies: HashMap<&'static str, Arc<dyn LoadBalanceStrategy>>,
    default_strategy: Arc<dyn LoadBalanceStrategy>,
}

impl LoadBalanceStrategyManager {
    pub fn new() -> Self {
        let round_robin: Arc<dyn LoadBalanceStrategy> = Arc::new(RoundRobinStrategy::new());
        let mut strategies: HashMap<&'static str, Arc<dyn LoadBalanceStrategy>> = HashMap::new();
        for strategy in [
            Arc::new(RandomStrategy) as Arc<dyn LoadBalanceStrategy>,
            round_robin.clone(),
            Arc::new(ClientIpStrategy),
            Arc::new(ClientIpConsistentHashStrategy),
            Arc::new(WeightStrategy),
            Arc::new(GrayLoadBalanceStrategy),
        ] {
            tracing::debug!(strategy = strategy.name(), "registered load-balance strategy");
            strategies.insert(strategy.name(), strategy);
        }
        Self {
            strategies,
            default_strategy: round_robin,
        }
    }

    pub fn strategy(&self, name: &str) -> Arc<dyn LoadBalanceStrategy> {
        self.strategies
            .get(name)
            .cloned()
            .unwrap_or_else(|| self.default_strategy.clone())
    }
}

impl Default for LoadBalanceStrategyManager {
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

    fn instance(id: &str, weight: i32, threshold: f64) -> ServiceInstance {
        ServiceInstance {
            instance_id: id.to_string(),
            ip: "127.0.0.1".to_string(),
            port: 8080,
            weight,
            threshold,
            enabled: true,
            gray: false,
        }
    }

    #[test]
    fn strict_round_robin_cycles_in_order() {
        let strategy = RoundRobinStrategy::new();
        let ctx = test_ctx("10.0.0.1");
        let config = LoadBalanceFilterConfig::default();
        let instances = vec![instance("a", 1, 0.0), instance("b", 1, 0.0), instance("c", 1, 0.0)];

        let picks: Vec<String> = (0..6)
            .map(|_| {
                strategy
                    .select_instance(&ctx, &config, &instances)
                    .unwrap()
                    .instance_id
            })
            .collect();
        assert_eq!(picks, ["a", "b", "c", "a", "b", "c"]);
    }

    #[test]
    fn loose_round_robin_rotates() {
        let strategy = RoundRobinStrategy::new();
        let ctx = test_ctx("10.0.0.1");
        let config = LoadBalanceFilterConfig {
            strict_round_robin: false,
            ..Default::default()
        };
        let instances = vec![instance("a", 1, 0.0), instance("b", 1, 0.0)];

        let picks: Vec<String> = (0..4)
            .map(|_| {
                strategy
                    .select_instance(&ctx, &config, &instances)
                    .unwrap()
                    .instance_id
            })
            .collect();
        assert_eq!(picks, ["a", "b", "a", "b"]);
    }

    #[test]
    fn client_ip_strategy_is_deterministic() {
        let strategy = ClientIpStrategy;
        let config = LoadBalanceFilterConfig::default();
        let instances = vec![instance("a", 1, 0.0), instance("b", 1, 0.0), instance("c", 1, 0.0)];

        let ctx = test_ctx("203.0.113.7");
        let first = strategy
            .select_instance(&ctx, &config, &instances)
            .unwrap()
            .instance_id;
        for _ in 0..20 {
            assert_eq!(
                strategy
                    .select_instance(&ctx, &config, &instances)
                    .unwrap()
                    .instance_id,
                first
            );
        }
    }

    #[test]
    fn consistent_hash_strategy_sticks_and_survives_unrelated_removal() {
        let strategy = ClientIpConsistentHashStrategy;
        let config = LoadBalanceFilterConfig {
            virtual_node_num: 16,
            ..Default::default()
        };
        let instances = vec![instance("a", 1, 0.0), instance("b", 1, 0.0), instance("c", 1, 0.0)];

        let ctx = test_ctx("198.51.100.23");
        let chosen = strategy
            .select_instance(&ctx, &config, &instances)
            .unwrap()
            .instance_id;
        assert_eq!(
            strategy
                .select_instance(&ctx, &config, &instances)
                .unwrap()
                .instance_id,
            chosen
        );

        // Removing an instance the client does not map to keeps the mapping.
        let removable = instances
            .iter()
            .find(|i| i.instance_id != chosen)
            .unwrap()
            .instance_id
            .clone();
        let remaining: Vec<ServiceInstance> = instances
            .iter()
            .filter(|i| i.instance_id != removable)
            .cloned()
            .collect();
        let again = strategy
            .select_instance(&ctx, &config, &remaining)
            .unwrap()
            .instance_id;
        assert_eq!(again, chosen);
    }

    #[test]
    fn weight_distribution_approaches_weight_ratio() {
        let strategy = WeightStrategy;
        let ctx = test_ctx("10.0.0.1");
        let config = LoadBalanceFilterConfig::default();
        let instances = vec![instance("a", 1, 0.0), instance("b", 3, 0.0)];

        let total = 10_000;
        let b_hits = (0..total)
            .filter(|_| {
                strategy
                    .select_instance(&ctx, &config, &instances)
                    .unwrap()
                    .instance_id
                    == "b"
            })
            .count();

        // Expectation 7500; 2 sigma of a binomial(10000, 0.75) is ~87.
        assert!((7_200..=7_800).contains(&b_hits), "b got {b_hits}");
    }

    #[test]
    fn weight_strategy_rejects_non_positive_total() {
        let strategy = WeightStrategy;
        let ctx = test_ctx("10.0.0.1");
        let config = LoadBalanceFilterConfig::default();
        assert!(strategy
            .select_instance(&ctx, &config, &[instance("a", 0, 0.0)])
            .is_none());
    }

    #[test]
    fn gray_strategy_picks_by_cumulative_threshold() {
        let strategy = GrayLoadBalanceStrategy;
        let ctx = test_ctx("192.0.2.40");
        let config = LoadBalanceFilterConfig::default();
        let instances = vec![instance("g1", 1, 0.2), instance("g2", 1, 0.3)];

        let chosen = strategy.select_instance(&ctx, &config, &instances).unwrap();
        assert!(["g1", "g2"].contains(&chosen.instance_id.as_str()));

        // Deterministic per client address.
        for _ in 0..10 {
            assert_eq!(
                strategy
                    .select_instance(&ctx, &config, &instances)
                    .unwrap()
                    .instance_id,
                chosen.instance_id
            );
        }
    }

    #[test]
    fn gray_strategy_rejects_zero_threshold_total() {
        let strategy = GrayLoadBalanceStrategy;
        let ctx = test_ctx("192.0.2.40");
        let config = LoadBalanceFilterConfig::default();
        assert!(strategy
            .select_instance(&ctx, &config, &[instance("g1", 1, 0.0)])
            .is_none());
    }

    #[test]
    fn manager_falls_back_to_round_robin() {
        let manager = LoadBalanceStrategyManager::new();
        assert_eq!(manager.strategy("nope").name(), ROUND_ROBIN_STRATEGY);
        assert_eq!(manager.strategy(WEIGHT_STRATEGY).name(), WEIGHT_STRATEGY);
    }
}
