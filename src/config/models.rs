//! Configuration data structures for Meridian.
//!
//! Two families live here: the *bootstrap* configuration the gateway process
//! is started with (listen address, socket options, upstream client tuning,
//! remote source endpoints), and the *dynamic* definitions pushed at runtime
//! by the configuration and discovery sources (routes, services, instances).
//! All types are serde-friendly and carry defaults so minimal configs stay
//! concise.
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

fn default_true() -> bool {
    true
}

/// Top-level bootstrap configuration, loaded once at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Address the ingress server binds to.
    pub listen_addr: String,
    /// Ingress socket and aggregation options.
    pub server: ServerConfig,
    /// Upstream HTTP client tuning.
    pub http_client: UpstreamClientConfig,
    /// Remote route-configuration source.
    pub config_source: SourceConfig,
    /// Remote service-discovery source.
    pub discovery: SourceConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            server: ServerConfig::default(),
            http_client: UpstreamClientConfig::default(),
            config_source: SourceConfig::default(),
            discovery: SourceConfig::default(),
        }
    }
}

/// Ingress socket options and request aggregation limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen backlog (SO_BACKLOG).
    pub backlog: i32,
    /// Socket send buffer size in bytes.
    pub send_buffer_size: usize,
    /// Socket receive buffer size in bytes.
    pub recv_buffer_size: usize,
    /// Maximum aggregated request body size in bytes.
    pub max_content_length: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            backlog: 1024,
            send_buffer_size: 64 * 1024,
            recv_buffer_size: 64 * 1024,
            max_content_length: 64 * 1024 * 1024,
        }
    }
}

/// Tuning for the shared pooled upstream client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamClientConfig {
    /// TCP connect timeout in milliseconds.
    pub connect_timeout_ms: u64,
    /// Whole-request timeout in milliseconds.
    pub request_timeout_ms: u64,
    /// Redirect cap kept for config compatibility; 3xx responses pass
    /// through to the client untouched.
    pub max_redirects: u32,
    /// Global cap on in-flight upstream requests.
    pub max_connections: usize,
    /// Pooled idle connections kept per host.
    pub max_connections_per_host: usize,
    /// Idle timeout for pooled connections in milliseconds.
    pub pooled_idle_timeout_ms: u64,
}

impl Default for UpstreamClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 3_000,
            request_timeout_ms: 30_000,
            max_redirects: 5,
            max_connections: 10_000,
            max_connections_per_host: 1_000,
            pooled_idle_timeout_ms: 60_000,
        }
    }
}

/// Endpoint of a remote polling source (routes or services).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// URL the source is polled from. Empty disables the source.
    pub url: String,
    /// Poll interval in seconds.
    pub poll_interval_secs: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            poll_interval_secs: 10,
        }
    }
}

/// A declarative mapping from a URI pattern to a named service plus
/// per-request policy. `uri` may contain `**` which matches any suffix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteDefinition {
    pub id: String,
    pub service_name: String,
    pub uri: String,
    #[serde(default)]
    pub order: i32,
    #[serde(default)]
    pub filter_configs: Vec<FilterConfig>,
    #[serde(default)]
    pub resilience: ResilienceConfig,
}

/// A named filter entry on a route. `config` is an opaque payload decoded
/// by the owning filter (`FlowFilterConfig`, `GrayFilterConfig`, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    pub name: String,
    #[serde(default = "default_true")]
    pub enable: bool,
    #[serde(default)]
    pub config: serde_json::Value,
}

/// Rate-limiting algorithm selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FlowAlgorithm {
    #[default]
    TokenBucket,
    SlidingWindow,
    LeakyBucket,
}

/// Flow filter payload. `rate` is algorithm-specific: tokens refilled per
/// second (token bucket), window size in milliseconds (sliding window) or
/// leak interval in milliseconds (leaky bucket).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowFilterConfig {
    pub enabled: bool,
    pub algorithm: FlowAlgorithm,
    pub capacity: u32,
    pub rate: u64,
}

impl Default for FlowFilterConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            algorithm: FlowAlgorithm::TokenBucket,
            capacity: 100,
            rate: 100,
        }
    }
}

/// Gray filter payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GrayFilterConfig {
    pub strategy_name: String,
    /// Upper bound on the gray traffic share, regardless of how much the
    /// instance thresholds add up to.
    pub max_gray_threshold: f64,
}

impl Default for GrayFilterConfig {
    fn default() -> Self {
        Self {
            strategy_name: "threshold".to_string(),
            max_gray_threshold: 0.5,
        }
    }
}

/// Load-balance filter payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadBalanceFilterConfig {
    pub strategy_name: String,
    /// Strict round-robin uses an atomic per-service counter; loose accepts
    /// benign races on a plain one.
    pub strict_round_robin: bool,
    /// Virtual nodes per physical node on the consistent-hash ring.
    pub virtual_node_num: usize,
}

impl Default for LoadBalanceFilterConfig {
    fn default() -> Self {
        Self {
            strategy_name: "round_robin".to_string(),
            strict_round_robin: true,
            virtual_node_num: 1,
        }
    }
}

/// Resilience policies, applied in the listed order: each entry wraps the
/// composition built so far, so the last entry is outermost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResiliencePolicy {
    Retry,
    Fallback,
    Circuitbreaker,
    Bulkhead,
    Threadpoolbulkhead,
}

/// Sliding window kind for the circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SlidingWindowType {
    #[default]
    CountBased,
    TimeBased,
}

/// Per-route resilience configuration. Parameter names map one-to-one onto
/// the primitives in `core::resilience`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResilienceConfig {
    pub enabled: bool,
    pub order: Vec<ResiliencePolicy>,

    // retry
    pub retry_enabled: bool,
    pub max_attempts: u32,
    pub wait_duration_ms: u64,

    // fallback
    pub fallback_enabled: bool,
    pub fallback_handler_name: String,
    /// Overrides the status of the fallback response when set.
    pub fallback_status: Option<u16>,

    // circuit breaker
    pub circuit_breaker_enabled: bool,
    pub failure_rate_threshold: f64,
    pub slow_call_rate_threshold: f64,
    pub slow_call_duration_threshold_ms: u64,
    pub wait_duration_in_open_state_ms: u64,
    pub permitted_calls_in_half_open_state: u32,
    pub minimum_number_of_calls: u32,
    pub sliding_window_type: SlidingWindowType,
    pub sliding_window_size: u32,

    // bulkhead
    pub bulkhead_enabled: bool,
    pub max_concurrent_calls: u32,
    pub max_wait_duration_ms: u64,

    // thread-pool bulkhead
    pub thread_pool_bulkhead_enabled: bool,
    pub core_thread_pool_size: usize,
    pub max_thread_pool_size: usize,
    pub queue_capacity: usize,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            order: Vec::new(),
            retry_enabled: false,
            max_attempts: 3,
            wait_duration_ms: 50,
            fallback_enabled: false,
            fallback_handler_name: "default".to_string(),
            fallback_status: None,
            circuit_breaker_enabled: false,
            failure_rate_threshold: 50.0,
            slow_call_rate_threshold: 100.0,
            slow_call_duration_threshold_ms: 60_000,
            wait_duration_in_open_state_ms: 60_000,
            permitted_calls_in_half_open_state: 10,
            minimum_number_of_calls: 10,
            sliding_window_type: SlidingWindowType::CountBased,
            sliding_window_size: 100,
            bulkhead_enabled: false,
            max_concurrent_calls: 25,
            max_wait_duration_ms: 0,
            thread_pool_bulkhead_enabled: false,
            core_thread_pool_size: 2,
            max_thread_pool_size: 4,
            queue_capacity: 64,
        }
    }
}

/// A named backend service as published by the discovery source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceDefinition {
    pub service_name: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// An addressable endpoint of a service. `threshold` is this instance's
/// share of gray traffic in [0, 1]; `gray` marks it as a canary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceInstance {
    pub instance_id: String,
    pub ip: String,
    pub port: u16,
    #[serde(default = "default_weight")]
    pub weight: i32,
    #[serde(default)]
    pub threshold: f64,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub gray: bool,
}

fn default_weight() -> i32 {
    1
}

impl ServiceInstance {
    /// `ip:port` address used as the upstream authority.
    pub fn address(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }
}

/// Wire payload pushed by the configuration source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutesPayload {
    pub routes: Vec<RouteDefinition>,
}

/// One service entry of the discovery payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceEntry {
    pub service: ServiceDefinition,
    #[serde(default)]
    pub instances: Vec<ServiceInstance>,
}

/// Wire payload pushed by the discovery source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServicesPayload {
    pub services: Vec<ServiceEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn route_definition_minimal_json() {
        let json = r#"{"id": "r1", "service_name": "demo", "uri": "/api/**"}"#;
        let route: RouteDefinition = serde_json::from_str(json).unwrap();
        assert_eq!(route.order, 0);
        assert!(route.filter_configs.is_empty());
        assert!(!route.resilience.enabled);
    }

    #[test]
    fn filter_config_defaults_to_enabled() {
        let json = r#"{"name": "gray"}"#;
        let fc: FilterConfig = serde_json::from_str(json).unwrap();
        assert!(fc.enable);
        assert!(fc.config.is_null());
    }

    #[test]
    fn resilience_order_parses_screaming_case() {
        let json = r#"{"enabled": true, "order": ["RETRY", "FALLBACK", "CIRCUITBREAKER"]}"#;
        let cfg: ResilienceConfig = serde_json::from_str(json).unwrap();
        assert!(cfg.enabled);
        assert_eq!(
            cfg.order,
            vec![
                ResiliencePolicy::Retry,
                ResiliencePolicy::Fallback,
                ResiliencePolicy::Circuitbreaker
            ]
        );
    }

    #[test]
    fn instance_defaults() {
        let json = r#"{"instance_id": "i1", "ip": "10.0.0.1", "port": 8080}"#;
        let instance: ServiceInstance = serde_json::from_str(json).unwrap();
        assert!(instance.enabled);
        assert!(!instance.gray);
        assert_eq!(instance.weight, 1);
        assert_eq!(instance.address(), "10.0.0.1:8080");
    }
}
