//! Built-in filters: the cross-cutting behaviors composed into every chain.
pub mod cors;
pub mod flow;
pub mod gray;
pub mod load_balance;
pub mod route;

use serde::de::DeserializeOwned;

pub use cors::CorsFilter;
pub use flow::FlowFilter;
pub use gray::GrayFilter;
pub use load_balance::LoadBalanceFilter;
pub use route::RouteFilter;

use crate::config::models::FilterConfig;

pub const CORS_FILTER_NAME: &str = "cors";
pub const FLOW_FILTER_NAME: &str = "flow";
pub const GRAY_FILTER_NAME: &str = "gray";
pub const LOAD_BALANCE_FILTER_NAME: &str = "load_balance";
pub const ROUTE_FILTER_NAME: &str = "route";

pub const CORS_FILTER_ORDER: i32 = 10;
pub const FLOW_FILTER_ORDER: i32 = 20;
pub const GRAY_FILTER_ORDER: i32 = 30;
pub const LOAD_BALANCE_FILTER_ORDER: i32 = 40;
pub const ROUTE_FILTER_ORDER: i32 = 100;

/// Built-ins appended to every chain, in composition order.
pub fn built_in_pre_filters() -> Vec<&'static str> {
    vec![
        CORS_FILTER_NAME,
        FLOW_FILTER_NAME,
        GRAY_FILTER_NAME,
        LOAD_BALANCE_FILTER_NAME,
    ]
}

/// Locate a filter entry on a route by name.
pub fn find_filter_config<'a>(
    filter_configs: &'a [FilterConfig],
    name: &str,
) -> Option<&'a FilterConfig> {
    filter_configs.iter().find(|fc| fc.name == name)
}

/// Decode the opaque payload of a named filter entry. Returns `None` when
/// the entry is absent or its payload does not decode.
pub fn decode_filter_config<T: DeserializeOwned>(
    filter_configs: &[FilterConfig],
    name: &str,
) -> Option<T> {
    let filter_config = find_filter_config(filter_configs, name)?;
    if filter_config.config.is_null() {
        return None;
    }
    serde_json::from_value(filter_config.config.clone())
        .map_err(|e| {
            tracing::warn!(filter = name, error = %e, "invalid filter config payload");
            e
        })
        .ok()
}
