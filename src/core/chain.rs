//! Filter chain: ordered policy hooks bracketing the upstream call.
//!
//! A chain of N filters executes as two phases over one cursor: the
//! pre-phase walks `0..N` awaiting each filter's `pre_filter`, then the
//! post-phase walks `N-1..0` awaiting `post_filter`. A pre-hook either
//! advances the chain (`Continue`) or declares the response final
//! (`WriteBack`), which skips the remaining filters and the whole
//! post-phase. Suspension points (rate-limiter admission, the upstream
//! call, retry waits) are awaits inside the hooks; the runtime resumes the
//! chain where Netty-style gateways re-enter it by callback.
use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;

use crate::{
    config::{models::RouteDefinition, registry::DynamicConfigRegistry},
    core::{context::GatewayContext, errors::GatewayResult},
};

/// Outcome of a pre-hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterAction {
    /// Advance to the next filter (or flip to the post-phase).
    Continue,
    /// The response is final; skip everything else and write it back.
    WriteBack,
}

/// A cross-cutting policy hook. Filters are process-wide singletons; any
/// per-service state lives in interior concurrent maps.
#[async_trait]
pub trait Filter: Send + Sync + 'static {
    async fn pre_filter(&self, ctx: &mut GatewayContext) -> GatewayResult<FilterAction>;

    async fn post_filter(&self, _ctx: &mut GatewayContext) -> GatewayResult<()> {
        Ok(())
    }

    /// Stable name used for registration and route `filter_configs` lookup.
    fn name(&self) -> &'static str;

    /// Position in the chain; lower runs earlier.
    fn order(&self) -> i32;
}

/// An ordered sequence of filters for one service.
pub struct FilterChain {
    filters: Vec<Arc<dyn Filter>>,
}

impl FilterChain {
    pub fn new() -> Self {
        Self {
            filters: Vec::new(),
        }
    }

    pub fn add(&mut self, filter: Arc<dyn Filter>) -> &mut Self {
        self.filters.push(filter);
        self
    }

    pub fn sort(&mut self) {
        self.filters.sort_by_key(|filter| filter.order());
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.filters.iter().any(|filter| filter.name() == name)
    }

    /// Drive the two-phase execution over the context's cursor. Returns when
    /// the response is final; the caller writes it back exactly once.
    pub async fn execute(&self, ctx: &mut GatewayContext) -> GatewayResult<()> {
        let size = self.filters.len() as i32;

        while ctx.is_pre_phase {
            if ctx.cur_filter_index >= size {
                ctx.is_pre_phase = false;
                ctx.cur_filter_index = size - 1;
                break;
            }
            let index = ctx.cur_filter_index as usize;
            ctx.cur_filter_index += 1;
            match self.filters[index].pre_filter(ctx).await? {
                FilterAction::Continue => {}
                FilterAction::WriteBack => return Ok(()),
            }
            if ctx.cur_filter_index == size {
                ctx.is_pre_phase = false;
                ctx.cur_filter_index = size - 1;
            }
        }

        while ctx.cur_filter_index >= 0 {
            let index = ctx.cur_filter_index as usize;
            ctx.cur_filter_index -= 1;
            self.filters[index].post_filter(ctx).await?;
        }

        Ok(())
    }
}

impl Default for FilterChain {
    fn default() -> Self {
        Self::new()
    }
}

/// Composes and caches one filter chain per service.
///
/// On a cache miss the chain is assembled from the registered built-ins plus
/// any route-configured filters, sorted by order, and a route listener is
/// installed (once per service) that drops the cached chain so the next
/// request rebuilds it against the fresh route.
pub struct FilterChainFactory {
    registry: Arc<DynamicConfigRegistry>,
    filters: HashMap<&'static str, Arc<dyn Filter>>,
    pre_filter_names: Vec<&'static str>,
    terminal_filter_name: &'static str,
    chains: Arc<scc::HashMap<String, Arc<FilterChain>>>,
    listened: Arc<scc::HashSet<String>>,
}

impl FilterChainFactory {
    /// `pre_filter_names` lists the built-ins appended to every chain in
    /// composition order; `terminal_filter_name` is the route filter.
    pub fn new(
        registry: Arc<DynamicConfigRegistry>,
        filters: Vec<Arc<dyn Filter>>,
        pre_filter_names: Vec<&'static str>,
        terminal_filter_name: &'static str,
    ) -> Self {
        let mut filter_map: HashMap<&'static str, Arc<dyn Filter>> = HashMap::new();
        for filter in filters {
            tracing::info!(filter = filter.name(), "registered filter");
            filter_map.insert(filter.name(), filter);
        }
        Self {
            registry,
            filters: filter_map,
            pre_filter_names,
            terminal_filter_name,
            chains: Arc::new(scc::HashMap::new()),
            listened: Arc::new(scc::HashSet::new()),
        }
    }

    /// Fetch or compose the chain for the route's service.
    pub fn chain_for(&self, route: &RouteDefinition) -> Arc<FilterChain> {
        let service_name = route.service_name.clone();
        if let Some(chain) = self.chains.read(&service_name, |_, chain| chain.clone()) {
            return chain;
        }

        let chain = Arc::new(self.compose(route));

        if self.listened.insert(service_name.clone()).is_ok() {
            let chains = self.chains.clone();
            self.registry.add_route_listener(
                &service_name,
                Arc::new(move |new_route: &RouteDefinition| {
                    chains.remove(&new_route.service_name);
                }),
            );
        }

        let _ = self.chains.insert(service_name, chain.clone());
        chain
    }

    fn compose(&self, route: &RouteDefinition) -> FilterChain {
        let mut chain = FilterChain::new();

        for name in &self.pre_filter_names {
            self.add_filter_if_present(&mut chain, name);
        }

        for filter_config in &route.filter_configs {
            if chain.contains(&filter_config.name) {
                continue;
            }
            if !self.add_filter_if_present(&mut chain, &filter_config.name) {
                tracing::info!(filter = %filter_config.name, "filter not found");
            }
        }

        self.add_filter_if_present(&mut chain, self.terminal_filter_name);
        chain.sort();
        chain
    }

    fn add_filter_if_present(&self, chain: &mut FilterChain, name: &str) -> bool {
        match self.filters.get(name) {
            Some(filter) => {
                chain.add(filter.clone());
                true
            }
            None => false,
        }
    }
}
