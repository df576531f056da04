//! Resilience composition over the upstream call.
//!
//! The route filter hands the executor an async *supplier* of the upstream
//! call; each policy listed in the route's `resilience.order` wraps the
//! composition built so far, making the last listed policy the outermost:
//! with `[RETRY, FALLBACK]` retries are exhausted before the fallback fires.
//! Per-service primitives are memoized and dropped by a route-change
//! listener so the next request rebuilds them from fresh config.
pub mod breaker;
pub mod bulkhead;
pub mod fallback;
pub mod retry;

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use futures_util::{future::BoxFuture, FutureExt};

pub use breaker::CircuitBreaker;
pub use bulkhead::{Bulkhead, ThreadPoolBulkhead};
pub use fallback::{DefaultFallbackHandler, FallbackHandler, FallbackHandlerManager};
pub use retry::Retry;

use crate::{
    config::{
        models::{ResilienceConfig, ResiliencePolicy, RouteDefinition},
        registry::DynamicConfigRegistry,
    },
    core::{
        errors::{GatewayError, GatewayResult},
        response::GatewayResponse,
    },
};

/// An in-flight upstream call factory: invoking it starts one attempt.
pub type UpstreamCall =
    Arc<dyn Fn() -> BoxFuture<'static, GatewayResult<GatewayResponse>> + Send + Sync>;

/// Terminal outcome of the composed execution.
pub enum UpstreamOutcome {
    /// The upstream (possibly after retries) answered; post-filters run.
    Response(GatewayResponse),
    /// A fallback handler produced the response; it is written back as-is.
    Fallback(GatewayResponse),
    /// Everything failed and no fallback was enabled.
    Failed(GatewayError),
}

/// Builds and runs the per-service resilience stack.
pub struct ResilienceExecutor {
    registry: Arc<DynamicConfigRegistry>,
    retries: Arc<scc::HashMap<String, Arc<Retry>>>,
    breakers: Arc<scc::HashMap<String, Arc<CircuitBreaker>>>,
    bulkheads: Arc<scc::HashMap<String, Arc<Bulkhead>>>,
    thread_pools: Arc<scc::HashMap<String, Arc<ThreadPoolBulkhead>>>,
    listened: Arc<scc::HashSet<String>>,
    fallbacks: FallbackHandlerManager,
}

impl ResilienceExecutor {
    pub fn new(registry: Arc<DynamicConfigRegistry>) -> Self {
        Self {
            registry,
            retries: Arc::new(scc::HashMap::new()),
            breakers: Arc::new(scc::HashMap::new()),
            bulkheads: Arc::new(scc::HashMap::new()),
            thread_pools: Arc::new(scc::HashMap::new()),
            listened: Arc::new(scc::HashSet::new()),
            fallbacks: FallbackHandlerManager::new(),
        }
    }

    /// Register a custom fallback handler before serving traffic.
    pub fn register_fallback(&mut self, handler: Arc<dyn FallbackHandler>) {
        self.fallbacks.register(handler);
    }

    /// Compose the configured stack around `call` and run it.
    pub async fn execute(
        &self,
        service_name: &str,
        config: &ResilienceConfig,
        call: UpstreamCall,
    ) -> UpstreamOutcome {
        let mut supplier = call;
        let fallback_fired = Arc::new(AtomicBool::new(false));

        for policy in &config.order {
            match policy {
                ResiliencePolicy::Retry if config.retry_enabled => {
                    self.ensure_invalidation_listener(service_name);
                    let retry = primitive(&self.retries, service_name, || {
                        Retry::from_config(config)
                    });
                    let inner = supplier.clone();
                    supplier = Arc::new(move || {
                        let retry = retry.clone();
                        let inner = inner.clone();
                        async move { retry.execute(inner).await }.boxed()
                    });
                }
                ResiliencePolicy::Fallback if config.fallback_enabled => {
                    let handler = self.fallbacks.handler(&config.fallback_handler_name);
                    let handler_config = config.clone();
                    let fired = fallback_fired.clone();
                    let inner = supplier.clone();
                    supplier = Arc::new(move || {
                        let handler = handler.clone();
                        let handler_config = handler_config.clone();
                        let fired = fired.clone();
                        let inner = inner.clone();
                        async move {
                            match inner().await {
                                Ok(response) => Ok(response),
                                Err(error) => {
                                    fired.store(true, Ordering::Release);
                                    Ok(handler.handle(&error, &handler_config))
                                }
                            }
                        }
                        .boxed()
                    });
                }
                ResiliencePolicy::Circuitbreaker if config.circuit_breaker_enabled => {
                    self.ensure_invalidation_listener(service_name);
                    let circuit_breaker = primitive(&self.breakers, service_name, || {
                        CircuitBreaker::from_config(config)
                    });
                    let inner = supplier.clone();
                    supplier = Arc::new(move || {
                        let circuit_breaker = circuit_breaker.clone();
                        let inner = inner.clone();
                        async move { circuit_breaker.execute(inner).await }.boxed()
                    });
                }
                ResiliencePolicy::Bulkhead if config.bulkhead_enabled => {
                    self.ensure_invalidation_listener(service_name);
                    let bulkhead = primitive(&self.bulkheads, service_name, || {
                        Bulkhead::from_config(config)
                    });
                    let inner = supplier.clone();
                    supplier = Arc::new(move || {
                        let bulkhead = bulkhead.clone();
                        let inner = inner.clone();
                        async move { bulkhead.execute(inner).await }.boxed()
                    });
                }
                ResiliencePolicy::Threadpoolbulkhead if config.thread_pool_bulkhead_enabled => {
                    self.ensure_invalidation_listener(service_name);
                    let pool = primitive(&self.thread_pools, service_name, || {
                        ThreadPoolBulkhead::from_config(config)
                    });
                    let inner = supplier.clone();
                    supplier = Arc::new(move || {
                        let pool = pool.clone();
                        let inner = inner.clone();
                        async move { pool.execute(inner).await }.boxed()
                    });
                }
                _ => {}
            }
        }

        match supplier().await {
            Ok(response) if fallback_fired.load(Ordering::Acquire) => {
                UpstreamOutcome::Fallback(response)
            }
            Ok(response) => UpstreamOutcome::Response(response),
            Err(error) if config.fallback_enabled => {
                // A policy outside the fallback wrapper rejected the call;
                // still answer the client through the handler.
                let handler = self.fallbacks.handler(&config.fallback_handler_name);
                UpstreamOutcome::Fallback(handler.handle(&error, config))
            }
            Err(error) => UpstreamOutcome::Failed(error),
        }
    }

    /// One listener per service drops every memoized primitive when the
    /// route changes; registration is idempotent.
    fn ensure_invalidation_listener(&self, service_name: &str) {
        if self.listened.insert(service_name.to_string()).is_err() {
            return;
        }
        let retries = self.retries.clone();
        let breakers = self.breakers.clone();
        let bulkheads = self.bulkheads.clone();
        let thread_pools = self.thread_pools.clone();
        self.registry.add_route_listener(
            service_name,
            Arc::new(move |route: &RouteDefinition| {
                retries.remove(&route.service_name);
                breakers.remove(&route.service_name);
                bulkheads.remove(&route.service_name);
                thread_pools.remove(&route.service_name);
            }),
        );
    }
}

fn primitive<T, F>(cache: &scc::HashMap<String, Arc<T>>, service_name: &str, build: F) -> Arc<T>
where
    F: FnOnce() -> T,
{
    cache
        .entry(service_name.to_string())
        .or_insert_with(|| Arc::new(build()))
        .get()
        .clone()
}
