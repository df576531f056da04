//! Port for the service-discovery source.
use std::sync::Arc;

use async_trait::async_trait;
use eyre::Result;

use crate::config::models::{ServiceDefinition, ServiceInstance};

/// Invoked per service with its definition and current instance set.
pub type ServiceChangeListener =
    Arc<dyn Fn(ServiceDefinition, Vec<ServiceInstance>) + Send + Sync>;

/// A source of service topology: delivers the current view immediately and
/// pushes updates to the listener for the lifetime of the process.
#[async_trait]
pub trait DiscoverySource: Send + Sync + 'static {
    async fn subscribe_services(&self, listener: ServiceChangeListener) -> Result<()>;
}
