//! Port for the remote route-configuration source.
use std::sync::Arc;

use async_trait::async_trait;
use eyre::Result;

use crate::config::models::RouteDefinition;

/// Invoked with the full route set on the initial load and on every change.
pub type RoutesChangeListener = Arc<dyn Fn(Vec<RouteDefinition>) + Send + Sync>;

/// A source of route definitions: delivers the current set immediately and
/// pushes updates to the listener for the lifetime of the process.
#[async_trait]
pub trait ConfigSource: Send + Sync + 'static {
    async fn subscribe_routes(&self, listener: RoutesChangeListener) -> Result<()>;
}
