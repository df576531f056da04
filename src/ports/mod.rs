pub mod config_source;
pub mod discovery;
pub mod upstream;

pub use config_source::{ConfigSource, RoutesChangeListener};
pub use discovery::{DiscoverySource, ServiceChangeListener};
pub use upstream::{UpstreamClient, UpstreamError, UpstreamResult};
