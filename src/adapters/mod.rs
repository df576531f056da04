pub mod config_source;
pub mod discovery;
pub mod ingress;
pub mod upstream;

pub use config_source::HttpConfigSource;
pub use discovery::HttpDiscoverySource;
pub use ingress::{IngressHandler, IngressServer};
pub use upstream::UpstreamClientAdapter;
