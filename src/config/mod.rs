pub mod loader;
pub mod models;
pub mod registry;
pub mod resolver;
pub mod validation;

pub use loader::load_config;
pub use models::*;
pub use registry::{DynamicConfigRegistry, RouteListener};
pub use validation::{GatewayConfigValidator, ValidationError};
