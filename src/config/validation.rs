//! Bootstrap configuration validation.
use std::net::SocketAddr;

use thiserror::Error;

use crate::config::models::GatewayConfig;

#[derive(Debug, Error)]
#[error("configuration invalid:\n{}", errors.join("\n"))]
pub struct ValidationError {
    pub errors: Vec<String>,
}

pub struct GatewayConfigValidator;

impl GatewayConfigValidator {
    /// Validate the bootstrap configuration, collecting every problem.
    pub fn validate(config: &GatewayConfig) -> Result<(), ValidationError> {
        let mut errors = Vec::new();

        if config.listen_addr.parse::<SocketAddr>().is_err() {
            errors.push(format!(
                "  - listen_addr '{}' is not a valid socket address",
                config.listen_addr
            ));
        }

        if config.server.max_content_length == 0 {
            errors.push("  - server.max_content_length must be greater than 0".to_string());
        }
        if config.server.backlog <= 0 {
            errors.push("  - server.backlog must be greater than 0".to_string());
        }

        if config.http_client.connect_timeout_ms == 0 {
            errors.push("  - http_client.connect_timeout_ms must be greater than 0".to_string());
        }
        if config.http_client.request_timeout_ms == 0 {
            errors.push("  - http_client.request_timeout_ms must be greater than 0".to_string());
        }
        if config.http_client.max_connections == 0 {
            errors.push("  - http_client.max_connections must be greater than 0".to_string());
        }

        for (label, source) in [
            ("config_source", &config.config_source),
            ("discovery", &config.discovery),
        ] {
            if !source.url.is_empty()
                && !source.url.starts_with("http://")
                && !source.url.starts_with("https://")
            {
                errors.push(format!(
                    "  - {label}.url '{}' must start with http:// or https://",
                    source.url
                ));
            }
            if !source.url.is_empty() && source.poll_interval_secs == 0 {
                errors.push(format!(
                    "  - {label}.poll_interval_secs must be greater than 0"
                ));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { errors })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::models::SourceConfig;

    #[test]
    fn default_config_with_valid_listen_addr_passes() {
        let config = GatewayConfig {
            listen_addr: "127.0.0.1:8080".to_string(),
            ..Default::default()
        };
        assert!(GatewayConfigValidator::validate(&config).is_ok());
    }

    #[test]
    fn bad_listen_addr_and_source_url_are_both_reported() {
        let config = GatewayConfig {
            listen_addr: "not-an-addr".to_string(),
            config_source: SourceConfig {
                url: "ftp://nope".to_string(),
                poll_interval_secs: 10,
            },
            ..Default::default()
        };
        let err = GatewayConfigValidator::validate(&config).unwrap_err();
        assert_eq!(err.errors.len(), 2);
    }

    #[test]
    fn zero_timeouts_are_rejected() {
        let mut config = GatewayConfig {
            listen_addr: "127.0.0.1:8080".to_string(),
            ..Default::default()
        };
        config.http_client.request_timeout_ms = 0;
        assert!(GatewayConfigValidator::validate(&config).is_err());
    }
}
