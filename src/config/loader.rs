use std::path::Path;

use config::{Config, File, FileFormat};
use eyre::{Result, WrapErr};

use crate::config::models::GatewayConfig;

/// Load the bootstrap configuration from a file; format is chosen by
/// extension (YAML, JSON, TOML, INI), defaulting to YAML.
pub async fn load_config(config_path: &str) -> Result<GatewayConfig> {
    load_config_sync(config_path)
}

/// Load the bootstrap configuration synchronously.
pub fn load_config_sync(config_path: &str) -> Result<GatewayConfig> {
    let path = Path::new(config_path);

    let format = match path.extension().and_then(|ext| ext.to_str()) {
        Some("yaml") | Some("yml") => FileFormat::Yaml,
        Some("json") => FileFormat::Json,
        Some("toml") => FileFormat::Toml,
        Some("ini") => FileFormat::Ini,
        _ => FileFormat::Yaml,
    };

    let settings = Config::builder()
        .add_source(File::new(
            path.to_str()
                .ok_or_else(|| eyre::eyre!("Invalid UTF-8 path: {}", path.display()))?,
            format,
        ))
        .build()
        .wrap_err_with(|| format!("Failed to build config from {}", path.display()))?;

    let gateway_config: GatewayConfig = settings
        .try_deserialize()
        .wrap_err_with(|| format!("Failed to deserialize config from {}", path.display()))?;

    Ok(gateway_config)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    #[tokio::test]
    async fn load_yaml_config() {
        let yaml_content = r#"
listen_addr: "127.0.0.1:3000"
server:
  max_content_length: 1048576
config_source:
  url: "http://config.local/routes"
  poll_interval_secs: 5
"#;
        let mut temp_file = NamedTempFile::with_suffix(".yaml").unwrap();
        write!(temp_file, "{}", yaml_content).unwrap();

        let config = load_config(temp_file.path().to_str().unwrap())
            .await
            .unwrap();
        assert_eq!(config.listen_addr, "127.0.0.1:3000");
        assert_eq!(config.server.max_content_length, 1_048_576);
        assert_eq!(config.config_source.poll_interval_secs, 5);
        // Untouched sections keep their defaults.
        assert_eq!(config.server.backlog, 1024);
        assert_eq!(config.http_client.request_timeout_ms, 30_000);
    }

    #[tokio::test]
    async fn load_toml_config() {
        let toml_content = r#"
listen_addr = "127.0.0.1:9000"

[http_client]
connect_timeout_ms = 500
request_timeout_ms = 2000
"#;
        let mut temp_file = NamedTempFile::with_suffix(".toml").unwrap();
        write!(temp_file, "{}", toml_content).unwrap();

        let config = load_config(temp_file.path().to_str().unwrap())
            .await
            .unwrap();
        assert_eq!(config.listen_addr, "127.0.0.1:9000");
        assert_eq!(config.http_client.connect_timeout_ms, 500);
        assert_eq!(config.http_client.request_timeout_ms, 2_000);
    }
}
