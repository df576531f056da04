use std::{path::Path, sync::Arc};

use clap::Parser;
use color_eyre::{
    eyre::{eyre, WrapErr},
    Result,
};
use meridian::{
    adapters::{
        HttpConfigSource, HttpDiscoverySource, IngressHandler, IngressServer,
        UpstreamClientAdapter,
    },
    config::{
        loader::load_config, models::GatewayConfig, registry::DynamicConfigRegistry,
        validation::GatewayConfigValidator,
    },
    core::{build_filter_chain_factory, resilience::ResilienceExecutor},
    ports::{ConfigSource, DiscoverySource},
    tracing_setup,
    utils::GracefulShutdown,
};

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    #[clap(subcommand)]
    command: Option<Commands>,

    #[clap(short, long, default_value = "gateway.yaml")]
    config: String,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Validate configuration file
    Validate {
        #[clap(short, long, default_value = "gateway.yaml")]
        config: String,
    },
    /// Initialize a new configuration file
    Init {
        #[clap(short, long, default_value = "gateway.yaml")]
        config: String,
    },
    /// Start the gateway (default)
    Serve {
        #[clap(short, long, default_value = "gateway.yaml")]
        config: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();
    let (command, config_path) = match args.command {
        Some(Commands::Validate { config }) => ("validate", config),
        Some(Commands::Init { config }) => ("init", config),
        Some(Commands::Serve { config }) => ("serve", config),
        None => ("serve", args.config),
    };

    match command {
        "validate" => return validate_config_command(&config_path).await,
        "init" => return init_config_command(&config_path).await,
        _ => {}
    }

    tracing_setup::init_tracing().map_err(|e| eyre!("Failed to initialize tracing: {}", e))?;

    tracing::info!(config = %config_path, "loading bootstrap configuration");
    let config: GatewayConfig = load_config(&config_path)
        .await
        .wrap_err_with(|| format!("Failed to load config from {config_path}"))?;
    GatewayConfigValidator::validate(&config).wrap_err("Configuration validation failed")?;
    let config = Arc::new(config);

    // Process-wide state, initialized registry -> client -> ingress and
    // torn down in reverse by task cancellation on exit.
    let registry = Arc::new(DynamicConfigRegistry::new());
    let upstream_client = Arc::new(UpstreamClientAdapter::new(&config.http_client));
    let resilience = Arc::new(ResilienceExecutor::new(registry.clone()));
    let chain_factory = Arc::new(build_filter_chain_factory(
        registry.clone(),
        upstream_client.clone(),
        resilience,
        Vec::new(),
    ));

    subscribe_config_source(&config, registry.clone()).await?;
    subscribe_discovery_source(&config, registry.clone()).await?;

    let graceful_shutdown = Arc::new(GracefulShutdown::new());
    let signal_handler_shutdown = graceful_shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = signal_handler_shutdown.run_signal_handler().await {
            tracing::error!(error = %e, "signal handler error");
        }
    });

    let handler = Arc::new(IngressHandler::new(
        registry,
        chain_factory,
        config.server.max_content_length,
    ));
    let server = IngressServer::new(config, handler);
    server.run(graceful_shutdown).await?;

    tracing::info!("gateway stopped");
    Ok(())
}

/// Wire the route source into the registry: full replace, then fan the
/// change out so per-service caches rebuild.
async fn subscribe_config_source(
    config: &GatewayConfig,
    registry: Arc<DynamicConfigRegistry>,
) -> Result<()> {
    if config.config_source.url.is_empty() {
        tracing::warn!("no config source configured; routes must be pushed by other means");
        return Ok(());
    }
    let source = HttpConfigSource::new(&config.config_source);
    source
        .subscribe_routes(Arc::new(move |new_routes| {
            registry.update_routes(new_routes.clone(), true);
            for route in &new_routes {
                registry.change_route(route);
            }
        }))
        .await
        .wrap_err("Failed to subscribe to the config source")
}

/// Wire the discovery source into the registry: definition first, then the
/// instance set.
async fn subscribe_discovery_source(
    config: &GatewayConfig,
    registry: Arc<DynamicConfigRegistry>,
) -> Result<()> {
    if config.discovery.url.is_empty() {
        tracing::warn!("no discovery source configured; instances must be pushed by other means");
        return Ok(());
    }
    let source = HttpDiscoverySource::new(&config.discovery);
    source
        .subscribe_services(Arc::new(move |definition, instances| {
            registry.update_service(definition.clone());
            registry.update_instances(&definition, instances);
        }))
        .await
        .wrap_err("Failed to subscribe to the discovery source")
}

async fn validate_config_command(config_path: &str) -> Result<()> {
    println!("Validating configuration file: {config_path}");

    if !Path::new(config_path).exists() {
        eprintln!("Error: configuration file '{config_path}' not found");
        std::process::exit(1);
    }

    let config = match load_config(config_path).await {
        Ok(config) => {
            println!("Configuration parsing: OK");
            config
        }
        Err(e) => {
            eprintln!("Configuration parsing failed:\n   {e}");
            std::process::exit(1);
        }
    };

    match GatewayConfigValidator::validate(&config) {
        Ok(()) => {
            println!("Configuration validation: OK");
            println!();
            println!("Summary:");
            println!("   - Listen address: {}", config.listen_addr);
            println!(
                "   - Config source: {}",
                if config.config_source.url.is_empty() {
                    "(none)"
                } else {
                    &config.config_source.url
                }
            );
            println!(
                "   - Discovery source: {}",
                if config.discovery.url.is_empty() {
                    "(none)"
                } else {
                    &config.discovery.url
                }
            );
            println!(
                "   - Max request body: {} bytes",
                config.server.max_content_length
            );
            Ok(())
        }
        Err(e) => {
            eprintln!("Configuration validation failed:\n{e}");
            std::process::exit(1);
        }
    }
}

async fn init_config_command(config_path: &str) -> Result<()> {
    if Path::new(config_path).exists() {
        eprintln!("Error: configuration file '{config_path}' already exists");
        std::process::exit(1);
    }

    let default_config = r#"# Meridian API Gateway configuration

# The address the ingress server listens on
listen_addr: "0.0.0.0:8080"

server:
  backlog: 1024
  send_buffer_size: 65536
  recv_buffer_size: 65536
  max_content_length: 67108864

http_client:
  connect_timeout_ms: 3000
  request_timeout_ms: 30000
  max_redirects: 5
  max_connections: 10000
  max_connections_per_host: 1000
  pooled_idle_timeout_ms: 60000

# Remote source of route definitions, polled for changes
config_source:
  url: "http://127.0.0.1:8848/routes"
  poll_interval_secs: 10

# Remote source of service topology, polled for changes
discovery:
  url: "http://127.0.0.1:8848/services"
  poll_interval_secs: 10
"#;

    tokio::fs::write(config_path, default_config)
        .await
        .wrap_err("Failed to write config file")?;
    println!("Created default configuration at: {config_path}");
    println!("   Run 'meridian serve --config {config_path}' to start the gateway");
    Ok(())
}
