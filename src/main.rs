//! Notebook gateway entry point.
//!
//! Startup order:
//! 1. Verify deployment arguments (`--realm`, `--domain`, `--root`); without
//!    them the service cannot tell which environment it runs in and shuts
//!    down after a grace delay so the supervisor does not flap at full speed.
//! 2. Load and validate configuration, initialize logging and metrics.
//! 3. Start the health listener, then the proxy listener.
//! 4. Run until a shutdown signal, then stop accepting.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use notebook_gateway::config::loader::load_config;
use notebook_gateway::{
    observability, FrontendListener, GatewayConfig, HealthServer, ProxyContext, Shutdown,
};

const DEFAULT_CONFIG_PATH: &str = "gateway.toml";
const MISSING_ARGS_DELAY: Duration = Duration::from_secs(10);

#[derive(Debug, Parser)]
#[command(name = "notebook-gateway", about = "Reverse proxy for a notebook server")]
struct Args {
    /// Deployment realm (e.g., us-east-1).
    #[arg(long)]
    realm: Option<String>,

    /// Deployment domain (e.g., desktop, prod).
    #[arg(long)]
    domain: Option<String>,

    /// Deployment root directory.
    #[arg(long)]
    root: Option<PathBuf>,

    /// Configuration file path.
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
}

impl Args {
    fn has_environment(&self) -> bool {
        self.realm.is_some() && self.domain.is_some() && self.root.is_some()
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    if !args.has_environment() {
        println!("The service cannot determine what environment it is running in and will shut down.");
        println!("If you are trying to run from a development workspace, add the following");
        println!("program arguments to your launch configuration:");
        println!();
        println!("--domain=desktop --realm=us-east-1 --root=build/private");
        // Wait a while so a supervising process manager does not restart the
        // service at full speed.
        tokio::time::sleep(MISSING_ARGS_DELAY).await;
        return Ok(());
    }

    let config = if args.config.exists() {
        load_config(&args.config)?
    } else {
        GatewayConfig::default()
    };

    observability::logging::init(&config.observability.log_level);
    tracing::info!(
        realm = args.realm.as_deref().unwrap_or_default(),
        domain = args.domain.as_deref().unwrap_or_default(),
        "notebook-gateway starting"
    );
    tracing::info!(
        listener = %config.listener.bind_address,
        health = %config.health.bind_address,
        upstream_host = %config.upstream.host,
        upstream_port = config.upstream.port,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            observability::metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let shutdown = Shutdown::new();
    let mut tasks = Vec::new();

    if config.health.enabled {
        let health = HealthServer::bind(&config.health.bind_address).await?;
        tasks.push(tokio::spawn(health.run(shutdown.subscribe())));
    }

    let ctx = Arc::new(ProxyContext::from_config(&config)?);
    let listener = FrontendListener::bind(&config.listener.bind_address, ctx).await?;
    tasks.push(tokio::spawn(listener.run(shutdown.subscribe())));

    tracing::info!("All servers successfully bound and started");

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");
    shutdown.trigger();

    for task in tasks {
        let _ = task.await;
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
