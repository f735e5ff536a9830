//! ilpkit node entry point.
//!
//! Starts the node with configuration from a TOML file or defaults.

mod config;
mod node;

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use config::NodeConfig;
use ilpkit_connector::NodeKey;
use node::IlpNode;

/// ilpkit node
#[derive(Parser, Debug)]
#[command(name = "ilpkit-node", version, about = "ilpkit peer connector node")]
struct Args {
    /// Path to the configuration file (TOML).
    #[arg(short, long, default_value = "ilpkit.toml")]
    config: PathBuf,

    /// Override the public client host used in settlement URIs.
    #[arg(long)]
    client_host: Option<String>,

    /// Skip waiting for the ledger before connecting peers.
    #[arg(long)]
    no_wait_for_ledger: bool,

    /// Override the log level (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,

    /// Emit logs as JSON.
    #[arg(long)]
    json_logs: bool,

    /// Generate a default config file with a fresh node key and exit.
    #[arg(long)]
    init: bool,
}

fn init_tracing(level: &str, format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if format == "json" {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Handle --init flag
    if args.init {
        init_tracing(args.log_level.as_deref().unwrap_or("info"), "text");
        let mut config = NodeConfig::default();
        let key = NodeKey::generate();
        config.connector.secret_key = key.secret_hex();
        config.save(&args.config)?;
        tracing::info!(
            path = %args.config.display(),
            public_key = %key.public_key_hex(),
            "wrote default config"
        );
        return Ok(());
    }

    // Load configuration
    let mut config = NodeConfig::load(&args.config)?;

    // Apply CLI overrides
    if let Some(client_host) = args.client_host {
        config.connector.client_host = client_host;
    }
    if args.no_wait_for_ledger {
        config.startup.wait_for_ledger = false;
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    if args.json_logs {
        config.logging.format = "json".into();
    }

    init_tracing(&config.logging.level, &config.logging.format);
    tracing::info!("ilpkit node v{}", env!("CARGO_PKG_VERSION"));

    let node = IlpNode::new(config)?;

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
        tracing::info!("received shutdown signal");
    };
    tokio::pin!(shutdown);

    tokio::select! {
        result = node.start() => result?,
        _ = &mut shutdown => {
            node.shutdown().await?;
            return Ok(());
        }
    }

    tokio::select! {
        result = node.run() => {
            if let Err(e) = result {
                tracing::error!(error = %e, "status loop error");
            }
        }
        _ = &mut shutdown => {
            tracing::info!("initiating graceful shutdown");
        }
    }

    node.shutdown().await?;
    tracing::info!("ilpkit node exited cleanly");
    Ok(())
}
