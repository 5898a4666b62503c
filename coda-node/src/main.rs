use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use prometheus_client::registry::Registry;
use tokio::sync::Mutex;
use tracing::info;
use tracing_subscriber::EnvFilter;

use coda_node::{Node, NodeConfig};

#[derive(Parser, Debug)]
#[command(about = "Run a coda content node")]
struct Cli {
    /// Path to the config file.
    #[clap(short, long)]
    config: Option<PathBuf>,
    /// Override the gateway port.
    #[clap(short, long)]
    port: Option<u16>,
    /// Disable the /metrics endpoint.
    #[clap(long)]
    no_metrics: bool,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    let args = Cli::parse();

    let mut config = NodeConfig::load(args.config.as_deref())?;
    if let Some(port) = args.port {
        config.gateway.port = port;
    }
    config.reconcile();

    let registry = if args.no_metrics {
        None
    } else {
        Some(Arc::new(Mutex::new(Registry::default())))
    };

    info!(
        endpoint = %config.gateway.self_endpoint,
        port = config.gateway.port,
        "starting coda node {}",
        env!("CARGO_PKG_VERSION"),
    );
    let node = Node::build(config, registry).await?;
    node.run().await
}
