use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use vellum_node::config::NodeConfig;

/// Permissioned multi-channel ledger node.
#[derive(Parser)]
#[command(name = "vellum-node", version, about)]
struct Args {
    /// Path to the node configuration file.
    #[arg(long, short)]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    vellum_node::telemetry::init();
    let args = Args::parse();
    let config = NodeConfig::load(&args.config).context("loading configuration")?;
    vellum_node::run(config).await
}
