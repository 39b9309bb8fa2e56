use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use starbus::{Config, Relay};

/// Relay process for a starbus cluster: pure fan-out, no application logic.
#[derive(Debug, Parser)]
#[command(
    name = "starbus-relay",
    version,
    about = "Star-topology message relay for clustered realtime servers"
)]
struct Cli {
    /// YAML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Bind address override, e.g. 127.0.0.1:7474.
    #[arg(long)]
    bind: Option<String>,

    /// Directory for rolling JSON log files (console-only when omitted).
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    starbus::logging::init(cli.log_dir.clone());

    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(bind) = cli.bind {
        config.relay.bind_addr = bind;
    }
    config.validate()?;

    let relay = Relay::new(config.relay);
    relay.start().await?;

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    relay.stop().await?;
    Ok(())
}
