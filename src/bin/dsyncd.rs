//! dsyncd: the dsync daemon.

use anyhow::{Context, Result};
use clap::Parser;
use dsync::DaemonConfig;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "dsyncd")]
#[command(version)]
#[command(about = "Serve dsync transfer requests")]
struct Cli {
    /// Config file (default: ~/.config/dsyncd/dsyncd.toml or /etc/dsyncd/dsyncd.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen host, overrides the config file
    #[arg(long)]
    host: Option<String>,

    /// Listen port, overrides the config file
    #[arg(short, long)]
    port: Option<u16>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut config =
        DaemonConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }

    dsync::server::serve(config).await?;
    Ok(())
}
