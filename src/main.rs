//! dsync client: `dsync <SOURCE> <DESTINATION>`
//!
//! Either side may be `path`, `host:path` or `host:port:path`; at most one
//! side may be remote.

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use dsync::transfer::options::DEFAULT_BLOCK_SIZE;
use dsync::{initiate_sync, Request, SyncPath, TransferOptions, TransferStats};
use std::time::Instant;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "dsync")]
#[command(version)]
#[command(about = "Sync a directory tree, sending only the blocks that changed")]
struct Cli {
    /// Source: path, host:path or host:port:path
    source: SyncPath,

    /// Destination: path, host:path or host:port:path
    destination: SyncPath,

    /// Block size in bytes
    #[arg(short, long, default_value_t = DEFAULT_BLOCK_SIZE)]
    block_size: usize,

    /// Follow symlinks in the source tree
    #[arg(short = 'L', long)]
    follow_links: bool,

    /// Print transfer statistics as JSON
    #[arg(long)]
    json: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let cwd = std::env::current_dir().context("Failed to read current directory")?;
    let request = Request::from_addresses(&cli.source, &cli.destination, &cwd)?
        .with_block_size(cli.block_size)
        .with_follow_links(cli.follow_links);

    let start = Instant::now();
    let stats = match initiate_sync(request, &TransferOptions::default()).await {
        Ok(stats) => stats,
        Err(e) => {
            eprintln!("{} {}", "error:".red().bold(), e);
            std::process::exit(1);
        }
    };

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        print_summary(&stats, start.elapsed().as_secs_f64());
    }
    Ok(())
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn print_summary(stats: &TransferStats, secs: f64) {
    println!("{}", "Sync complete".green().bold());
    println!(
        "  {} files, {} directories, {} symlinks ({} bytes)",
        stats.files, stats.directories, stats.symlinks, stats.source_size
    );
    println!(
        "  {} {} bytes, {} {} bytes",
        "sent".cyan(),
        stats.bytes_sent,
        "unchanged".cyan(),
        stats.bytes_same
    );
    if stats.status_exchanges > 0 {
        println!(
            "  {} status exchanges, {} packets resent",
            stats.status_exchanges,
            stats.packets_resent_by_source + stats.packets_resent_by_destination
        );
    }
    println!("  {:.2}s", secs);
}
