//! Control daemon supervising local processes
//!
//! Listens on a Unix socket and answers one JSON request per connection.

use anyhow::{Context, Result};
use clap::Parser;
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "opsctld")]
#[command(about = "Daemon supervising local processes", long_about = None)]
#[command(version)]
struct Args {
    /// Control socket path, overrides the configured one
    #[arg(short, long)]
    socket: Option<PathBuf>,

    /// Configuration file (defaults to ./opsctl.yaml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    opsctl::logging::init(args.verbose)?;

    let config = supervisor_config::load_or_default(args.config.as_deref())
        .context("Failed to load configuration")?;
    let socket_path = args
        .socket
        .unwrap_or_else(|| config.settings.socket_path.clone());

    info!("Starting opsctld");
    info!("Socket: {}", socket_path.display());

    let shutdown = shutdown_channel()?;

    // Run with smol
    smol::block_on(async { opsctl::daemon::run(config, &socket_path, shutdown).await })
}

/// Resolves once SIGINT or SIGTERM arrives
fn shutdown_channel() -> Result<async_channel::Receiver<()>> {
    let mut signals =
        Signals::new([SIGINT, SIGTERM]).context("Failed to register signal handlers")?;
    let (tx, rx) = async_channel::bounded(1);

    std::thread::spawn(move || {
        if let Some(sig) = signals.forever().next() {
            info!("Received signal {}", sig);
            let _ = tx.send_blocking(());
        }
    });

    Ok(rx)
}
