//! splitfetch server entry point.

mod config;

use std::path::PathBuf;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use splitfetch_server::Dispatcher;

use crate::config::Config;

/// Serve a file to parallel splitfetch clients.
#[derive(Parser)]
#[command(name = "splitfetch-server", version)]
struct Cli {
    /// Only serve this file (default: any file a client names).
    file: Option<PathBuf>,

    /// TCP port to listen on.
    #[arg(short, long)]
    port: Option<u16>,

    /// Maximum number of connections served at once.
    #[arg(long)]
    max_connections: Option<usize>,

    /// Configuration file (TOML).
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(file) = cli.file {
        config.file = Some(file);
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(max) = cli.max_connections {
        config.max_connections = max;
    }

    if let Some(file) = &config.file {
        anyhow::ensure!(file.is_file(), "not a file: {}", file.display());
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        port = config.port,
        file = ?config.file,
        "starting splitfetch server"
    );

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run(config))?;

    tracing::info!("server shut down cleanly");
    Ok(())
}

async fn run(config: Config) -> anyhow::Result<()> {
    let cancel = CancellationToken::new();
    let dispatcher = Dispatcher::new(config.server_config(), cancel.clone());
    let listener = dispatcher.bind().await?;

    tokio::select! {
        result = dispatcher.serve(listener) => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupt received, shutting down");
            cancel.cancel();
        }
    }
    Ok(())
}
