//! splitfetch client entry point.

mod config;
mod progress;

use std::path::PathBuf;

use clap::Parser;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use splitfetch_client::{DownloadError, Downloader};

use crate::config::Config;

/// Download a file from a splitfetch server over parallel connections.
#[derive(Parser)]
#[command(name = "splitfetch", version)]
struct Cli {
    /// Server host or IP, optionally with `:port`.
    host: String,

    /// Path of the file on the server.
    file: String,

    /// Number of parallel workers.
    #[arg(short, long)]
    workers: Option<u32>,

    /// Server port (when `host` carries none).
    #[arg(short, long)]
    port: Option<u16>,

    /// Directory receiving the downloaded file.
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Maximum number of workers connected at once (0 = all).
    #[arg(long)]
    max_concurrent: Option<usize>,

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
    if let Some(workers) = cli.workers {
        config.workers = workers;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(dir) = cli.output_dir {
        config.output_dir = dir;
    }
    if let Some(max) = cli.max_concurrent {
        config.max_concurrent = max;
    }
    anyhow::ensure!(config.workers >= 1, "worker count must be at least 1");

    let addr = config.server_addr(&cli.host);
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        server = %addr,
        file = %cli.file,
        workers = config.workers,
        "starting splitfetch"
    );

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run(config, addr, cli.file))
}

async fn run(config: Config, addr: String, file: String) -> anyhow::Result<()> {
    let cancel = CancellationToken::new();
    let (tx, rx) = mpsc::channel(256);
    let renderer = tokio::spawn(progress::render(rx, config.workers));

    let downloader = Downloader::new(config.download_config()).with_progress(tx);

    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling workers");
            interrupt.cancel();
        }
    });

    let result = downloader.download(&addr, &file, cancel).await;
    // Closes the progress channel so the renderer finishes.
    drop(downloader);
    let _ = renderer.await;

    match result {
        Ok(report) => {
            tracing::info!(
                path = %report.path.display(),
                bytes = report.bytes,
                workers = report.workers.len(),
                "download complete"
            );
            Ok(())
        }
        Err(err) => {
            for failure in err.failures() {
                tracing::error!("{failure}");
            }
            let context = match &err {
                DownloadError::Merge { .. } => {
                    "download failed, no complete file was produced".to_string()
                }
                DownloadError::Workers { output, .. } => {
                    format!("download failed, {} must not be trusted", output.display())
                }
                _ => "download failed".to_string(),
            };
            Err(anyhow::Error::new(err).context(context))
        }
    }
}
