//! Download orchestration.
//!
//! Spawns one worker per range with a staggered start, waits for every one
//! of them (a failed worker never stops its siblings), then reassembles the
//! parts exactly once.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{Semaphore, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use splitfetch_protocol::TransferRequest;

use crate::config::DownloadConfig;
use crate::error::{DownloadError, WorkerError, WorkerFailure};
use crate::progress::Progress;
use crate::reassemble::reassemble;
use crate::store::{PartStore, base_name};
use crate::worker::{WorkerContext, WorkerReport, fetch_part};

/// Summary of a successful download.
#[derive(Debug, Clone)]
pub struct DownloadReport {
    pub path: PathBuf,
    pub bytes: u64,
    pub workers: Vec<WorkerReport>,
}

/// Parallel range downloader.
pub struct Downloader {
    config: DownloadConfig,
    progress: Option<mpsc::Sender<Progress>>,
}

impl Downloader {
    pub fn new(config: DownloadConfig) -> Self {
        Self {
            config,
            progress: None,
        }
    }

    /// Sends per-worker progress events to `tx` (lossy, see [`Progress`]).
    pub fn with_progress(mut self, tx: mpsc::Sender<Progress>) -> Self {
        self.progress = Some(tx);
        self
    }

    pub fn config(&self) -> &DownloadConfig {
        &self.config
    }

    /// Downloads `file_path` from the server at `addr` into the output
    /// directory as `<output_dir>/<base name of file_path>`.
    ///
    /// `cancel` aborts every in-flight worker; the partial parts are left on
    /// disk and the merge reports the first missing one.
    pub async fn download(
        &self,
        addr: &str,
        file_path: &str,
        cancel: CancellationToken,
    ) -> Result<DownloadReport, DownloadError> {
        let workers = self.config.workers;
        if workers == 0 {
            return Err(DownloadError::InvalidInput(
                "worker count must be at least 1".into(),
            ));
        }
        let base = base_name(file_path)
            .ok_or_else(|| DownloadError::InvalidInput(format!("no file name in {file_path:?}")))?;
        let requests = (0..workers)
            .map(|index| TransferRequest::new(index, workers, file_path))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| DownloadError::InvalidInput(e.to_string()))?;

        let addr = resolve(addr).await?;
        let store = Arc::new(PartStore::new(&self.config.output_dir));
        let ctx = Arc::new(WorkerContext {
            addr,
            store: Arc::clone(&store),
            config: self.config.worker.clone(),
            cancel,
            progress: self.progress.clone(),
        });
        let limiter = Arc::new(Semaphore::new(self.config.concurrency()));

        info!(
            %addr,
            path = file_path,
            workers,
            concurrency = self.config.concurrency(),
            "starting download"
        );

        let mut handles = Vec::with_capacity(requests.len());
        for request in requests {
            if request.worker_index > 0 && !self.config.stagger.is_zero() {
                tokio::select! {
                    _ = ctx.cancel.cancelled() => {}
                    _ = tokio::time::sleep(self.config.stagger) => {}
                }
            }

            let ctx = Arc::clone(&ctx);
            let limiter = Arc::clone(&limiter);
            handles.push(tokio::spawn(async move {
                let _permit = limiter.acquire_owned().await;
                fetch_part(&ctx, &request).await
            }));
        }

        let mut reports = Vec::with_capacity(handles.len());
        let mut failures = Vec::new();
        let mut expected: Option<u64> = Some(0);

        for (index, handle) in (0..workers).zip(handles) {
            let outcome = handle
                .await
                .unwrap_or_else(|e| Err(WorkerError::Aborted(e.to_string())));

            // Sum announced sizes so the merge can check the final length.
            // An overflowing total is treated as unknown.
            let announced = match &outcome {
                Ok(report) => Some(report.payload_size),
                Err(WorkerError::Incomplete { expected, .. }) => Some(*expected),
                Err(_) => None,
            };
            expected = expected
                .zip(announced)
                .and_then(|(sum, size)| sum.checked_add(size));

            match outcome {
                Ok(report) => reports.push(report),
                Err(error) => {
                    warn!(worker = index, "worker failed: {error}");
                    failures.push(WorkerFailure { index, error });
                }
            }
        }

        let merged = match reassemble(&store, base, workers, expected).await {
            Ok(merged) => merged,
            Err(source) => {
                warn!("merge failed: {source}");
                return Err(DownloadError::Merge { source, failures });
            }
        };

        if !failures.is_empty() {
            return Err(DownloadError::Workers {
                output: merged.path,
                failures,
            });
        }

        info!(path = %merged.path.display(), bytes = merged.bytes, "download complete");
        Ok(DownloadReport {
            path: merged.path,
            bytes: merged.bytes,
            workers: reports,
        })
    }
}

/// Resolves `addr` once for all workers. Resolution failures are structural
/// and not retried.
async fn resolve(addr: &str) -> Result<SocketAddr, DownloadError> {
    let invalid = |source| DownloadError::InvalidAddress {
        addr: addr.to_string(),
        source,
    };
    tokio::net::lookup_host(addr)
        .await
        .map_err(invalid)?
        .next()
        .ok_or_else(|| {
            invalid(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "no addresses found",
            ))
        })
}
