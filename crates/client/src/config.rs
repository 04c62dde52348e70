use std::path::PathBuf;
use std::time::Duration;

use splitfetch_protocol::RetryPolicy;
use splitfetch_protocol::constants::{
    CONNECT_TIMEOUT, RECV_BUFFER_SIZE, RECV_TIMEOUT, SPAWN_STAGGER,
};

/// Per-worker network tunables.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Timeout for one connect attempt.
    pub connect_timeout: Duration,
    /// Connect attempts and the delay between them.
    pub connect_retry: RetryPolicy,
    /// Timeout for one socket read before it is retried.
    pub read_timeout: Duration,
    /// Consecutive read timeouts tolerated before the worker gives up.
    pub read_retry: RetryPolicy,
    /// Limit on the wait for the first reply bytes after the request is
    /// sent. A busy server queues requests before answering them, so this
    /// wait is not counted against `read_retry`. `None` waits until the
    /// server answers, closes, or the download is cancelled.
    pub reply_timeout: Option<Duration>,
    /// Socket receive buffer size.
    pub buffer_size: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            connect_timeout: CONNECT_TIMEOUT,
            connect_retry: RetryPolicy::connect(),
            read_timeout: RECV_TIMEOUT,
            read_retry: RetryPolicy::receive(),
            reply_timeout: None,
            buffer_size: RECV_BUFFER_SIZE,
        }
    }
}

/// Download configuration.
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    /// Number of ranges (and connections) the file is split into.
    pub workers: u32,
    /// Maximum number of workers connected at once (0 = all of them).
    pub max_concurrent: usize,
    /// Delay between spawning consecutive workers.
    pub stagger: Duration,
    /// Directory receiving part files and the final file.
    pub output_dir: PathBuf,
    pub worker: WorkerConfig,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            max_concurrent: 0,
            stagger: SPAWN_STAGGER,
            output_dir: PathBuf::from("downloads"),
            worker: WorkerConfig::default(),
        }
    }
}

impl DownloadConfig {
    /// Effective concurrency limit, never zero and never above the worker count.
    pub fn concurrency(&self) -> usize {
        let workers = self.workers.max(1) as usize;
        match self.max_concurrent {
            0 => workers,
            n => n.min(workers),
        }
    }
}
