//! Error types for the client.

use std::path::PathBuf;

use splitfetch_protocol::ProtocolError;

/// Failure of a single worker. Siblings are unaffected.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("could not connect to {addr} after {attempts} attempts: {source}")]
    Connect {
        addr: String,
        attempts: u32,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("incomplete transfer: received {received} of {expected} bytes")]
    Incomplete { received: u64, expected: u64 },

    #[error("receive timed out {attempts} times in a row")]
    Timeout { attempts: u32 },

    #[error("no reply from server within {0:?}")]
    NoReply(std::time::Duration),

    #[error("cancelled")]
    Cancelled,

    #[error("worker aborted: {0}")]
    Aborted(String),
}

/// A worker failure tagged with its worker index.
#[derive(Debug, thiserror::Error)]
#[error("worker {index}: {error}")]
pub struct WorkerFailure {
    pub index: u32,
    #[source]
    pub error: WorkerError,
}

/// Failure to stitch part files into the final file.
#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    #[error("missing part {index}: {}", .path.display())]
    MissingPart { index: u32, path: PathBuf },

    #[error("merged file is {actual} bytes, expected {expected}")]
    SizeMismatch { expected: u64, actual: u64 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Outcome of a whole download that did not produce a valid file.
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("cannot resolve {addr}: {source}")]
    InvalidAddress {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// No usable output file; `failures` lists the workers that failed first.
    #[error("merge failed: {source}")]
    Merge {
        #[source]
        source: MergeError,
        failures: Vec<WorkerFailure>,
    },

    /// Parts were merged but some workers reported failures, so the output
    /// cannot be trusted.
    #[error("{} worker(s) failed; output {} is invalid", .failures.len(), .output.display())]
    Workers {
        output: PathBuf,
        failures: Vec<WorkerFailure>,
    },
}

impl DownloadError {
    /// Per-worker failures behind this error, if any.
    pub fn failures(&self) -> &[WorkerFailure] {
        match self {
            Self::Merge { failures, .. } | Self::Workers { failures, .. } => failures,
            _ => &[],
        }
    }
}
