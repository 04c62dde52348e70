//! Error types for the server.

use std::path::PathBuf;

use splitfetch_protocol::ProtocolError;

/// Errors produced while serving a single connection.
///
/// None of these stop the accept loop; they end the connection they
/// occurred on.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("file not served by this instance: {}", .0.display())]
    Forbidden(PathBuf),

    #[error("source ended early: sent {sent} of {expected} bytes")]
    SourceTruncated { sent: u64, expected: u64 },

    #[error("send stalled after {attempts} attempts")]
    SendStalled { attempts: u32 },

    #[error("sends stalled for {0:?} in total")]
    StallLimit(std::time::Duration),

    #[error("timed out waiting for request")]
    Timeout,

    #[error("cancelled")]
    Cancelled,
}
