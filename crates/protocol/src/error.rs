//! Error types for the wire protocol.

/// Errors produced while planning ranges or decoding protocol messages.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("invalid header: {0}")]
    InvalidHeader(String),
}
