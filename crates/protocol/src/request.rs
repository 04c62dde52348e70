//! Transfer request sent by a client worker.
//!
//! ```text
//! <worker_index>,<worker_count>,<file_path>
//! ```
//!
//! The request has no terminator: the server takes whatever arrives in the
//! first read. The path is everything after the second comma, so it may
//! itself contain commas.

use std::fmt;

use crate::ProtocolError;
use crate::plan::{ChunkPlan, plan};

/// One worker's request for its share of a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub worker_index: u32,
    pub worker_count: u32,
    pub file_path: String,
}

impl TransferRequest {
    /// Builds a request, checking the index/count invariant and the path.
    pub fn new(
        worker_index: u32,
        worker_count: u32,
        file_path: impl Into<String>,
    ) -> Result<Self, ProtocolError> {
        let file_path = file_path.into();
        if worker_count == 0 {
            return Err(ProtocolError::InvalidInput(
                "worker count must be at least 1".into(),
            ));
        }
        if worker_index >= worker_count {
            return Err(ProtocolError::InvalidInput(format!(
                "worker index {worker_index} out of range for {worker_count} workers"
            )));
        }
        validate_path(&file_path)?;
        Ok(Self {
            worker_index,
            worker_count,
            file_path,
        })
    }

    /// Serializes the request to its wire form.
    pub fn encode(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }

    /// Parses a request from the bytes of the server's first read.
    pub fn parse(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| ProtocolError::InvalidRequest(format!("not valid UTF-8: {e}")))?;

        let mut fields = text.splitn(3, ',');
        let (Some(index), Some(count), Some(path)) = (fields.next(), fields.next(), fields.next())
        else {
            return Err(ProtocolError::InvalidRequest(format!(
                "expected `index,count,path`, got {text:?}"
            )));
        };

        let worker_index = parse_field("worker index", index)?;
        let worker_count = parse_field("worker count", count)?;
        let file_path = path.trim_end_matches(['\r', '\n', '\0']);

        Self::new(worker_index, worker_count, file_path).map_err(|e| match e {
            ProtocolError::InvalidInput(msg) => ProtocolError::InvalidRequest(msg),
            other => other,
        })
    }

    /// Range this request covers for a file of `file_size` bytes.
    pub fn plan(&self, file_size: u64) -> Result<ChunkPlan, ProtocolError> {
        plan(file_size, self.worker_index, self.worker_count)
    }

    pub fn is_last(&self) -> bool {
        self.worker_index + 1 == self.worker_count
    }
}

impl fmt::Display for TransferRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{}",
            self.worker_index, self.worker_count, self.file_path
        )
    }
}

fn parse_field(name: &str, raw: &str) -> Result<u32, ProtocolError> {
    raw.trim_ascii()
        .parse()
        .map_err(|_| ProtocolError::InvalidRequest(format!("{name} is not a number: {raw:?}")))
}

fn validate_path(path: &str) -> Result<(), ProtocolError> {
    if path.is_empty() {
        return Err(ProtocolError::InvalidRequest("empty file path".into()));
    }
    // The path is echoed back in the header line.
    if path.contains('\n') {
        return Err(ProtocolError::InvalidRequest(
            "file path contains a newline".into(),
        ));
    }
    Ok(())
}
