//! Transfer header sent by the server before the payload.
//!
//! ```text
//! SIZE:<payload_size>:FILENAME:<file_path>\n
//! ```
//!
//! The payload follows the `\n` immediately, so a single network read may
//! carry the header and the first payload bytes together. [`TransferHeader::split`]
//! hands both back.

use crate::ProtocolError;
use crate::constants::{HEADER_TERMINATOR, MAX_HEADER_LEN};

const SIZE_PREFIX: &str = "SIZE:";
const FILENAME_TAG: &str = ":FILENAME:";

/// Metadata line preceding a worker's payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferHeader {
    /// Exact number of payload bytes that follow the header.
    pub payload_size: u64,
    /// Source path as the server resolved it.
    pub source_path: String,
}

impl TransferHeader {
    pub fn new(payload_size: u64, source_path: impl Into<String>) -> Self {
        Self {
            payload_size,
            source_path: source_path.into(),
        }
    }

    /// Serializes the header, terminator included.
    pub fn encode(&self) -> Vec<u8> {
        format!(
            "{SIZE_PREFIX}{}{FILENAME_TAG}{}\n",
            self.payload_size, self.source_path
        )
        .into_bytes()
    }

    /// Returns the index of the header terminator in `buf`, if present.
    pub fn find_terminator(buf: &[u8]) -> Option<usize> {
        buf.iter().position(|&b| b == HEADER_TERMINATOR)
    }

    /// Splits accumulated bytes into the header and any payload bytes that
    /// arrived after it.
    ///
    /// Returns `Ok(None)` while the terminator has not been received yet.
    pub fn split(buf: &[u8]) -> Result<Option<(Self, &[u8])>, ProtocolError> {
        match Self::find_terminator(buf) {
            Some(end) => {
                let header = Self::parse(&buf[..end])?;
                Ok(Some((header, &buf[end + 1..])))
            }
            None if buf.len() >= MAX_HEADER_LEN => Err(ProtocolError::InvalidHeader(format!(
                "no terminator within {MAX_HEADER_LEN} bytes"
            ))),
            None => Ok(None),
        }
    }

    /// Parses a header line without its terminator.
    pub fn parse(line: &[u8]) -> Result<Self, ProtocolError> {
        let text = std::str::from_utf8(line)
            .map_err(|e| ProtocolError::InvalidHeader(format!("not valid UTF-8: {e}")))?;
        let text = text.strip_suffix('\r').unwrap_or(text);

        let rest = text
            .strip_prefix(SIZE_PREFIX)
            .ok_or_else(|| ProtocolError::InvalidHeader(format!("missing SIZE field: {text:?}")))?;
        let (size, source_path) = rest.split_once(FILENAME_TAG).ok_or_else(|| {
            ProtocolError::InvalidHeader(format!("missing FILENAME field: {text:?}"))
        })?;
        let payload_size = size
            .parse()
            .map_err(|_| ProtocolError::InvalidHeader(format!("invalid size: {size:?}")))?;

        Ok(Self {
            payload_size,
            source_path: source_path.to_string(),
        })
    }
}
