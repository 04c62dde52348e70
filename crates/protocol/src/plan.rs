//! Byte-range planning.
//!
//! Client and server each call [`plan`] on their own: the client to know
//! which range it asked for, the server from the size it measured on disk.
//! Neither side ever sends a size to be trusted by the other.

use crate::ProtocolError;

/// A contiguous `[offset, offset + length)` range assigned to one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    pub offset: u64,
    pub length: u64,
}

impl ChunkPlan {
    /// Exclusive end offset of the range.
    pub fn end(&self) -> u64 {
        self.offset + self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }
}

/// Computes the range for `worker_index` out of `worker_count`.
///
/// Every worker gets `file_size / worker_count` bytes; the last one also
/// absorbs the remainder. When `file_size < worker_count`, all but the last
/// worker receive an empty range.
pub fn plan(
    file_size: u64,
    worker_index: u32,
    worker_count: u32,
) -> Result<ChunkPlan, ProtocolError> {
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

    let share = file_size / u64::from(worker_count);
    let offset = u64::from(worker_index) * share;
    let length = if worker_index == worker_count - 1 {
        file_size - offset
    } else {
        share
    };

    Ok(ChunkPlan { offset, length })
}
