//! Part file reassembly.

use std::path::PathBuf;

use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::MergeError;
use crate::store::PartStore;

/// Result of a successful merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeReport {
    pub path: PathBuf,
    pub bytes: u64,
    pub parts: u32,
}

/// Concatenates `<base>.part0 .. <base>.part{worker_count - 1}` into
/// `<base>` in index order, deleting each part once it has been appended.
///
/// Every part must exist before the final file is touched, so running this
/// again after a successful merge fails with [`MergeError::MissingPart`] and
/// leaves the merged file alone. When `expected_size` is known, a merged
/// file of any other length is reported as [`MergeError::SizeMismatch`].
pub async fn reassemble(
    store: &PartStore,
    base: &str,
    worker_count: u32,
    expected_size: Option<u64>,
) -> Result<MergeReport, MergeError> {
    for index in 0..worker_count {
        let path = store.part_path(base, index);
        if !tokio::fs::try_exists(&path).await? {
            return Err(MergeError::MissingPart { index, path });
        }
    }

    let final_path = store.final_path(base);
    let mut output = tokio::fs::File::create(&final_path).await?;
    let mut total: u64 = 0;

    for index in 0..worker_count {
        let path = store.part_path(base, index);
        let mut part = tokio::fs::File::open(&path).await?;
        let copied = tokio::io::copy(&mut part, &mut output).await?;
        drop(part);
        tokio::fs::remove_file(&path).await?;

        total += copied;
        debug!(part = index, bytes = copied, "part merged");
    }

    output.flush().await?;

    if let Some(expected) = expected_size
        && expected != total
    {
        return Err(MergeError::SizeMismatch {
            expected,
            actual: total,
        });
    }

    info!(path = %final_path.display(), bytes = total, parts = worker_count, "file reassembled");
    Ok(MergeReport {
        path: final_path,
        bytes: total,
        parts: worker_count,
    })
}
