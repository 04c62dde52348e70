//! Server-side transfer worker.
//!
//! Sends the header for one connection, then streams exactly the planned
//! range of the source file and half-closes the write side.

use std::io::{ErrorKind, SeekFrom};
use std::path::Path;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWrite, AsyncWriteExt};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use splitfetch_protocol::{ChunkPlan, RetryPolicy, TransferHeader};

use crate::ServerError;
use crate::config::ServerConfig;

/// Send-side tunables for one worker.
#[derive(Debug, Clone, Copy)]
pub struct SendOptions {
    pub block_size: usize,
    pub send_timeout: Duration,
    pub send_retry: RetryPolicy,
    /// Total stalled-send time allowed across the whole range.
    pub stall_limit: Duration,
}

impl From<&ServerConfig> for SendOptions {
    fn from(config: &ServerConfig) -> Self {
        Self {
            block_size: config.block_size.max(1),
            send_timeout: config.send_timeout,
            send_retry: config.send_retry,
            stall_limit: config.stall_limit,
        }
    }
}

/// Streams `plan` of `source` to `writer`, preceded by the header.
///
/// `header_path` is echoed in the header as the client named it. On success
/// the write side is shut down and the number of payload bytes sent
/// (always `plan.length`) is returned. On failure nothing is shut down, so
/// the peer sees a short stream rather than a clean end.
pub async fn send_range<W: AsyncWrite + Unpin>(
    writer: &mut W,
    source: &Path,
    header_path: &str,
    plan: ChunkPlan,
    opts: SendOptions,
    cancel: &CancellationToken,
) -> Result<u64, ServerError> {
    let mut file = tokio::fs::File::open(source).await?;
    file.seek(SeekFrom::Start(plan.offset)).await?;

    let mut stalled = Duration::ZERO;
    let header = TransferHeader::new(plan.length, header_path);
    send_block(writer, &header.encode(), opts, &mut stalled, cancel).await?;

    let mut buf = vec![0u8; opts.block_size];
    let mut remaining = plan.length;
    let mut sent: u64 = 0;

    while remaining > 0 {
        if cancel.is_cancelled() {
            return Err(ServerError::Cancelled);
        }

        let to_read = remaining.min(buf.len() as u64) as usize;
        let n = file.read(&mut buf[..to_read]).await?;
        if n == 0 {
            return Err(ServerError::SourceTruncated {
                sent,
                expected: plan.length,
            });
        }

        send_block(writer, &buf[..n], opts, &mut stalled, cancel).await?;
        remaining -= n as u64;
        sent += n as u64;

        trace!(
            offset = plan.offset,
            sent,
            total = plan.length,
            percent = sent * 100 / plan.length,
            "block sent"
        );
    }

    writer.flush().await?;
    writer.shutdown().await?;

    debug!(
        offset = plan.offset,
        bytes = sent,
        path = %source.display(),
        "range sent"
    );
    Ok(sent)
}

/// Writes all of `block`, retrying the unsent remainder on transient errors.
///
/// A send counts as transient when it would block, is interrupted, reports
/// a timeout, or does not complete within `send_timeout`. Time spent in
/// failed sends accumulates in `stalled` across calls and is capped by
/// `opts.stall_limit`.
async fn send_block<W: AsyncWrite + Unpin>(
    writer: &mut W,
    block: &[u8],
    opts: SendOptions,
    stalled: &mut Duration,
    cancel: &CancellationToken,
) -> Result<(), ServerError> {
    let mut written = 0;
    let mut failures: u32 = 0;

    while written < block.len() {
        let started = Instant::now();
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ServerError::Cancelled),
            r = tokio::time::timeout(opts.send_timeout, writer.write(&block[written..])) => r,
        };

        match result {
            Ok(Ok(0)) => return Err(std::io::Error::from(ErrorKind::WriteZero).into()),
            Ok(Ok(n)) => {
                written += n;
                failures = 0;
                continue;
            }
            Ok(Err(e)) if !is_transient(&e) => return Err(e.into()),
            Ok(Err(e)) => debug!(error = %e, "transient send failure"),
            Err(_) => debug!(timeout = ?opts.send_timeout, "send timed out"),
        }

        failures += 1;
        if !opts.send_retry.allows(failures + 1) {
            return Err(ServerError::SendStalled { attempts: failures });
        }
        let delay = opts.send_retry.delay_for_attempt(failures + 1);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        *stalled += started.elapsed();
        if *stalled >= opts.stall_limit {
            return Err(ServerError::StallLimit(*stalled));
        }
    }

    Ok(())
}

fn is_transient(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        ErrorKind::WouldBlock | ErrorKind::Interrupted | ErrorKind::TimedOut
    )
}
