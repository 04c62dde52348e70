//! Client-side transfer worker.
//!
//! Connects to the server, requests one range, and streams the payload into
//! that range's part file.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use splitfetch_protocol::{ProtocolError, TransferHeader, TransferRequest};

use crate::config::WorkerConfig;
use crate::error::WorkerError;
use crate::progress::{self, Progress};
use crate::store::{PartStore, base_name};

/// Shared state handed to every worker of one download.
#[derive(Clone)]
pub struct WorkerContext {
    pub addr: SocketAddr,
    pub store: Arc<PartStore>,
    pub config: WorkerConfig,
    pub cancel: CancellationToken,
    pub progress: Option<mpsc::Sender<Progress>>,
}

/// What a successful worker received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerReport {
    pub index: u32,
    pub payload_size: u64,
    pub source_path: String,
    pub part_path: PathBuf,
}

/// Downloads the range described by `request` into its part file.
///
/// A short payload leaves the truncated part file on disk and returns
/// [`WorkerError::Incomplete`].
pub async fn fetch_part(
    ctx: &WorkerContext,
    request: &TransferRequest,
) -> Result<WorkerReport, WorkerError> {
    let index = request.worker_index;
    let base = base_name(&request.file_path).ok_or_else(|| {
        ProtocolError::InvalidInput(format!("no file name in {:?}", request.file_path))
    })?;

    let mut stream = connect(ctx.addr, &ctx.config, &ctx.cancel).await?;
    debug!(worker = index, addr = %ctx.addr, "connected");

    stream.write_all(&request.encode()).await?;
    stream.flush().await?;

    let (header, trailing) = read_header(&mut stream, &ctx.config, &ctx.cancel).await?;
    debug!(
        worker = index,
        payload_size = header.payload_size,
        source = %header.source_path,
        "header received"
    );
    if base_name(&header.source_path) != Some(base) {
        warn!(
            worker = index,
            requested = %request.file_path,
            source = %header.source_path,
            "server reported a different file name"
        );
    }

    ctx.store.ensure_dir().await?;
    let part_path = ctx.store.part_path(base, index);
    let mut part = tokio::fs::File::create(&part_path).await?;

    let received = receive_payload(
        &mut stream,
        &mut part,
        index,
        header.payload_size,
        &trailing,
        ctx,
    )
    .await;
    part.flush().await?;
    drop(part);
    let received = received?;

    // Half-close; the server is done sending either way.
    if let Err(e) = stream.shutdown().await {
        debug!(worker = index, error = %e, "shutdown failed");
    }

    if received != header.payload_size {
        warn!(
            worker = index,
            received,
            expected = header.payload_size,
            part = %part_path.display(),
            "incomplete transfer, part file kept"
        );
        return Err(WorkerError::Incomplete {
            received,
            expected: header.payload_size,
        });
    }

    info!(worker = index, bytes = received, "part complete");
    Ok(WorkerReport {
        index,
        payload_size: header.payload_size,
        source_path: header.source_path,
        part_path,
    })
}

/// Connects to `addr`, retrying per `config.connect_retry`.
async fn connect(
    addr: SocketAddr,
    config: &WorkerConfig,
    cancel: &CancellationToken,
) -> Result<TcpStream, WorkerError> {
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(WorkerError::Cancelled),
            r = tokio::time::timeout(config.connect_timeout, TcpStream::connect(addr)) => r,
        };

        let error = match result {
            Ok(Ok(stream)) => return Ok(stream),
            Ok(Err(e)) => e,
            Err(_) => std::io::Error::new(std::io::ErrorKind::TimedOut, "connect timed out"),
        };

        if !config.connect_retry.allows(attempt + 1) {
            return Err(WorkerError::Connect {
                addr: addr.to_string(),
                attempts: attempt,
                source: error,
            });
        }

        let delay = config.connect_retry.delay_for_attempt(attempt + 1);
        warn!(%addr, attempt, error = %error, "connect failed, retrying");
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(WorkerError::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

/// Reads into `buf`, retrying reads that time out.
///
/// Only consecutive timeouts count against `config.read_retry`.
async fn read_some<R: AsyncRead + Unpin>(
    reader: &mut R,
    buf: &mut [u8],
    config: &WorkerConfig,
    cancel: &CancellationToken,
) -> Result<usize, WorkerError> {
    let mut timeouts: u32 = 0;
    loop {
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(WorkerError::Cancelled),
            r = tokio::time::timeout(config.read_timeout, reader.read(buf)) => r,
        };

        match result {
            Ok(Ok(n)) => return Ok(n),
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::TimedOut => {}
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => {}
        }

        timeouts += 1;
        if !config.read_retry.allows(timeouts + 1) {
            return Err(WorkerError::Timeout { attempts: timeouts });
        }
        debug!(timeouts, "receive timed out, retrying");
        let delay = config.read_retry.delay_for_attempt(timeouts + 1);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

/// Reads the first bytes of the server's reply.
///
/// Bounded only by `config.reply_timeout` and cancellation: a server at its
/// connection limit holds the request until a slot frees up.
async fn wait_for_reply<R: AsyncRead + Unpin>(
    reader: &mut R,
    buf: &mut [u8],
    config: &WorkerConfig,
    cancel: &CancellationToken,
) -> Result<usize, WorkerError> {
    let read = async {
        loop {
            match reader.read(buf).await {
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                other => return other,
            }
        }
    };
    let wait = async {
        match config.reply_timeout {
            Some(limit) => match tokio::time::timeout(limit, read).await {
                Ok(result) => result.map_err(WorkerError::from),
                Err(_) => Err(WorkerError::NoReply(limit)),
            },
            None => read.await.map_err(WorkerError::from),
        }
    };

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(WorkerError::Cancelled),
        result = wait => result,
    }
}

/// Reads until the header terminator and returns the header together with
/// any payload bytes that arrived in the same reads.
pub(crate) async fn read_header<R: AsyncRead + Unpin>(
    reader: &mut R,
    config: &WorkerConfig,
    cancel: &CancellationToken,
) -> Result<(TransferHeader, Vec<u8>), WorkerError> {
    let mut acc = Vec::with_capacity(256);
    let mut buf = vec![0u8; config.buffer_size.max(1)];

    loop {
        let n = if acc.is_empty() {
            wait_for_reply(reader, &mut buf, config, cancel).await?
        } else {
            read_some(reader, &mut buf, config, cancel).await?
        };
        if n == 0 {
            return Err(ProtocolError::InvalidHeader(format!(
                "connection closed after {} bytes, before the header ended",
                acc.len()
            ))
            .into());
        }
        acc.extend_from_slice(&buf[..n]);

        if let Some((header, trailing)) = TransferHeader::split(&acc)? {
            return Ok((header, trailing.to_vec()));
        }
    }
}

/// Writes `trailing` then copies from `reader` until `payload_size` bytes
/// are written or the peer closes. Returns the number of bytes written.
pub(crate) async fn receive_payload<R, W>(
    reader: &mut R,
    part: &mut W,
    index: u32,
    payload_size: u64,
    trailing: &[u8],
    ctx: &WorkerContext,
) -> Result<u64, WorkerError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let report = |received: u64| {
        progress::report(
            ctx.progress.as_ref(),
            Progress {
                worker: index,
                received,
                total: payload_size,
            },
        )
    };

    if trailing.len() as u64 > payload_size {
        part.write_all(&trailing[..payload_size as usize]).await?;
        return Err(ProtocolError::InvalidHeader(format!(
            "received {} payload bytes with the header, more than the announced {payload_size}",
            trailing.len()
        ))
        .into());
    }

    part.write_all(trailing).await?;
    let mut written = trailing.len() as u64;
    report(written);

    let mut buf = vec![0u8; ctx.config.buffer_size.max(1)];
    while written < payload_size {
        let to_read = (payload_size - written).min(buf.len() as u64) as usize;
        let n = read_some(reader, &mut buf[..to_read], &ctx.config, &ctx.cancel).await?;
        if n == 0 {
            debug!(worker = index, written, payload_size, "peer closed");
            break;
        }
        part.write_all(&buf[..n]).await?;
        written += n as u64;
        report(written);
    }

    Ok(written)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use splitfetch_protocol::RetryPolicy;
    use tokio::net::TcpListener;

    use super::*;

    fn fast_config() -> WorkerConfig {
        WorkerConfig {
            connect_timeout: Duration::from_secs(2),
            connect_retry: RetryPolicy::immediate(3),
            read_timeout: Duration::from_secs(5),
            read_retry: RetryPolicy::immediate(3),
            reply_timeout: None,
            buffer_size: 16,
        }
    }

    fn context(addr: SocketAddr, dir: &std::path::Path) -> WorkerContext {
        WorkerContext {
            addr,
            store: Arc::new(PartStore::new(dir)),
            config: fast_config(),
            cancel: CancellationToken::new(),
            progress: None,
        }
    }

    /// One-shot fake server: reads the request, then writes `reply` in the
    /// given pieces and closes. Returns the request it received.
    async fn fake_server(pieces: Vec<Vec<u8>>) -> (SocketAddr, tokio::task::JoinHandle<Vec<u8>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut request = vec![0u8; 1024];
            let n = stream.read(&mut request).await.unwrap();
            request.truncate(n);
            for piece in pieces {
                stream.write_all(&piece).await.unwrap();
                stream.flush().await.unwrap();
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            stream.shutdown().await.unwrap();
            request
        });
        (addr, handle)
    }

    #[tokio::test]
    async fn header_split_across_reads() {
        let mut reader = tokio_test::io::Builder::new()
            .read(b"SIZE:5:FI")
            .read(b"LENAME:a.bin")
            .read(b"\n")
            .build();

        let (header, trailing) =
            read_header(&mut reader, &fast_config(), &CancellationToken::new())
                .await
                .unwrap();
        assert_eq!(header, TransferHeader::new(5, "a.bin"));
        assert!(trailing.is_empty());
    }

    #[tokio::test]
    async fn header_read_keeps_trailing_payload() {
        let mut reader = tokio_test::io::Builder::new()
            .read(b"SIZE:5:FILENAME:a.bin\nhel")
            .build();

        let (header, trailing) =
            read_header(&mut reader, &fast_config(), &CancellationToken::new())
                .await
                .unwrap();
        assert_eq!(header.payload_size, 5);
        assert_eq!(trailing, b"hel");
    }

    #[tokio::test]
    async fn eof_before_header_is_protocol_error() {
        let mut reader = tokio_test::io::Builder::new().read(b"SIZE:5").build();
        let result = read_header(&mut reader, &fast_config(), &CancellationToken::new()).await;
        assert!(matches!(
            result,
            Err(WorkerError::Protocol(ProtocolError::InvalidHeader(_)))
        ));
    }

    #[tokio::test]
    async fn malformed_header_is_protocol_error() {
        let mut reader = tokio_test::io::Builder::new()
            .read(b"HELLO THERE\n")
            .build();
        let result = read_header(&mut reader, &fast_config(), &CancellationToken::new()).await;
        assert!(matches!(result, Err(WorkerError::Protocol(_))));
    }

    #[tokio::test]
    async fn receive_error_aborts() {
        let mut reader = tokio_test::io::Builder::new()
            .read(b"abc")
            .read_error(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "reset",
            ))
            .build();
        let dir = tempfile::tempdir().unwrap();
        let ctx = context("127.0.0.1:1".parse().unwrap(), dir.path());
        let mut part = Vec::new();

        let result = receive_payload(&mut reader, &mut part, 0, 10, b"", &ctx).await;
        assert!(matches!(result, Err(WorkerError::Io(_))));
        assert_eq!(part, b"abc");
    }

    #[tokio::test]
    async fn receive_payload_reports_progress() {
        let mut reader = tokio_test::io::Builder::new().read(b"lo").build();
        let dir = tempfile::tempdir().unwrap();
        let (tx, mut rx) = mpsc::channel(16);
        let ctx = WorkerContext {
            progress: Some(tx),
            ..context("127.0.0.1:1".parse().unwrap(), dir.path())
        };
        let mut part = Vec::new();

        let written = receive_payload(&mut reader, &mut part, 2, 5, b"hel", &ctx)
            .await
            .unwrap();
        assert_eq!(written, 5);
        assert_eq!(part, b"hello");

        let mut last = None;
        while let Ok(p) = rx.try_recv() {
            last = Some(p);
        }
        assert_eq!(
            last,
            Some(Progress {
                worker: 2,
                received: 5,
                total: 5
            })
        );
    }

    #[tokio::test]
    async fn excess_trailing_bytes_rejected() {
        let mut reader = tokio_test::io::Builder::new().build();
        let dir = tempfile::tempdir().unwrap();
        let ctx = context("127.0.0.1:1".parse().unwrap(), dir.path());
        let mut part = Vec::new();

        let result = receive_payload(&mut reader, &mut part, 0, 2, b"abcd", &ctx).await;
        assert!(matches!(result, Err(WorkerError::Protocol(_))));
        assert_eq!(part, b"ab");
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_timeouts_give_up() {
        let (_client, mut server_side) = tokio::io::duplex(64);
        let config = WorkerConfig {
            read_timeout: Duration::from_secs(5),
            read_retry: RetryPolicy::immediate(4),
            ..fast_config()
        };

        let mut buf = [0u8; 8];
        let result = read_some(&mut server_side, &mut buf, &config, &CancellationToken::new()).await;
        assert!(matches!(result, Err(WorkerError::Timeout { attempts: 4 })));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_then_data_succeeds() {
        let (mut client, mut server_side) = tokio::io::duplex(64);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(7)).await;
            client.write_all(b"late").await.unwrap();
            // Keep the pipe open until the reader is done.
            tokio::time::sleep(Duration::from_secs(60)).await;
        });

        let mut buf = [0u8; 8];
        let n = read_some(&mut server_side, &mut buf, &fast_config(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(&buf[..n], b"late");
    }

    #[tokio::test(start_paused = true)]
    async fn queued_reply_is_not_a_receive_timeout() {
        let (mut server_side, mut client) = tokio::io::duplex(256);
        tokio::spawn(async move {
            // Far longer than read_retry allows for ordinary reads.
            tokio::time::sleep(Duration::from_secs(600)).await;
            server_side.write_all(b"SIZE:2:FILENAME:f\nok").await.unwrap();
            tokio::time::sleep(Duration::from_secs(60)).await;
        });

        let (header, trailing) = read_header(&mut client, &fast_config(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(header.payload_size, 2);
        assert_eq!(trailing, b"ok");
    }

    #[tokio::test(start_paused = true)]
    async fn reply_timeout_bounds_the_wait() {
        let (_server_side, mut client) = tokio::io::duplex(256);
        let config = WorkerConfig {
            reply_timeout: Some(Duration::from_secs(30)),
            ..fast_config()
        };

        let result = read_header(&mut client, &config, &CancellationToken::new()).await;
        assert!(matches!(result, Err(WorkerError::NoReply(d)) if d == Duration::from_secs(30)));
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_header_still_times_out() {
        let (mut server_side, mut client) = tokio::io::duplex(256);
        tokio::spawn(async move {
            server_side.write_all(b"SIZE:2:FIL").await.unwrap();
            tokio::time::sleep(Duration::from_secs(3600)).await;
        });

        let result = read_header(&mut client, &fast_config(), &CancellationToken::new()).await;
        assert!(matches!(result, Err(WorkerError::Timeout { attempts: 3 })));
    }

    #[tokio::test]
    async fn fetch_part_writes_part_file() {
        let dir = tempfile::tempdir().unwrap();
        let (addr, server) = fake_server(vec![
            b"SIZE:11:FILENAME:/srv/hello.txt\nhello".to_vec(),
            b" world".to_vec(),
        ])
        .await;
        let ctx = context(addr, dir.path());
        let request = TransferRequest::new(1, 2, "/srv/hello.txt").unwrap();

        let report = fetch_part(&ctx, &request).await.unwrap();

        assert_eq!(server.await.unwrap(), b"1,2,/srv/hello.txt");
        assert_eq!(report.index, 1);
        assert_eq!(report.payload_size, 11);
        assert_eq!(report.part_path, dir.path().join("hello.txt.part1"));
        assert_eq!(std::fs::read(&report.part_path).unwrap(), b"hello world");
    }

    #[tokio::test]
    async fn short_payload_is_incomplete_and_kept() {
        let dir = tempfile::tempdir().unwrap();
        let (addr, _server) =
            fake_server(vec![b"SIZE:6:FILENAME:f.bin\n".to_vec(), b"12345".to_vec()]).await;
        let ctx = context(addr, dir.path());
        let request = TransferRequest::new(0, 1, "f.bin").unwrap();

        let result = fetch_part(&ctx, &request).await;

        assert!(matches!(
            result,
            Err(WorkerError::Incomplete {
                received: 5,
                expected: 6
            })
        ));
        let part = dir.path().join("f.bin.part0");
        assert_eq!(std::fs::read(part).unwrap(), b"12345");
    }

    #[tokio::test]
    async fn empty_range_creates_empty_part() {
        let dir = tempfile::tempdir().unwrap();
        let (addr, _server) = fake_server(vec![b"SIZE:0:FILENAME:f.bin\n".to_vec()]).await;
        let ctx = context(addr, dir.path());
        let request = TransferRequest::new(0, 3, "f.bin").unwrap();

        let report = fetch_part(&ctx, &request).await.unwrap();
        assert_eq!(report.payload_size, 0);
        assert_eq!(std::fs::read(report.part_path).unwrap(), b"");
    }

    #[tokio::test]
    async fn creates_missing_output_dir() {
        let root = tempfile::tempdir().unwrap();
        let out = root.path().join("nested/downloads");
        let (addr, _server) = fake_server(vec![b"SIZE:2:FILENAME:f\nok".to_vec()]).await;
        let ctx = context(addr, &out);
        let request = TransferRequest::new(0, 1, "f").unwrap();

        fetch_part(&ctx, &request).await.unwrap();
        assert_eq!(std::fs::read(out.join("f.part0")).unwrap(), b"ok");
    }

    #[tokio::test]
    async fn connect_failure_after_retries() {
        // Bind then drop to get a port nobody listens on.
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(addr, dir.path());
        let request = TransferRequest::new(0, 1, "f").unwrap();

        let result = fetch_part(&ctx, &request).await;
        assert!(matches!(
            result,
            Err(WorkerError::Connect { attempts: 3, .. })
        ));
        assert!(!dir.path().join("f.part0").exists());
    }

    #[tokio::test]
    async fn cancelled_worker_stops() {
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(addr, dir.path());
        ctx.cancel.cancel();
        let request = TransferRequest::new(0, 1, "f").unwrap();

        let result = fetch_part(&ctx, &request).await;
        assert!(matches!(result, Err(WorkerError::Cancelled)));
    }
}
