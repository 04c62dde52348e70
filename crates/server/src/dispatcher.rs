//! Connection dispatcher.
//!
//! Accepts connections until cancelled and hands each one to its own task.
//! A bad request, missing file or failed transfer ends that connection only;
//! the accept loop keeps running.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use splitfetch_protocol::TransferRequest;
use splitfetch_protocol::constants::MAX_REQUEST_LEN;

use crate::ServerError;
use crate::config::ServerConfig;
use crate::worker::{SendOptions, send_range};

/// Accept loop serving byte ranges to client workers.
pub struct Dispatcher {
    config: Arc<ServerConfig>,
    cancel: CancellationToken,
    limiter: Arc<Semaphore>,
}

impl Dispatcher {
    pub fn new(config: ServerConfig, cancel: CancellationToken) -> Self {
        let limiter = Arc::new(Semaphore::new(config.max_connections.max(1)));
        Self {
            config: Arc::new(config),
            cancel,
            limiter,
        }
    }

    /// Binds the configured address.
    pub async fn bind(&self) -> Result<TcpListener, ServerError> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        info!(addr = %listener.local_addr()?, "listening");
        Ok(listener)
    }

    /// Binds and serves until cancellation.
    pub async fn run(&self) -> Result<(), ServerError> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }

    /// Serves connections from `listener` until cancellation.
    ///
    /// Every connection is accepted and its request read right away. At
    /// most `max_connections` transfers run at once; further requests wait
    /// for a free slot in arrival order, with no time limit.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), ServerError> {
        loop {
            let (stream, peer) = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                result = listener.accept() => match result {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        error!("accept error: {e}");
                        continue;
                    }
                },
            };

            debug!(%peer, "connection accepted");
            let config = Arc::clone(&self.config);
            let limiter = Arc::clone(&self.limiter);
            let cancel = self.cancel.child_token();
            tokio::spawn(async move {
                match handle_connection(stream, peer, &config, limiter, &cancel).await {
                    Ok(sent) => debug!(%peer, bytes = sent, "connection done"),
                    Err(e) => warn!(%peer, "connection dropped: {e}"),
                }
            });
        }

        info!("dispatcher shutting down");
        Ok(())
    }
}

/// Serves one connection: request, slot, validation, planning, transfer.
async fn handle_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    config: &ServerConfig,
    limiter: Arc<Semaphore>,
    cancel: &CancellationToken,
) -> Result<u64, ServerError> {
    let request = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(ServerError::Cancelled),
        result = read_request(&mut stream, config) => result?,
    };

    if limiter.available_permits() == 0 {
        debug!(%peer, worker = request.worker_index, "all slots busy, request queued");
    }
    let _permit = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(ServerError::Cancelled),
        permit = limiter.acquire_owned() => permit.map_err(|_| ServerError::Cancelled)?,
    };

    let (path, file_size) = resolve_source(&request.file_path, config.file.as_deref()).await?;

    // Planned from the size on disk, never from anything the client sent.
    let plan = request.plan(file_size)?;

    info!(
        %peer,
        worker = request.worker_index,
        workers = request.worker_count,
        offset = plan.offset,
        length = plan.length,
        path = %path.display(),
        "serving range"
    );

    let sent = send_range(
        &mut stream,
        &path,
        &request.file_path,
        plan,
        SendOptions::from(config),
        cancel,
    )
    .await?;

    info!(%peer, worker = request.worker_index, bytes = sent, "range complete");
    Ok(sent)
}

/// Reads the request from the first read on the connection.
async fn read_request(
    stream: &mut TcpStream,
    config: &ServerConfig,
) -> Result<TransferRequest, ServerError> {
    let mut buf = vec![0u8; MAX_REQUEST_LEN];
    let n = tokio::time::timeout(config.request_timeout, stream.read(&mut buf))
        .await
        .map_err(|_| ServerError::Timeout)??;
    if n == 0 {
        return Err(splitfetch_protocol::ProtocolError::InvalidRequest(
            "connection closed before request".into(),
        )
        .into());
    }
    Ok(TransferRequest::parse(&buf[..n])?)
}

/// Checks that `requested` names a servable regular file and returns its
/// path and current size.
async fn resolve_source(
    requested: &str,
    only: Option<&Path>,
) -> Result<(PathBuf, u64), ServerError> {
    let path = PathBuf::from(requested);
    let metadata = match tokio::fs::metadata(&path).await {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ServerError::FileNotFound(path));
        }
        Err(e) => return Err(e.into()),
    };
    if !metadata.is_file() {
        return Err(ServerError::FileNotFound(path));
    }

    if let Some(only) = only {
        let wanted = tokio::fs::canonicalize(only).await?;
        let actual = tokio::fs::canonicalize(&path).await?;
        if wanted != actual {
            return Err(ServerError::Forbidden(path));
        }
    }

    Ok((path, metadata.len()))
}
