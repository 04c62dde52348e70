use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use splitfetch_protocol::RetryPolicy;
use splitfetch_protocol::constants::{
    BLOCK_SIZE, DEFAULT_PORT, REQUEST_TIMEOUT, SEND_STALL_LIMIT, SEND_TIMEOUT,
};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to listen on (port 0 = OS-assigned).
    pub bind_addr: SocketAddr,
    /// When set, only this file is served; requests naming any other path
    /// are refused. When unset, any existing regular file may be requested.
    pub file: Option<PathBuf>,
    /// Maximum number of transfers served at once. Further requests are
    /// read and then wait for a free slot.
    pub max_connections: usize,
    /// Bytes read from disk and sent per block.
    pub block_size: usize,
    /// Time allowed for the request to arrive after accept.
    pub request_timeout: Duration,
    /// Time allowed for one socket send before it is retried.
    pub send_timeout: Duration,
    /// Retry budget for stalled or would-block sends.
    pub send_retry: RetryPolicy,
    /// Total stalled-send time allowed per connection.
    pub stall_limit: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: ([0, 0, 0, 0], DEFAULT_PORT).into(),
            file: None,
            max_connections: 64,
            block_size: BLOCK_SIZE,
            request_timeout: REQUEST_TIMEOUT,
            send_timeout: SEND_TIMEOUT,
            send_retry: RetryPolicy::send(),
            stall_limit: SEND_STALL_LIMIT,
        }
    }
}

impl ServerConfig {
    /// Default configuration bound to an ephemeral loopback port.
    pub fn loopback() -> Self {
        Self {
            bind_addr: ([127, 0, 0, 1], 0).into(),
            ..Default::default()
        }
    }
}
