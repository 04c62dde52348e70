//! Server settings (`server.toml`, see [`splitfetch_settings`]). Every key
//! is optional.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use splitfetch_protocol::constants::{
    BLOCK_SIZE, DEFAULT_PORT, REQUEST_TIMEOUT, SEND_STALL_LIMIT, SEND_TIMEOUT,
};
use splitfetch_server::ServerConfig;
use splitfetch_settings::SettingsError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// TCP port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Only serve this file. Unset = any requested regular file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,

    /// Connections served at once.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Bytes per send block.
    #[serde(default = "default_block_size")]
    pub block_size: usize,

    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,

    /// Total stalled-send time before a connection is dropped.
    #[serde(default = "default_stall_limit_ms")]
    pub stall_limit_ms: u64,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_max_connections() -> usize {
    ServerConfig::default().max_connections
}

fn default_block_size() -> usize {
    BLOCK_SIZE
}

fn default_request_timeout_ms() -> u64 {
    REQUEST_TIMEOUT.as_millis() as u64
}

fn default_send_timeout_ms() -> u64 {
    SEND_TIMEOUT.as_millis() as u64
}

fn default_stall_limit_ms() -> u64 {
    SEND_STALL_LIMIT.as_millis() as u64
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            file: None,
            max_connections: default_max_connections(),
            block_size: default_block_size(),
            request_timeout_ms: default_request_timeout_ms(),
            send_timeout_ms: default_send_timeout_ms(),
            stall_limit_ms: default_stall_limit_ms(),
        }
    }
}

impl Config {
    /// Loads `path`, or `server.toml` from the default location.
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        splitfetch_settings::load(path, "server.toml")
    }

    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            bind_addr: ([0, 0, 0, 0], self.port).into(),
            file: self.file.clone(),
            max_connections: self.max_connections,
            block_size: self.block_size,
            request_timeout: Duration::from_millis(self.request_timeout_ms),
            send_timeout: Duration::from_millis(self.send_timeout_ms),
            stall_limit: Duration::from_millis(self.stall_limit_ms),
            ..ServerConfig::default()
        }
    }
}
