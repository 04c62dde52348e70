//! Client settings (`client.toml`, see [`splitfetch_settings`]). Every key
//! is optional.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use splitfetch_client::{DownloadConfig, WorkerConfig};
use splitfetch_protocol::RetryPolicy;
use splitfetch_protocol::constants::{
    CONNECT_TIMEOUT, DEFAULT_PORT, RECV_TIMEOUT, SPAWN_STAGGER,
};
use splitfetch_settings::SettingsError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Server port used when the host argument carries none.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Number of parallel workers (ranges).
    #[serde(default = "default_workers")]
    pub workers: u32,

    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Workers connected at once (0 = all).
    #[serde(default)]
    pub max_concurrent: usize,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,

    /// Limit on waiting for the server to start answering (0 = no limit).
    #[serde(default)]
    pub reply_timeout_ms: u64,

    #[serde(default = "default_connect_attempts")]
    pub connect_attempts: u32,

    #[serde(default = "default_connect_retry_delay_ms")]
    pub connect_retry_delay_ms: u64,

    /// Delay between starting consecutive workers.
    #[serde(default = "default_stagger_ms")]
    pub stagger_ms: u64,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_workers() -> u32 {
    DownloadConfig::default().workers
}

fn default_output_dir() -> PathBuf {
    DownloadConfig::default().output_dir
}

fn default_connect_timeout_ms() -> u64 {
    CONNECT_TIMEOUT.as_millis() as u64
}

fn default_read_timeout_ms() -> u64 {
    RECV_TIMEOUT.as_millis() as u64
}

fn default_connect_attempts() -> u32 {
    RetryPolicy::connect().max_attempts
}

fn default_connect_retry_delay_ms() -> u64 {
    RetryPolicy::connect().delay.as_millis() as u64
}

fn default_stagger_ms() -> u64 {
    SPAWN_STAGGER.as_millis() as u64
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            workers: default_workers(),
            output_dir: default_output_dir(),
            max_concurrent: 0,
            connect_timeout_ms: default_connect_timeout_ms(),
            read_timeout_ms: default_read_timeout_ms(),
            reply_timeout_ms: 0,
            connect_attempts: default_connect_attempts(),
            connect_retry_delay_ms: default_connect_retry_delay_ms(),
            stagger_ms: default_stagger_ms(),
        }
    }
}

impl Config {
    /// Loads `path`, or `client.toml` from the default location.
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        splitfetch_settings::load(path, "client.toml")
    }

    pub fn download_config(&self) -> DownloadConfig {
        DownloadConfig {
            workers: self.workers,
            max_concurrent: self.max_concurrent,
            stagger: Duration::from_millis(self.stagger_ms),
            output_dir: self.output_dir.clone(),
            worker: WorkerConfig {
                connect_timeout: Duration::from_millis(self.connect_timeout_ms),
                connect_retry: RetryPolicy::new(
                    self.connect_attempts,
                    Duration::from_millis(self.connect_retry_delay_ms),
                ),
                read_timeout: Duration::from_millis(self.read_timeout_ms),
                reply_timeout: match self.reply_timeout_ms {
                    0 => None,
                    ms => Some(Duration::from_millis(ms)),
                },
                ..WorkerConfig::default()
            },
        }
    }

    /// `host` with the configured port appended unless it already has one.
    ///
    /// IPv6 literals need brackets: `[::1]` or `[::1]:9000`.
    pub fn server_addr(&self, host: &str) -> String {
        let has_port = match host.rsplit_once(':') {
            Some((head, port)) => {
                port.parse::<u16>().is_ok() && (!head.contains(':') || head.ends_with(']'))
            }
            None => false,
        };
        if has_port {
            host.to_string()
        } else {
            format!("{host}:{}", self.port)
        }
    }
}
