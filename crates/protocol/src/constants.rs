use std::time::Duration;

/// TCP port the server listens on unless configured otherwise.
pub const DEFAULT_PORT: u16 = 8000;

/// Size of each block the server reads from disk and sends (8 KiB).
pub const BLOCK_SIZE: usize = 8 * 1024;

/// Size of the client's socket receive buffer (8 KiB).
pub const RECV_BUFFER_SIZE: usize = 8 * 1024;

/// Upper bound on a request; the server reads it in a single read of at
/// most this many bytes.
pub const MAX_REQUEST_LEN: usize = 4096;

/// Upper bound on a header line, delimiter included.
///
/// A peer that sends this many bytes without a `\n` is not speaking the
/// protocol.
pub const MAX_HEADER_LEN: usize = 64 * 1024;

/// Delimiter terminating the header line.
pub const HEADER_TERMINATOR: u8 = b'\n';

/// Time the server waits for a request after accepting a connection.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(3);

/// Time allowed for a single socket send before it counts as transient.
pub const SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Total time one connection may spend in stalled sends before it is dropped.
pub const SEND_STALL_LIMIT: Duration = Duration::from_secs(60);

/// Time allowed for a single socket receive before it is retried.
pub const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// Timeout for one TCP connect attempt.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Delay between worker spawns on the client.
pub const SPAWN_STAGGER: Duration = Duration::from_millis(100);
