//! Wire protocol for splitfetch parallel downloads.
//!
//! A client opens one TCP connection per worker and sends a
//! [`TransferRequest`]. The server answers with a [`TransferHeader`] line
//! followed by the raw bytes of the worker's [`ChunkPlan`] range.
//!
//! # Wire format
//!
//! ```text
//! REQUEST (client -> server, one read, no terminator):
//!   <worker_index>,<worker_count>,<file_path>
//!
//! HEADER (server -> client):
//!   SIZE:<payload_size>:FILENAME:<file_path>\n
//!
//! PAYLOAD: exactly payload_size raw bytes, then EOF (write half-close)
//! ```
//!
//! There is no checksum or further framing.

pub mod constants;
pub mod error;
pub mod header;
pub mod plan;
pub mod request;
pub mod retry;

pub use error::ProtocolError;
pub use header::TransferHeader;
pub use plan::{ChunkPlan, plan};
pub use request::TransferRequest;
pub use retry::RetryPolicy;
