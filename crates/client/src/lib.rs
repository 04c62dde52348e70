//! splitfetch client.
//!
//! [`Downloader`] spawns one worker per byte range against a splitfetch
//! server, waits for all of them, then stitches the part files back into
//! the original file with [`reassemble`].

pub mod config;
pub mod error;
pub mod orchestrator;
pub mod progress;
pub mod reassemble;
pub mod store;
pub mod worker;

pub use config::{DownloadConfig, WorkerConfig};
pub use error::{DownloadError, MergeError, WorkerError, WorkerFailure};
pub use orchestrator::{DownloadReport, Downloader};
pub use progress::Progress;
pub use reassemble::{MergeReport, reassemble};
pub use store::{PartStore, base_name};
pub use worker::{WorkerContext, WorkerReport, fetch_part};
