//! splitfetch server.
//!
//! The [`Dispatcher`] accepts connections, reads each worker's request,
//! re-plans the requested range from the file size on disk and streams it
//! back through [`worker::send_range`].

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod worker;

pub use config::ServerConfig;
pub use dispatcher::Dispatcher;
pub use error::ServerError;
