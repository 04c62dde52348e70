//! Per-worker progress events.
//!
//! Events are delivered with `try_send`: a full or closed channel drops
//! them and never slows a worker down.

use tokio::sync::mpsc;

/// Bytes received so far by one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub worker: u32,
    pub received: u64,
    pub total: u64,
}

impl Progress {
    /// Completion percentage (an empty range counts as complete).
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        (u128::from(self.received.min(self.total)) * 100 / u128::from(self.total)) as u8
    }

    pub fn is_complete(&self) -> bool {
        self.received >= self.total
    }
}

/// Sends `progress` if anyone is listening.
pub(crate) fn report(tx: Option<&mpsc::Sender<Progress>>, progress: Progress) {
    if let Some(tx) = tx {
        let _ = tx.try_send(progress);
    }
}
