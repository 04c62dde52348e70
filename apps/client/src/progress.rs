//! Console progress reporting.

use std::collections::HashMap;

use tokio::sync::mpsc;

use splitfetch_client::Progress;

/// Percentage step between two log lines for the same worker.
const STEP: u8 = 10;

/// Logs each worker's progress every [`STEP`] percent until the channel
/// closes, then a summary line.
pub async fn render(mut rx: mpsc::Receiver<Progress>, workers: u32) {
    let mut tracker = Tracker::default();
    while let Some(progress) = rx.recv().await {
        if let Some(percent) = tracker.update(progress) {
            tracing::info!(
                worker = progress.worker,
                received = progress.received,
                total = progress.total,
                "{percent}%"
            );
        }
    }
    tracing::debug!(
        finished = tracker.finished(),
        workers,
        "progress reporting done"
    );
}

/// Last logged percentage per worker.
#[derive(Default)]
struct Tracker {
    logged: HashMap<u32, u8>,
}

impl Tracker {
    /// Returns the percentage to log, if `progress` crossed a new step.
    fn update(&mut self, progress: Progress) -> Option<u8> {
        let percent = progress.percent();
        let step = percent - percent % STEP;
        match self.logged.get(&progress.worker) {
            Some(&last) if last >= step => None,
            _ => {
                self.logged.insert(progress.worker, step);
                Some(step)
            }
        }
    }

    fn finished(&self) -> usize {
        self.logged.values().filter(|&&p| p == 100).count()
    }
}
