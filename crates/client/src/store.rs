//! Output directory holding part files and the merged file.

use std::path::{Path, PathBuf};

use tokio::sync::Mutex;
use tracing::debug;

/// Output directory shared by all workers of one download.
///
/// Part files are owned by exactly one worker each and need no locking.
/// Only creating the directory is serialized, so sibling workers racing on
/// a first run do not trip over each other.
#[derive(Debug)]
pub struct PartStore {
    dir: PathBuf,
    create_lock: Mutex<()>,
}

impl PartStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            create_lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `<dir>/<base>.part<index>`
    pub fn part_path(&self, base: &str, index: u32) -> PathBuf {
        self.dir.join(format!("{base}.part{index}"))
    }

    /// `<dir>/<base>`
    pub fn final_path(&self, base: &str) -> PathBuf {
        self.dir.join(base)
    }

    /// Creates the output directory if it does not exist yet.
    pub async fn ensure_dir(&self) -> std::io::Result<()> {
        let _guard = self.create_lock.lock().await;
        if !tokio::fs::try_exists(&self.dir).await? {
            tokio::fs::create_dir_all(&self.dir).await?;
            debug!(dir = %self.dir.display(), "output directory created");
        }
        Ok(())
    }
}

/// Last component of a `/` or `\` separated path.
///
/// Returns `None` for paths that have no usable file name (empty, ending in
/// a separator, `.` or `..`).
pub fn base_name(path: &str) -> Option<&str> {
    let name = path.rsplit(['/', '\\']).next()?;
    match name {
        "" | "." | ".." => None,
        name => Some(name),
    }
}
