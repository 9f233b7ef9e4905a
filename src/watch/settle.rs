//! Debounce inbox events until a file stops changing.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Tracks files and decides when they've "settled" (stopped changing).
pub struct FileSettleTracker {
    /// File path to the time of its last change event.
    pending: HashMap<PathBuf, Instant>,
    settle_duration: Duration,
    settled_tx: mpsc::Sender<PathBuf>,
}

impl FileSettleTracker {
    pub fn new(settle_secs: u64, settled_tx: mpsc::Sender<PathBuf>) -> Self {
        Self {
            pending: HashMap::new(),
            settle_duration: Duration::from_secs(settle_secs),
            settled_tx,
        }
    }

    /// Record a change event; restarts the file's settle window.
    pub fn file_changed(&mut self, path: PathBuf) {
        self.pending.insert(path, Instant::now());
    }

    /// Send every file that has been quiet for the settle window.
    ///
    /// Returns how many files were released.
    pub async fn check_settled(&mut self) -> usize {
        let now = Instant::now();
        let settled: Vec<PathBuf> = self
            .pending
            .iter()
            .filter(|(_, last_change)| now.duration_since(**last_change) >= self.settle_duration)
            .map(|(path, _)| path.clone())
            .collect();

        let mut released = 0;
        for path in settled {
            self.pending.remove(&path);
            if let Err(e) = self.settled_tx.send(path.clone()).await {
                tracing::error!("Failed to send settled file: {}", e);
            } else {
                tracing::info!("File settled: {:?}", path);
                released += 1;
            }
        }
        released
    }

    /// Stop tracking a file (e.g. it was deleted).
    pub fn remove(&mut self, path: &Path) {
        self.pending.remove(path);
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}
