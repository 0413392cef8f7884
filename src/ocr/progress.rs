use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::watch;

/// Externally visible OCR progress.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
    /// `ceil(completed / total * 100)`, capped at 100
    pub percent: u8,
}

/// `ceil(completed * 100 / total)`, capped at 100. An empty run is complete.
pub fn percent_for(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    let completed = completed.min(total);
    ((completed * 100).div_ceil(total)).min(100) as u8
}

/// Counts resolved cells and publishes progress on a watch channel.
///
/// Published values never go backwards, even if completions are reported
/// from several threads at once.
pub struct ProgressTracker {
    total: AtomicUsize,
    completed: AtomicUsize,
    sender: watch::Sender<Progress>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(Progress::default());
        Self {
            total: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
            sender,
        }
    }

    /// Creates a tracker along with a receiver for its updates.
    pub fn channel() -> (Self, watch::Receiver<Progress>) {
        let tracker = Self::new();
        let receiver = tracker.subscribe();
        (tracker, receiver)
    }

    pub fn subscribe(&self) -> watch::Receiver<Progress> {
        self.sender.subscribe()
    }

    /// Resets the counter for a run of `total` cells.
    pub fn start(&self, total: usize) {
        self.total.store(total, Ordering::SeqCst);
        self.completed.store(0, Ordering::SeqCst);
        let initial = Progress { completed: 0, total, percent: percent_for(0, total) };
        self.sender.send_replace(initial);
    }

    /// Records one resolved cell (success or substituted empty).
    pub fn cell_done(&self) -> Progress {
        let total = self.total.load(Ordering::SeqCst);
        let completed = (self.completed.fetch_add(1, Ordering::SeqCst) + 1).min(total);
        let update = Progress { completed, total, percent: percent_for(completed, total) };

        self.sender.send_if_modified(|current| {
            if update.completed > current.completed {
                *current = update;
                true
            } else {
                false
            }
        });

        update
    }

    pub fn current(&self) -> Progress {
        *self.sender.borrow()
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}
