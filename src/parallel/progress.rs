//! Progress tracking for batch runs

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tokio::sync::broadcast;
use tracing::debug;

/// Thread-safe progress tracker shared by every task of a batch.
///
/// Counts are in outputs, not files: a file that fails before rendering
/// counts as failed once per planned size.
pub struct ProgressTracker {
    sender: broadcast::Sender<ProgressUpdate>,
    start_time: Mutex<Option<Instant>>,

    planned: AtomicUsize,
    rendered: AtomicUsize,
    failed: AtomicUsize,
}

/// Point-in-time view of the counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub planned: usize,
    pub rendered: usize,
    pub failed: usize,
    pub elapsed: Duration,
}

impl ProgressSnapshot {
    pub fn finished(&self) -> usize {
        self.rendered + self.failed
    }
}

/// Progress update event
#[derive(Debug, Clone)]
pub enum ProgressUpdate {
    Started {
        profile: String,
        planned: usize,
    },
    OutputRendered {
        path: PathBuf,
    },
    OutputFailed {
        input: String,
        output: Option<PathBuf>,
        error: String,
        /// Outputs this failure accounts for
        count: usize,
    },
    Finished {
        snapshot: ProgressSnapshot,
    },
}

impl ProgressTracker {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1024);

        Self {
            sender,
            start_time: Mutex::new(None),
            planned: AtomicUsize::new(0),
            rendered: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
        }
    }

    /// Reset the counters for a new batch of `planned` outputs
    pub fn start(&self, profile: &str, planned: usize) {
        *self.start_time.lock().unwrap_or_else(|e| e.into_inner()) = Some(Instant::now());
        self.planned.store(planned, Ordering::Relaxed);
        self.rendered.store(0, Ordering::Relaxed);
        self.failed.store(0, Ordering::Relaxed);

        let _ = self.sender.send(ProgressUpdate::Started {
            profile: profile.to_string(),
            planned,
        });
        debug!("Started progress tracking for {} outputs", planned);
    }

    pub fn output_rendered(&self, path: PathBuf) {
        self.rendered.fetch_add(1, Ordering::Relaxed);
        let _ = self.sender.send(ProgressUpdate::OutputRendered { path });
    }

    pub fn output_failed(&self, input: &str, output: Option<PathBuf>, error: String, count: usize) {
        self.failed.fetch_add(count, Ordering::Relaxed);
        let _ = self.sender.send(ProgressUpdate::OutputFailed {
            input: input.to_string(),
            output,
            error,
            count,
        });
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        let start_time = *self.start_time.lock().unwrap_or_else(|e| e.into_inner());
        let elapsed = start_time.map(|start| start.elapsed()).unwrap_or_default();

        ProgressSnapshot {
            planned: self.planned.load(Ordering::Relaxed),
            rendered: self.rendered.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            elapsed,
        }
    }

    /// Publish the final counters; sent whether the batch succeeded or not
    pub fn finish(&self) -> ProgressSnapshot {
        let snapshot = self.snapshot();
        let _ = self.sender.send(ProgressUpdate::Finished { snapshot });
        snapshot
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressUpdate> {
        self.sender.subscribe()
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}
