//! Job tracker (C8): at-most-one-in-progress-per-capture bookkeeping for the
//! long-running ingest and report tasks.
//!
//! The history map has a single writer discipline: the HTTP surface only
//! reads it; starts and in-flight failure notes come from the task itself;
//! completions are finalized by a single background consumer draining a
//! channel, so there is never a race between "task finished" and "task
//! reported failure mid-flight".

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::mpsc;

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct JobHistoryEntry {
    pub begin_ts: i64,
    pub end_ts: Option<i64>,
    pub error: Option<String>,
}

impl JobHistoryEntry {
    pub fn is_complete(&self) -> bool {
        self.end_ts.is_some()
    }
}

/// A job's completion, delivered to the single background consumer.
/// `Shutdown` is the sentinel that ends the consumer loop gracefully.
pub enum JobSignal {
    Completed { capture_id: String, error: Option<String> },
    Shutdown,
}

#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("capture {0} already has an ingest in progress")]
    AlreadyInProgress(String),
}

pub struct JobTracker {
    history: Mutex<HashMap<String, JobHistoryEntry>>,
    tx: mpsc::UnboundedSender<JobSignal>,
}

impl JobTracker {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<JobSignal>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { history: Mutex::new(HashMap::new()), tx }, rx)
    }

    pub fn sender(&self) -> mpsc::UnboundedSender<JobSignal> {
        self.tx.clone()
    }

    /// Rejects a start if an incomplete entry already exists; otherwise
    /// replaces whatever entry was there (including a completed one, so a
    /// fresh load always re-runs).
    pub fn start(&self, capture_id: &str, begin_ts: i64) -> Result<(), JobError> {
        let mut history = self.history.lock().unwrap();
        if let Some(entry) = history.get(capture_id) {
            if !entry.is_complete() {
                return Err(JobError::AlreadyInProgress(capture_id.to_string()));
            }
        }
        history.insert(capture_id.to_string(), JobHistoryEntry { begin_ts, end_ts: None, error: None });
        Ok(())
    }

    /// Records an in-flight error without marking the job complete — it is
    /// still "in progress" for start-rejection purposes until the
    /// completion signal arrives.
    pub fn mark_failure(&self, capture_id: &str, error: String) {
        if let Some(entry) = self.history.lock().unwrap().get_mut(capture_id) {
            entry.error = Some(error);
        }
    }

    fn complete(&self, capture_id: &str, end_ts: i64, error: Option<String>) {
        if let Some(entry) = self.history.lock().unwrap().get_mut(capture_id) {
            entry.end_ts = Some(end_ts);
            if error.is_some() {
                entry.error = error;
            }
        }
    }

    pub fn status(&self, capture_id: &str) -> Option<JobHistoryEntry> {
        self.history.lock().unwrap().get(capture_id).cloned()
    }

    /// Full history dump for the non-production debug introspection route.
    /// Gating on "non-production" is a runtime config check, not a compile-time
    /// one — a release binary still serves this route when `PRODUCTION_MODE` is
    /// unset, so this can't be `#[cfg(debug_assertions)]`.
    pub fn snapshot(&self) -> HashMap<String, JobHistoryEntry> {
        self.history.lock().unwrap().clone()
    }
}

/// The single completion consumer. Runs until a `Shutdown` sentinel is
/// received; do not spawn more than one of these against the same tracker.
pub async fn run_completion_consumer(
    tracker: &JobTracker,
    mut rx: mpsc::UnboundedReceiver<JobSignal>,
    now: impl Fn() -> i64,
) {
    while let Some(signal) = rx.recv().await {
        match signal {
            JobSignal::Completed { capture_id, error } => {
                tracker.complete(&capture_id, now(), error);
            }
            JobSignal::Shutdown => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_concurrent_start_for_same_capture() {
        let (tracker, _rx) = JobTracker::new();
        tracker.start("cap1", 0).unwrap();
        assert!(matches!(tracker.start("cap1", 1), Err(JobError::AlreadyInProgress(_))));
    }

    #[tokio::test]
    async fn start_after_completion_is_accepted() {
        let (tracker, rx) = JobTracker::new();
        tracker.start("cap1", 0).unwrap();
        tracker.sender().send(JobSignal::Completed { capture_id: "cap1".into(), error: None }).unwrap();
        tracker.sender().send(JobSignal::Shutdown).unwrap();
        run_completion_consumer(&tracker, rx, || 1).await;
        assert!(tracker.status("cap1").unwrap().is_complete());
        assert!(tracker.start("cap1", 2).is_ok());
    }
}
