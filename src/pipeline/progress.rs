//! Progress side channel.
//!
//! The runner emits one `ProgressUpdate` per settled task. Sinks must not
//! block; they observe the pipeline and never steer it.

use std::sync::Mutex;

use serde::Serialize;
use tracing::info;

/// Snapshot of a run after one more task settled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProgressUpdate {
    pub processed: usize,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl ProgressUpdate {
    /// Human-readable progress line
    pub fn message(&self) -> String {
        format!("Processed {} of {} images...", self.processed, self.total)
    }

    pub const fn is_complete(&self) -> bool {
        self.processed == self.total
    }
}

pub trait ProgressSink {
    fn on_progress(&self, update: &ProgressUpdate);
}

/// Discards updates
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn on_progress(&self, _update: &ProgressUpdate) {}
}

/// Logs every update at info level
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingProgress;

impl ProgressSink for TracingProgress {
    fn on_progress(&self, update: &ProgressUpdate) {
        info!(
            processed = update.processed,
            total = update.total,
            succeeded = update.succeeded,
            failed = update.failed,
            "📷 {}",
            update.message()
        );
    }
}

/// Keeps every update, mainly for tests and post-run inspection
#[derive(Debug, Default)]
pub struct CollectingProgress {
    updates: Mutex<Vec<ProgressUpdate>>,
}

impl CollectingProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn updates(&self) -> Vec<ProgressUpdate> {
        self.updates.lock().map(|updates| updates.clone()).unwrap_or_default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.updates().iter().map(ProgressUpdate::message).collect()
    }

    pub fn last(&self) -> Option<ProgressUpdate> {
        self.updates().last().copied()
    }
}

impl ProgressSink for CollectingProgress {
    fn on_progress(&self, update: &ProgressUpdate) {
        if let Ok(mut updates) = self.updates.lock() {
            updates.push(*update);
        }
    }
}

impl<F> ProgressSink for F
where
    F: Fn(&ProgressUpdate),
{
    fn on_progress(&self, update: &ProgressUpdate) {
        self(update);
    }
}
