//! # Pipeline Runner
//!
//! `PipelineRunner::run(tasks, options)` is the single entry point of the
//! batch pipeline. It has no knowledge of where tasks came from or where
//! the artifacts go; the application layer owns both.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::{ImageTask, TaskOutcome};
use crate::pipeline::aggregator::{ArchiveBuilder, MissingReport, OwnerDetails};
use crate::pipeline::probe::{ImageProbe, ImageSource};
use crate::pipeline::progress::{ProgressSink, ProgressUpdate};
use crate::pipeline::scheduler::{PoolError, WorkerPool};

/// What the run produces
#[derive(Debug, Clone)]
pub enum RunMode {
    /// Fetch content and bundle successes under `identifier`
    Archive { identifier: String },
    /// Probe existence and record misses per owner
    Report { owners: Arc<HashMap<String, OwnerDetails>> },
}

impl RunMode {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Archive { .. } => "archive",
            Self::Report { .. } => "report",
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub mode: RunMode,
    /// Maximum simultaneously in-flight probes or fetches
    pub concurrency: usize,
    /// Cancelling this token aborts every in-flight and pending task
    pub abort: CancellationToken,
}

impl RunOptions {
    pub fn archive(identifier: impl Into<String>, concurrency: usize) -> Self {
        Self {
            mode: RunMode::Archive { identifier: identifier.into() },
            concurrency,
            abort: CancellationToken::new(),
        }
    }

    pub fn report(owners: Arc<HashMap<String, OwnerDetails>>, concurrency: usize) -> Self {
        Self {
            mode: RunMode::Report { owners },
            concurrency,
            abort: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn with_abort(mut self, abort: CancellationToken) -> Self {
        self.abort = abort;
        self
    }
}

/// Aggregate built while outcomes arrive
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AggregateResult {
    Archive(ArchiveBuilder),
    Report(MissingReport),
}

impl AggregateResult {
    fn for_mode(mode: &RunMode) -> Self {
        match mode {
            RunMode::Archive { identifier } => Self::Archive(ArchiveBuilder::new(identifier.clone())),
            RunMode::Report { owners } => Self::Report(MissingReport::new(Arc::clone(owners))),
        }
    }

    fn record(&mut self, outcome: &TaskOutcome) {
        match self {
            Self::Archive(archive) => {
                archive.record(outcome);
            }
            Self::Report(report) => {
                report.record(outcome);
            }
        }
    }

    pub fn into_archive(self) -> Option<ArchiveBuilder> {
        match self {
            Self::Archive(archive) => Some(archive),
            Self::Report(_) => None,
        }
    }

    pub fn into_report(self) -> Option<MissingReport> {
        match self {
            Self::Report(report) => Some(report),
            Self::Archive(_) => None,
        }
    }
}

/// Final counts of a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub attempted: usize,
    pub succeeded: usize,
    pub skipped: usize,
}

/// Everything a finished run produced
#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub run_id: Uuid,
    pub aggregate: AggregateResult,
    pub summary: RunSummary,
    /// One outcome per task, in task order
    pub outcomes: Vec<TaskOutcome>,
    pub peak_in_flight: usize,
}

/// Runs image tasks through the worker pool and the aggregator
pub struct PipelineRunner<S: ImageSource + ?Sized> {
    probe: ImageProbe<S>,
}

impl<S: ImageSource + ?Sized> PipelineRunner<S> {
    pub const fn new(probe: ImageProbe<S>) -> Self {
        Self { probe }
    }

    pub const fn probe(&self) -> &ImageProbe<S> {
        &self.probe
    }

    /// Executes every task exactly once and aggregates the outcomes.
    ///
    /// Per-task failures never fail the run; the only error is an invalid
    /// concurrency limit, detected before any task starts.
    pub async fn run(
        &self,
        tasks: Vec<ImageTask>,
        options: &RunOptions,
        progress: &dyn ProgressSink,
    ) -> Result<PipelineRun, PoolError> {
        let pool = WorkerPool::new(options.concurrency)?;
        let run_id = Uuid::new_v4();
        let total = tasks.len();
        let fetch_content = matches!(options.mode, RunMode::Archive { .. });
        let abort = options.abort.child_token();

        info!(
            "🚀 Pipeline run {} started: mode={}, tasks={}, concurrency={}",
            run_id,
            options.mode.name(),
            total,
            pool.limit()
        );

        let mut aggregate = AggregateResult::for_mode(&options.mode);
        let mut summary = RunSummary { attempted: total, ..RunSummary::default() };
        let mut processed = 0;

        let probe = &self.probe;
        let abort_ref = &abort;
        let jobs: Vec<_> = tasks
            .into_iter()
            .map(|task| move || execute(probe, task, fetch_content, abort_ref))
            .collect();

        let report = pool
            .run(jobs, |_, outcome: &TaskOutcome| {
                processed += 1;
                if outcome.is_success() {
                    summary.succeeded += 1;
                } else {
                    summary.skipped += 1;
                }
                aggregate.record(outcome);
                progress.on_progress(&ProgressUpdate {
                    processed,
                    total,
                    succeeded: summary.succeeded,
                    failed: summary.skipped,
                });
            })
            .await;

        info!(
            "✅ Pipeline run {} finished: attempted={}, succeeded={}, skipped={}",
            run_id, summary.attempted, summary.succeeded, summary.skipped
        );

        Ok(PipelineRun {
            run_id,
            aggregate,
            summary,
            outcomes: report.outputs,
            peak_in_flight: report.peak_in_flight,
        })
    }
}

async fn execute<S: ImageSource + ?Sized>(
    probe: &ImageProbe<S>,
    task: ImageTask,
    fetch_content: bool,
    abort: &CancellationToken,
) -> TaskOutcome {
    if fetch_content {
        match probe.fetch(&task.url, abort).await {
            Ok(image) => TaskOutcome::success(task, Some(image)),
            Err(error) => {
                warn!("❌ Skipped: {} ({})", task, error);
                TaskOutcome::failure(task, error.into())
            }
        }
    } else {
        match probe.probe(&task.url, abort).await {
            Ok(()) => TaskOutcome::success(task, None),
            Err(reason) => {
                warn!("🔍 Missing image {}: {}", task, reason);
                TaskOutcome::failure(task, reason)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::FailureReason;
    use crate::pipeline::probe::{ProbeTimeouts, RemoteImage, TransportError};
    use crate::pipeline::progress::CollectingProgress;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::collections::HashSet;
    use std::time::Duration;

    /// Serves every URL except the ones listed as broken; `hang` never answers
    struct FakeSource {
        broken: HashSet<String>,
        hang: HashSet<String>,
    }

    #[async_trait]
    impl ImageSource for FakeSource {
        async fn head(&self, url: &str) -> Result<u16, TransportError> {
            if self.hang.contains(url) {
                std::future::pending::<()>().await;
            }
            Ok(if self.broken.contains(url) { 404 } else { 200 })
        }

        async fn get(&self, url: &str) -> Result<RemoteImage, TransportError> {
            if self.hang.contains(url) {
                std::future::pending::<()>().await;
            }
            if self.broken.contains(url) {
                return Err(TransportError::Request("connection refused".into()));
            }
            Ok(RemoteImage {
                status: 200,
                content_type: Some("image/jpeg".into()),
                bytes: Bytes::from(url.to_string()),
            })
        }
    }

    fn runner(broken: &[&str], hang: &[&str]) -> PipelineRunner<FakeSource> {
        let source = FakeSource {
            broken: broken.iter().map(|s| (*s).to_string()).collect(),
            hang: hang.iter().map(|s| (*s).to_string()).collect(),
        };
        PipelineRunner::new(ImageProbe::new(Arc::new(source), ProbeTimeouts::default()))
    }

    fn tasks(owner: &str, count: usize) -> Vec<ImageTask> {
        (0..count)
            .map(|i| ImageTask::new(format!("https://cdn/{owner}/{i}.jpg"), owner, i))
            .collect()
    }

    #[tokio::test]
    async fn test_archive_run_skips_failures() {
        let runner = runner(&["https://cdn/SKU/2.jpg"], &[]);
        let progress = CollectingProgress::new();

        let run = runner
            .run(tasks("SKU", 5), &RunOptions::archive("B0X", 4), &progress)
            .await
            .unwrap();

        assert_eq!(run.summary, RunSummary { attempted: 5, succeeded: 4, skipped: 1 });
        let archive = run.aggregate.into_archive().unwrap();
        assert_eq!(archive.len(), 4);
        assert!(archive.entry("B0X.PT02.jpg").is_none());
        assert_eq!(progress.messages().last().unwrap(), "Processed 5 of 5 images...");
        assert!(run.peak_in_flight <= 4);
    }

    #[tokio::test]
    async fn test_report_run_records_missing_labels() {
        let runner = runner(&["https://cdn/B/1.jpg"], &[]);
        let products = vec![
            crate::domain::Product::new("A", "Alpha", vec![]),
            crate::domain::Product::new("B", "Beta", vec![]),
        ];
        let owners = Arc::new(OwnerDetails::index(&products));
        let mut all = tasks("A", 2);
        all.extend(tasks("B", 2));

        let run = runner
            .run(all, &RunOptions::report(owners, 8), &CollectingProgress::new())
            .await
            .unwrap();

        let report = run.aggregate.into_report().unwrap();
        assert_eq!(report.len(), 1);
        assert_eq!(report.get("B").unwrap().labels(), ["PT01"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_out_task_is_a_failure_not_an_omission() {
        let runner = runner(&[], &["https://cdn/SKU/1.jpg"]);

        let run = runner
            .run(tasks("SKU", 3), &RunOptions::archive("B0", 2), &CollectingProgress::new())
            .await
            .unwrap();

        assert_eq!(run.outcomes.len(), 3);
        assert_eq!(run.outcomes[1].status, crate::domain::TaskStatus::Failure(FailureReason::TimedOut));
        assert_eq!(run.summary.skipped, 1);
    }

    #[tokio::test]
    async fn test_cancelled_run_settles_every_task_as_aborted() {
        let runner = runner(&[], &[]);
        let abort = CancellationToken::new();
        abort.cancel();
        let options = RunOptions::archive("B0", 2).with_abort(abort);
        let progress = CollectingProgress::new();

        let run = runner.run(tasks("SKU", 4), &options, &progress).await.unwrap();

        assert_eq!(run.outcomes.len(), 4);
        assert!(run
            .outcomes
            .iter()
            .all(|o| o.status == crate::domain::TaskStatus::Failure(FailureReason::Aborted)));
        assert_eq!(progress.updates().len(), 4);
    }

    #[tokio::test]
    async fn test_zero_concurrency_fails_before_any_task() {
        let runner = runner(&[], &[]);
        let progress = CollectingProgress::new();
        let result = runner.run(tasks("SKU", 2), &RunOptions::archive("B0", 0), &progress).await;
        assert!(matches!(result, Err(PoolError::ZeroConcurrency)));
        assert!(progress.updates().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_head_probe_timeout_falls_back_then_times_out() {
        let runner = runner(&[], &["https://cdn/SKU/0.jpg"]);
        let owners = Arc::new(HashMap::new());
        let started = tokio::time::Instant::now();

        let run = runner
            .run(tasks("SKU", 1), &RunOptions::report(owners, 1), &CollectingProgress::new())
            .await
            .unwrap();

        let timeouts = runner.probe().timeouts();
        assert!(started.elapsed() >= timeouts.head + timeouts.load - Duration::from_millis(1));
        let report = run.aggregate.into_report().unwrap();
        assert_eq!(report.get("SKU").unwrap().labels(), ["MAIN"]);
    }
}
