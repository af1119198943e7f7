//! # Batch Image Fetch Pipeline
//!
//! Bounded-concurrency probes and fetches over a list of image tasks,
//! aggregated into a ZIP archive (archive mode) or a missing-image report
//! (report mode).
//!
//! - `timer`: cancellable deadline shared by every probe
//! - `scheduler`: worker pool with a fixed in-flight bound
//! - `probe`: transport seam, existence probe and content fetch
//! - `aggregator`: order-independent archive and report builders
//! - `progress`: per-task progress side channel
//! - `runner`: wires the above into `PipelineRunner::run`

pub mod aggregator;
pub mod probe;
pub mod progress;
pub mod runner;
pub mod scheduler;
pub mod timer;

pub use aggregator::{ArchiveBuilder, ArtifactError, MissingRecord, MissingReport, OwnerDetails};
pub use probe::{ImageCache, ImageProbe, ImageSource, ProbeError, ProbeTimeouts, RemoteImage, TransportError};
pub use progress::{CollectingProgress, NoopProgress, ProgressSink, ProgressUpdate, TracingProgress};
pub use runner::{AggregateResult, PipelineRun, PipelineRunner, RunMode, RunOptions, RunSummary};
pub use scheduler::{PoolError, PoolReport, WorkerPool};
pub use timer::{Settled, settle_within};
