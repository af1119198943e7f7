//! Gallery Image Pipeline - product image export and missing-image reporting
//!
//! Takes the image lists of a product catalog and runs bounded-concurrency
//! probes or fetches against every image URL. Results are aggregated either
//! into a ZIP archive for one product or into a CSV report of missing images
//! across the whole catalog.

// Module declarations
pub mod domain;
pub mod pipeline;
pub mod application;
pub mod infrastructure;

pub use application::{ArchiveExportUseCase, ExportError, GallerySession, MissingReportUseCase, ReportOutcome};
pub use pipeline::{PipelineRunner, RunMode, RunOptions};
