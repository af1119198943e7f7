//! Archive export and missing-image report use cases
//!
//! Both check their preconditions against the session, hand a task list to
//! the pipeline and turn the aggregate into a downloadable artifact.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::application::session::GallerySession;
use crate::domain::constants::artifacts::REPORT_FILE_NAME;
use crate::domain::image_task::{task_list_for_catalog, task_list_for_product};
use crate::infrastructure::config::PipelineConfig;
use crate::pipeline::{
    AggregateResult, ArtifactError, ImageProbe, ImageSource, OwnerDetails, PipelineRunner, PoolError, ProgressSink,
    RunOptions, RunSummary,
};

/// Fatal failures of one export invocation
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("No identifier found for SKU: {0}")]
    MissingIdentifier(String),

    #[error("Product {0} is not currently displayed")]
    ProductNotRendered(String),

    #[error("Unknown product: {0}")]
    UnknownProduct(String),

    #[error("Failed to load identifier map: {0}")]
    IdentifierSource(String),

    #[error("Invalid pipeline settings: {0}")]
    Pool(#[from] PoolError),

    #[error("Pipeline produced a {0} aggregate for this export")]
    UnexpectedAggregate(&'static str),

    #[error("Failed to build artifact: {0}")]
    Serialization(#[from] ArtifactError),
}

/// Serialized ZIP of one product's images
#[derive(Debug, Clone)]
pub struct ArchiveArtifact {
    pub run_id: Uuid,
    pub sku: String,
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub entry_names: Vec<String>,
    pub summary: RunSummary,
}

/// Serialized missing-image report
#[derive(Debug, Clone)]
pub struct ReportArtifact {
    pub run_id: Uuid,
    pub file_name: String,
    pub csv: String,
    /// Products with at least one missing image
    pub product_count: usize,
    pub missing_image_count: usize,
    pub summary: RunSummary,
}

#[derive(Debug, Clone)]
pub enum ReportOutcome {
    /// Every image in the catalog was reachable; no file is produced
    NothingMissing { summary: RunSummary },
    Report(ReportArtifact),
}

async fn write_artifact(dir: &Path, file_name: &str, contents: &[u8]) -> anyhow::Result<PathBuf> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("Failed to create output directory {}", dir.display()))?;
    let path = dir.join(file_name);
    tokio::fs::write(&path, contents)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}

impl ArchiveArtifact {
    pub async fn write_to(&self, dir: &Path) -> anyhow::Result<PathBuf> {
        write_artifact(dir, &self.file_name, &self.bytes).await
    }
}

impl ReportArtifact {
    pub async fn write_to(&self, dir: &Path) -> anyhow::Result<PathBuf> {
        write_artifact(dir, &self.file_name, self.csv.as_bytes()).await
    }
}

fn build_probe<S: ImageSource + ?Sized>(
    source: &Arc<S>,
    config: &PipelineConfig,
    session: &GallerySession,
) -> ImageProbe<S> {
    let probe = ImageProbe::new(Arc::clone(source), config.timeouts())
        .with_default_extension(config.default_extension.clone());
    if config.reuse_cached_images {
        probe.with_cache(session.image_cache())
    } else {
        probe
    }
}

/// Bundles one product's reachable images into `{asin}_images.zip`
pub struct ArchiveExportUseCase<S: ImageSource + ?Sized> {
    source: Arc<S>,
    config: PipelineConfig,
}

impl<S: ImageSource + ?Sized> ArchiveExportUseCase<S> {
    pub fn new(source: Arc<S>, config: PipelineConfig) -> Self {
        Self { source, config }
    }

    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.config.archive_concurrency = concurrency;
        self
    }

    pub async fn execute(
        &self,
        session: &GallerySession,
        sku: &str,
        abort: &CancellationToken,
        progress: &dyn ProgressSink,
    ) -> Result<ArchiveArtifact, ExportError> {
        let asin = session.resolve_identifier(sku).await?;
        let product = session
            .product(sku)
            .ok_or_else(|| ExportError::UnknownProduct(sku.to_string()))?;
        if !session.is_rendered(sku) {
            return Err(ExportError::ProductNotRendered(sku.to_string()));
        }

        let tasks = task_list_for_product(product);
        info!("📦 Exporting {} images of {} as {}", tasks.len(), sku, asin);

        let runner = PipelineRunner::new(build_probe(&self.source, &self.config, session));
        let options = RunOptions::archive(asin, self.config.archive_concurrency).with_abort(abort.clone());
        let run = runner.run(tasks, &options, progress).await?;

        let archive = match run.aggregate {
            AggregateResult::Archive(archive) => archive,
            AggregateResult::Report(_) => return Err(ExportError::UnexpectedAggregate("report")),
        };
        if archive.is_empty() {
            warn!("⚠️  No images of {} could be fetched, archive is empty", sku);
        }
        if self.config.reuse_cached_images {
            debug!("🗂️ Image cache holds {} images", session.image_cache().len().await);
        }

        let bytes = archive.finish()?;
        Ok(ArchiveArtifact {
            run_id: run.run_id,
            sku: sku.to_string(),
            file_name: archive.file_name(),
            entry_names: archive.entry_names().map(str::to_owned).collect(),
            bytes,
            summary: run.summary,
        })
    }
}

/// Probes every catalog image and reports the unreachable ones per product
pub struct MissingReportUseCase<S: ImageSource + ?Sized> {
    source: Arc<S>,
    config: PipelineConfig,
}

impl<S: ImageSource + ?Sized> MissingReportUseCase<S> {
    pub fn new(source: Arc<S>, config: PipelineConfig) -> Self {
        Self { source, config }
    }

    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.config.report_concurrency = concurrency;
        self
    }

    pub async fn execute(
        &self,
        session: &GallerySession,
        abort: &CancellationToken,
        progress: &dyn ProgressSink,
    ) -> Result<ReportOutcome, ExportError> {
        let catalog = session.catalog();
        let tasks = task_list_for_catalog(catalog);
        let owners: Arc<HashMap<String, OwnerDetails>> = Arc::new(OwnerDetails::index(catalog));
        info!("🔍 Checking {} images across {} products", tasks.len(), catalog.len());

        let runner = PipelineRunner::new(build_probe(&self.source, &self.config, session));
        let options = RunOptions::report(owners, self.config.report_concurrency).with_abort(abort.clone());
        let run = runner.run(tasks, &options, progress).await?;

        let report = match run.aggregate {
            AggregateResult::Report(report) => report,
            AggregateResult::Archive(_) => return Err(ExportError::UnexpectedAggregate("archive")),
        };

        if report.is_empty() {
            info!("✅ No missing images found");
            return Ok(ReportOutcome::NothingMissing { summary: run.summary });
        }

        let csv = report.to_csv()?;
        info!(
            "📝 {} missing images across {} products",
            report.missing_image_count(),
            report.len()
        );
        Ok(ReportOutcome::Report(ReportArtifact {
            run_id: run.run_id,
            file_name: REPORT_FILE_NAME.to_string(),
            csv,
            product_count: report.len(),
            missing_image_count: report.missing_image_count(),
            summary: run.summary,
        }))
    }
}
