//! Application layer
//!
//! Session state and the two export use cases built on the pipeline.

pub mod export_use_cases;
pub mod session;

pub use export_use_cases::{
    ArchiveArtifact, ArchiveExportUseCase, ExportError, MissingReportUseCase, ReportArtifact, ReportOutcome,
};
pub use crate::domain::IdentifierProvider;
pub use session::{GallerySession, GalleryView, IdentifierDirectory};
