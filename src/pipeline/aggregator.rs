//! # Aggregator & Artifact Builder
//!
//! Consumes task outcomes in whatever order they settle. Both builders key
//! their contents by sorted maps, so the serialized artifact only depends on
//! the set of outcomes, never on their arrival order.

use std::collections::{BTreeMap, HashMap};
use std::io::{Cursor, Write};
use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::domain::constants::artifacts::{ARCHIVE_FILE_SUFFIX, LABEL_SEPARATOR, REPORT_HEADER};
use crate::domain::{Product, TaskOutcome};

#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Report error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error while writing artifact: {0}")]
    Io(#[from] std::io::Error),

    #[error("Report is not valid UTF-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),

    #[error("Failed to flush report writer: {0}")]
    Flush(String),
}

/// In-memory archive, filename → content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveBuilder {
    identifier: String,
    entries: BTreeMap<String, Bytes>,
}

impl ArchiveBuilder {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            entries: BTreeMap::new(),
        }
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Adds the payload of a successful outcome as `{identifier}.{label}{extension}`.
    ///
    /// Returns whether an entry was added.
    pub fn record(&mut self, outcome: &TaskOutcome) -> bool {
        let Some(payload) = outcome.payload.as_ref().filter(|_| outcome.is_success()) else {
            return false;
        };

        let name = format!("{}.{}{}", self.identifier, outcome.task.label, payload.extension);
        debug!("Archive entry added: {} ({} bytes)", name, payload.bytes.len());
        self.entries.insert(name, payload.bytes.clone());
        true
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry_names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn entry(&self, name: &str) -> Option<&Bytes> {
        self.entries.get(name)
    }

    /// Download name of the serialized archive
    pub fn file_name(&self) -> String {
        format!("{}{}", self.identifier, ARCHIVE_FILE_SUFFIX)
    }

    /// Serializes the archive to ZIP bytes
    pub fn finish(&self) -> Result<Vec<u8>, ArtifactError> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));

        for (name, bytes) in &self.entries {
            writer.start_file(name.as_str(), entry_options())?;
            writer.write_all(bytes)?;
        }

        let cursor = writer.finish()?;
        Ok(cursor.into_inner())
    }
}

/// Fixed timestamp keeps identical entries producing identical archives
fn entry_options() -> SimpleFileOptions {
    SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(zip::DateTime::default())
}

/// Descriptive fields written next to each missing record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerDetails {
    pub sku: String,
    pub title: String,
    pub category: Option<String>,
    pub listing_type: Option<String>,
}

impl OwnerDetails {
    /// Details known only by SKU
    pub fn bare(sku: impl Into<String>) -> Self {
        Self {
            sku: sku.into(),
            title: String::new(),
            category: None,
            listing_type: None,
        }
    }

    /// Owner lookup table for a catalog, keyed by SKU
    pub fn index(products: &[Product]) -> HashMap<String, Self> {
        products
            .iter()
            .map(|product| (product.sku.clone(), Self::from(product)))
            .collect()
    }
}

impl From<&Product> for OwnerDetails {
    fn from(product: &Product) -> Self {
        Self {
            sku: product.sku.clone(),
            title: product.title.clone(),
            category: product.category.clone(),
            listing_type: product.listing_type.clone(),
        }
    }
}

/// Missing labels of one product, ordered by image position
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingRecord {
    pub details: OwnerDetails,
    labels: BTreeMap<usize, String>,
}

impl MissingRecord {
    fn new(details: OwnerDetails) -> Self {
        Self { details, labels: BTreeMap::new() }
    }

    pub fn labels(&self) -> Vec<&str> {
        self.labels.values().map(String::as_str).collect()
    }

    pub fn joined_labels(&self) -> String {
        self.labels().join(LABEL_SEPARATOR)
    }
}

/// Owner SKU → missing record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingReport {
    owners: Arc<HashMap<String, OwnerDetails>>,
    records: BTreeMap<String, MissingRecord>,
}

impl MissingReport {
    pub fn new(owners: Arc<HashMap<String, OwnerDetails>>) -> Self {
        Self { owners, records: BTreeMap::new() }
    }

    /// Appends the label of a failed outcome to its owner's record, creating
    /// the record on the first miss. Returns whether the outcome was a miss.
    pub fn record(&mut self, outcome: &TaskOutcome) -> bool {
        if outcome.is_success() {
            return false;
        }

        let owner_key = &outcome.task.owner_key;
        let record = self.records.entry(owner_key.clone()).or_insert_with(|| {
            let details = self
                .owners
                .get(owner_key)
                .cloned()
                .unwrap_or_else(|| OwnerDetails::bare(owner_key.clone()));
            MissingRecord::new(details)
        });
        record.labels.insert(outcome.task.index, outcome.task.label.clone());
        true
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of products with at least one missing image
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Total number of missing images across all records
    pub fn missing_image_count(&self) -> usize {
        self.records.values().map(|record| record.labels.len()).sum()
    }

    pub fn get(&self, sku: &str) -> Option<&MissingRecord> {
        self.records.get(sku)
    }

    pub fn records(&self) -> impl Iterator<Item = &MissingRecord> {
        self.records.values()
    }

    /// Serializes one row per product: identifying fields plus joined labels
    pub fn to_csv(&self) -> Result<String, ArtifactError> {
        let mut writer = csv::WriterBuilder::new()
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(Vec::new());

        writer.write_record(REPORT_HEADER)?;
        for record in self.records.values() {
            let details = &record.details;
            writer.write_record([
                details.sku.as_str(),
                details.title.as_str(),
                details.category.as_deref().unwrap_or_default(),
                details.listing_type.as_deref().unwrap_or_default(),
                record.joined_labels().as_str(),
            ])?;
        }

        let bytes = writer
            .into_inner()
            .map_err(|error| ArtifactError::Flush(error.to_string()))?;
        Ok(String::from_utf8(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FailureReason, FetchedImage, ImageTask};
    use proptest::prelude::*;
    use std::io::Read;

    fn success(owner: &str, index: usize, body: &'static [u8], content_type: &str) -> TaskOutcome {
        TaskOutcome::success(
            ImageTask::new(format!("https://cdn/{owner}/{index}"), owner, index),
            Some(FetchedImage::new(Bytes::from_static(body), Some(content_type.to_string()))),
        )
    }

    fn miss(owner: &str, index: usize) -> TaskOutcome {
        TaskOutcome::failure(
            ImageTask::new(format!("https://cdn/{owner}/{index}"), owner, index),
            FailureReason::Missing,
        )
    }

    fn owners() -> Arc<HashMap<String, OwnerDetails>> {
        let products = vec![
            Product::new("SKU-1", "Widget", vec![]).with_category("Tools").with_listing_type("FBA"),
            Product::new("SKU-2", "Widget \"Pro\"", vec![]),
        ];
        Arc::new(OwnerDetails::index(&products))
    }

    #[test]
    fn test_archive_entry_names() {
        let mut archive = ArchiveBuilder::new("B00TEST");
        assert!(archive.record(&success("SKU-1", 0, b"main", "image/jpeg")));
        assert!(archive.record(&success("SKU-1", 1, b"part", "image/png")));
        assert!(!archive.record(&miss("SKU-1", 2)));

        let names: Vec<_> = archive.entry_names().collect();
        assert_eq!(names, ["B00TEST.MAIN.jpg", "B00TEST.PT01.png"]);
        assert_eq!(archive.file_name(), "B00TEST_images.zip");
    }

    #[test]
    fn test_archive_finish_produces_readable_zip() {
        let mut archive = ArchiveBuilder::new("B00TEST");
        archive.record(&success("SKU-1", 0, b"first image", "image/jpeg"));
        archive.record(&success("SKU-1", 3, b"fourth image", "image/webp"));

        let bytes = archive.finish().unwrap();
        let mut zip = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(zip.len(), 2);

        let mut content = String::new();
        zip.by_name("B00TEST.PT03.webp").unwrap().read_to_string(&mut content).unwrap();
        assert_eq!(content, "fourth image");
    }

    #[test]
    fn test_empty_archive_still_serializes() {
        let archive = ArchiveBuilder::new("B00EMPTY");
        let bytes = archive.finish().unwrap();
        let zip = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(zip.len(), 0);
    }

    #[test]
    fn test_report_groups_labels_by_owner_in_position_order() {
        let mut report = MissingReport::new(owners());
        report.record(&miss("SKU-1", 2));
        report.record(&miss("SKU-1", 0));
        assert!(!report.record(&success("SKU-1", 1, b"ok", "image/jpeg")));

        let record = report.get("SKU-1").unwrap();
        assert_eq!(record.labels(), ["MAIN", "PT02"]);
        assert_eq!(report.len(), 1);
        assert_eq!(report.missing_image_count(), 2);
    }

    #[test]
    fn test_report_csv_layout() {
        let mut report = MissingReport::new(owners());
        report.record(&miss("SKU-1", 1));
        report.record(&miss("SKU-1", 2));

        let csv = report.to_csv().unwrap();
        let lines: Vec<_> = csv.lines().collect();
        assert_eq!(lines[0], "sku,title,category,listingType,missingImageLabels");
        assert_eq!(lines[1], "SKU-1,Widget,Tools,FBA,\"PT01,PT02\"");
        assert_eq!(lines.len(), 2);
    }

    #[test]
    fn test_report_csv_escapes_quotes() {
        let mut report = MissingReport::new(owners());
        report.record(&miss("SKU-2", 1));

        let csv = report.to_csv().unwrap();
        assert_eq!(csv.lines().nth(1).unwrap(), "SKU-2,\"Widget \"\"Pro\"\"\",,,PT01");
    }

    #[test]
    fn test_report_unknown_owner_uses_bare_details() {
        let mut report = MissingReport::new(Arc::new(HashMap::new()));
        report.record(&miss("GHOST", 0));
        assert_eq!(report.get("GHOST").unwrap().details, OwnerDetails::bare("GHOST"));
    }

    fn mixed_outcomes() -> Vec<TaskOutcome> {
        vec![
            success("SKU-1", 0, b"a", "image/jpeg"),
            miss("SKU-1", 1),
            success("SKU-1", 2, b"c", "image/png"),
            miss("SKU-2", 0),
            miss("SKU-2", 3),
            success("SKU-2", 1, b"d", "image/gif"),
            miss("SKU-3", 0),
        ]
    }

    proptest! {
        #[test]
        fn prop_aggregation_is_order_independent(shuffled in Just(mixed_outcomes()).prop_shuffle()) {
            let mut expected_archive = ArchiveBuilder::new("B0");
            let mut expected_report = MissingReport::new(owners());
            for outcome in &mixed_outcomes() {
                expected_archive.record(outcome);
                expected_report.record(outcome);
            }

            let mut archive = ArchiveBuilder::new("B0");
            let mut report = MissingReport::new(owners());
            for outcome in &shuffled {
                archive.record(outcome);
                report.record(outcome);
            }

            prop_assert_eq!(archive.finish().unwrap(), expected_archive.finish().unwrap());
            prop_assert_eq!(report.to_csv().unwrap(), expected_report.to_csv().unwrap());
        }
    }
}
