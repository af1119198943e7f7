//! # Image Task Definitions
//!
//! One `ImageTask` per product image; the pipeline turns each task into
//! exactly one `TaskOutcome`.

use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::domain::constants::media::{DEFAULT_EXTENSION, KNOWN_IMAGE_TYPES};
use crate::domain::product::{Product, image_label};

/// One image belonging to one product
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageTask {
    pub url: String,
    pub label: String,
    /// SKU of the owning product
    pub owner_key: String,
    /// Position of the image within its product
    pub index: usize,
}

impl ImageTask {
    #[must_use]
    pub fn new(url: impl Into<String>, owner_key: impl Into<String>, index: usize) -> Self {
        Self {
            url: url.into(),
            label: image_label(index),
            owner_key: owner_key.into(),
            index,
        }
    }
}

impl fmt::Display for ImageTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} ({})", self.owner_key, self.label, self.url)
    }
}

/// Builds the task list for a single product, labels assigned by position
#[must_use]
pub fn task_list_for_product(product: &Product) -> Vec<ImageTask> {
    product
        .images
        .iter()
        .enumerate()
        .map(|(index, url)| ImageTask::new(url.clone(), product.sku.clone(), index))
        .collect()
}

/// Builds the task list for every image of every product, in catalog order
#[must_use]
pub fn task_list_for_catalog(products: &[Product]) -> Vec<ImageTask> {
    products.iter().flat_map(task_list_for_product).collect()
}

/// Why a task ended as a failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureReason {
    /// The probe concluded the image does not exist
    Missing,
    TimedOut,
    Http(u16),
    Network(String),
    /// The body was received but is not a decodable image
    Undecodable,
    /// The run was cancelled while the task was pending or in flight
    Aborted,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing => write!(f, "missing"),
            Self::TimedOut => write!(f, "timed out"),
            Self::Http(status) => write!(f, "HTTP {status}"),
            Self::Network(message) => write!(f, "network error: {message}"),
            Self::Undecodable => write!(f, "not a decodable image"),
            Self::Aborted => write!(f, "aborted"),
        }
    }
}

/// Terminal status of a task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    Success,
    Failure(FailureReason),
}

impl TaskStatus {
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// Image content retrieved in archive mode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedImage {
    pub bytes: Bytes,
    pub content_type: Option<String>,
    /// Archive extension including the leading dot
    pub extension: String,
}

impl FetchedImage {
    /// Builds a fetched image, deriving the extension from the declared content type
    #[must_use]
    pub fn new(bytes: Bytes, content_type: Option<String>) -> Self {
        let extension = extension_for_content_type(content_type.as_deref(), DEFAULT_EXTENSION);
        Self { bytes, content_type, extension }
    }

    /// Same as [`FetchedImage::new`] with a caller-chosen fallback extension
    #[must_use]
    pub fn with_default_extension(bytes: Bytes, content_type: Option<String>, default_extension: &str) -> Self {
        let extension = extension_for_content_type(content_type.as_deref(), default_extension);
        Self { bytes, content_type, extension }
    }
}

/// Maps a `Content-Type` header value to an archive extension.
///
/// Parameters such as `; charset=...` are ignored and matching is
/// case-insensitive. Unknown or absent types fall back to `default_extension`.
#[must_use]
pub fn extension_for_content_type(content_type: Option<&str>, default_extension: &str) -> String {
    let essence = content_type
        .and_then(|value| value.split(';').next())
        .map(|value| value.trim().to_ascii_lowercase());

    essence
        .and_then(|essence| {
            KNOWN_IMAGE_TYPES
                .iter()
                .find(|(mime, _)| *mime == essence)
                .map(|(_, extension)| (*extension).to_string())
        })
        .unwrap_or_else(|| default_extension.to_string())
}

/// Outcome of one task, produced exactly once by the pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskOutcome {
    pub task: ImageTask,
    pub status: TaskStatus,
    /// Present only for successful archive-mode fetches
    pub payload: Option<FetchedImage>,
}

impl TaskOutcome {
    #[must_use]
    pub const fn success(task: ImageTask, payload: Option<FetchedImage>) -> Self {
        Self { task, status: TaskStatus::Success, payload }
    }

    #[must_use]
    pub const fn failure(task: ImageTask, reason: FailureReason) -> Self {
        Self { task, status: TaskStatus::Failure(reason), payload: None }
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status.is_success()
    }
}
