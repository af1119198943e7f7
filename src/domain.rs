//! Domain layer - catalog entities and pipeline value types
//!
//! Nothing in here performs I/O.

pub mod constants;
pub mod image_task;
pub mod product;
pub mod repositories;

pub use image_task::{FailureReason, FetchedImage, ImageTask, TaskOutcome, TaskStatus};
pub use product::{IdentifierEntry, Product, image_label};
pub use repositories::IdentifierProvider;
