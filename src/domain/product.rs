use serde::{Deserialize, Serialize};

use crate::domain::constants::labels::{MAIN_LABEL, PART_PREFIX};

/// Catalog product as stored in `products.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub sku: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(rename = "listingType", default, skip_serializing_if = "Option::is_none")]
    pub listing_type: Option<String>,
    #[serde(default)]
    pub images: Vec<String>,
}

impl Product {
    /// Creates a product without category or listing type
    pub fn new(sku: impl Into<String>, title: impl Into<String>, images: Vec<String>) -> Self {
        Self {
            sku: sku.into(),
            title: title.into(),
            category: None,
            listing_type: None,
            images,
        }
    }

    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    #[must_use]
    pub fn with_listing_type(mut self, listing_type: impl Into<String>) -> Self {
        self.listing_type = Some(listing_type.into());
        self
    }
}

/// One row of the SKU → external identifier map (`asin_map_zip.json`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifierEntry {
    pub sku: String,
    pub asin: String,
}

/// Positional label of an image within its product.
///
/// Index 0 is `MAIN`, every later index is `PT` followed by the index
/// zero-padded to two digits (`PT01`, `PT02`, ..., `PT10`, ...).
#[must_use]
pub fn image_label(index: usize) -> String {
    if index == 0 {
        MAIN_LABEL.to_string()
    } else {
        format!("{PART_PREFIX}{index:02}")
    }
}
