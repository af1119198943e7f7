//! Session-scoped gallery state
//!
//! One `GallerySession` lives for the whole process: the loaded catalog, the
//! filter that decides which products are currently rendered, the
//! identifier directory and the image cache shared by archive exports.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::application::export_use_cases::ExportError;
use crate::domain::{IdentifierProvider, Product};
use crate::pipeline::ImageCache;

/// SKU → ASIN lookup, fetched once and then served from memory
pub struct IdentifierDirectory {
    provider: Arc<dyn IdentifierProvider>,
    entries: OnceCell<HashMap<String, String>>,
}

impl IdentifierDirectory {
    pub fn new(provider: Arc<dyn IdentifierProvider>) -> Self {
        Self { provider, entries: OnceCell::new() }
    }

    async fn entries(&self) -> Result<&HashMap<String, String>, ExportError> {
        self.entries
            .get_or_try_init(|| async {
                let entries = self
                    .provider
                    .load_identifiers()
                    .await
                    .map_err(|e| ExportError::IdentifierSource(format!("{e:#}")))?;
                info!("🔑 Identifier directory loaded ({} entries)", entries.len());
                Ok::<_, ExportError>(entries.into_iter().map(|entry| (entry.sku, entry.asin)).collect())
            })
            .await
    }

    /// ASIN of `sku`, or `None` when the map has no entry for it
    pub async fn lookup(&self, sku: &str) -> Result<Option<String>, ExportError> {
        Ok(self.entries().await?.get(sku).cloned())
    }

    pub fn is_loaded(&self) -> bool {
        self.entries.initialized()
    }
}

/// Filter state of the gallery page.
///
/// Search matches case-insensitively against SKU and title; category and
/// listing type must match exactly (ignoring case) when set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GalleryView {
    pub search: Option<String>,
    pub category: Option<String>,
    pub listing_type: Option<String>,
}

impl GalleryView {
    #[must_use]
    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = non_empty(search.into());
        self
    }

    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = non_empty(category.into());
        self
    }

    #[must_use]
    pub fn with_listing_type(mut self, listing_type: impl Into<String>) -> Self {
        self.listing_type = non_empty(listing_type.into());
        self
    }

    pub fn matches(&self, product: &Product) -> bool {
        if let Some(search) = &self.search {
            let needle = search.to_lowercase();
            if !product.sku.to_lowercase().contains(&needle) && !product.title.to_lowercase().contains(&needle) {
                return false;
            }
        }
        field_matches(self.category.as_deref(), product.category.as_deref())
            && field_matches(self.listing_type.as_deref(), product.listing_type.as_deref())
    }
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn field_matches(wanted: Option<&str>, actual: Option<&str>) -> bool {
    match wanted {
        None => true,
        Some(wanted) => actual.is_some_and(|actual| actual.eq_ignore_ascii_case(wanted)),
    }
}

/// Process-wide gallery state passed explicitly into every export
pub struct GallerySession {
    catalog: Vec<Product>,
    view: GalleryView,
    identifiers: IdentifierDirectory,
    image_cache: Arc<ImageCache>,
}

impl GallerySession {
    pub fn new(catalog: Vec<Product>, identifiers: Arc<dyn IdentifierProvider>) -> Self {
        Self {
            catalog,
            view: GalleryView::default(),
            identifiers: IdentifierDirectory::new(identifiers),
            image_cache: Arc::new(ImageCache::new()),
        }
    }

    #[must_use]
    pub fn with_view(mut self, view: GalleryView) -> Self {
        self.view = view;
        self
    }

    pub fn catalog(&self) -> &[Product] {
        &self.catalog
    }

    pub const fn view(&self) -> &GalleryView {
        &self.view
    }

    pub fn set_view(&mut self, view: GalleryView) {
        debug!("Gallery view changed: {:?}", view);
        self.view = view;
    }

    pub fn product(&self, sku: &str) -> Option<&Product> {
        self.catalog.iter().find(|product| product.sku == sku)
    }

    /// Products the current view renders, in catalog order
    pub fn rendered_products(&self) -> Vec<&Product> {
        self.catalog.iter().filter(|product| self.view.matches(product)).collect()
    }

    pub fn is_rendered(&self, sku: &str) -> bool {
        self.product(sku).is_some_and(|product| self.view.matches(product))
    }

    /// Distinct category values, for filter choices
    pub fn categories(&self) -> BTreeSet<&str> {
        self.catalog.iter().filter_map(|product| product.category.as_deref()).collect()
    }

    /// Distinct listing types, for filter choices
    pub fn listing_types(&self) -> BTreeSet<&str> {
        self.catalog.iter().filter_map(|product| product.listing_type.as_deref()).collect()
    }

    pub const fn identifiers(&self) -> &IdentifierDirectory {
        &self.identifiers
    }

    /// ASIN of `sku`; a missing entry is a fatal lookup failure
    pub async fn resolve_identifier(&self, sku: &str) -> Result<String, ExportError> {
        self.identifiers
            .lookup(sku)
            .await?
            .ok_or_else(|| ExportError::MissingIdentifier(sku.to_string()))
    }

    pub fn image_cache(&self) -> Arc<ImageCache> {
        Arc::clone(&self.image_cache)
    }
}
