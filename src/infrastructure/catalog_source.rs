//! Catalog and identifier-map sources
//!
//! The catalog (`products.json`) and the SKU → ASIN map may live on disk or
//! behind an http(s) URL. This module also converts spreadsheet exports of
//! the catalog into `products.json`.

use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tokio::fs;
use tokio_util::sync::CancellationToken;
use tracing::info;
use url::Url;

use crate::domain::{IdentifierEntry, IdentifierProvider, Product};
use crate::infrastructure::http_client::HttpClient;

/// Where a JSON document is read from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogSource {
    File(PathBuf),
    Url(Url),
}

impl CatalogSource {
    /// `http://` and `https://` locations are URLs, anything else is a path
    pub fn parse(location: &str) -> Result<Self> {
        let trimmed = location.trim();
        if trimmed.is_empty() {
            bail!("Catalog location is empty");
        }
        if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            let url = Url::parse(trimmed).with_context(|| format!("Invalid catalog URL: {trimmed}"))?;
            return Ok(Self::Url(url));
        }
        Ok(Self::File(PathBuf::from(trimmed)))
    }

    /// Read the raw document text
    pub async fn read_text(&self, http: &HttpClient, cancellation_token: &CancellationToken) -> Result<String> {
        match self {
            Self::File(path) => fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read {}", path.display())),
            Self::Url(url) => http.get_text(url.as_str(), cancellation_token).await,
        }
    }

    async fn load_json<T: DeserializeOwned>(
        &self,
        http: &HttpClient,
        cancellation_token: &CancellationToken,
    ) -> Result<T> {
        let text = self.read_text(http, cancellation_token).await?;
        serde_json::from_str(&text).with_context(|| format!("Failed to parse JSON from {self}"))
    }

    /// Load the product catalog
    pub async fn load_products(
        &self,
        http: &HttpClient,
        cancellation_token: &CancellationToken,
    ) -> Result<Vec<Product>> {
        let products: Vec<Product> = self.load_json(http, cancellation_token).await?;
        info!("📦 Loaded {} products from {}", products.len(), self);
        Ok(products)
    }

    /// Load the SKU → ASIN map
    pub async fn load_identifier_map(
        &self,
        http: &HttpClient,
        cancellation_token: &CancellationToken,
    ) -> Result<Vec<IdentifierEntry>> {
        let entries: Vec<IdentifierEntry> = self.load_json(http, cancellation_token).await?;
        info!("🔑 Loaded {} identifier entries from {}", entries.len(), self);
        Ok(entries)
    }
}

impl fmt::Display for CatalogSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => write!(f, "{}", path.display()),
            Self::Url(url) => write!(f, "{url}"),
        }
    }
}

/// Identifier map read from a [`CatalogSource`] the first time a SKU is resolved
pub struct SourcedIdentifierMap {
    source: CatalogSource,
    http: Arc<HttpClient>,
    cancellation_token: CancellationToken,
}

impl SourcedIdentifierMap {
    pub fn new(source: CatalogSource, http: Arc<HttpClient>, cancellation_token: CancellationToken) -> Self {
        Self { source, http, cancellation_token }
    }
}

#[async_trait]
impl IdentifierProvider for SourcedIdentifierMap {
    async fn load_identifiers(&self) -> Result<Vec<IdentifierEntry>> {
        self.source.load_identifier_map(&self.http, &self.cancellation_token).await
    }
}

/// Parse a catalog spreadsheet export.
///
/// `sku` and `title` columns are required, `category` and `listingType` are
/// optional. Every non-empty cell under a header starting with `image`
/// becomes an image URL, in column order.
pub fn import_products_csv<R: Read>(reader: R) -> Result<Vec<Product>> {
    let mut csv_reader = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
    let headers = csv_reader.headers().context("Failed to read CSV header row")?.clone();

    let column = |name: &str| headers.iter().position(|header| header.trim() == name);
    let sku_column = column("sku").context("CSV is missing the `sku` column")?;
    let title_column = column("title").context("CSV is missing the `title` column")?;
    let category_column = column("category");
    let listing_type_column = column("listingType");
    let image_columns: Vec<usize> = headers
        .iter()
        .enumerate()
        .filter(|(_, header)| header.trim().starts_with("image"))
        .map(|(position, _)| position)
        .collect();

    let mut products = Vec::new();
    for (row, record) in csv_reader.records().enumerate() {
        let record = record.with_context(|| format!("Failed to read CSV row {}", row + 2))?;
        let cell = |position: usize| record.get(position).unwrap_or_default();
        let optional = |position: Option<usize>| {
            position.map(cell).filter(|value| !value.is_empty()).map(str::to_owned)
        };

        let images = image_columns
            .iter()
            .map(|&position| cell(position))
            .filter(|value| !value.is_empty())
            .map(str::to_owned)
            .collect();

        products.push(Product {
            sku: cell(sku_column).to_owned(),
            title: cell(title_column).to_owned(),
            category: optional(category_column),
            listing_type: optional(listing_type_column),
            images,
        });
    }

    Ok(products)
}

/// Convert `products.csv` into `products.json`, returning the number of products written
pub async fn convert_csv_file(input: &Path, output: &Path) -> Result<usize> {
    let raw = fs::read(input)
        .await
        .with_context(|| format!("Failed to read {}", input.display()))?;
    let products = import_products_csv(raw.as_slice())?;

    let json = serde_json::to_string_pretty(&products).context("Failed to serialize products")?;
    fs::write(output, json)
        .await
        .with_context(|| format!("Failed to write {}", output.display()))?;

    info!("✅ Converted {} products from {} to {}", products.len(), input.display(), output.display());
    Ok(products.len())
}
