//! Data source interfaces the domain depends on

use anyhow::Result;
use async_trait::async_trait;

use crate::domain::product::IdentifierEntry;

/// Supplies the SKU → ASIN map on first use
#[async_trait]
pub trait IdentifierProvider: Send + Sync {
    async fn load_identifiers(&self) -> Result<Vec<IdentifierEntry>>;
}

#[async_trait]
impl IdentifierProvider for Vec<IdentifierEntry> {
    async fn load_identifiers(&self) -> Result<Vec<IdentifierEntry>> {
        Ok(self.clone())
    }
}
