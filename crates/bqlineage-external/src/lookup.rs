//! Schema lookup trait for external datasets

use crate::storage::StoragePlatform;
use bqlineage_core::{urn, Schema};
use std::fmt;

/// Identifies a virtual table on an object store
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExternalTable {
    /// Storage platform, e.g. `gcs`
    pub platform: StoragePlatform,

    /// Scheme-less path identity, e.g. `bucket/customer1`
    pub path: String,
}

impl ExternalTable {
    /// Create a new external table identifier
    pub fn new(platform: StoragePlatform, path: impl Into<String>) -> Self {
        Self {
            platform,
            path: path.into(),
        }
    }

    /// Dataset URN on the storage platform
    pub fn urn(&self, env: &str) -> String {
        urn::dataset(self.platform.as_str(), &self.path, env)
    }
}

impl fmt::Display for ExternalTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.platform, self.path)
    }
}

/// Errors that can occur when fetching schemas
#[derive(Debug, Clone, thiserror::Error)]
pub enum FetchError {
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Query failed: {0}")]
    QueryError(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Source of schemas for external datasets
///
/// Lookups may run concurrently, one per resolved identity.
#[async_trait::async_trait]
pub trait SchemaLookup: Send + Sync {
    /// Get the lookup name (e.g., "Static", "Catalog")
    fn name(&self) -> &'static str;

    /// Fetch the schema of an external dataset
    ///
    /// `Ok(None)` means the dataset is known to have no schema yet.
    async fn fetch_schema(&self, table: &ExternalTable) -> Result<Option<Schema>, FetchError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn external_table_urn() {
        let table = ExternalTable::new(StoragePlatform::gcs(), "bigquery_data/customer1");
        assert_eq!(
            table.urn("PROD"),
            "urn:li:dataset:(urn:li:dataPlatform:gcs,bigquery_data/customer1,PROD)"
        );
        assert_eq!(table.to_string(), "gcs:bigquery_data/customer1");
    }
}
