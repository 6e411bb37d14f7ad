//! In-memory schema lookup
//!
//! Returns predefined schemas keyed by external table path. Useful for:
//! - Feeding schemas exported from a catalog as a JSON file
//! - Testing external lineage without a catalog
//! - Simulating lookup failures and latency
//!
//! ## Usage
//!
//! ```rust,ignore
//! use bqlineage_core::Schema;
//! use bqlineage_external::{StaticSchemaLookup, SchemaLookup, ExternalTable, StoragePlatform};
//!
//! let lookup = StaticSchemaLookup::new();
//! lookup.add_schema("bucket/customer1", Schema::from_names(["age", "name"])).await;
//!
//! let table = ExternalTable::new(StoragePlatform::gcs(), "bucket/customer1");
//! let schema = lookup.fetch_schema(&table).await?;
//! ```
//!
//! ## Schema files
//!
//! `from_json_file` reads an object keyed by path. Each value is either a
//! list of field names or a full schema:
//!
//! ```json
//! {
//!   "bucket/customer1": ["age", "firstname", "lastname"],
//!   "bucket/customer2": {"fields": [{"name": "age", "native_type": "INT64"}]}
//! }
//! ```

use crate::lookup::{ExternalTable, FetchError, SchemaLookup};
use bqlineage_core::Schema;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;

/// One entry of a schema file
#[derive(Deserialize)]
#[serde(untagged)]
enum SchemaEntry {
    Names(Vec<String>),
    Schema(Schema),
}

impl From<SchemaEntry> for Schema {
    fn from(entry: SchemaEntry) -> Self {
        match entry {
            SchemaEntry::Names(names) => Schema::from_names(names),
            SchemaEntry::Schema(schema) => schema,
        }
    }
}

/// In-memory schema lookup
///
/// Thread-safe and cheap to clone; clones share the same schemas.
pub struct StaticSchemaLookup {
    /// Predefined schemas by path
    schemas: Arc<RwLock<HashMap<String, Schema>>>,

    /// Errors to return for specific paths
    errors: Arc<RwLock<HashMap<String, FetchError>>>,

    /// Simulate lookup latency (milliseconds)
    latency_ms: u64,
}

impl StaticSchemaLookup {
    /// Create a lookup with no schemas
    pub fn new() -> Self {
        Self::from_schemas(HashMap::new())
    }

    /// Create a lookup from a pre-built map of schemas
    pub fn from_schemas(schemas: HashMap<String, Schema>) -> Self {
        Self {
            schemas: Arc::new(RwLock::new(schemas)),
            errors: Arc::new(RwLock::new(HashMap::new())),
            latency_ms: 0,
        }
    }

    /// Parse a schema file's contents
    pub fn from_json(json: &str) -> Result<Self, FetchError> {
        let entries: HashMap<String, SchemaEntry> = serde_json::from_str(json)
            .map_err(|e| FetchError::InvalidResponse(format!("Invalid schema file: {}", e)))?;

        Ok(Self::from_schemas(
            entries.into_iter().map(|(path, entry)| (path, entry.into())).collect(),
        ))
    }

    /// Load a schema file
    pub fn from_json_file(path: &Path) -> Result<Self, FetchError> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            FetchError::ConfigError(format!("Failed to read {}: {}", path.display(), e))
        })?;

        Self::from_json(&json)
    }

    /// Add a schema for a path
    pub async fn add_schema(&self, path: impl Into<String>, schema: Schema) {
        self.schemas.write().await.insert(path.into(), schema);
    }

    /// Configure an error to be returned for a specific path
    pub async fn add_error_for(&self, path: impl Into<String>, error: FetchError) {
        self.errors.write().await.insert(path.into(), error);
    }

    /// Configure simulated latency for every lookup
    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    /// Get the number of schemas stored
    pub async fn schema_count(&self) -> usize {
        self.schemas.read().await.len()
    }

    /// Check if a schema exists for a path
    pub async fn has_schema(&self, path: &str) -> bool {
        self.schemas.read().await.contains_key(path)
    }

    async fn simulate_latency(&self) {
        if self.latency_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.latency_ms)).await;
        }
    }
}

impl Default for StaticSchemaLookup {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for StaticSchemaLookup {
    fn clone(&self) -> Self {
        Self {
            schemas: Arc::clone(&self.schemas),
            errors: Arc::clone(&self.errors),
            latency_ms: self.latency_ms,
        }
    }
}

#[async_trait::async_trait]
impl SchemaLookup for StaticSchemaLookup {
    fn name(&self) -> &'static str {
        "Static"
    }

    async fn fetch_schema(&self, table: &ExternalTable) -> Result<Option<Schema>, FetchError> {
        self.simulate_latency().await;

        if let Some(error) = self.errors.read().await.get(&table.path) {
            return Err(error.clone());
        }

        Ok(self.schemas.read().await.get(&table.path).cloned())
    }
}

/// Builder for a [`StaticSchemaLookup`] with several schemas
///
/// ```rust,ignore
/// let lookup = StaticSchemaLookupBuilder::new()
///     .with_schema("bucket/customer1", Schema::from_names(["age", "name"]))
///     .with_error("bucket/locked", FetchError::PermissionDenied("denied".into()))
///     .with_latency(50)
///     .build();
/// ```
pub struct StaticSchemaLookupBuilder {
    schemas: HashMap<String, Schema>,
    errors: HashMap<String, FetchError>,
    latency_ms: u64,
}

impl StaticSchemaLookupBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self {
            schemas: HashMap::new(),
            errors: HashMap::new(),
            latency_ms: 0,
        }
    }

    /// Add a schema for a path
    pub fn with_schema(mut self, path: impl Into<String>, schema: Schema) -> Self {
        self.schemas.insert(path.into(), schema);
        self
    }

    /// Add an error for a path
    pub fn with_error(mut self, path: impl Into<String>, error: FetchError) -> Self {
        self.errors.insert(path.into(), error);
        self
    }

    /// Configure latency
    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    /// Build the lookup
    pub fn build(self) -> StaticSchemaLookup {
        StaticSchemaLookup {
            schemas: Arc::new(RwLock::new(self.schemas)),
            errors: Arc::new(RwLock::new(self.errors)),
            latency_ms: self.latency_ms,
        }
    }
}

impl Default for StaticSchemaLookupBuilder {
    fn default() -> Self {
        Self::new()
    }
}
