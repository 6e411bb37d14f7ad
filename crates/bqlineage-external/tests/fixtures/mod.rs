//! Test fixtures for external lineage integration tests
//!
//! Object-storage layouts with one folder per customer, plus a nested
//! folder holding a table of its own.

use bqlineage_core::{GcsLineageProviderConfig, PathSpec, Schema};
use bqlineage_external::{StaticSchemaLookup, StaticSchemaLookupBuilder};

/// Destination external table
pub const DATASET_URN: &str =
    "urn:li:dataset:(urn:li:dataPlatform:bigquery,my_project.my_dataset.customers,PROD)";

/// Source URIs of the customers table
pub fn customer_uris() -> Vec<String> {
    vec![
        "gs://bigquery_data/customer1/*.parquet".to_string(),
        "gs://bigquery_data/customer2/*.parquet".to_string(),
        "gs://bigquery_data/customer3/my_table/*.parquet".to_string(),
    ]
}

/// One spec per folder depth
pub fn customer_config() -> GcsLineageProviderConfig {
    GcsLineageProviderConfig::new(vec![
        PathSpec::new("gs://bigquery_data/{table}/*.parquet"),
        PathSpec::new("gs://bigquery_data/customer3/{table}/*.parquet"),
    ])
}

/// Shared customer columns
pub fn customer_schema() -> Schema {
    Schema::from_names(["age", "firstname", "lastname"])
}

/// Lookup knowing every customer table
pub fn complete_lookup() -> StaticSchemaLookup {
    StaticSchemaLookupBuilder::new()
        .with_schema("bigquery_data/customer1", customer_schema())
        .with_schema("bigquery_data/customer2", customer_schema())
        .with_schema("bigquery_data/customer3/my_table", customer_schema())
        .build()
}
