//! Catalog URN helpers
//!
//! Dataset URNs have the shape
//! `urn:li:dataset:(urn:li:dataPlatform:<platform>,<name>,<env>)` and schema
//! field URNs `urn:li:schemaField:(<dataset urn>,<field path>)`.

use crate::identifier::TableReference;

/// Default environment for dataset URNs
pub const DEFAULT_ENV: &str = "PROD";

/// Platform name for warehouse tables
pub const BIGQUERY_PLATFORM: &str = "bigquery";

/// `urn:li:dataPlatform:<platform>`
pub fn data_platform(platform: &str) -> String {
    format!("urn:li:dataPlatform:{}", platform)
}

/// Dataset URN for a named dataset on a platform
pub fn dataset(platform: &str, name: &str, env: &str) -> String {
    format!("urn:li:dataset:({},{},{})", data_platform(platform), name, env)
}

/// Dataset URN for a warehouse table
pub fn bigquery_dataset(table: &TableReference, env: &str) -> String {
    dataset(BIGQUERY_PLATFORM, &table.to_dotted(), env)
}

/// Schema field URN for a column of a dataset
pub fn schema_field(dataset_urn: &str, field_path: &str) -> String {
    format!("urn:li:schemaField:({},{})", dataset_urn, field_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bigquery_dataset_urn() {
        let table = TableReference::new("my_project", "my_dataset", "my_table");
        assert_eq!(
            bigquery_dataset(&table, DEFAULT_ENV),
            "urn:li:dataset:(urn:li:dataPlatform:bigquery,my_project.my_dataset.my_table,PROD)"
        );
    }

    #[test]
    fn schema_field_urn() {
        let dataset_urn = dataset("gcs", "bigquery_data/customer1", "PROD");
        assert_eq!(
            schema_field(&dataset_urn, "age"),
            "urn:li:schemaField:(urn:li:dataset:(urn:li:dataPlatform:gcs,bigquery_data/customer1,PROD),age)"
        );
    }
}
