//! Integration tests for external table lineage
//!
//! Resolution runs end to end against the in-memory schema lookup, so no
//! catalog credentials are required.
//!
//! ```bash
//! cargo test -p bqlineage-external --test integration_tests
//! ```

mod fixtures;

use bqlineage_core::{DiagnosticCode, LineageReport, LineageType, PathSpec};
use bqlineage_external::{ExternalLineageResolver, FetchError, SchemaLookup};
use fixtures::*;
use pretty_assertions::assert_eq;

fn resolver() -> ExternalLineageResolver {
    ExternalLineageResolver::new(&customer_config())
        .unwrap()
        .with_column_lineage(true)
}

// =============================================================================
// Table Level
// =============================================================================

#[tokio::test]
async fn test_customer_folders_resolve_to_three_upstreams() {
    let mut report = LineageReport::new();
    let record = resolver()
        .resolve(DATASET_URN, &customer_uris(), None, &mut report)
        .await
        .unwrap();

    assert_eq!(
        record.upstream_urns(),
        vec![
            "urn:li:dataset:(urn:li:dataPlatform:gcs,bigquery_data/customer1,PROD)",
            "urn:li:dataset:(urn:li:dataPlatform:gcs,bigquery_data/customer2,PROD)",
            "urn:li:dataset:(urn:li:dataPlatform:gcs,bigquery_data/customer3/my_table,PROD)",
        ]
    );
    assert!(record.upstreams.iter().all(|u| u.lineage_type == LineageType::Copy));
    assert_eq!(record.fine_grained_lineages, None);
}

#[tokio::test]
async fn test_non_storage_uris_yield_nothing() {
    let mut report = LineageReport::new();
    let uris = vec![
        "https://example.com/customer1.csv".to_string(),
        "s3://bucket/customer1/*.parquet".to_string(),
    ];

    let record = resolver().resolve(DATASET_URN, &uris, None, &mut report).await;
    assert!(record.is_none());
}

#[tokio::test]
async fn test_ignored_unmatched_paths_yield_nothing() {
    let config = customer_config().with_ignore_non_path_spec_path(true);
    let resolver = ExternalLineageResolver::new(&config).unwrap();
    let mut report = LineageReport::new();

    let uris = vec!["gs://other_bucket/folder/file.csv".to_string()];
    let record = resolver.resolve(DATASET_URN, &uris, None, &mut report).await;

    assert!(record.is_none());
    assert_eq!(report.num_lineage_dropped_gcs_path, 1);
    assert_eq!(report.samples_for(DiagnosticCode::StoragePathDropped).len(), 1);
}

#[tokio::test]
async fn test_unmatched_paths_are_surfaced() {
    let mut report = LineageReport::new();
    let uris = vec!["gs://other_bucket/folder/file.csv".to_string()];

    let record = resolver().resolve(DATASET_URN, &uris, None, &mut report).await.unwrap();

    assert_eq!(
        record.upstream_urns(),
        vec!["urn:li:dataset:(urn:li:dataPlatform:gcs,other_bucket/folder,PROD)"]
    );
    assert_eq!(report.num_lineage_unmatched_gcs_path, 1);
    assert!(report.has_warnings());
}

#[tokio::test]
async fn test_excluded_paths_fall_through_to_later_specs() {
    let config = bqlineage_core::GcsLineageProviderConfig::new(vec![
        PathSpec::new("gs://bigquery_data/{table}/**")
            .with_exclude(vec!["gs://bigquery_data/customer3/**".to_string()]),
        PathSpec::new("gs://bigquery_data/customer3/{table}/*.parquet"),
    ]);
    let resolver = ExternalLineageResolver::new(&config).unwrap();
    let mut report = LineageReport::new();

    let record = resolver
        .resolve(DATASET_URN, &customer_uris(), None, &mut report)
        .await
        .unwrap();

    assert_eq!(record.upstreams.len(), 3);
    assert!(record.upstream_urns()[2].contains("bigquery_data/customer3/my_table"));
}

// =============================================================================
// Column Level
// =============================================================================

#[tokio::test]
async fn test_schemas_give_pass_through_column_lineage() {
    let lookup = complete_lookup();
    let mut report = LineageReport::new();

    let record = resolver()
        .resolve(DATASET_URN, &customer_uris(), Some(&lookup), &mut report)
        .await
        .unwrap();

    let fine = record.fine_grained_lineages.unwrap();
    assert_eq!(fine.len(), 9);

    assert_eq!(
        fine[0].upstream_field_urns,
        vec!["urn:li:schemaField:(urn:li:dataset:(urn:li:dataPlatform:gcs,bigquery_data/customer1,PROD),age)"]
    );
    assert_eq!(
        fine[0].downstream_field_urn,
        "urn:li:schemaField:(urn:li:dataset:(urn:li:dataPlatform:bigquery,my_project.my_dataset.customers,PROD),age)"
    );
    assert!(fine[8].upstream_field_urns[0].contains("customer3/my_table,PROD),lastname)"));
    assert_eq!(report.num_external_tables_missing_schema, 0);
}

#[tokio::test]
async fn test_one_missing_schema_drops_all_column_lineage() {
    let lookup = complete_lookup();
    let mut uris = customer_uris();
    uris.push("gs://bigquery_data/customer4/*.parquet".to_string());
    let mut report = LineageReport::new();

    let record = resolver()
        .resolve(DATASET_URN, &uris, Some(&lookup), &mut report)
        .await
        .unwrap();

    assert_eq!(record.upstreams.len(), 4);
    assert_eq!(record.fine_grained_lineages, None);
    assert_eq!(report.num_external_tables_missing_schema, 1);
    assert_eq!(report.samples_for(DiagnosticCode::ExternalSchemaMissing).len(), 1);
}

#[tokio::test]
async fn test_lookup_errors_count_as_missing_schemas() {
    let lookup = complete_lookup();
    lookup
        .add_error_for(
            "bigquery_data/customer2",
            FetchError::PermissionDenied("denied".to_string()),
        )
        .await;
    let mut report = LineageReport::new();

    let record = resolver()
        .resolve(DATASET_URN, &customer_uris(), Some(&lookup), &mut report)
        .await
        .unwrap();

    assert_eq!(record.upstreams.len(), 3);
    assert_eq!(record.fine_grained_lineages, None);
    assert_eq!(
        report.samples_for(DiagnosticCode::ExternalSchemaFetchFailed)[0].subject.as_deref(),
        Some("gcs:bigquery_data/customer2")
    );
}

#[tokio::test]
async fn test_column_lineage_disabled_skips_lookup() {
    let lookup = complete_lookup();
    lookup
        .add_error_for("bigquery_data/customer1", FetchError::NetworkError("down".to_string()))
        .await;
    let resolver = ExternalLineageResolver::new(&customer_config()).unwrap();
    let mut report = LineageReport::new();

    let record = resolver
        .resolve(DATASET_URN, &customer_uris(), Some(&lookup), &mut report)
        .await
        .unwrap();

    assert_eq!(record.fine_grained_lineages, None);
    assert_eq!(report.num_external_tables_missing_schema, 0);
}

#[tokio::test]
async fn test_slow_lookups_run_concurrently() {
    let lookup = complete_lookup().with_latency(100);
    assert_eq!(lookup.name(), "Static");
    let mut report = LineageReport::new();

    let start = std::time::Instant::now();
    let record = resolver()
        .resolve(DATASET_URN, &customer_uris(), Some(&lookup), &mut report)
        .await
        .unwrap();

    assert_eq!(record.fine_grained_lineages.map(|f| f.len()), Some(9));
    assert!(start.elapsed() < std::time::Duration::from_millis(290));
}
