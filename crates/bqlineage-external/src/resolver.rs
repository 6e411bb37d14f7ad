//! External table lineage resolution
//!
//! Storage URIs are matched against path specs in order. Each match yields
//! a virtual table identity; every distinct identity becomes one `Copy`
//! upstream. Column lineage is all or nothing: every identity needs a
//! schema, otherwise the record is table level only.

use crate::lookup::{ExternalTable, FetchError, SchemaLookup};
use crate::path_spec::{fallback_identity, CompiledPathSpec};
use crate::storage::StorageSchemes;
use bqlineage_core::{
    urn, ConfigError, Diagnostic, DiagnosticCode, FineGrainedLineage, GcsLineageProviderConfig,
    LineageConfig, LineageReport, LineageType, Schema, Upstream, UpstreamLineageRecord,
};
use futures::future::join_all;
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// Resolves lineage of external tables from their source URIs
#[derive(Debug, Clone)]
pub struct ExternalLineageResolver {
    specs: Vec<CompiledPathSpec>,
    ignore_non_path_spec_path: bool,
    strip_urls: bool,
    schemes: StorageSchemes,
    env: String,
    include_column_lineage: bool,
}

impl ExternalLineageResolver {
    /// Compile the path specs of a provider config
    pub fn new(config: &GcsLineageProviderConfig) -> Result<Self, ConfigError> {
        let specs = config
            .path_specs
            .iter()
            .map(CompiledPathSpec::compile)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            specs,
            ignore_non_path_spec_path: config.ignore_non_path_spec_path,
            strip_urls: config.strip_urls,
            schemes: StorageSchemes::default(),
            env: urn::DEFAULT_ENV.to_string(),
            include_column_lineage: false,
        })
    }

    /// Resolver configured from a lineage config
    pub fn from_config(config: &LineageConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(&config.gcs_lineage_config)?
            .with_env(config.env.clone())
            .with_column_lineage(config.include_column_lineage_with_gcs))
    }

    /// Set the URN environment
    pub fn with_env(mut self, env: impl Into<String>) -> Self {
        self.env = env.into();
        self
    }

    /// Derive column lineage from schema lookups
    pub fn with_column_lineage(mut self, enabled: bool) -> Self {
        self.include_column_lineage = enabled;
        self
    }

    /// Replace the storage scheme registry
    pub fn with_schemes(mut self, schemes: StorageSchemes) -> Self {
        self.schemes = schemes;
        self
    }

    /// Distinct virtual tables read by the URIs, sorted
    pub fn identities(&self, uris: &[String], report: &mut LineageReport) -> Vec<ExternalTable> {
        let mut tables = BTreeSet::new();

        for uri in uris {
            let Some((platform, _)) = self.schemes.classify(uri) else {
                continue;
            };

            if let Some(found) = self.specs.iter().find_map(|spec| spec.matches(uri)) {
                debug!(uri = %uri, table = %found.table, "Matched storage path");
                tables.insert(ExternalTable::new(platform.clone(), found.identity));
                continue;
            }

            if self.ignore_non_path_spec_path {
                report.num_lineage_dropped_gcs_path += 1;
                report.add_sample(
                    Diagnostic::info(
                        DiagnosticCode::StoragePathDropped,
                        "Storage path matches no path spec",
                    )
                    .with_subject(uri.as_str()),
                );
                continue;
            }

            match fallback_identity(uri, self.strip_urls) {
                Some(path) => {
                    warn!(uri = %uri, identity = %path, "Storage path matches no path spec");
                    report.num_lineage_unmatched_gcs_path += 1;
                    report.add_sample(
                        Diagnostic::warn(
                            DiagnosticCode::StoragePathUnmatched,
                            format!("Storage path matches no path spec, kept as {}", path),
                        )
                        .with_subject(uri.as_str()),
                    );
                    tables.insert(ExternalTable::new(platform.clone(), path));
                }
                None => {
                    report.num_lineage_dropped_gcs_path += 1;
                    report.add_sample(
                        Diagnostic::warn(
                            DiagnosticCode::StoragePathDropped,
                            "Storage path has no identity",
                        )
                        .with_subject(uri.as_str()),
                    );
                }
            }
        }

        tables.into_iter().collect()
    }

    /// Lineage record of an external table, `None` if no URI resolves
    pub async fn resolve(
        &self,
        dataset_urn: &str,
        source_uris: &[String],
        lookup: Option<&dyn SchemaLookup>,
        report: &mut LineageReport,
    ) -> Option<UpstreamLineageRecord> {
        if !source_uris.iter().any(|uri| self.schemes.is_storage_uri(uri)) {
            return None;
        }

        let tables = self.identities(source_uris, report);
        if tables.is_empty() {
            return None;
        }

        let upstreams = tables
            .iter()
            .map(|table| Upstream::new(table.urn(&self.env), LineageType::Copy))
            .collect();

        let fine_grained = match lookup {
            Some(lookup) if self.include_column_lineage => {
                self.fine_grained(dataset_urn, &tables, lookup, report).await
            }
            _ => None,
        };

        Some(UpstreamLineageRecord::new(upstreams, fine_grained))
    }

    /// Pass-through column lineage, `None` unless every table has a schema
    async fn fine_grained(
        &self,
        dataset_urn: &str,
        tables: &[ExternalTable],
        lookup: &dyn SchemaLookup,
        report: &mut LineageReport,
    ) -> Option<Vec<FineGrainedLineage>> {
        let results = join_all(tables.iter().map(|table| lookup.fetch_schema(table))).await;

        let mut schemas: Vec<(&ExternalTable, Schema)> = Vec::with_capacity(tables.len());
        let mut complete = true;

        for (table, result) in tables.iter().zip(results) {
            match result {
                Ok(Some(schema)) => schemas.push((table, schema)),
                Ok(None) => {
                    complete = false;
                    report_missing_schema(report, table, None);
                }
                Err(error) => {
                    complete = false;
                    warn!(lookup = lookup.name(), table = %table, error = %error, "Schema lookup failed");
                    report_missing_schema(report, table, Some(&error));
                }
            }
        }

        if !complete {
            return None;
        }

        let lineages = schemas
            .into_iter()
            .flat_map(|(table, schema)| {
                let table_urn = table.urn(&self.env);
                schema
                    .fields
                    .into_iter()
                    .map(move |field| {
                        FineGrainedLineage::new(
                            vec![urn::schema_field(&table_urn, &field.name)],
                            urn::schema_field(dataset_urn, &field.name),
                        )
                    })
            })
            .collect();

        Some(lineages)
    }
}

fn report_missing_schema(report: &mut LineageReport, table: &ExternalTable, error: Option<&FetchError>) {
    report.num_external_tables_missing_schema += 1;

    let diagnostic = match error {
        Some(error) => Diagnostic::warn(
            DiagnosticCode::ExternalSchemaFetchFailed,
            format!("Schema lookup failed: {}", error),
        ),
        None => Diagnostic::warn(DiagnosticCode::ExternalSchemaMissing, "No schema for external dataset"),
    };

    report.add_sample(diagnostic.with_subject(table.to_string()));
}
