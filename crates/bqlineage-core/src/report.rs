//! Run report (stable v1)
//!
//! Counters and diagnostic samples for one extraction run. Degraded results
//! land here instead of being raised to the caller.

use crate::diagnostic::{Diagnostic, DiagnosticCode, Severity};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Maximum number of diagnostics kept per code
pub const MAX_SAMPLES_PER_CODE: usize = 10;

/// Report schema version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportVersion {
    /// Major version (breaking changes)
    pub major: u32,

    /// Minor version (backward-compatible additions)
    pub minor: u32,
}

impl ReportVersion {
    /// Current report schema version
    pub const CURRENT: ReportVersion = ReportVersion { major: 1, minor: 0 };
}

impl std::fmt::Display for ReportVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Lineage extraction report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineageReport {
    /// Schema version
    pub version: ReportVersion,

    /// Run start (ISO 8601)
    pub started_at: String,

    /// Events seen by the map builder
    pub num_total_lineage_entries: usize,

    /// Events without a destination table
    pub num_skipped_lineage_entries_missing_data: usize,

    /// Events whose destination is filtered out by the dataset pattern
    pub num_skipped_lineage_entries_not_allowed: usize,

    /// Events whose only source was the destination itself
    pub num_skipped_lineage_entries_no_sources: usize,

    /// Events that contributed at least one edge
    pub num_lineage_entries_processed: usize,

    /// Events whose SQL analysis failed and fell back to table level
    pub num_lineage_entries_sql_parser_failure: usize,

    /// Events that produced column-level mappings
    pub num_lineage_entries_with_column_lineage: usize,

    /// Storage paths dropped for matching no path spec
    pub num_lineage_dropped_gcs_path: usize,

    /// Storage paths kept whole for matching no path spec
    pub num_lineage_unmatched_gcs_path: usize,

    /// External datasets without a schema
    pub num_external_tables_missing_schema: usize,

    /// Diagnostic samples grouped by code
    pub samples: BTreeMap<String, Vec<Diagnostic>>,
}

impl LineageReport {
    /// Create a new empty report
    pub fn new() -> Self {
        Self {
            version: ReportVersion::CURRENT,
            started_at: chrono::Utc::now().to_rfc3339(),
            num_total_lineage_entries: 0,
            num_skipped_lineage_entries_missing_data: 0,
            num_skipped_lineage_entries_not_allowed: 0,
            num_skipped_lineage_entries_no_sources: 0,
            num_lineage_entries_processed: 0,
            num_lineage_entries_sql_parser_failure: 0,
            num_lineage_entries_with_column_lineage: 0,
            num_lineage_dropped_gcs_path: 0,
            num_lineage_unmatched_gcs_path: 0,
            num_external_tables_missing_schema: 0,
            samples: BTreeMap::new(),
        }
    }

    /// Keep a diagnostic sample, bounded per code
    pub fn add_sample(&mut self, diagnostic: Diagnostic) {
        let samples = self
            .samples
            .entry(diagnostic.code.as_str().to_string())
            .or_default();

        if samples.len() < MAX_SAMPLES_PER_CODE {
            samples.push(diagnostic);
        }
    }

    /// Samples recorded for a code
    pub fn samples_for(&self, code: DiagnosticCode) -> &[Diagnostic] {
        self.samples
            .get(code.as_str())
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Count an analyzer failure and keep its diagnostic
    pub fn report_sql_parser_failure(&mut self, diagnostic: Diagnostic) {
        self.num_lineage_entries_sql_parser_failure += 1;
        self.add_sample(diagnostic);
    }

    /// Whether any result was degraded
    pub fn has_warnings(&self) -> bool {
        self.samples
            .values()
            .flatten()
            .any(|diagnostic| diagnostic.severity == Severity::Warn)
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Save to file
    pub fn save_to_file(&self, path: &std::path::Path) -> Result<(), std::io::Error> {
        let json = self.to_json().map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }
}

impl Default for LineageReport {
    fn default() -> Self {
        Self::new()
    }
}
