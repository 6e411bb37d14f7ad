//! Lineage map builder
//!
//! Folds a one-shot stream of audit events into a [`LineageMap`]. Each event
//! is inspected once and dropped; memory grows with the number of distinct
//! destinations and edges, not with event volume.

use bqlineage_core::{
    CompiledAllowDeny, ConfigError, LineageConfig, LineageEdge, LineageMap, LineageReport,
    LineageType, QueryEvent, TableReference,
};
use bqlineage_sql::{ColumnLineage, ColumnLineageAnalyzer, SqlAnalyzer};
use std::collections::{BTreeMap, BTreeSet};

/// Builds a lineage map from query events
pub struct LineageMapBuilder {
    analyzer: Box<dyn SqlAnalyzer>,
    extract_column_lineage: bool,
    dataset_pattern: CompiledAllowDeny,
}

impl LineageMapBuilder {
    /// Table-level builder over every destination, with the default analyzer
    pub fn new() -> Self {
        Self {
            analyzer: Box::new(ColumnLineageAnalyzer::new()),
            extract_column_lineage: false,
            dataset_pattern: CompiledAllowDeny::default(),
        }
    }

    /// Builder configured from a lineage config
    pub fn from_config(config: &LineageConfig) -> Result<Self, ConfigError> {
        Ok(Self::new()
            .with_column_lineage(config.extract_column_lineage)
            .with_dataset_pattern(config.dataset_pattern.compile()?))
    }

    /// Replace the SQL analyzer
    pub fn with_analyzer(mut self, analyzer: impl SqlAnalyzer + 'static) -> Self {
        self.analyzer = Box::new(analyzer);
        self
    }

    /// Ask the analyzer for column mappings
    pub fn with_column_lineage(mut self, extract: bool) -> Self {
        self.extract_column_lineage = extract;
        self
    }

    /// Only keep destinations whose `project.dataset.table` passes the pattern
    pub fn with_dataset_pattern(mut self, pattern: CompiledAllowDeny) -> Self {
        self.dataset_pattern = pattern;
        self
    }

    /// Consume the events and return the lineage map
    ///
    /// Never fails: events without a usable destination or sources are
    /// skipped, analyzer failures degrade to table-level edges. Both are
    /// counted in the report.
    pub fn build<I>(&self, events: I, report: &mut LineageReport) -> LineageMap
    where
        I: IntoIterator<Item = QueryEvent>,
    {
        let mut map = LineageMap::new();

        for event in events {
            self.process(event, &mut map, report);
        }

        tracing::debug!(
            destinations = map.len(),
            edges = map.edge_count(),
            events = report.num_total_lineage_entries,
            "Built lineage map"
        );

        map
    }

    fn process(&self, event: QueryEvent, map: &mut LineageMap, report: &mut LineageReport) {
        report.num_total_lineage_entries += 1;

        let Some(destination) = event.destination_table.as_ref().map(TableReference::sanitized) else {
            report.num_skipped_lineage_entries_missing_data += 1;
            tracing::debug!(statement_type = %event.statement_type, "Skipping event without destination");
            return;
        };

        if !self.dataset_pattern.allowed(&destination.to_dotted()) {
            report.num_skipped_lineage_entries_not_allowed += 1;
            tracing::debug!(destination = %destination, "Destination filtered by dataset pattern");
            return;
        }

        let sources = candidate_sources(&event, &destination);
        if sources.is_empty() {
            report.num_skipped_lineage_entries_no_sources += 1;
            tracing::debug!(destination = %destination, "Skipping event without sources");
            return;
        }

        let columns = if self.extract_column_lineage {
            self.column_lineage(&event, &destination, &sources, report)
        } else {
            ColumnLineage::new()
        };

        for (source, lineage_type) in sources {
            let mappings = columns.for_source(&source).cloned().unwrap_or_default();
            let edge = LineageEdge::new(source, event.timestamp, event.actor.clone())
                .with_column_mappings(mappings)
                .with_lineage_type(lineage_type);

            map.insert(&destination, edge);
        }

        report.num_lineage_entries_processed += 1;
    }

    fn column_lineage(
        &self,
        event: &QueryEvent,
        destination: &TableReference,
        sources: &BTreeMap<TableReference, LineageType>,
        report: &mut LineageReport,
    ) -> ColumnLineage {
        let known: BTreeSet<TableReference> = sources.keys().cloned().collect();

        match self.analyzer.analyze(&event.query_text, destination, &known) {
            Ok(columns) => {
                if !columns.is_empty() {
                    report.num_lineage_entries_with_column_lineage += 1;
                }
                columns
            }
            Err(err) => {
                tracing::warn!(
                    destination = %destination,
                    error = %err,
                    "Column lineage failed, falling back to table level"
                );
                report.report_sql_parser_failure(err.to_diagnostic(destination));
                ColumnLineage::new()
            }
        }
    }
}

impl Default for LineageMapBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Sanitized sources of an event, minus the destination itself
///
/// A reference listed both as table and view counts as a view.
fn candidate_sources(
    event: &QueryEvent,
    destination: &TableReference,
) -> BTreeMap<TableReference, LineageType> {
    let tables = event
        .referenced_tables
        .iter()
        .map(|table| (table.sanitized(), LineageType::Transformed));
    let views = event
        .referenced_views
        .iter()
        .map(|view| (view.sanitized(), LineageType::View));

    tables
        .chain(views)
        .filter(|(source, _)| source != destination)
        .collect()
}
