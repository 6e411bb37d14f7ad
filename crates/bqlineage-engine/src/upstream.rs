//! Upstream lineage resolution
//!
//! Turns the edges recorded for one table into the record reported to the
//! catalog: one upstream per distinct source and, when any edge carries
//! column mappings, the deduplicated fine-grained lineage.

use bqlineage_core::{
    urn, FineGrainedLineage, LineageConfig, LineageEdge, LineageMap, LineageType,
    TableReference, Upstream, UpstreamLineageRecord,
};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};

/// Latest observation of one upstream
struct Observed {
    lineage_type: LineageType,
    time: DateTime<Utc>,
    actor: String,
}

/// Resolves upstream lineage records from a lineage map
#[derive(Debug, Clone)]
pub struct UpstreamResolver {
    env: String,
    temp_table_dataset_prefixes: Vec<String>,
}

impl UpstreamResolver {
    /// Resolver for the default environment without temp-table expansion
    pub fn new() -> Self {
        Self {
            env: urn::DEFAULT_ENV.to_string(),
            temp_table_dataset_prefixes: Vec::new(),
        }
    }

    /// Resolver configured from a lineage config
    pub fn from_config(config: &LineageConfig) -> Self {
        Self::new()
            .with_env(config.env.clone())
            .with_temp_table_dataset_prefixes(config.temp_table_dataset_prefixes.clone())
    }

    /// Set the URN environment
    pub fn with_env(mut self, env: impl Into<String>) -> Self {
        self.env = env.into();
        self
    }

    /// Expand upstreams living in datasets with these prefixes
    pub fn with_temp_table_dataset_prefixes(mut self, prefixes: Vec<String>) -> Self {
        self.temp_table_dataset_prefixes = prefixes;
        self
    }

    /// Lineage record of a table, `None` if the map has no edges into it
    pub fn resolve(&self, target: &TableReference, map: &LineageMap) -> Option<UpstreamLineageRecord> {
        let target = target.sanitized();
        let edges = map.get(&target)?;

        let mut upstreams = BTreeMap::new();
        let mut columns = BTreeSet::new();
        let mut visited = BTreeSet::from([target.clone()]);

        for edge in edges {
            if self.is_expandable(edge, map) {
                self.expand_temporary(&edge.source, map, &mut visited, &mut upstreams);
                continue;
            }

            observe(&mut upstreams, edge);
            for mapping in &edge.column_mappings {
                columns.insert((
                    edge.source.clone(),
                    mapping.source_column.clone(),
                    mapping.destination_column.clone(),
                ));
            }
        }

        if upstreams.is_empty() {
            return None;
        }

        let target_urn = urn::bigquery_dataset(&target, &self.env);

        let fine_grained: Vec<FineGrainedLineage> = columns
            .into_iter()
            .map(|(source, source_column, destination_column)| {
                let source_urn = urn::bigquery_dataset(&source, &self.env);
                FineGrainedLineage::new(
                    vec![urn::schema_field(&source_urn, &source_column)],
                    urn::schema_field(&target_urn, &destination_column),
                )
            })
            .collect();

        let upstreams = upstreams
            .into_iter()
            .map(|(source, observed)| {
                Upstream::new(urn::bigquery_dataset(&source, &self.env), observed.lineage_type)
                    .with_audit_stamp(observed.time, observed.actor)
            })
            .collect();

        tracing::debug!(table = %target, "Resolved upstream lineage");

        Some(UpstreamLineageRecord::new(upstreams, Some(fine_grained)))
    }

    fn is_expandable(&self, edge: &LineageEdge, map: &LineageMap) -> bool {
        edge.source.is_temporary(&self.temp_table_dataset_prefixes) && map.contains(&edge.source)
    }

    /// Replace a temporary table by its own upstreams, table level only
    fn expand_temporary(
        &self,
        temporary: &TableReference,
        map: &LineageMap,
        visited: &mut BTreeSet<TableReference>,
        upstreams: &mut BTreeMap<TableReference, Observed>,
    ) {
        if !visited.insert(temporary.clone()) {
            return;
        }

        let Some(edges) = map.get(temporary) else {
            return;
        };

        for edge in edges {
            if self.is_expandable(edge, map) {
                self.expand_temporary(&edge.source, map, visited, upstreams);
            } else if !visited.contains(&edge.source) {
                observe(upstreams, edge);
            }
        }
    }
}

impl Default for UpstreamResolver {
    fn default() -> Self {
        Self::new()
    }
}

/// Record an upstream, keeping its most recent audit stamp
fn observe(upstreams: &mut BTreeMap<TableReference, Observed>, edge: &LineageEdge) {
    let observed = upstreams.entry(edge.source.clone()).or_insert_with(|| Observed {
        lineage_type: edge.lineage_type,
        time: edge.audit_timestamp,
        actor: edge.actor.clone(),
    });

    if edge.audit_timestamp > observed.time {
        observed.time = edge.audit_timestamp;
        observed.actor = edge.actor.clone();
    }
}
