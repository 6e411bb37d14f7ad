//! Lineage edges and the per-run lineage map
//!
//! An edge is a value: two edges into the same destination are the same edge
//! when their source and column mappings match. The audit timestamp and actor
//! ride along and are advanced on re-observation, so the map grows with the
//! number of distinct dependencies rather than with event volume.

use crate::identifier::TableReference;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use std::hash::{Hash, Hasher};

/// One source column feeding one destination column
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ColumnMapping {
    /// Column on the edge's source table
    pub source_column: String,

    /// Column on the destination table
    pub destination_column: String,
}

impl ColumnMapping {
    pub fn new(source_column: impl Into<String>, destination_column: impl Into<String>) -> Self {
        Self {
            source_column: source_column.into(),
            destination_column: destination_column.into(),
        }
    }
}

/// How the destination was derived from the source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LineageType {
    /// Written by a query reading the source as a base table
    Transformed,

    /// Written by a query reading the source as a view
    View,

    /// Verbatim copy, e.g. an external table over object storage
    Copy,
}

/// One observed `source -> destination` dependency
///
/// The destination is implied by the [`LineageMap`] key the edge lives under.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineageEdge {
    /// Table read
    pub source: TableReference,

    /// Most recent observation of this dependency
    pub audit_timestamp: DateTime<Utc>,

    /// Actor of the most recent observation
    pub actor: String,

    /// Column-level mappings, empty for table-level edges
    #[serde(default)]
    pub column_mappings: BTreeSet<ColumnMapping>,

    /// Base table or view read
    pub lineage_type: LineageType,
}

impl LineageEdge {
    /// Create a table-level edge
    pub fn new(source: TableReference, audit_timestamp: DateTime<Utc>, actor: impl Into<String>) -> Self {
        Self {
            source,
            audit_timestamp,
            actor: actor.into(),
            column_mappings: BTreeSet::new(),
            lineage_type: LineageType::Transformed,
        }
    }

    /// Set column mappings
    pub fn with_column_mappings(mut self, mappings: impl IntoIterator<Item = ColumnMapping>) -> Self {
        self.column_mappings = mappings.into_iter().collect();
        self
    }

    /// Set the lineage type
    pub fn with_lineage_type(mut self, lineage_type: LineageType) -> Self {
        self.lineage_type = lineage_type;
        self
    }

    /// Whether this edge carries column-level lineage
    pub fn has_column_mappings(&self) -> bool {
        !self.column_mappings.is_empty()
    }

    fn identity(&self) -> EdgeKey {
        (self.source.clone(), self.column_mappings.clone())
    }
}

impl PartialEq for LineageEdge {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source && self.column_mappings == other.column_mappings
    }
}

impl Eq for LineageEdge {}

impl Hash for LineageEdge {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.source.hash(state);
        self.column_mappings.hash(state);
    }
}

type EdgeKey = (TableReference, BTreeSet<ColumnMapping>);

/// Deterministically ordered, value-deduplicated set of edges into one table
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(into = "Vec<LineageEdge>", from = "Vec<LineageEdge>")]
pub struct EdgeSet {
    edges: BTreeMap<EdgeKey, LineageEdge>,
}

impl EdgeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an edge, or advance the tracked timestamp of its existing twin
    ///
    /// Returns `true` when the edge was not present before.
    pub fn upsert(&mut self, edge: LineageEdge) -> bool {
        match self.edges.entry(edge.identity()) {
            Entry::Vacant(slot) => {
                slot.insert(edge);
                true
            }
            Entry::Occupied(mut slot) => {
                let existing = slot.get_mut();
                if edge.audit_timestamp > existing.audit_timestamp {
                    existing.audit_timestamp = edge.audit_timestamp;
                    existing.actor = edge.actor;
                }
                false
            }
        }
    }

    /// Number of distinct edges
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Edges ordered by source, then column mappings
    pub fn iter(&self) -> impl Iterator<Item = &LineageEdge> {
        self.edges.values()
    }

    /// Distinct sources feeding this table
    pub fn sources(&self) -> BTreeSet<&TableReference> {
        self.edges.keys().map(|(source, _)| source).collect()
    }

    /// Whether any edge reads the given source
    pub fn contains_source(&self, source: &TableReference) -> bool {
        self.edges.keys().any(|(s, _)| s == source)
    }

    /// Find an edge equal by value to the given one
    pub fn get(&self, edge: &LineageEdge) -> Option<&LineageEdge> {
        self.edges.get(&edge.identity())
    }
}

/// Edge-set equality ignores timestamps and actors
impl PartialEq for EdgeSet {
    fn eq(&self, other: &Self) -> bool {
        self.edges.len() == other.edges.len() && self.edges.keys().eq(other.edges.keys())
    }
}

impl Eq for EdgeSet {}

impl From<EdgeSet> for Vec<LineageEdge> {
    fn from(set: EdgeSet) -> Self {
        set.edges.into_values().collect()
    }
}

impl From<Vec<LineageEdge>> for EdgeSet {
    fn from(edges: Vec<LineageEdge>) -> Self {
        let mut set = EdgeSet::new();
        for edge in edges {
            set.upsert(edge);
        }
        set
    }
}

impl<'a> IntoIterator for &'a EdgeSet {
    type Item = &'a LineageEdge;
    type IntoIter = std::collections::btree_map::Values<'a, EdgeKey, LineageEdge>;

    fn into_iter(self) -> Self::IntoIter {
        self.edges.values()
    }
}

/// Destination key -> edges feeding that destination
///
/// Built fresh per extraction run; holds no cross-run state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LineageMap {
    entries: BTreeMap<String, EdgeSet>,
}

impl LineageMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert an edge into the destination's edge set
    ///
    /// Returns `true` when the edge is new for that destination.
    pub fn insert(&mut self, destination: &TableReference, edge: LineageEdge) -> bool {
        self.insert_by_key(destination.key(), edge)
    }

    fn insert_by_key(&mut self, key: String, edge: LineageEdge) -> bool {
        self.entries.entry(key).or_default().upsert(edge)
    }

    /// Edges feeding a destination
    pub fn get(&self, destination: &TableReference) -> Option<&EdgeSet> {
        self.entries.get(&destination.key())
    }

    /// Edges feeding a destination, by canonical key
    pub fn get_by_key(&self, key: &str) -> Option<&EdgeSet> {
        self.entries.get(key)
    }

    pub fn contains(&self, destination: &TableReference) -> bool {
        self.entries.contains_key(&destination.key())
    }

    /// Number of destinations
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total number of distinct edges across all destinations
    pub fn edge_count(&self) -> usize {
        self.entries.values().map(EdgeSet::len).sum()
    }

    /// Destination keys in sorted order
    pub fn destinations(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// `(destination key, edges)` pairs in sorted order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &EdgeSet)> {
        self.entries.iter().map(|(key, edges)| (key.as_str(), edges))
    }

    /// Fold another map into this one with the same upsert semantics
    pub fn merge(&mut self, other: LineageMap) {
        for (key, edges) in other.entries {
            for edge in Vec::from(edges) {
                self.insert_by_key(key.clone(), edge);
            }
        }
    }

    /// Serialize to pretty JSON for inspection
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).single().unwrap()
    }

    fn table(name: &str) -> TableReference {
        TableReference::new("p", "d", name)
    }

    #[test]
    fn edge_equality_ignores_timestamp_and_actor() {
        let a = LineageEdge::new(table("s"), at(1), "alice");
        let b = LineageEdge::new(table("s"), at(2), "bob");
        assert_eq!(a, b);

        let c = b.clone().with_column_mappings([ColumnMapping::new("x", "y")]);
        assert_ne!(a, c);
    }

    #[test]
    fn upsert_keeps_latest_timestamp() {
        let mut set = EdgeSet::new();
        assert!(set.upsert(LineageEdge::new(table("s"), at(10), "alice")));
        assert!(!set.upsert(LineageEdge::new(table("s"), at(30), "bob")));
        assert!(!set.upsert(LineageEdge::new(table("s"), at(20), "carol")));

        assert_eq!(set.len(), 1);
        let edge = set.iter().next().unwrap();
        assert_eq!(edge.audit_timestamp, at(30));
        assert_eq!(edge.actor, "bob");
    }

    #[test]
    fn column_edges_are_distinct_from_table_edges() {
        let mut set = EdgeSet::new();
        set.upsert(LineageEdge::new(table("s"), at(1), "a"));
        set.upsert(
            LineageEdge::new(table("s"), at(1), "a")
                .with_column_mappings([ColumnMapping::new("id", "id")]),
        );

        assert_eq!(set.len(), 2);
        assert_eq!(set.sources().len(), 1);
        assert!(set.contains_source(&table("s")));
    }

    #[test]
    fn edge_set_equality_ignores_timestamps() {
        let mut left = EdgeSet::new();
        left.upsert(LineageEdge::new(table("a"), at(1), "x"));
        left.upsert(LineageEdge::new(table("b"), at(1), "x"));

        let mut right = EdgeSet::new();
        right.upsert(LineageEdge::new(table("b"), at(99), "y"));
        right.upsert(LineageEdge::new(table("a"), at(42), "y"));

        assert_eq!(left, right);
    }

    #[test]
    fn map_keys_by_canonical_destination() {
        let mut map = LineageMap::new();
        let dest = table("t");
        map.insert(&dest, LineageEdge::new(table("s"), at(1), "a"));

        assert!(map.contains(&dest));
        assert!(map.get_by_key("projects/p/datasets/d/tables/t").is_some());
        assert_eq!(map.len(), 1);
        assert_eq!(map.edge_count(), 1);
    }

    #[test]
    fn merge_upserts_edges() {
        let dest = table("t");

        let mut first = LineageMap::new();
        first.insert(&dest, LineageEdge::new(table("s"), at(5), "a"));

        let mut second = LineageMap::new();
        second.insert(&dest, LineageEdge::new(table("s"), at(9), "b"));
        second.insert(&dest, LineageEdge::new(table("u"), at(9), "b"));
        second.insert(&table("other"), LineageEdge::new(table("s"), at(9), "b"));

        first.merge(second);

        assert_eq!(first.len(), 2);
        let edges = first.get(&dest).unwrap();
        assert_eq!(edges.len(), 2);
        let s_edge = edges.get(&LineageEdge::new(table("s"), at(0), "")).unwrap();
        assert_eq!(s_edge.audit_timestamp, at(9));
    }

    #[test]
    fn map_serializes_edges_as_lists() {
        let mut map = LineageMap::new();
        map.insert(
            &table("t"),
            LineageEdge::new(table("s"), at(1), "a").with_lineage_type(LineageType::View),
        );

        let json = map.to_json().unwrap();
        assert!(json.contains("projects/p/datasets/d/tables/t"));
        assert!(json.contains("\"VIEW\""));

        let parsed: LineageMap = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, map);
    }
}
