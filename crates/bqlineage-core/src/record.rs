//! Upstream lineage record handed to the catalog

use crate::edge::LineageType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// When and by whom a dependency was last observed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditStamp {
    pub time: DateTime<Utc>,
    pub actor: String,
}

/// One upstream dataset of the target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Upstream {
    /// Dataset URN of the upstream
    pub dataset_urn: String,

    /// How the target was derived from this upstream
    #[serde(rename = "type")]
    pub lineage_type: LineageType,

    /// Most recent observation, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audit_stamp: Option<AuditStamp>,
}

impl Upstream {
    pub fn new(dataset_urn: impl Into<String>, lineage_type: LineageType) -> Self {
        Self {
            dataset_urn: dataset_urn.into(),
            lineage_type,
            audit_stamp: None,
        }
    }

    /// Set the audit stamp
    pub fn with_audit_stamp(mut self, time: DateTime<Utc>, actor: impl Into<String>) -> Self {
        self.audit_stamp = Some(AuditStamp {
            time,
            actor: actor.into(),
        });
        self
    }
}

/// Column-to-column dependency
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FineGrainedLineage {
    /// Schema field URNs feeding the downstream field
    pub upstream_field_urns: Vec<String>,

    /// Schema field URN on the target
    pub downstream_field_urn: String,
}

impl FineGrainedLineage {
    pub fn new(upstream_field_urns: Vec<String>, downstream_field_urn: impl Into<String>) -> Self {
        Self {
            upstream_field_urns,
            downstream_field_urn: downstream_field_urn.into(),
        }
    }
}

/// Lineage reported for one target dataset
///
/// `fine_grained_lineages` is `None` for a table-level result and never an
/// empty list: `None` means no column lineage was available, not that the
/// target has no column dependencies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpstreamLineageRecord {
    pub upstreams: Vec<Upstream>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fine_grained_lineages: Option<Vec<FineGrainedLineage>>,
}

impl UpstreamLineageRecord {
    /// Build a record, normalizing an empty column list to `None`
    pub fn new(upstreams: Vec<Upstream>, fine_grained_lineages: Option<Vec<FineGrainedLineage>>) -> Self {
        Self {
            upstreams,
            fine_grained_lineages: fine_grained_lineages.filter(|lineages| !lineages.is_empty()),
        }
    }

    /// Upstream dataset URNs in record order
    pub fn upstream_urns(&self) -> Vec<&str> {
        self.upstreams.iter().map(|u| u.dataset_urn.as_str()).collect()
    }

    /// Whether column-level lineage is present
    pub fn has_fine_grained_lineage(&self) -> bool {
        self.fine_grained_lineages.is_some()
    }

    /// Serialize to pretty JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
