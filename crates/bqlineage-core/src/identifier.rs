//! Warehouse table references
//!
//! A [`TableReference`] is the `{project, dataset, table}` triple identifying a
//! BigQuery table. Two raw forms are accepted:
//!
//! - the audit-log path form `projects/<p>/datasets/<d>/tables/<t>`, which is
//!   also the canonical display form and the lineage map key
//! - the dotted form `<p>.<d>.<t>`
//!
//! Both forms parse losslessly into the triple and back.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const PROJECTS: &str = "projects";
const DATASETS: &str = "datasets";
const TABLES: &str = "tables";

/// Identifies a warehouse table
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TableReference {
    /// Project (billing/storage project)
    pub project: String,

    /// Dataset within the project
    pub dataset: String,

    /// Table name, possibly carrying a partition or snapshot decorator
    pub table: String,
}

impl TableReference {
    /// Create a reference from its three parts
    pub fn new(
        project: impl Into<String>,
        dataset: impl Into<String>,
        table: impl Into<String>,
    ) -> Self {
        Self {
            project: project.into(),
            dataset: dataset.into(),
            table: table.into(),
        }
    }

    /// Parse either the path form or the dotted form
    pub fn parse(raw: &str) -> Result<Self, MalformedReferenceError> {
        let trimmed = raw.trim();

        if trimmed.starts_with("projects/") {
            Self::parse_path(trimmed)
        } else {
            Self::parse_dotted(trimmed.trim_matches('`'))
        }
    }

    fn parse_path(raw: &str) -> Result<Self, MalformedReferenceError> {
        let parts: Vec<&str> = raw.split('/').collect();
        if parts.len() != 6 {
            return Err(MalformedReferenceError::SegmentCount {
                raw: raw.to_string(),
                expected: 6,
                found: parts.len(),
            });
        }

        for (index, expected) in [(0, PROJECTS), (2, DATASETS), (4, TABLES)] {
            if parts[index] != expected {
                return Err(MalformedReferenceError::UnexpectedComponent {
                    raw: raw.to_string(),
                    expected,
                    found: parts[index].to_string(),
                });
            }
        }

        Self::from_parts(raw, parts[1], parts[3], parts[5])
    }

    fn parse_dotted(raw: &str) -> Result<Self, MalformedReferenceError> {
        let parts: Vec<&str> = raw.split('.').collect();
        if parts.len() != 3 {
            return Err(MalformedReferenceError::SegmentCount {
                raw: raw.to_string(),
                expected: 3,
                found: parts.len(),
            });
        }

        Self::from_parts(raw, parts[0], parts[1], parts[2])
    }

    fn from_parts(
        raw: &str,
        project: &str,
        dataset: &str,
        table: &str,
    ) -> Result<Self, MalformedReferenceError> {
        let segments = [project, dataset, table];

        if segments.iter().any(|segment| segment.is_empty()) {
            return Err(MalformedReferenceError::EmptySegment(raw.to_string()));
        }

        // Either separator inside a segment breaks the round trip through the other form
        if let Some(segment) = segments.iter().find(|segment| segment.contains(['.', '/'])) {
            return Err(MalformedReferenceError::InvalidSegment {
                raw: raw.to_string(),
                segment: segment.to_string(),
            });
        }

        Ok(Self::new(project, dataset, table))
    }

    /// Dotted `project.dataset.table` name, as used in dataset URNs
    pub fn to_dotted(&self) -> String {
        format!("{}.{}.{}", self.project, self.dataset, self.table)
    }

    /// Canonical string used as the lineage map key
    pub fn key(&self) -> String {
        self.to_string()
    }

    /// Strip partition/snapshot decorators and collapse date-sharded tables
    ///
    /// `events$20240101` and `events@1700000000` become `events`,
    /// `events_20240101` becomes `events`, and a table named only by its
    /// shard date takes the dataset name.
    pub fn sanitized(&self) -> Self {
        let undecorated = match self.table.find(['$', '@']) {
            Some(idx) => &self.table[..idx],
            None => self.table.as_str(),
        };

        let table = match shard_base(undecorated) {
            Some("") => self.dataset.as_str(),
            Some(base) => base,
            None => undecorated,
        };

        Self::new(self.project.clone(), self.dataset.clone(), table)
    }

    /// Whether the table lives in a temporary dataset
    pub fn is_temporary(&self, dataset_prefixes: &[String]) -> bool {
        dataset_prefixes
            .iter()
            .any(|prefix| !prefix.is_empty() && self.dataset.starts_with(prefix.as_str()))
    }
}

/// Base name of a `_YYYYMMDD`-sharded table, `Some("")` for a bare shard date
fn shard_base(table: &str) -> Option<&str> {
    if table.len() < 8 {
        return None;
    }

    let split = table.len() - 8;
    if !table.is_char_boundary(split) {
        return None;
    }

    let (head, tail) = table.split_at(split);
    if !tail.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    if head.is_empty() {
        Some("")
    } else {
        head.strip_suffix('_').filter(|base| !base.is_empty())
    }
}

impl fmt::Display for TableReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}/{}/{}",
            PROJECTS, self.project, DATASETS, self.dataset, TABLES, self.table
        )
    }
}

impl FromStr for TableReference {
    type Err = MalformedReferenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for TableReference {
    type Error = MalformedReferenceError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TableReference> for String {
    fn from(value: TableReference) -> Self {
        value.to_string()
    }
}

/// Raw table name that does not describe a `{project, dataset, table}` triple
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MalformedReferenceError {
    #[error("Malformed table reference '{raw}': expected {expected} segments, found {found}")]
    SegmentCount {
        raw: String,
        expected: usize,
        found: usize,
    },

    #[error("Malformed table reference '{raw}': expected '{expected}', found '{found}'")]
    UnexpectedComponent {
        raw: String,
        expected: &'static str,
        found: String,
    },

    #[error("Malformed table reference '{0}': empty segment")]
    EmptySegment(String),

    #[error("Malformed table reference '{raw}': segment '{segment}' contains a separator")]
    InvalidSegment { raw: String, segment: String },
}
