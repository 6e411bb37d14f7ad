//! Audit-log query events

use crate::identifier::TableReference;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Statement type as reported by the audit log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatementType {
    Select,
    Insert,
    Update,
    Delete,
    Merge,
    CreateTable,
    CreateTableAsSelect,
    CreateView,
    Script,

    /// Anything the audit log reports that we do not model
    #[serde(other)]
    Unknown,
}

impl StatementType {
    /// Get the statement type as its audit-log string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Select => "SELECT",
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::Merge => "MERGE",
            Self::CreateTable => "CREATE_TABLE",
            Self::CreateTableAsSelect => "CREATE_TABLE_AS_SELECT",
            Self::CreateView => "CREATE_VIEW",
            Self::Script => "SCRIPT",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for StatementType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

fn unknown_actor() -> String {
    "unknown".to_string()
}

/// One audit record for an executed query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryEvent {
    /// When the job was recorded
    pub timestamp: DateTime<Utc>,

    /// Identity that ran the query
    #[serde(default = "unknown_actor")]
    pub actor: String,

    /// Raw SQL, possibly several statements
    #[serde(default)]
    pub query_text: String,

    /// Reported statement type
    pub statement_type: StatementType,

    /// Project the job ran in
    #[serde(default)]
    pub project_id: String,

    /// Completion time, absent for streaming audit sources
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,

    /// Base tables read by the query
    #[serde(default)]
    pub referenced_tables: BTreeSet<TableReference>,

    /// Views read by the query
    #[serde(default)]
    pub referenced_views: BTreeSet<TableReference>,

    /// Table written by the query
    #[serde(default)]
    pub destination_table: Option<TableReference>,
}

impl QueryEvent {
    /// Create an event with no references and an unknown actor
    pub fn new(
        timestamp: DateTime<Utc>,
        statement_type: StatementType,
        query_text: impl Into<String>,
    ) -> Self {
        Self {
            timestamp,
            actor: unknown_actor(),
            query_text: query_text.into(),
            statement_type,
            project_id: String::new(),
            end_time: None,
            referenced_tables: BTreeSet::new(),
            referenced_views: BTreeSet::new(),
            destination_table: None,
        }
    }

    /// Set the actor
    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = actor.into();
        self
    }

    /// Set the project the job ran in
    pub fn with_project_id(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = project_id.into();
        self
    }

    /// Set the completion time
    pub fn with_end_time(mut self, end_time: DateTime<Utc>) -> Self {
        self.end_time = Some(end_time);
        self
    }

    /// Set the destination table
    pub fn with_destination(mut self, destination: TableReference) -> Self {
        self.destination_table = Some(destination);
        self
    }

    /// Set the referenced base tables
    pub fn with_referenced_tables(mut self, tables: impl IntoIterator<Item = TableReference>) -> Self {
        self.referenced_tables = tables.into_iter().collect();
        self
    }

    /// Set the referenced views
    pub fn with_referenced_views(mut self, views: impl IntoIterator<Item = TableReference>) -> Self {
        self.referenced_views = views.into_iter().collect();
        self
    }

    /// Parse one JSON line as produced by an audit-log export
    pub fn from_json(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }
}
