//! bqlineage core
//!
//! Domain model shared by every bqlineage crate: table references, audit
//! events, lineage edges and the per-run lineage map, the externally
//! reported lineage record, configuration and the run report.
//! Diagnostic codes are part of the public API and must stay stable.

pub mod identifier;
pub mod event;
pub mod edge;
pub mod record;
pub mod urn;
pub mod schema;
pub mod diagnostic;
pub mod report;
pub mod config;

pub use identifier::{TableReference, MalformedReferenceError};
pub use event::{QueryEvent, StatementType};
pub use edge::{ColumnMapping, LineageEdge, LineageType, EdgeSet, LineageMap};
pub use record::{AuditStamp, Upstream, FineGrainedLineage, UpstreamLineageRecord};
pub use schema::{Schema, SchemaField};
pub use diagnostic::{Diagnostic, DiagnosticCode, Severity};
pub use report::{LineageReport, ReportVersion};
pub use config::{
    LineageConfig, PathSpec, GcsLineageProviderConfig, AllowDenyPattern, CompiledAllowDeny,
    ConfigError,
};
