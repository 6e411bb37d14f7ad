//! SQL parsing and column-lineage analysis
//!
//! This crate handles:
//! - Parsing BigQuery SQL using datafusion-sqlparser-rs
//! - Picking the statement of a script that writes the destination
//! - Resolving CTEs, derived tables and aliases back to known source tables
//! - Producing source-column -> destination-column mappings

pub mod parser;
pub mod resolver;
pub mod analyzer;

pub use parser::{SqlParser, ParsedSql, ParseError};
pub use resolver::{Relation, Scope, OutputColumn, ColumnSource};
pub use analyzer::{SqlAnalyzer, ColumnLineageAnalyzer, ColumnLineage, AnalysisError, NoopAnalyzer};
