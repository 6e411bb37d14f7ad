//! SQL parsing using datafusion-sqlparser-rs
//!
//! Parses audit-log query text into an AST and converts failures into
//! diagnostics.

use sqlparser::ast::Statement;
use sqlparser::dialect::{BigQueryDialect, Dialect};
use sqlparser::parser::{Parser, ParserError};
use bqlineage_core::{Diagnostic, DiagnosticCode};

/// Longest SQL excerpt carried into diagnostics
const EXCERPT_LEN: usize = 120;

/// SQL parser with configurable dialect
pub struct SqlParser {
    dialect: Box<dyn Dialect + Send + Sync>,
}

impl SqlParser {
    /// Create a SQL parser for BigQuery, the default
    pub fn new() -> Self {
        Self::bigquery()
    }

    /// Create a SQL parser for BigQuery
    pub fn bigquery() -> Self {
        Self {
            dialect: Box::new(BigQueryDialect {}),
        }
    }

    /// Parse SQL string into AST
    pub fn parse(&self, sql: &str) -> Result<ParsedSql, ParseError> {
        match Parser::parse_sql(&*self.dialect, sql) {
            Ok(statements) => Ok(ParsedSql { statements }),
            Err(error) => Err(ParseError {
                sql: sql.to_string(),
                error,
            }),
        }
    }
}

impl Default for SqlParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Successfully parsed SQL with AST
#[derive(Debug, Clone)]
pub struct ParsedSql {
    /// Parsed statements, a script yields several
    pub statements: Vec<Statement>,
}

/// SQL parsing error with diagnostic information
#[derive(Debug)]
pub struct ParseError {
    /// Original SQL string
    pub sql: String,

    /// Parser error from sqlparser
    pub error: ParserError,
}

impl ParseError {
    /// Convert to a warning quoting a short excerpt of the query
    pub fn to_diagnostic(&self) -> Diagnostic {
        Diagnostic::warn(
            DiagnosticCode::SqlParseError,
            format!("Failed to parse SQL: {} in `{}`", self.error, excerpt(&self.sql)),
        )
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SQL parse error: {}", self.error)
    }
}

impl std::error::Error for ParseError {}

/// Single-line prefix of a query for diagnostics
fn excerpt(sql: &str) -> String {
    let flat = sql.split_whitespace().collect::<Vec<_>>().join(" ");
    match flat.char_indices().nth(EXCERPT_LEN) {
        Some((idx, _)) => format!("{}...", &flat[..idx]),
        None => flat,
    }
}
