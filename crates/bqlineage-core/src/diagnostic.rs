//! Diagnostic codes for degraded lineage
//!
//! Codes are stable strings. Never rename or remove a code; add new ones.

use serde::{Deserialize, Serialize};

/// Diagnostic code registry (v1)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiagnosticCode {
    // SQL analysis (1xxx)
    /// Query text could not be parsed
    SqlParseError,

    /// Query parsed but its write statement is not analyzable
    SqlUnsupportedStatement,

    /// No statement in the query writes the destination
    SqlNoWriteStatement,

    // External tables (2xxx)
    /// Storage path matched no path spec and was dropped
    StoragePathDropped,

    /// Storage path matched no path spec and was kept whole
    StoragePathUnmatched,

    /// Schema lookup found no schema for an external dataset
    ExternalSchemaMissing,

    /// Schema lookup failed for an external dataset
    ExternalSchemaFetchFailed,
}

impl DiagnosticCode {
    /// Get the diagnostic code as a stable string identifier
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SqlParseError => "SQL_PARSE_ERROR",
            Self::SqlUnsupportedStatement => "SQL_UNSUPPORTED_STATEMENT",
            Self::SqlNoWriteStatement => "SQL_NO_WRITE_STATEMENT",
            Self::StoragePathDropped => "STORAGE_PATH_DROPPED",
            Self::StoragePathUnmatched => "STORAGE_PATH_UNMATCHED",
            Self::ExternalSchemaMissing => "EXTERNAL_SCHEMA_MISSING",
            Self::ExternalSchemaFetchFailed => "EXTERNAL_SCHEMA_FETCH_FAILED",
        }
    }
}

impl std::fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Diagnostic severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Expected outcome of a configured choice
    Info,
    /// Lineage was degraded
    Warn,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
        }
    }
}

/// A diagnostic message with structured metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Stable diagnostic code
    pub code: DiagnosticCode,

    /// Severity level
    pub severity: Severity,

    /// Human-readable message
    pub message: String,

    /// Table, dataset or path the diagnostic is about
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
}

impl Diagnostic {
    /// Create a new diagnostic with minimal fields
    pub fn new(code: DiagnosticCode, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            code,
            severity,
            message: message.into(),
            subject: None,
        }
    }

    /// Shorthand for an informational note
    pub fn info(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self::new(code, Severity::Info, message)
    }

    /// Shorthand for a warning
    pub fn warn(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self::new(code, Severity::Warn, message)
    }

    /// Set the subject
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostic_code_stability() {
        assert_eq!(DiagnosticCode::SqlParseError.as_str(), "SQL_PARSE_ERROR");
        assert_eq!(DiagnosticCode::StoragePathDropped.as_str(), "STORAGE_PATH_DROPPED");
    }

    #[test]
    fn diagnostic_serialization() {
        let diag = Diagnostic::warn(DiagnosticCode::SqlParseError, "Expected end of statement")
            .with_subject("projects/p/datasets/d/tables/t");

        let json = serde_json::to_string(&diag).unwrap();
        assert!(json.contains("SQL_PARSE_ERROR"));
        assert!(json.contains("\"warn\""));
        assert!(json.contains("projects/p/datasets/d/tables/t"));
    }

    #[test]
    fn info_severity_serializes_lowercase() {
        let diag = Diagnostic::info(DiagnosticCode::StoragePathDropped, "Storage path matches no path spec");
        assert_eq!(diag.severity, Severity::Info);
        assert!(serde_json::to_string(&diag).unwrap().contains("\"info\""));
    }
}
