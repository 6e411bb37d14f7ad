//! Configuration schema (bqlineage.toml)

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Placeholder a path spec binds to the table name
pub const TABLE_PLACEHOLDER: &str = "table";

/// How an object-storage prefix maps to a logical table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathSpec {
    /// Glob with exactly one `{table}` placeholder, e.g. `gs://bucket/{table}/*.parquet`
    pub include: String,

    /// Globs that exclude otherwise matching paths
    #[serde(default)]
    pub exclude: Vec<String>,

    /// Allowed file extensions for the final path segment (empty allows all)
    #[serde(default)]
    pub file_types: Vec<String>,
}

impl PathSpec {
    /// Create a spec with no excludes
    pub fn new(include: impl Into<String>) -> Self {
        Self {
            include: include.into(),
            exclude: Vec::new(),
            file_types: Vec::new(),
        }
    }

    /// Set exclude globs
    pub fn with_exclude(mut self, exclude: Vec<String>) -> Self {
        self.exclude = exclude;
        self
    }

    /// Set allowed file extensions
    pub fn with_file_types(mut self, file_types: Vec<String>) -> Self {
        self.file_types = file_types;
        self
    }

    /// Names of the `{...}` placeholders in the include glob, in order
    pub fn placeholders(&self) -> Result<Vec<&str>, ConfigError> {
        let mut names = Vec::new();
        let mut rest = self.include.as_str();

        while let Some(open) = rest.find(['{', '}']) {
            if rest[open..].starts_with('}') {
                return Err(self.invalid("unbalanced '}'"));
            }

            let after = &rest[open + 1..];
            let close = after
                .find(['{', '}'])
                .filter(|idx| after[*idx..].starts_with('}'))
                .ok_or_else(|| self.invalid("unterminated '{'"))?;

            let name = &after[..close];
            if name.is_empty() {
                return Err(self.invalid("empty placeholder '{}'"));
            }

            names.push(name);
            rest = &after[close + 1..];
        }

        Ok(names)
    }

    /// Check the include glob carries exactly one `{table}` placeholder
    pub fn validate(&self) -> Result<(), ConfigError> {
        let tables = self
            .placeholders()?
            .into_iter()
            .filter(|name| *name == TABLE_PLACEHOLDER)
            .count();

        match tables {
            1 => Ok(()),
            0 => Err(self.invalid("missing '{table}' placeholder")),
            n => Err(self.invalid(&format!("{} '{{table}}' placeholders, expected one", n))),
        }
    }

    fn invalid(&self, reason: &str) -> ConfigError {
        ConfigError::InvalidPathSpec {
            include: self.include.clone(),
            reason: reason.to_string(),
        }
    }
}

/// Lineage for external tables backed by object storage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GcsLineageProviderConfig {
    /// Drop storage paths that match no path spec
    #[serde(default)]
    pub ignore_non_path_spec_path: bool,

    /// Drop the trailing file name when keeping an unmatched path whole
    #[serde(default = "default_true")]
    pub strip_urls: bool,

    /// Path specs, evaluated in order
    #[serde(default)]
    pub path_specs: Vec<PathSpec>,
}

fn default_true() -> bool {
    true
}

impl Default for GcsLineageProviderConfig {
    fn default() -> Self {
        Self {
            ignore_non_path_spec_path: false,
            strip_urls: true,
            path_specs: Vec::new(),
        }
    }
}

impl GcsLineageProviderConfig {
    /// Create a config from path specs
    pub fn new(path_specs: Vec<PathSpec>) -> Self {
        Self {
            path_specs,
            ..Self::default()
        }
    }

    /// Set whether unmatched paths are dropped
    pub fn with_ignore_non_path_spec_path(mut self, ignore: bool) -> Self {
        self.ignore_non_path_spec_path = ignore;
        self
    }

    /// Validate every path spec
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.path_specs.iter().try_for_each(PathSpec::validate)
    }
}

/// Regex allow/deny lists
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowDenyPattern {
    /// Names must match one of these
    #[serde(default = "allow_all")]
    pub allow: Vec<String>,

    /// Names must match none of these
    #[serde(default)]
    pub deny: Vec<String>,
}

fn allow_all() -> Vec<String> {
    vec![".*".to_string()]
}

impl Default for AllowDenyPattern {
    fn default() -> Self {
        Self {
            allow: allow_all(),
            deny: Vec::new(),
        }
    }
}

impl AllowDenyPattern {
    /// Compile both lists, anchored at the start of the name
    pub fn compile(&self) -> Result<CompiledAllowDeny, ConfigError> {
        let compile_all = |patterns: &[String]| -> Result<Vec<Regex>, ConfigError> {
            patterns
                .iter()
                .map(|pattern| {
                    Regex::new(&format!("^(?:{})", pattern)).map_err(|e| ConfigError::InvalidPattern {
                        pattern: pattern.clone(),
                        reason: e.to_string(),
                    })
                })
                .collect()
        };

        Ok(CompiledAllowDeny {
            allow: compile_all(&self.allow)?,
            deny: compile_all(&self.deny)?,
        })
    }
}

/// Compiled form of [`AllowDenyPattern`]
///
/// An empty allow list allows every name.
#[derive(Debug, Clone, Default)]
pub struct CompiledAllowDeny {
    allow: Vec<Regex>,
    deny: Vec<Regex>,
}

impl CompiledAllowDeny {
    /// Whether a name passes both lists
    pub fn allowed(&self, name: &str) -> bool {
        let allowed = self.allow.is_empty() || self.allow.iter().any(|re| re.is_match(name));
        allowed && !self.deny.iter().any(|re| re.is_match(name))
    }
}

fn default_env() -> String {
    crate::urn::DEFAULT_ENV.to_string()
}

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineageConfig {
    /// Ask the SQL analyzer for column-level mappings
    #[serde(default)]
    pub extract_column_lineage: bool,

    /// Environment used in dataset URNs
    #[serde(default = "default_env")]
    pub env: String,

    /// Datasets holding temporary tables whose lineage is expanded through
    #[serde(default)]
    pub temp_table_dataset_prefixes: Vec<String>,

    /// Emit column lineage for external tables over object storage
    #[serde(default)]
    pub include_column_lineage_with_gcs: bool,

    /// Destination tables (`project.dataset.table`) to extract lineage for
    #[serde(default)]
    pub dataset_pattern: AllowDenyPattern,

    /// Path specs for external tables
    #[serde(default)]
    pub gcs_lineage_config: GcsLineageProviderConfig,
}

impl Default for LineageConfig {
    fn default() -> Self {
        Self {
            extract_column_lineage: false,
            env: default_env(),
            temp_table_dataset_prefixes: Vec::new(),
            include_column_lineage_with_gcs: false,
            dataset_pattern: AllowDenyPattern::default(),
            gcs_lineage_config: GcsLineageProviderConfig::default(),
        }
    }
}

impl LineageConfig {
    /// Load and validate config from a TOML file
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        Self::from_toml(&contents)
    }

    /// Load and validate config from a TOML string
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        let config: LineageConfig = toml::from_str(toml)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Save config to TOML file
    pub fn save_to_file(&self, path: &std::path::Path) -> Result<(), ConfigError> {
        let toml = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, toml)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Fail fast on invalid path specs or patterns
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.gcs_lineage_config.validate()?;
        self.dataset_pattern.compile()?;
        Ok(())
    }
}

/// Config error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),

    #[error("Invalid path spec '{include}': {reason}")]
    InvalidPathSpec { include: String, reason: String },

    #[error("Invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
}
