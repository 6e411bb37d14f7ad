//! Compiled path specs
//!
//! An include glob such as `gs://bucket/{table}/*.parquet` compiles to an
//! anchored regex:
//!
//! - `**` matches anything, including `/`
//! - `*` matches within one path segment, `?` one character of it
//! - `{table}` matches one segment and binds the table name
//! - any other `{name}` matches one segment without binding
//!
//! The identity of a matching URI is everything up to the end of the
//! `{table}` binding, without the scheme: `bucket/customer1`.

use crate::storage::strip_scheme;
use bqlineage_core::config::TABLE_PLACEHOLDER;
use bqlineage_core::{ConfigError, PathSpec};
use regex::Regex;

/// A URI matched by a path spec
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathMatch {
    /// Value bound to `{table}`
    pub table: String,

    /// Scheme-less prefix up to and including the table segment
    pub identity: String,
}

/// A path spec ready for matching
#[derive(Debug, Clone)]
pub struct CompiledPathSpec {
    pattern: Regex,
    excludes: Vec<Regex>,
    file_types: Vec<String>,
}

impl CompiledPathSpec {
    /// Validate and compile a path spec
    pub fn compile(spec: &PathSpec) -> Result<Self, ConfigError> {
        spec.validate()?;

        let invalid = |glob: &str, e: regex::Error| ConfigError::InvalidPathSpec {
            include: glob.to_string(),
            reason: e.to_string(),
        };

        let pattern = glob_regex(&spec.include, true).map_err(|e| invalid(&spec.include, e))?;
        let excludes = spec
            .exclude
            .iter()
            .map(|glob| glob_regex(glob, false).map_err(|e| invalid(glob, e)))
            .collect::<Result<Vec<_>, _>>()?;
        let file_types = spec
            .file_types
            .iter()
            .map(|ext| ext.trim_start_matches('.').to_ascii_lowercase())
            .collect();

        Ok(Self {
            pattern,
            excludes,
            file_types,
        })
    }

    /// Match a URI, honoring excludes and allowed file types
    pub fn matches(&self, uri: &str) -> Option<PathMatch> {
        let captures = self.pattern.captures(uri)?;

        if self.excludes.iter().any(|exclude| exclude.is_match(uri)) {
            return None;
        }

        if !self.file_type_allowed(uri) {
            return None;
        }

        let table = captures.name(TABLE_PLACEHOLDER)?;
        Some(PathMatch {
            table: table.as_str().to_string(),
            identity: strip_scheme(&uri[..table.end()]).to_string(),
        })
    }

    fn file_type_allowed(&self, uri: &str) -> bool {
        if self.file_types.is_empty() {
            return true;
        }

        let file = uri.rsplit('/').next().unwrap_or(uri);
        match file.rsplit_once('.') {
            Some((_, ext)) => self.file_types.iter().any(|t| t.eq_ignore_ascii_case(ext)),
            None => true,
        }
    }
}

/// Identity of a URI no spec matched: scheme and glob segments stripped
///
/// With `strip_urls` a trailing file name is dropped as well, leaving at
/// least the bucket.
pub fn fallback_identity(uri: &str, strip_urls: bool) -> Option<String> {
    let mut segments: Vec<&str> = strip_scheme(uri)
        .split('/')
        .take_while(|segment| !is_glob(segment))
        .filter(|segment| !segment.is_empty())
        .collect();

    if strip_urls && segments.len() > 1 && segments.last().is_some_and(|s| s.contains('.')) {
        segments.pop();
    }

    if segments.is_empty() {
        None
    } else {
        Some(segments.join("/"))
    }
}

fn is_glob(segment: &str) -> bool {
    segment.contains(['*', '?', '[', '{'])
}

fn glob_regex(glob: &str, bind_table: bool) -> Result<Regex, regex::Error> {
    let mut out = String::from("^");
    let mut bound = false;
    let mut chars = glob.char_indices().peekable();

    while let Some((idx, c)) = chars.next() {
        match c {
            '*' if chars.peek().map(|(_, next)| *next) == Some('*') => {
                chars.next();
                out.push_str(".*");
            }
            '*' => out.push_str("[^/]*"),
            '?' => out.push_str("[^/]"),
            '{' => match glob[idx + 1..].find('}') {
                Some(len) => {
                    let name = &glob[idx + 1..idx + 1 + len];
                    if bind_table && !bound && name == TABLE_PLACEHOLDER {
                        out.push_str("(?P<table>[^/]+)");
                        bound = true;
                    } else {
                        out.push_str("[^/]+");
                    }
                    for (_, skipped) in chars.by_ref() {
                        if skipped == '}' {
                            break;
                        }
                    }
                }
                None => out.push_str(&regex::escape("{")),
            },
            other => out.push_str(&regex::escape(other.encode_utf8(&mut [0; 4]))),
        }
    }

    out.push('$');
    Regex::new(&out)
}
