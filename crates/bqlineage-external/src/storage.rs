//! Object-storage scheme registry
//!
//! Maps a URI scheme (`gs`) to the catalog platform its virtual tables live
//! on (`gcs`). URIs with an unregistered scheme are not object storage.

use std::collections::BTreeMap;
use std::fmt;

/// Catalog platform of an object store
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StoragePlatform(String);

impl StoragePlatform {
    /// Google Cloud Storage
    pub fn gcs() -> Self {
        Self::new("gcs")
    }

    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Platform name used in URNs
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StoragePlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Scheme -> platform table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageSchemes {
    schemes: BTreeMap<String, StoragePlatform>,
}

impl StorageSchemes {
    /// Empty registry
    pub fn empty() -> Self {
        Self {
            schemes: BTreeMap::new(),
        }
    }

    /// Register a scheme, replacing any previous platform for it
    pub fn register(mut self, scheme: impl Into<String>, platform: StoragePlatform) -> Self {
        self.schemes.insert(scheme.into().to_ascii_lowercase(), platform);
        self
    }

    /// Platform and scheme-less path of an object-storage URI
    pub fn classify<'a>(&self, uri: &'a str) -> Option<(&StoragePlatform, &'a str)> {
        let (scheme, path) = split_scheme(uri)?;
        let platform = self.schemes.get(&scheme.to_ascii_lowercase())?;
        Some((platform, path))
    }

    /// Whether the URI uses a registered scheme
    pub fn is_storage_uri(&self, uri: &str) -> bool {
        self.classify(uri).is_some()
    }
}

impl Default for StorageSchemes {
    fn default() -> Self {
        Self::empty().register("gs", StoragePlatform::gcs())
    }
}

/// Split `scheme://path`
pub(crate) fn split_scheme(uri: &str) -> Option<(&str, &str)> {
    let (scheme, path) = uri.split_once("://")?;
    if scheme.is_empty() || !scheme.chars().all(|c| c.is_ascii_alphanumeric() || c == '+') {
        return None;
    }
    Some((scheme, path))
}

/// Drop the `scheme://` prefix if there is one
pub(crate) fn strip_scheme(uri: &str) -> &str {
    split_scheme(uri).map(|(_, path)| path).unwrap_or(uri)
}
