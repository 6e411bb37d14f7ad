//! Lineage for external tables over object storage
//!
//! An external table reads files such as `gs://bucket/customer1/*.parquet`.
//! Its upstreams are "virtual tables" on the storage platform, derived by
//! matching each source URI against the configured path specs.
//!
//! ## Example
//!
//! ```rust,ignore
//! use bqlineage_core::{GcsLineageProviderConfig, LineageReport, PathSpec};
//! use bqlineage_external::{ExternalLineageResolver, StaticSchemaLookup};
//!
//! let config = GcsLineageProviderConfig::new(vec![PathSpec::new("gs://bucket/{table}/*.parquet")]);
//! let resolver = ExternalLineageResolver::new(&config)?.with_column_lineage(true);
//! let lookup = StaticSchemaLookup::new();
//!
//! let mut report = LineageReport::new();
//! let record = resolver
//!     .resolve(dataset_urn, &["gs://bucket/customer1/*.parquet".to_string()], Some(&lookup), &mut report)
//!     .await;
//! ```

pub mod storage;
pub mod path_spec;
pub mod lookup;
pub mod static_lookup;
pub mod resolver;

pub use storage::{StorageSchemes, StoragePlatform};
pub use path_spec::{CompiledPathSpec, PathMatch};
pub use lookup::{SchemaLookup, ExternalTable, FetchError};
pub use static_lookup::{StaticSchemaLookup, StaticSchemaLookupBuilder};
pub use resolver::ExternalLineageResolver;
