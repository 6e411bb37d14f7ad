//! bqlineage engine - lineage reconstruction
//!
//! This crate implements the two in-memory transforms of a lineage run:
//! - Building the lineage map from a single pass over audit events
//! - Resolving a table's upstream lineage record from that map

pub mod map_builder;
pub mod upstream;

pub use map_builder::LineageMapBuilder;
pub use upstream::UpstreamResolver;
