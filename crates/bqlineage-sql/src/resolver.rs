//! Name resolution for relations, aliases and column references
//!
//! A [`Scope`] holds the relations visible to one SELECT: known source
//! tables, CTEs and derived tables, each reachable by alias or name.
//! Column references are resolved through it down to `(table, column)`
//! pairs on known source tables.

use bqlineage_core::TableReference;
use std::collections::BTreeSet;

/// A column of a known source table
pub type ColumnSource = (TableReference, String);

/// One column produced by a query
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OutputColumn {
    /// Output name, absent for unnamed expressions
    pub name: Option<String>,

    /// Source columns the value is derived from
    pub sources: BTreeSet<ColumnSource>,
}

impl OutputColumn {
    /// Create an output column
    pub fn new(name: Option<String>, sources: BTreeSet<ColumnSource>) -> Self {
        Self { name, sources }
    }

    fn is_named(&self, column: &str) -> bool {
        self.name
            .as_deref()
            .map(|name| name.eq_ignore_ascii_case(column))
            .unwrap_or(false)
    }
}

/// A relation in a FROM clause
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Relation {
    /// A known source table
    Table(TableReference),

    /// A CTE or subquery with resolved output columns
    Derived(Vec<OutputColumn>),

    /// A table that is not among the known sources, or an unsupported factor
    Unknown,
}

impl Relation {
    /// Sources of a named column of this relation
    fn column(&self, column: &str) -> BTreeSet<ColumnSource> {
        match self {
            Relation::Table(table) => BTreeSet::from([(table.clone(), column.to_string())]),
            Relation::Derived(columns) => columns
                .iter()
                .filter(|c| c.is_named(column))
                .flat_map(|c| c.sources.iter().cloned())
                .collect(),
            Relation::Unknown => BTreeSet::new(),
        }
    }

    fn exposes(&self, column: &str) -> bool {
        match self {
            Relation::Derived(columns) => columns.iter().any(|c| c.is_named(column)),
            _ => false,
        }
    }
}

/// Relations visible to one SELECT
#[derive(Debug, Clone, Default)]
pub struct Scope {
    relations: Vec<(Vec<String>, Relation)>,
}

impl Scope {
    /// Create an empty scope
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a relation under the names that may qualify its columns
    pub fn add(&mut self, names: Vec<String>, relation: Relation) {
        self.relations.push((names, relation));
    }

    /// Find a relation by alias or name
    pub fn lookup(&self, qualifier: &str) -> Option<&Relation> {
        self.relations
            .iter()
            .find(|(names, _)| names.iter().any(|n| n.eq_ignore_ascii_case(qualifier)))
            .map(|(_, relation)| relation)
    }

    /// Resolve a possibly qualified column reference
    ///
    /// The longest prefix naming a relation qualifies the column that
    /// follows it, so `alias.col`, `dataset.table.col` and
    /// `alias.struct_col.field` all resolve. Without a matching
    /// qualifier the first part is taken as an unqualified column.
    pub fn resolve(&self, parts: &[String]) -> BTreeSet<ColumnSource> {
        match parts {
            [] => BTreeSet::new(),
            [column] => self.resolve_unqualified(column),
            _ => {
                for split in (1..parts.len()).rev() {
                    let qualifier = parts[..split].join(".");
                    if let Some(relation) = self.lookup(&qualifier) {
                        return relation.column(&parts[split]);
                    }
                }
                self.resolve_unqualified(&parts[0])
            }
        }
    }

    /// Resolve an unqualified column
    ///
    /// A single relation owns every column. With several relations the
    /// column resolves only if exactly one derived relation exposes it, or
    /// if the scope holds a single table and no derived relation has it.
    pub fn resolve_unqualified(&self, column: &str) -> BTreeSet<ColumnSource> {
        if let [(_, relation)] = self.relations.as_slice() {
            return relation.column(column);
        }

        let exposing: Vec<&Relation> = self
            .relations
            .iter()
            .map(|(_, relation)| relation)
            .filter(|relation| relation.exposes(column))
            .collect();

        if let [relation] = exposing.as_slice() {
            return relation.column(column);
        }
        if !exposing.is_empty() {
            return BTreeSet::new();
        }

        let tables: Vec<&Relation> = self
            .relations
            .iter()
            .map(|(_, relation)| relation)
            .filter(|relation| !matches!(relation, Relation::Derived(_)))
            .collect();

        match tables.as_slice() {
            [relation @ Relation::Table(_)] => relation.column(column),
            _ => BTreeSet::new(),
        }
    }

    /// Expand `*` or `qualifier.*`
    ///
    /// Only derived relations have known columns; tables expand to nothing.
    pub fn expand_wildcard(&self, qualifier: Option<&str>, except: &[String]) -> Vec<OutputColumn> {
        let relations: Vec<&Relation> = match qualifier {
            Some(qualifier) => self.lookup(qualifier).into_iter().collect(),
            None => self.relations.iter().map(|(_, relation)| relation).collect(),
        };

        relations
            .into_iter()
            .filter_map(|relation| match relation {
                Relation::Derived(columns) => Some(columns),
                _ => None,
            })
            .flatten()
            .filter(|column| !except.iter().any(|name| column.is_named(name)))
            .cloned()
            .collect()
    }
}

/// Match a possibly partial table name against the known sources
///
/// `project.dataset.table`, `dataset.table` and bare `table` are accepted.
/// Projects compare case-insensitively, and a decorated or date-sharded
/// table name matches its sanitized source.
pub fn match_source(sources: &BTreeSet<TableReference>, name: &[String]) -> Option<TableReference> {
    let parts: Vec<&str> = name
        .iter()
        .flat_map(|part| part.split('.'))
        .filter(|part| !part.is_empty())
        .collect();

    sources
        .iter()
        .find(|source| match parts.as_slice() {
            [project, dataset, table] => {
                source.project.eq_ignore_ascii_case(project)
                    && source.dataset == *dataset
                    && same_table(source, table)
            }
            [dataset, table] => source.dataset == *dataset && same_table(source, table),
            [table] => same_table(source, table),
            _ => false,
        })
        .cloned()
}

fn same_table(source: &TableReference, table: &str) -> bool {
    source.table == table
        || TableReference::new(&source.project, &source.dataset, table).sanitized().table == source.table
}
