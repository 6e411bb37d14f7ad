//! Column-lineage analysis
//!
//! [`SqlAnalyzer`] is the capability the map builder invokes to turn query
//! text into source-column -> destination-column mappings. The default
//! [`ColumnLineageAnalyzer`] walks the sqlparser AST of the statement that
//! writes the destination:
//!
//! 1. Pick the last INSERT ... SELECT or CREATE TABLE ... AS SELECT of the
//!    script that writes the destination, else the last bare query, whose
//!    result the job wrote to the destination
//! 2. Resolve each SELECT's FROM clause into a [`Scope`] of known source
//!    tables, CTEs and derived tables
//! 3. Trace every projected expression back to source columns
//! 4. Name destination columns by the INSERT column list, else by alias

use crate::parser::{ParseError, SqlParser};
use crate::resolver::{match_source, ColumnSource, OutputColumn, Relation, Scope};
use bqlineage_core::{ColumnMapping, Diagnostic, DiagnosticCode, TableReference};
use sqlparser::ast::{
    visit_expressions, Expr, ObjectName, Query, Select, SelectItem, SetExpr, Statement,
    TableFactor, TableWithJoins, WildcardAdditionalOptions,
};
use std::collections::{BTreeMap, BTreeSet};
use std::ops::ControlFlow;

/// Derives column mappings from query text
pub trait SqlAnalyzer: Send + Sync {
    /// Column mappings from `sources` into `destination`
    ///
    /// Mappings are restricted to the given sources. An error means the
    /// caller should fall back to table-level lineage.
    fn analyze(
        &self,
        sql: &str,
        destination: &TableReference,
        sources: &BTreeSet<TableReference>,
    ) -> Result<ColumnLineage, AnalysisError>;
}

/// Column mappings grouped by source table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnLineage {
    mappings: BTreeMap<TableReference, BTreeSet<ColumnMapping>>,
}

impl ColumnLineage {
    /// Create empty lineage
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one mapping from a source table
    pub fn add(&mut self, source: TableReference, mapping: ColumnMapping) {
        self.mappings.entry(source).or_default().insert(mapping);
    }

    /// Mappings contributed by one source
    pub fn for_source(&self, source: &TableReference) -> Option<&BTreeSet<ColumnMapping>> {
        self.mappings.get(source)
    }

    /// Total number of mappings
    pub fn mapping_count(&self) -> usize {
        self.mappings.values().map(BTreeSet::len).sum()
    }

    /// Check if no mapping was found
    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }
}

/// Column-lineage analysis failure
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("Unsupported statement for column lineage: {0}")]
    UnsupportedStatement(String),

    #[error("No statement writes a table")]
    NoWriteStatement,
}

impl AnalysisError {
    /// Stable diagnostic code
    pub fn code(&self) -> DiagnosticCode {
        match self {
            Self::Parse(_) => DiagnosticCode::SqlParseError,
            Self::UnsupportedStatement(_) => DiagnosticCode::SqlUnsupportedStatement,
            Self::NoWriteStatement => DiagnosticCode::SqlNoWriteStatement,
        }
    }

    /// Convert to a warning about the given destination
    ///
    /// Parse failures quote an excerpt of the query text.
    pub fn to_diagnostic(&self, destination: &TableReference) -> Diagnostic {
        let diagnostic = match self {
            Self::Parse(err) => err.to_diagnostic(),
            _ => Diagnostic::warn(self.code(), self.to_string()),
        };
        diagnostic.with_subject(destination.to_string())
    }
}

/// Analyzer that never finds column mappings
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAnalyzer;

impl SqlAnalyzer for NoopAnalyzer {
    fn analyze(
        &self,
        _sql: &str,
        _destination: &TableReference,
        _sources: &BTreeSet<TableReference>,
    ) -> Result<ColumnLineage, AnalysisError> {
        Ok(ColumnLineage::new())
    }
}

/// sqlparser-backed column-lineage analyzer
pub struct ColumnLineageAnalyzer {
    parser: SqlParser,
}

impl ColumnLineageAnalyzer {
    /// Analyzer using the BigQuery dialect
    pub fn new() -> Self {
        Self::with_parser(SqlParser::bigquery())
    }

    /// Analyzer using a custom parser
    pub fn with_parser(parser: SqlParser) -> Self {
        Self { parser }
    }
}

impl Default for ColumnLineageAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl SqlAnalyzer for ColumnLineageAnalyzer {
    fn analyze(
        &self,
        sql: &str,
        destination: &TableReference,
        sources: &BTreeSet<TableReference>,
    ) -> Result<ColumnLineage, AnalysisError> {
        let parsed = self.parser.parse(sql)?;
        let target = write_target(&parsed.statements, destination)?;

        let mut walker = QueryWalker::new(sources);
        let outputs = walker.query(target.query);

        let mut lineage = ColumnLineage::new();
        for (index, output) in outputs.into_iter().enumerate() {
            let Some(column) = target.columns.get(index).cloned().or(output.name) else {
                continue;
            };

            for (source, source_column) in output.sources {
                lineage.add(source, ColumnMapping::new(source_column, column.clone()));
            }
        }

        tracing::debug!(
            destination = %destination,
            mappings = lineage.mapping_count(),
            "Analyzed column lineage"
        );

        Ok(lineage)
    }
}

/// The query whose output lands in the destination
struct WriteTarget<'a> {
    query: &'a Query,

    /// Explicit destination column list, positional
    columns: Vec<String>,
}

fn write_target<'a>(
    statements: &'a [Statement],
    destination: &TableReference,
) -> Result<WriteTarget<'a>, AnalysisError> {
    let destination = BTreeSet::from([destination.sanitized()]);
    let writes_destination = |name: &ObjectName| match_source(&destination, &name_parts(name)).is_some();

    let mut written = None;
    let mut bare_query = None;
    let mut unsupported = None;

    for statement in statements {
        match statement {
            Statement::Insert(insert) if writes_destination(&insert.table_name) => {
                if let Some(source) = &insert.source {
                    written = Some(WriteTarget {
                        query: &**source,
                        columns: insert.columns.iter().map(|c| c.value.clone()).collect(),
                    });
                }
            }
            Statement::CreateTable(create) if writes_destination(&create.name) => {
                if let Some(query) = &create.query {
                    written = Some(WriteTarget {
                        query: &**query,
                        columns: create.columns.iter().map(|c| c.name.value.clone()).collect(),
                    });
                }
            }
            Statement::Query(query) => {
                bare_query = Some(WriteTarget {
                    query: &**query,
                    columns: Vec::new(),
                });
            }
            Statement::Update { .. } => unsupported = Some("UPDATE"),
            Statement::Merge { .. } => unsupported = Some("MERGE"),
            _ => {}
        }
    }

    written.or(bare_query).ok_or_else(|| match unsupported {
        Some(kind) => AnalysisError::UnsupportedStatement(kind.to_string()),
        None => AnalysisError::NoWriteStatement,
    })
}

/// Walks a query, tracking CTEs visible at each level
struct QueryWalker<'a> {
    sources: &'a BTreeSet<TableReference>,
    ctes: Vec<(String, Vec<OutputColumn>)>,
}

impl<'a> QueryWalker<'a> {
    fn new(sources: &'a BTreeSet<TableReference>) -> Self {
        Self {
            sources,
            ctes: Vec::new(),
        }
    }

    fn query(&mut self, query: &Query) -> Vec<OutputColumn> {
        let depth = self.ctes.len();

        if let Some(with) = &query.with {
            for cte in &with.cte_tables {
                let columns = self.query(&cte.query);
                self.ctes.push((cte.alias.name.value.clone(), columns));
            }
        }

        let outputs = self.set_expr(&query.body);
        self.ctes.truncate(depth);
        outputs
    }

    fn set_expr(&mut self, body: &SetExpr) -> Vec<OutputColumn> {
        match body {
            SetExpr::Select(select) => self.select(select),
            SetExpr::Query(query) => self.query(query),
            SetExpr::SetOperation { left, right, .. } => {
                let mut outputs = self.set_expr(left);
                let others = self.set_expr(right);
                for (output, other) in outputs.iter_mut().zip(others) {
                    output.sources.extend(other.sources);
                }
                outputs
            }
            _ => Vec::new(),
        }
    }

    fn select(&mut self, select: &Select) -> Vec<OutputColumn> {
        let mut scope = Scope::new();
        for table in &select.from {
            self.table_with_joins(table, &mut scope);
        }

        let mut outputs = Vec::new();
        for item in &select.projection {
            match item {
                SelectItem::UnnamedExpr(expr) => {
                    outputs.push(OutputColumn::new(expr_name(expr), column_sources(expr, &scope)));
                }
                SelectItem::ExprWithAlias { expr, alias } => {
                    outputs.push(OutputColumn::new(
                        Some(alias.value.clone()),
                        column_sources(expr, &scope),
                    ));
                }
                SelectItem::Wildcard(options) => {
                    outputs.extend(scope.expand_wildcard(None, &except_columns(options)));
                }
                SelectItem::QualifiedWildcard(name, options) => {
                    let qualifier = name_parts(name).join(".");
                    outputs.extend(scope.expand_wildcard(Some(&qualifier), &except_columns(options)));
                }
            }
        }

        outputs
    }

    fn table_with_joins(&mut self, table: &TableWithJoins, scope: &mut Scope) {
        self.table_factor(&table.relation, scope);
        for join in &table.joins {
            self.table_factor(&join.relation, scope);
        }
    }

    fn table_factor(&mut self, factor: &TableFactor, scope: &mut Scope) {
        match factor {
            TableFactor::Table { name, alias, .. } => {
                let parts = name_parts(name);
                let full = parts.join(".");

                let relation = match (parts.len(), self.cte(&full)) {
                    (1, Some(columns)) => Relation::Derived(columns.clone()),
                    _ => match match_source(self.sources, &parts) {
                        Some(table) => Relation::Table(table),
                        None => Relation::Unknown,
                    },
                };

                let names = match alias {
                    Some(alias) => vec![alias.name.value.clone()],
                    None => name_suffixes(&full),
                };

                scope.add(names, relation);
            }
            TableFactor::Derived { subquery, alias, .. } => {
                let columns = self.query(subquery);
                let names = alias.iter().map(|a| a.name.value.clone()).collect();
                scope.add(names, Relation::Derived(columns));
            }
            TableFactor::NestedJoin { table_with_joins, .. } => {
                self.table_with_joins(table_with_joins, scope);
            }
            _ => scope.add(Vec::new(), Relation::Unknown),
        }
    }

    fn cte(&self, name: &str) -> Option<&Vec<OutputColumn>> {
        self.ctes
            .iter()
            .rev()
            .find(|(cte, _)| cte.eq_ignore_ascii_case(name))
            .map(|(_, columns)| columns)
    }
}

/// Every source column an expression reads
fn column_sources(expr: &Expr, scope: &Scope) -> BTreeSet<ColumnSource> {
    let mut sources = BTreeSet::new();

    let _ = visit_expressions(expr, |e| {
        match e {
            Expr::Identifier(ident) => {
                sources.extend(scope.resolve(&[ident.value.clone()]));
            }
            Expr::CompoundIdentifier(idents) => {
                let parts: Vec<String> = idents.iter().map(|i| i.value.clone()).collect();
                sources.extend(scope.resolve(&parts));
            }
            _ => {}
        }
        ControlFlow::<()>::Continue(())
    });

    sources
}

/// Output name of an unaliased expression
fn expr_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Identifier(ident) => Some(ident.value.clone()),
        Expr::CompoundIdentifier(idents) => idents.last().map(|i| i.value.clone()),
        Expr::Nested(inner) => expr_name(inner),
        _ => None,
    }
}

fn except_columns(options: &WildcardAdditionalOptions) -> Vec<String> {
    options
        .opt_except
        .as_ref()
        .map(|except| {
            std::iter::once(&except.first_element)
                .chain(&except.additional_elements)
                .map(|ident| ident.value.clone())
                .collect()
        })
        .unwrap_or_default()
}

fn name_parts(name: &ObjectName) -> Vec<String> {
    name.0.iter().map(|ident| ident.value.clone()).collect()
}

/// `p.d.t` is reachable as `p.d.t`, `d.t` and `t`
fn name_suffixes(full: &str) -> Vec<String> {
    let segments: Vec<&str> = full.split('.').collect();
    (0..segments.len()).map(|i| segments[i..].join(".")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn table(name: &str) -> TableReference {
        TableReference::new("my_project", "my_dataset", name)
    }

    fn sources(names: &[&str]) -> BTreeSet<TableReference> {
        names.iter().map(|name| table(name)).collect()
    }

    fn mappings(pairs: &[(&str, &str)]) -> BTreeSet<ColumnMapping> {
        pairs.iter().map(|(s, d)| ColumnMapping::new(*s, *d)).collect()
    }

    fn analyze(sql: &str, known: &[&str]) -> Result<ColumnLineage, AnalysisError> {
        ColumnLineageAnalyzer::new().analyze(sql, &table("dest"), &sources(known))
    }

    #[test]
    fn insert_with_join_aliases() {
        let sql = r#"
            INSERT INTO `my_project.my_dataset.dest`
            SELECT src1.a, src2.b
            FROM `my_project.my_dataset.source1` src1
            LEFT JOIN `my_project.my_dataset.source2` src2 ON src1.id = src2.id
        "#;

        let lineage = analyze(sql, &["source1", "source2"]).unwrap();
        assert_eq!(lineage.mapping_count(), 2);
        assert_eq!(lineage.for_source(&table("source1")), Some(&mappings(&[("a", "a")])));
        assert_eq!(lineage.for_source(&table("source2")), Some(&mappings(&[("b", "b")])));
    }

    #[test]
    fn ctas_with_aliases() {
        let sql = r#"
            CREATE OR REPLACE TABLE `my_project.my_dataset.dest` AS
            SELECT o.order_id AS id, CONCAT(u.first_name, ' ', u.last_name) AS customer
            FROM my_dataset.orders AS o
            JOIN my_dataset.users AS u ON o.user_id = u.id
        "#;

        let lineage = analyze(sql, &["orders", "users"]).unwrap();
        assert_eq!(lineage.for_source(&table("orders")), Some(&mappings(&[("order_id", "id")])));
        assert_eq!(
            lineage.for_source(&table("users")),
            Some(&mappings(&[("first_name", "customer"), ("last_name", "customer")]))
        );
    }

    #[test]
    fn insert_column_list_names_destination() {
        let sql = "INSERT INTO `my_project.my_dataset.dest` (total, label) \
                   SELECT amount * 2, name FROM `my_project.my_dataset.orders`";

        let lineage = analyze(sql, &["orders"]).unwrap();
        assert_eq!(
            lineage.for_source(&table("orders")),
            Some(&mappings(&[("amount", "total"), ("name", "label")]))
        );
    }

    #[test]
    fn cte_and_subquery_resolve_to_sources() {
        let sql = r#"
            INSERT INTO `my_project.my_dataset.dest`
            WITH recent AS (
                SELECT user_id, amount AS spend FROM `my_project.my_dataset.orders`
            )
            SELECT r.user_id, r.spend, x.region
            FROM recent r
            JOIN (SELECT id, country AS region FROM `my_project.my_dataset.users`) x
              ON r.user_id = x.id
        "#;

        let lineage = analyze(sql, &["orders", "users"]).unwrap();
        assert_eq!(
            lineage.for_source(&table("orders")),
            Some(&mappings(&[("amount", "spend"), ("user_id", "user_id")]))
        );
        assert_eq!(lineage.for_source(&table("users")), Some(&mappings(&[("country", "region")])));
    }

    #[test]
    fn union_branches_merge_positionally() {
        let sql = r#"
            INSERT INTO `my_project.my_dataset.dest`
            SELECT id, amount FROM `my_project.my_dataset.orders_eu`
            UNION ALL
            SELECT id, total FROM `my_project.my_dataset.orders_us`
        "#;

        let lineage = analyze(sql, &["orders_eu", "orders_us"]).unwrap();
        assert_eq!(
            lineage.for_source(&table("orders_us")),
            Some(&mappings(&[("id", "id"), ("total", "amount")]))
        );
    }

    #[test]
    fn wildcard_over_cte_expands_with_except() {
        let sql = r#"
            CREATE TABLE `my_project.my_dataset.dest` AS
            WITH base AS (SELECT id, email, password FROM `my_project.my_dataset.users`)
            SELECT * EXCEPT (password) FROM base
        "#;

        let lineage = analyze(sql, &["users"]).unwrap();
        assert_eq!(
            lineage.for_source(&table("users")),
            Some(&mappings(&[("email", "email"), ("id", "id")]))
        );
    }

    #[test]
    fn unknown_tables_are_ignored() {
        let sql = "INSERT INTO `my_project.my_dataset.dest` \
                   SELECT a FROM `other_project.other.elsewhere`";

        let lineage = analyze(sql, &["orders"]).unwrap();
        assert!(lineage.is_empty());
    }

    #[test]
    fn script_uses_write_to_destination() {
        let sql = r#"
            CREATE TEMP TABLE staging AS SELECT id FROM `my_project.my_dataset.ignored`;
            INSERT INTO `my_project.my_dataset.dest` SELECT id AS key FROM `my_project.my_dataset.orders`;
        "#;

        let lineage = analyze(sql, &["orders", "ignored"]).unwrap();
        assert_eq!(lineage.mapping_count(), 1);
        assert_eq!(lineage.for_source(&table("orders")), Some(&mappings(&[("id", "key")])));
    }

    #[test]
    fn later_writes_to_other_tables_are_ignored() {
        let sql = "INSERT INTO dest SELECT a AS x FROM src; \
                   INSERT INTO other SELECT b AS y FROM src; \
                   CREATE TABLE `my_project.my_dataset.archive` AS SELECT c AS z FROM src";

        let lineage = analyze(sql, &["src"]).unwrap();
        assert_eq!(lineage.mapping_count(), 1);
        assert_eq!(lineage.for_source(&table("src")), Some(&mappings(&[("a", "x")])));
    }

    #[test]
    fn destination_matches_sharded_and_case_insensitive_project() {
        let sql = "INSERT INTO `My_Project.my_dataset.dest_20240101` SELECT a FROM `my_project.my_dataset.src`; \
                   INSERT INTO `my_project.my_dataset.other` SELECT b FROM `my_project.my_dataset.src`";

        let lineage = analyze(sql, &["src"]).unwrap();
        assert_eq!(lineage.for_source(&table("src")), Some(&mappings(&[("a", "a")])));
    }

    #[test]
    fn writes_to_other_tables_only_fall_back_to_bare_query() {
        let other = "INSERT INTO `my_project.my_dataset.other` SELECT b FROM `my_project.my_dataset.src`";
        let err = analyze(other, &["src"]).unwrap_err();
        assert_eq!(err.code(), DiagnosticCode::SqlNoWriteStatement);

        let with_query = format!("{}; SELECT a FROM `my_project.my_dataset.src`", other);
        let lineage = analyze(&with_query, &["src"]).unwrap();
        assert_eq!(lineage.for_source(&table("src")), Some(&mappings(&[("a", "a")])));
    }

    #[test]
    fn bare_select_is_written_to_destination() {
        let lineage = analyze("SELECT id FROM `my_project.my_dataset.orders`", &["orders"]).unwrap();
        assert_eq!(lineage.for_source(&table("orders")), Some(&mappings(&[("id", "id")])));
    }

    #[test]
    fn update_is_unsupported() {
        let err = analyze("UPDATE `my_project.my_dataset.dest` SET a = 1 WHERE true", &["orders"])
            .unwrap_err();
        assert!(matches!(err, AnalysisError::UnsupportedStatement(ref kind) if kind == "UPDATE"));
        assert_eq!(err.code(), DiagnosticCode::SqlUnsupportedStatement);
    }

    #[test]
    fn unparsable_sql_is_a_parse_error() {
        let err = analyze("INSERT INTO `my_project.my_dataset.dest` SELECT (((", &["orders"]).unwrap_err();
        assert_eq!(err.code(), DiagnosticCode::SqlParseError);

        let diag = err.to_diagnostic(&table("dest"));
        assert_eq!(diag.code, DiagnosticCode::SqlParseError);
        assert!(diag.message.contains("in `INSERT INTO `my_project.my_dataset.dest` SELECT (((`"));
        assert_eq!(diag.subject.as_deref(), Some("projects/my_project/datasets/my_dataset/tables/dest"));
    }

    #[test]
    fn noop_analyzer_finds_nothing() {
        let lineage = NoopAnalyzer
            .analyze("INSERT INTO t SELECT a FROM s", &table("dest"), &sources(&["s"]))
            .unwrap();
        assert!(lineage.is_empty());
    }
}
