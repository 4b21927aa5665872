use super::conditions::{write_conjunction, Column, Predicate, SqlFragment};
use super::joins::Join;
use super::pagination::{Pagination, TotalCount};
use super::processors::QueryProcessor;
use super::value::{validate_clause, Rendered, SqlWriter};
use crate::constants::columns;
use crate::error::{DataError, Result};
use crate::models::Entity;
use uuid::Uuid;

#[derive(Debug, Clone)]
enum SelectItem {
    Expr(String),
    Subquery { query: SubQuery, alias: String },
}

/// An eager-load request recorded by a preload processor.
#[derive(Debug, Clone)]
pub(crate) struct PreloadRequest {
    pub path: String,
    pub processors: Vec<QueryProcessor>,
}

/// Accumulates the parts of one SELECT statement.
///
/// Processors fold onto a builder in call order. The tenant and soft-delete
/// guards are only reachable from inside the crate: the repository sets them
/// after every caller-supplied processor has run, and they render ahead of
/// all other predicates.
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    table: String,
    alias: String,
    select: Vec<SelectItem>,
    joins: Vec<Join>,
    predicates: Vec<Predicate>,
    group_by: Vec<String>,
    having: Vec<Predicate>,
    order_by: Vec<String>,
    pagination: Option<Pagination>,
    total_count: Option<TotalCount>,
    preloads: Vec<PreloadRequest>,
    raw: Option<SqlFragment>,
    include_deleted: bool,
    tenant_guard: Option<Uuid>,
    soft_delete_guard: bool,
    error: Option<DataError>,
}

impl QueryBuilder {
    /// Create a new query builder for the given table
    pub fn new(table: &str) -> Self {
        Self::with_alias(table, table)
    }

    pub fn with_alias(table: &str, alias: &str) -> Self {
        Self {
            table: table.to_string(),
            alias: alias.to_string(),
            select: Vec::new(),
            joins: Vec::new(),
            predicates: Vec::new(),
            group_by: Vec::new(),
            having: Vec::new(),
            order_by: Vec::new(),
            pagination: None,
            total_count: None,
            preloads: Vec::new(),
            raw: None,
            include_deleted: false,
            tenant_guard: None,
            soft_delete_guard: false,
            error: None,
        }
    }

    /// Fold processors onto the builder, left to right.
    pub fn apply(self, processors: &[QueryProcessor]) -> Self {
        processors
            .iter()
            .fold(self, |builder, processor| processor.apply_to(builder))
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// Replace the source table. The alias follows the table unless one is given.
    pub fn table(mut self, table: &str, alias: Option<&str>) -> Self {
        self.table = table.to_string();
        self.alias = alias.unwrap_or(table).to_string();
        self
    }

    /// Set the projection. Each item is an identifier or expression such as
    /// `"COUNT(*) AS total"`.
    pub fn select(mut self, items: &[&str]) -> Self {
        self.select = items
            .iter()
            .map(|item| SelectItem::Expr(item.to_string()))
            .collect();
        self
    }

    /// Append `(subquery) AS alias` to the projection.
    pub fn select_subquery(mut self, query: SubQuery, alias: &str) -> Self {
        if self.select.is_empty() {
            self.select
                .push(SelectItem::Expr(format!("{}.*", self.alias)));
        }
        self.select.push(SelectItem::Subquery {
            query,
            alias: alias.to_string(),
        });
        self
    }

    pub fn join(mut self, join: Join) -> Self {
        self.joins.push(join);
        self
    }

    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn group_by(mut self, clause: &str) -> Self {
        self.group_by.push(clause.to_string());
        self
    }

    pub fn having(mut self, predicate: Predicate) -> Self {
        self.having.push(predicate);
        self
    }

    pub fn order_by(mut self, clause: &str) -> Self {
        self.order_by.push(clause.to_string());
        self
    }

    pub fn paginate(mut self, pagination: Pagination, total: Option<TotalCount>) -> Self {
        self.pagination = Some(pagination);
        self.total_count = total;
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        match self.pagination.as_mut() {
            Some(pagination) => pagination.limit = Some(limit),
            None => self.pagination = Some(Pagination::limit_only(limit)),
        }
        self
    }

    pub(crate) fn preload(mut self, path: &str, processors: Vec<QueryProcessor>) -> Self {
        self.preloads.push(PreloadRequest {
            path: path.to_string(),
            processors,
        });
        self
    }

    /// Replace the whole statement.
    pub fn raw_statement(mut self, fragment: SqlFragment) -> Self {
        self.raw = Some(fragment);
        self
    }

    pub fn include_deleted(mut self) -> Self {
        self.include_deleted = true;
        self
    }

    /// Record a construction error. The first one is reported at render time.
    pub fn fail(mut self, error: DataError) -> Self {
        if self.error.is_none() {
            self.error = Some(error);
        }
        self
    }

    pub fn has_joins(&self) -> bool {
        !self.joins.is_empty()
    }

    pub fn has_filters(&self) -> bool {
        !self.predicates.is_empty()
    }

    pub fn has_order(&self) -> bool {
        !self.order_by.is_empty()
    }

    pub fn is_grouped(&self) -> bool {
        !self.group_by.is_empty() || !self.having.is_empty()
    }

    pub fn is_raw(&self) -> bool {
        self.raw.is_some()
    }

    pub fn includes_deleted(&self) -> bool {
        self.include_deleted
    }

    pub fn pagination(&self) -> Option<Pagination> {
        self.pagination
    }

    pub fn total_count(&self) -> Option<&TotalCount> {
        self.total_count.as_ref()
    }

    pub fn error(&self) -> Option<&DataError> {
        self.error.as_ref()
    }

    pub(crate) fn preloads(&self) -> &[PreloadRequest] {
        &self.preloads
    }

    pub(crate) fn scope_to_tenant(mut self, tenant_id: Uuid) -> Self {
        self.tenant_guard = Some(tenant_id);
        self
    }

    /// Exclude soft-deleted rows unless the caller opted in with `with_deleted`.
    pub(crate) fn exclude_deleted(mut self) -> Self {
        self.soft_delete_guard = true;
        self
    }

    pub(crate) fn clear_projection(mut self) -> Self {
        self.select.clear();
        self
    }

    pub(crate) fn clear_pagination(mut self) -> Self {
        self.pagination = None;
        self.total_count = None;
        self
    }

    fn check(&self) -> Result<()> {
        match &self.error {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    fn guard_predicates(&self) -> Vec<Predicate> {
        let mut guards = Vec::new();
        if let Some(tenant_id) = self.tenant_guard {
            guards.push(Predicate::eq(
                Column::qualified(&self.alias, columns::TENANT_ID),
                tenant_id,
            ));
        }
        if self.soft_delete_guard && !self.include_deleted {
            guards.push(Predicate::is_null(Column::qualified(
                &self.alias,
                columns::DELETED_AT,
            )));
        }
        guards
    }

    fn write_projection(&self, writer: &mut SqlWriter) {
        if self.select.is_empty() {
            writer.push_identifier(&self.alias);
            writer.push(".*");
            return;
        }
        for (i, item) in self.select.iter().enumerate() {
            if i > 0 {
                writer.push(", ");
            }
            match item {
                SelectItem::Expr(expr) => match validate_clause("select", expr) {
                    Ok(()) => writer.push(expr),
                    Err(e) => writer.fail(e),
                },
                SelectItem::Subquery { query, alias } => {
                    writer.push("(");
                    query.write(writer);
                    writer.push(") AS ");
                    writer.push_identifier(alias);
                }
            }
        }
    }

    fn write_from(&self, writer: &mut SqlWriter) {
        writer.push(" FROM ");
        writer.push_identifier(&self.table);
        if self.alias != self.table {
            writer.push(" AS ");
            writer.push_identifier(&self.alias);
        }
        for join in &self.joins {
            writer.push(" ");
            join.write(writer);
        }
    }

    /// Writes ` WHERE ...` when there is anything to filter on.
    pub(crate) fn write_where(&self, writer: &mut SqlWriter) {
        let guards = self.guard_predicates();
        let all: Vec<&Predicate> = guards.iter().chain(self.predicates.iter()).collect();
        if all.is_empty() {
            return;
        }
        writer.push(" WHERE ");
        write_conjunction(writer, &all);
    }

    fn write_grouping(&self, writer: &mut SqlWriter) {
        if !self.group_by.is_empty() {
            writer.push(" GROUP BY ");
            write_clauses(writer, "group by", &self.group_by);
        }
        if !self.having.is_empty() {
            writer.push(" HAVING ");
            let having: Vec<&Predicate> = self.having.iter().collect();
            write_conjunction(writer, &having);
        }
    }

    fn write_ordering(&self, writer: &mut SqlWriter) {
        if !self.order_by.is_empty() {
            writer.push(" ORDER BY ");
            write_clauses(writer, "order by", &self.order_by);
        }
        if let Some(pagination) = &self.pagination {
            writer.push(&pagination.to_sql());
        }
    }

    pub(crate) fn write_statement(&self, writer: &mut SqlWriter) {
        if let Some(error) = &self.error {
            writer.fail(error.clone());
            return;
        }
        if let Some(raw) = &self.raw {
            raw.write(writer, "statement");
            return;
        }
        writer.push("SELECT ");
        self.write_projection(writer);
        self.write_from(writer);
        self.write_where(writer);
        self.write_grouping(writer);
        self.write_ordering(writer);
    }

    /// Build the complete SELECT statement
    pub fn build_select(&self) -> Result<Rendered> {
        self.check()?;
        let mut writer = SqlWriter::new();
        self.write_statement(&mut writer);
        writer.finish()
    }

    /// Count of rows the statement matches, ignoring limit/offset. A grouped
    /// query counts its groups.
    pub fn build_count(&self) -> Result<Rendered> {
        self.check()?;
        let mut writer = SqlWriter::new();
        if let Some(raw) = &self.raw {
            writer.push("SELECT COUNT(*) FROM (");
            raw.write(&mut writer, "statement");
            writer.push(") AS raw_rows");
        } else if self.is_grouped() {
            writer.push("SELECT COUNT(*) FROM (SELECT 1");
            self.write_from(&mut writer);
            self.write_where(&mut writer);
            self.write_grouping(&mut writer);
            writer.push(") AS grouped_rows");
        } else {
            writer.push("SELECT COUNT(*)");
            self.write_from(&mut writer);
            self.write_where(&mut writer);
        }
        writer.finish()
    }

    pub fn build_exists(&self) -> Result<Rendered> {
        self.check()?;
        let mut writer = SqlWriter::new();
        writer.push("SELECT EXISTS(");
        if let Some(raw) = &self.raw {
            raw.write(&mut writer, "statement");
        } else {
            writer.push("SELECT 1");
            self.write_from(&mut writer);
            self.write_where(&mut writer);
            self.write_grouping(&mut writer);
        }
        writer.push(")");
        writer.finish()
    }
}

fn write_clauses(writer: &mut SqlWriter, kind: &str, clauses: &[String]) {
    for (i, clause) in clauses.iter().enumerate() {
        if i > 0 {
            writer.push(", ");
        }
        match validate_clause(kind, clause) {
            Ok(()) => writer.push(clause),
            Err(e) => writer.fail(e),
        }
    }
}

/// A nested SELECT over an entity's table, usable in
/// [`Predicate::in_subquery`], [`Predicate::exists`] and
/// [`QueryProcessor::select_subquery`].
#[derive(Debug, Clone)]
pub struct SubQuery {
    builder: QueryBuilder,
}

impl SubQuery {
    pub fn of<E: Entity>(processors: &[QueryProcessor]) -> Self {
        let mut builder = QueryBuilder::new(E::TABLE);
        if E::SOFT_DELETE {
            builder = builder.exclude_deleted();
        }
        Self {
            builder: builder.apply(processors),
        }
    }

    pub fn build(&self) -> Result<Rendered> {
        self.builder.build_select()
    }

    pub(crate) fn write(&self, writer: &mut SqlWriter) {
        self.builder.write_statement(writer);
    }
}
