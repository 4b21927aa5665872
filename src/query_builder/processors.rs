//! # Query processors
//!
//! A [`QueryProcessor`] is a named, pure transform `QueryBuilder -> QueryBuilder`.
//! Callers assemble a list of processors, often conditionally, and hand it to a
//! repository operation, which folds them left to right before injecting its
//! own tenant and soft-delete guards.
//!
//! ```rust,ignore
//! let total = TotalCount::new();
//! let processors = vec![
//!     QueryProcessor::filter(Predicate::like("modules.name", "%rust%")),
//!     search.tag_id.map(|tag| QueryProcessor::filter(tag_predicate(tag))).into(),
//!     QueryProcessor::order_by("modules.name ASC"),
//!     QueryProcessor::paginate(20, 0, &total),
//! ];
//! let modules = repo.get_all_for_tenant(&mut scope, tenant_id, &processors).await?;
//! ```

use super::builder::{QueryBuilder, SubQuery};
use super::conditions::{Predicate, SqlFragment};
use super::joins::Join;
use super::operators::{group_field_filters, parse_field_filters, FieldFilter};
use super::pagination::{Pagination, TotalCount};
use super::value::Value;
use crate::models::Entity;
use std::fmt;
use std::sync::Arc;

type Transform = Arc<dyn Fn(QueryBuilder) -> QueryBuilder + Send + Sync>;

/// A composable query transform. `None` converts to a no-op, so optional
/// filters can sit in a processor list without branching.
#[derive(Clone)]
pub struct QueryProcessor {
    name: &'static str,
    transform: Option<Transform>,
}

impl fmt::Debug for QueryProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryProcessor")
            .field("name", &self.name)
            .field("noop", &self.transform.is_none())
            .finish()
    }
}

impl From<Option<QueryProcessor>> for QueryProcessor {
    fn from(processor: Option<QueryProcessor>) -> Self {
        processor.unwrap_or_else(QueryProcessor::noop)
    }
}

impl QueryProcessor {
    fn new(
        name: &'static str,
        transform: impl Fn(QueryBuilder) -> QueryBuilder + Send + Sync + 'static,
    ) -> Self {
        Self {
            name,
            transform: Some(Arc::new(transform)),
        }
    }

    pub fn noop() -> Self {
        Self {
            name: "noop",
            transform: None,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_noop(&self) -> bool {
        self.transform.is_none()
    }

    pub(crate) fn apply_to(&self, builder: QueryBuilder) -> QueryBuilder {
        match &self.transform {
            Some(transform) => transform(builder),
            None => builder,
        }
    }

    /// AND a predicate into the WHERE clause.
    pub fn filter(predicate: Predicate) -> Self {
        Self::new("filter", move |builder| builder.filter(predicate.clone()))
    }

    /// AND a verbatim condition into the WHERE clause.
    pub fn filter_raw(condition: impl Into<String>, args: Vec<Value>) -> Self {
        Self::filter(Predicate::raw(condition, args))
    }

    /// Per-column comparisons joined by `AND`/`OR`.
    ///
    /// `operators[i]` joins column `i` to column `i + 1`; the last entry is
    /// ignored. AND binds tighter than OR and the whole group is
    /// parenthesised, so `[a, b]`, `["=?", ">=?"]`, `["AND", "OR"]`,
    /// `[5, 10]` becomes `(a = ? AND b >= ?)`.
    pub fn filter_with_operator(
        columns: &[&str],
        conditions: &[&str],
        operators: &[&str],
        values: Vec<Value>,
    ) -> Self {
        let parsed = parse_field_filters(columns, conditions, operators, values)
            .and_then(group_field_filters);
        Self::new("filter_with_operator", move |builder| match &parsed {
            Ok(Some(predicate)) => builder.filter(predicate.clone()),
            Ok(None) => builder,
            Err(e) => builder.fail(e.clone()),
        })
    }

    /// Typed equivalent of [`QueryProcessor::filter_with_operator`].
    pub fn filter_fields(filters: Vec<FieldFilter>) -> Self {
        let grouped = group_field_filters(filters);
        Self::new("filter_fields", move |builder| match &grouped {
            Ok(Some(predicate)) => builder.filter(predicate.clone()),
            Ok(None) => builder,
            Err(e) => builder.fail(e.clone()),
        })
    }

    pub fn join(join: Join) -> Self {
        Self::new("join", move |builder| builder.join(join.clone()))
    }

    pub fn join_raw(clause: impl Into<String>) -> Self {
        let join = Join::raw(clause);
        Self::new("join", move |builder| builder.join(join.clone()))
    }

    pub fn select(columns: &[&str]) -> Self {
        let columns: Vec<String> = columns.iter().map(|c| c.to_string()).collect();
        Self::new("select", move |builder| {
            let items: Vec<&str> = columns.iter().map(String::as_str).collect();
            builder.select(&items)
        })
    }

    pub fn select_subquery(subquery: SubQuery, alias: &str) -> Self {
        let alias = alias.to_string();
        Self::new("select_subquery", move |builder| {
            builder.select_subquery(subquery.clone(), &alias)
        })
    }

    /// Read from another table (e.g. a view) instead of the entity's own.
    pub fn table(name: &str) -> Self {
        let name = name.to_string();
        Self::new("table", move |builder| builder.table(&name, None))
    }

    pub fn table_as(name: &str, alias: &str) -> Self {
        let (name, alias) = (name.to_string(), alias.to_string());
        Self::new("table", move |builder| builder.table(&name, Some(&alias)))
    }

    pub fn order_by(clause: &str) -> Self {
        let clause = clause.to_string();
        Self::new("order_by", move |builder| builder.order_by(&clause))
    }

    pub fn group_by(clause: &str) -> Self {
        let clause = clause.to_string();
        Self::new("group_by", move |builder| builder.group_by(&clause))
    }

    pub fn having(predicate: Predicate) -> Self {
        Self::new("having", move |builder| builder.having(predicate.clone()))
    }

    /// Limit/offset the read and record the unpaged total in `total`.
    pub fn paginate(limit: u32, offset: u32, total: &TotalCount) -> Self {
        let total = total.clone();
        Self::new("paginate", move |builder| {
            builder.paginate(Pagination::limit_offset(limit, offset), Some(total.clone()))
        })
    }

    pub fn limit(limit: u32) -> Self {
        Self::new("limit", move |builder| builder.limit(limit))
    }

    /// Eager-load relations by name. Dotted paths (`"sub_topics.programming_questions"`)
    /// load nested relations.
    pub fn preload_associations(names: &[&str]) -> Self {
        let names: Vec<String> = names.iter().map(|n| n.to_string()).collect();
        Self::new("preload_associations", move |builder| {
            names
                .iter()
                .fold(builder, |builder, name| builder.preload(name, Vec::new()))
        })
    }

    /// Eager-load one relation with its query scoped by `processors`.
    pub fn preload_with_condition(name: &str, processors: Vec<QueryProcessor>) -> Self {
        let name = name.to_string();
        Self::new("preload_with_condition", move |builder| {
            builder.preload(&name, processors.clone())
        })
    }

    /// Replace the whole statement. Rejected by tenant-scoped operations.
    pub fn raw_query(sql: impl Into<String>, args: Vec<Value>) -> Self {
        let fragment = SqlFragment::new(sql, args);
        Self::new("raw_query", move |builder| {
            builder.raw_statement(fragment.clone())
        })
    }

    /// Include soft-deleted rows in this read.
    pub fn with_deleted() -> Self {
        Self::new("with_deleted", QueryBuilder::include_deleted)
    }
}

/// A nested SELECT over `E`'s table with `processors` applied.
pub fn sub_query<E: Entity>(processors: &[QueryProcessor]) -> SubQuery {
    SubQuery::of::<E>(processors)
}
