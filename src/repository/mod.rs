//! # Generic Repository
//!
//! [`Repository<E>`] runs CRUD, counting, existence and projection reads for
//! any [`Entity`] on a caller-supplied [`UnitOfWork`]. Callers shape reads
//! with [`QueryProcessor`]s; the repository folds them, then adds its own
//! guards:
//!
//! - `*_for_tenant` operations always add `tenant_id = ?` ahead of every
//!   caller predicate, and refuse `raw_query` because no guard could be added
//! - entities with `SOFT_DELETE` exclude rows with a `deleted_at` unless the
//!   caller passes `with_deleted()`
//!
//! Writes are in [`writes`], association mutation in [`associations`] and
//! eager loading in [`preload`].

pub mod associations;
pub(crate) mod executor;
pub mod preload;
pub mod writes;

pub use writes::FieldMap;

use crate::constants::{columns, DEFAULT_ORDER};
use crate::database::UnitOfWork;
use crate::error::{DataError, Result};
use crate::models::Entity;
use crate::query_builder::{Column, Page, Pagination, Predicate, QueryBuilder, QueryProcessor, TotalCount};
use preload::PreloadTree;
use sqlx::sqlite::SqliteRow;
use sqlx::FromRow;
use std::marker::PhantomData;
use uuid::Uuid;

/// Per-instance repository behaviour.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryConfig {
    /// Ordering used by the `*_in_order` and paged reads when the caller gives none.
    pub default_order: Vec<String>,
    /// Relations eagerly loaded on every entity read.
    pub preloads: Vec<String>,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            default_order: DEFAULT_ORDER.iter().map(|s| s.to_string()).collect(),
            preloads: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Repository<E: Entity> {
    config: RepositoryConfig,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> Default for Repository<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// Qualify a bare `column [direction]` clause with `alias`.
pub(crate) fn qualify_clause(alias: &str, clause: &str) -> String {
    let clause = clause.trim();
    let head = clause.split_whitespace().next().unwrap_or_default();
    if head.contains('.') || head.contains('(') {
        clause.to_string()
    } else {
        format!("{alias}.{clause}")
    }
}

impl<E: Entity> Repository<E> {
    pub fn new() -> Self {
        Self::with_config(RepositoryConfig::default())
    }

    pub fn with_config(config: RepositoryConfig) -> Self {
        Self {
            config,
            _entity: PhantomData,
        }
    }

    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    /// Fold `processors`, then add the tenant and soft-delete guards.
    pub(crate) fn builder(
        &self,
        processors: &[QueryProcessor],
        tenant_id: Option<Uuid>,
    ) -> Result<QueryBuilder> {
        let mut builder = QueryBuilder::new(E::TABLE).apply(processors);
        if let Some(tenant_id) = tenant_id {
            if builder.is_raw() {
                return Err(DataError::invalid_query(
                    "raw_query cannot be used with a tenant-scoped operation",
                ));
            }
            builder = builder.scope_to_tenant(tenant_id);
        }
        if E::SOFT_DELETE {
            builder = builder.exclude_deleted();
        }
        Ok(builder)
    }

    fn ordered(&self, builder: QueryBuilder) -> QueryBuilder {
        if builder.has_order() || builder.is_raw() {
            return builder;
        }
        let alias = builder.alias().to_string();
        self.config
            .default_order
            .iter()
            .fold(builder, |builder, clause| {
                builder.order_by(&qualify_clause(&alias, clause))
            })
    }

    fn by_id(builder: QueryBuilder, id: Uuid) -> QueryBuilder {
        let column = Column::qualified(builder.alias(), columns::ID);
        builder.filter(Predicate::eq(column, id))
    }

    async fn fetch_entities<U>(
        &self,
        uow: &mut U,
        builder: &QueryBuilder,
        tenant_id: Option<Uuid>,
        operation: &'static str,
    ) -> Result<Vec<E>>
    where
        U: UnitOfWork + ?Sized,
    {
        let rendered = builder.build_select()?;
        let conn = uow.connection()?;
        let mut rows: Vec<E> = executor::fetch_all(&mut *conn, &rendered).await?;

        if let Some(total) = builder.total_count() {
            let count = executor::fetch_i64(&mut *conn, &builder.build_count()?).await?;
            total.set(count);
        }

        let tree = PreloadTree::build(&self.config.preloads, builder.preloads());
        if !tree.is_empty() && !rows.is_empty() {
            tree.load(&mut *conn, &mut rows, tenant_id).await?;
        }

        tracing::debug!(
            table = E::TABLE,
            operation,
            rows = rows.len(),
            "repository read"
        );
        Ok(rows)
    }

    async fn fetch_first<U>(
        &self,
        uow: &mut U,
        builder: QueryBuilder,
        tenant_id: Option<Uuid>,
        operation: &'static str,
    ) -> Result<E>
    where
        U: UnitOfWork + ?Sized,
    {
        let builder = builder.limit(1);
        self.fetch_entities(uow, &builder, tenant_id, operation)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| DataError::not_found(E::TABLE, "no record matches the query"))
    }

    /// Exactly one row matching `processors`; none is `NotFound`.
    pub async fn get_record<U>(&self, uow: &mut U, processors: &[QueryProcessor]) -> Result<E>
    where
        U: UnitOfWork + ?Sized,
    {
        let builder = self.builder(processors, None)?;
        self.fetch_first(uow, builder, None, "get_record").await
    }

    pub async fn get_record_for_tenant<U>(
        &self,
        uow: &mut U,
        tenant_id: Uuid,
        processors: &[QueryProcessor],
    ) -> Result<E>
    where
        U: UnitOfWork + ?Sized,
    {
        let builder = self.builder(processors, Some(tenant_id))?;
        self.fetch_first(uow, builder, Some(tenant_id), "get_record_for_tenant")
            .await
    }

    /// The record with primary key `id` inside `tenant_id`.
    pub async fn get_for_tenant<U>(
        &self,
        uow: &mut U,
        tenant_id: Uuid,
        id: Uuid,
        processors: &[QueryProcessor],
    ) -> Result<E>
    where
        U: UnitOfWork + ?Sized,
    {
        let builder = Self::by_id(self.builder(processors, Some(tenant_id))?, id);
        self.fetch_first(uow, builder, Some(tenant_id), "get_for_tenant")
            .await
            .map_err(|e| match e {
                DataError::NotFound(_) => DataError::not_found(E::TABLE, format!("id {id}")),
                other => other,
            })
    }

    pub async fn get_all<U>(&self, uow: &mut U, processors: &[QueryProcessor]) -> Result<Vec<E>>
    where
        U: UnitOfWork + ?Sized,
    {
        let builder = self.builder(processors, None)?;
        self.fetch_entities(uow, &builder, None, "get_all").await
    }

    pub async fn get_all_for_tenant<U>(
        &self,
        uow: &mut U,
        tenant_id: Uuid,
        processors: &[QueryProcessor],
    ) -> Result<Vec<E>>
    where
        U: UnitOfWork + ?Sized,
    {
        let builder = self.builder(processors, Some(tenant_id))?;
        self.fetch_entities(uow, &builder, Some(tenant_id), "get_all_for_tenant")
            .await
    }

    /// Like [`Repository::get_all`], applying the configured ordering when
    /// the processors order nothing.
    pub async fn get_all_in_order<U>(
        &self,
        uow: &mut U,
        processors: &[QueryProcessor],
    ) -> Result<Vec<E>>
    where
        U: UnitOfWork + ?Sized,
    {
        let builder = self.ordered(self.builder(processors, None)?);
        self.fetch_entities(uow, &builder, None, "get_all_in_order")
            .await
    }

    pub async fn get_all_in_order_for_tenant<U>(
        &self,
        uow: &mut U,
        tenant_id: Uuid,
        processors: &[QueryProcessor],
    ) -> Result<Vec<E>>
    where
        U: UnitOfWork + ?Sized,
    {
        let builder = self.ordered(self.builder(processors, Some(tenant_id))?);
        self.fetch_entities(uow, &builder, Some(tenant_id), "get_all_in_order_for_tenant")
            .await
    }

    /// One ordered page plus the count of every matching row.
    pub async fn get_page<U>(
        &self,
        uow: &mut U,
        limit: u32,
        offset: u32,
        processors: &[QueryProcessor],
    ) -> Result<Page<E>>
    where
        U: UnitOfWork + ?Sized,
    {
        let builder = self.builder(processors, None)?;
        self.page(uow, builder, None, limit, offset).await
    }

    pub async fn get_page_for_tenant<U>(
        &self,
        uow: &mut U,
        tenant_id: Uuid,
        limit: u32,
        offset: u32,
        processors: &[QueryProcessor],
    ) -> Result<Page<E>>
    where
        U: UnitOfWork + ?Sized,
    {
        let builder = self.builder(processors, Some(tenant_id))?;
        self.page(uow, builder, Some(tenant_id), limit, offset).await
    }

    async fn page<U>(
        &self,
        uow: &mut U,
        builder: QueryBuilder,
        tenant_id: Option<Uuid>,
        limit: u32,
        offset: u32,
    ) -> Result<Page<E>>
    where
        U: UnitOfWork + ?Sized,
    {
        let total = TotalCount::new();
        let pagination = Pagination::limit_offset(limit, offset);
        let builder = self
            .ordered(builder)
            .paginate(pagination, Some(total.clone()));
        let items = self
            .fetch_entities(uow, &builder, tenant_id, "get_page")
            .await?;
        Ok(Page::new(items, total.get(), pagination))
    }

    /// Number of matching rows (distinct groups for a grouped query).
    pub async fn get_count<U>(&self, uow: &mut U, processors: &[QueryProcessor]) -> Result<i64>
    where
        U: UnitOfWork + ?Sized,
    {
        let builder = self.builder(processors, None)?;
        self.count(uow, &builder).await
    }

    pub async fn get_count_for_tenant<U>(
        &self,
        uow: &mut U,
        tenant_id: Uuid,
        processors: &[QueryProcessor],
    ) -> Result<i64>
    where
        U: UnitOfWork + ?Sized,
    {
        let builder = self.builder(processors, Some(tenant_id))?;
        self.count(uow, &builder).await
    }

    async fn count<U>(&self, uow: &mut U, builder: &QueryBuilder) -> Result<i64>
    where
        U: UnitOfWork + ?Sized,
    {
        let rendered = builder.build_count()?;
        let count = executor::fetch_i64(uow.connection()?, &rendered).await?;
        tracing::debug!(table = E::TABLE, count, "repository count");
        Ok(count)
    }

    pub async fn does_record_exist<U>(
        &self,
        uow: &mut U,
        processors: &[QueryProcessor],
    ) -> Result<bool>
    where
        U: UnitOfWork + ?Sized,
    {
        let builder = self.builder(processors, None)?;
        let flag = executor::fetch_i64(uow.connection()?, &builder.build_exists()?).await?;
        Ok(flag != 0)
    }

    pub async fn does_record_exist_for_tenant<U>(
        &self,
        uow: &mut U,
        tenant_id: Uuid,
        processors: &[QueryProcessor],
    ) -> Result<bool>
    where
        U: UnitOfWork + ?Sized,
    {
        let builder = self.builder(processors, Some(tenant_id))?;
        let flag = executor::fetch_i64(uow.connection()?, &builder.build_exists()?).await?;
        Ok(flag != 0)
    }

    /// Arbitrary projection into `D`. No primary-key or soft-delete
    /// semantics apply; the processors decide what is read.
    pub async fn scan<D, U>(&self, uow: &mut U, processors: &[QueryProcessor]) -> Result<Vec<D>>
    where
        D: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
        U: UnitOfWork + ?Sized,
    {
        let builder = QueryBuilder::new(E::TABLE).apply(processors);
        self.project(uow, &builder).await
    }

    /// [`Repository::scan`] restricted to one tenant.
    pub async fn scan_for_tenant<D, U>(
        &self,
        uow: &mut U,
        tenant_id: Uuid,
        processors: &[QueryProcessor],
    ) -> Result<Vec<D>>
    where
        D: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
        U: UnitOfWork + ?Sized,
    {
        let builder = QueryBuilder::new(E::TABLE).apply(processors);
        if builder.is_raw() {
            return Err(DataError::invalid_query(
                "raw_query cannot be used with a tenant-scoped operation",
            ));
        }
        self.project(uow, &builder.scope_to_tenant(tenant_id)).await
    }

    async fn project<D, U>(&self, uow: &mut U, builder: &QueryBuilder) -> Result<Vec<D>>
    where
        D: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
        U: UnitOfWork + ?Sized,
    {
        let rendered = builder.build_select()?;
        let conn = uow.connection()?;
        let rows: Vec<D> = executor::fetch_all(&mut *conn, &rendered).await?;
        if let Some(total) = builder.total_count() {
            total.set(executor::fetch_i64(&mut *conn, &builder.build_count()?).await?);
        }
        tracing::debug!(table = E::TABLE, rows = rows.len(), "repository scan");
        Ok(rows)
    }
}
