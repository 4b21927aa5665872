//! # Metric enrichment
//!
//! An [`Enricher`] fills derived counts (sub-topics per module, questions per
//! module, ...) into rows that were already read. Each [`CountMetric`] counts
//! live child rows whose foreign key points at the row, inside the row's
//! tenant.
//!
//! Two strategies are available, selected by [`FanOutStrategy`]:
//!
//! - `PerRow` runs one count per metric per row. The metrics of a row run
//!   concurrently, each on its own read-only scope taken from the pool, and
//!   rows are pipelined `row_concurrency` at a time. Inside a read-write
//!   scope it gives way to `Batched`, so uncommitted writes are counted.
//! - `Batched` runs one grouped count per metric over all rows on the
//!   caller's scope, a bounded chunk of rows per statement.
//!
//! Either way the rows come back in input order, and the first failing count
//! fails the whole call without returning any row.

use crate::config::{EnrichmentConfig, FanOutStrategy};
use crate::constants::{columns, MAX_IN_LIST_BINDS};
use crate::database::{AccessMode, DatabaseConnection, UnitOfWork};
use crate::error::{DataError, Result};
use crate::models::Entity;
use crate::query_builder::{Column, Predicate, QueryBuilder, QueryProcessor, Rendered};
use crate::repository::executor;
use futures::future::try_join_all;
use futures::stream::{self, StreamExt, TryStreamExt};
use sqlx::FromRow;
use std::collections::HashMap;
use std::time::Instant;
use uuid::Uuid;

#[derive(Debug, FromRow)]
struct GroupedCount {
    owner_id: Uuid,
    owner_tenant: Uuid,
    total: i64,
}

/// A count of child rows stored onto each enriched row.
pub struct CountMetric<R> {
    name: &'static str,
    table: &'static str,
    foreign_key: &'static str,
    soft_delete: bool,
    processors: Vec<QueryProcessor>,
    apply: fn(&mut R, i64),
}

impl<R> std::fmt::Debug for CountMetric<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CountMetric")
            .field("name", &self.name)
            .field("table", &self.table)
            .field("foreign_key", &self.foreign_key)
            .field("processors", &self.processors)
            .finish()
    }
}

impl<R: Entity> CountMetric<R> {
    /// Count `C` rows whose `foreign_key` equals the enriched row's id.
    pub fn of<C: Entity>(name: &'static str, foreign_key: &'static str, apply: fn(&mut R, i64)) -> Self {
        Self {
            name,
            table: C::TABLE,
            foreign_key,
            soft_delete: C::SOFT_DELETE,
            processors: Vec::new(),
            apply,
        }
    }

    /// Narrow the counted rows further. Only filters and joins apply.
    pub fn with_processors(mut self, processors: Vec<QueryProcessor>) -> Self {
        self.processors = processors;
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    fn base(&self) -> Result<QueryBuilder> {
        let mut builder = QueryBuilder::new(self.table)
            .apply(&self.processors)
            .clear_projection()
            .clear_pagination();
        if builder.is_raw() || builder.is_grouped() {
            return Err(DataError::invalid_query(format!(
                "metric '{}' accepts filters and joins only",
                self.name
            )));
        }
        if self.soft_delete {
            builder = builder.exclude_deleted();
        }
        Ok(builder)
    }

    fn key_column(&self, column: &str) -> Column {
        Column::qualified(self.table, column)
    }

    pub(crate) fn row_query(&self, owner_id: Uuid, tenant_id: Uuid) -> Result<Rendered> {
        self.base()?
            .scope_to_tenant(tenant_id)
            .filter(Predicate::eq(self.key_column(self.foreign_key), owner_id))
            .build_count()
    }

    pub(crate) fn grouped_query(&self, owners: &[(Uuid, Uuid)]) -> Result<Rendered> {
        let owner_ids: Vec<Uuid> = owners.iter().map(|(id, _)| *id).collect();
        let mut tenants: Vec<Uuid> = owners.iter().map(|(_, tenant)| *tenant).collect();
        tenants.sort();
        tenants.dedup();

        let fk = format!("{}.{}", self.table, self.foreign_key);
        let tenant = format!("{}.{}", self.table, columns::TENANT_ID);
        let owner_column = format!("{fk} AS owner_id");
        let tenant_column = format!("{tenant} AS owner_tenant");
        self.base()?
            .select(&[
                owner_column.as_str(),
                tenant_column.as_str(),
                "COUNT(*) AS total",
            ])
            .filter(Predicate::in_list(self.key_column(self.foreign_key), owner_ids))
            .filter(Predicate::in_list(self.key_column(columns::TENANT_ID), tenants))
            .group_by(&fk)
            .group_by(&tenant)
            .build_select()
    }
}

/// Fills [`CountMetric`]s into rows of `R`.
pub struct Enricher<R: Entity> {
    db: DatabaseConnection,
    metrics: Vec<CountMetric<R>>,
    config: EnrichmentConfig,
}

impl<R: Entity> std::fmt::Debug for Enricher<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Enricher")
            .field("table", &R::TABLE)
            .field("metrics", &self.metrics)
            .field("config", &self.config)
            .finish()
    }
}

impl<R: Entity> Enricher<R> {
    pub fn new(db: DatabaseConnection, config: EnrichmentConfig) -> Self {
        Self {
            db,
            metrics: Vec::new(),
            config,
        }
    }

    pub fn with_metric(mut self, metric: CountMetric<R>) -> Self {
        self.metrics.push(metric);
        self
    }

    pub fn with_strategy(mut self, strategy: FanOutStrategy) -> Self {
        self.config.strategy = strategy;
        self
    }

    pub fn config(&self) -> &EnrichmentConfig {
        &self.config
    }

    /// Enrich `rows` with every metric.
    ///
    /// The per-row strategy counts on its own read-only scopes, which cannot
    /// see writes `uow` has not committed. Inside a read-write `uow` the
    /// batched strategy runs instead, on `uow` itself.
    pub async fn enrich<U>(&self, uow: &mut U, rows: Vec<R>) -> Result<Vec<R>>
    where
        U: UnitOfWork + ?Sized,
    {
        if rows.is_empty() || self.metrics.is_empty() {
            return Ok(rows);
        }
        let started = Instant::now();
        let count = rows.len();
        let strategy = self.effective_strategy(uow.access_mode());
        if strategy != self.config.strategy {
            tracing::debug!(
                scope_id = %uow.scope_id(),
                "read-write scope; counting on the caller's transaction"
            );
        }
        let enriched = match strategy {
            FanOutStrategy::PerRow => self.enrich_per_row(rows).await,
            FanOutStrategy::Batched => self.enrich_batched(uow, rows).await,
        };

        match &enriched {
            Ok(_) => tracing::debug!(
                table = R::TABLE,
                strategy = ?strategy,
                rows = count,
                metrics = self.metrics.len(),
                duration_ms = started.elapsed().as_millis() as u64,
                "rows enriched"
            ),
            Err(error) => tracing::warn!(
                table = R::TABLE,
                strategy = ?self.config.strategy,
                error = %error,
                "enrichment failed"
            ),
        }
        enriched
    }

    fn effective_strategy(&self, mode: AccessMode) -> FanOutStrategy {
        match (self.config.strategy, mode) {
            (FanOutStrategy::PerRow, AccessMode::ReadWrite) => FanOutStrategy::Batched,
            (strategy, _) => strategy,
        }
    }

    async fn enrich_per_row(&self, rows: Vec<R>) -> Result<Vec<R>> {
        let concurrency = self.config.row_concurrency.max(1);
        stream::iter(rows.into_iter().map(|row| self.enrich_row(row)))
            .buffered(concurrency)
            .try_collect()
            .await
    }

    async fn enrich_row(&self, mut row: R) -> Result<R> {
        let (id, tenant_id) = (row.id(), row.tenant_id());
        let counts = try_join_all(self.metrics.iter().map(|metric| {
            let db = self.db.clone();
            async move {
                let rendered = metric.row_query(id, tenant_id)?;
                let mut scope = db.begin(AccessMode::ReadOnly).await?;
                let count = executor::fetch_i64(scope.connection()?, &rendered).await?;
                scope.commit().await?;
                Ok::<_, DataError>(count)
            }
        }))
        .await?;

        for (metric, count) in self.metrics.iter().zip(counts) {
            (metric.apply)(&mut row, count);
        }
        Ok(row)
    }

    async fn enrich_batched<U>(&self, uow: &mut U, mut rows: Vec<R>) -> Result<Vec<R>>
    where
        U: UnitOfWork + ?Sized,
    {
        let owners: Vec<(Uuid, Uuid)> = rows.iter().map(|r| (r.id(), r.tenant_id())).collect();
        for metric in &self.metrics {
            let mut totals: HashMap<(Uuid, Uuid), i64> = HashMap::with_capacity(owners.len());
            for chunk in owners.chunks(MAX_IN_LIST_BINDS) {
                let rendered = metric.grouped_query(chunk)?;
                let grouped: Vec<GroupedCount> =
                    executor::fetch_all(uow.connection()?, &rendered).await?;
                totals.extend(
                    grouped
                        .into_iter()
                        .map(|g| ((g.owner_id, g.owner_tenant), g.total)),
                );
            }

            for row in rows.iter_mut() {
                let total = totals
                    .get(&(row.id(), row.tenant_id()))
                    .copied()
                    .unwrap_or(0);
                (metric.apply)(row, total);
            }
        }
        Ok(rows)
    }
}
