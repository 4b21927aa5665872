use super::migrations::DatabaseMigrations;
use super::transaction::{AccessMode, TransactionScope};
use crate::config::DatabaseConfig;
use crate::error::{DataError, Result};
use futures::future::BoxFuture;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::str::FromStr;

/// Pooled access to the store. Cheap to clone; clones share the pool.
#[derive(Debug, Clone)]
pub struct DatabaseConnection {
    pool: SqlitePool,
}

impl DatabaseConnection {
    /// Open the pool described by `config`, applying migrations when enabled.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&config.database_url)
            .map_err(|e| DataError::Configuration(format!("invalid database url: {e}")))?
            .create_if_missing(config.create_if_missing)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(config.busy_timeout())
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout())
            .after_release(|conn, _meta| {
                Box::pin(async move {
                    sqlx::query("PRAGMA query_only = OFF")
                        .execute(&mut *conn)
                        .await?;
                    Ok(true)
                })
            })
            .connect_with(options)
            .await?;

        tracing::info!(
            database_url = %config.database_url,
            max_connections = config.max_connections,
            "database pool ready"
        );

        if config.run_migrations {
            DatabaseMigrations::run_all(&pool).await?;
        }

        Ok(Self { pool })
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Open an owned transaction scope.
    ///
    /// A read-only scope also switches its connection to `query_only`, so
    /// storage refuses writes that bypass the repository, such as a raw
    /// statement.
    pub async fn begin(&self, mode: AccessMode) -> Result<TransactionScope> {
        let mut tx = self.pool.begin().await?;
        let pragma = match mode {
            AccessMode::ReadOnly => "PRAGMA query_only = ON",
            AccessMode::ReadWrite => "PRAGMA query_only = OFF",
        };
        sqlx::query(pragma).execute(&mut *tx).await?;
        Ok(TransactionScope::new(tx, mode))
    }

    /// Run `work` in a fresh scope: commit on `Ok`, roll back on `Err`.
    pub async fn in_transaction<T, F>(&self, mode: AccessMode, work: F) -> Result<T>
    where
        T: Send,
        F: for<'a> FnOnce(&'a mut TransactionScope) -> BoxFuture<'a, Result<T>> + Send,
    {
        let mut scope = self.begin(mode).await?;
        match work(&mut scope).await {
            Ok(value) => {
                scope.commit().await?;
                Ok(value)
            }
            Err(error) => {
                if let Err(rollback_error) = scope.rollback().await {
                    tracing::warn!(error = %rollback_error, "rollback after failed unit of work failed");
                }
                Err(error)
            }
        }
    }

    pub async fn health_check(&self) -> Result<bool> {
        let row = sqlx::query("SELECT 1 AS health")
            .fetch_one(&self.pool)
            .await?;

        let health: i64 = row.try_get("health")?;
        Ok(health == 1)
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}
