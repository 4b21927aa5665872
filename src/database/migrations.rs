//! # Database Migration System
//!
//! Schema migrations are embedded at compile time and applied in version
//! order. Applied versions are tracked in `schema_migrations`, so running
//! [`DatabaseMigrations::run_all`] repeatedly is safe.
//!
//! Files follow the `YYYYMMDDHHMMSS_description.sql` naming convention.

use crate::error::{DataError, Result};
use chrono::Utc;
use sqlx::sqlite::SqlitePool;
use std::collections::HashSet;

/// Represents a single embedded migration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Migration {
    /// Version timestamp (YYYYMMDDHHMMSS format)
    pub version: String,
    /// Human-readable migration name
    pub name: String,
    pub sql: &'static str,
}

const EMBEDDED: &[(&str, &str)] = &[(
    "20260301000000_create_catalog",
    include_str!("../../migrations/20260301000000_create_catalog.sql"),
)];

/// Manages database schema migrations.
pub struct DatabaseMigrations;

impl DatabaseMigrations {
    /// Run all outstanding migrations in order
    pub async fn run_all(pool: &SqlitePool) -> Result<()> {
        Self::ensure_migration_table(pool).await?;

        let applied = Self::get_applied_migrations(pool).await?;
        for migration in Self::migrations()? {
            if applied.contains(&migration.version) {
                continue;
            }
            tracing::info!(
                version = %migration.version,
                name = %migration.name,
                "applying migration"
            );
            Self::apply(pool, &migration).await?;
        }

        Ok(())
    }

    /// All embedded migrations, sorted by version.
    pub fn migrations() -> Result<Vec<Migration>> {
        let mut migrations = EMBEDDED
            .iter()
            .map(|(filename, sql)| {
                let (version, name) = Self::parse_migration_filename(filename).ok_or_else(|| {
                    DataError::Configuration(format!("malformed migration name '{filename}'"))
                })?;
                Ok(Migration { version, name, sql })
            })
            .collect::<Result<Vec<_>>>()?;
        migrations.sort_by(|a, b| a.version.cmp(&b.version));
        Ok(migrations)
    }

    /// Parse migration filename to extract version and name
    fn parse_migration_filename(filename: &str) -> Option<(String, String)> {
        if filename.len() < 15 || !filename.is_char_boundary(14) {
            return None;
        }

        let (version_part, name_part) = filename.split_at(14);
        if !version_part.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }

        let name = name_part
            .strip_prefix('_')
            .unwrap_or(name_part)
            .replace('_', " ");

        Some((version_part.to_string(), name))
    }

    async fn ensure_migration_table(pool: &SqlitePool) -> Result<()> {
        sqlx::raw_sql(
            r#"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version TEXT PRIMARY KEY NOT NULL,
                name TEXT NOT NULL,
                applied_at TEXT NOT NULL
            )
        "#,
        )
        .execute(pool)
        .await?;

        Ok(())
    }

    async fn get_applied_migrations(pool: &SqlitePool) -> Result<HashSet<String>> {
        let versions: Vec<String> = sqlx::query_scalar("SELECT version FROM schema_migrations")
            .fetch_all(pool)
            .await?;
        Ok(versions.into_iter().collect())
    }

    /// Apply one migration and record it in the same transaction.
    async fn apply(pool: &SqlitePool, migration: &Migration) -> Result<()> {
        let mut tx = pool.begin().await?;

        sqlx::raw_sql(migration.sql).execute(&mut *tx).await?;

        sqlx::query(
            "INSERT OR IGNORE INTO schema_migrations (version, name, applied_at) VALUES (?, ?, ?)",
        )
        .bind(&migration.version)
        .bind(&migration.name)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }
}
