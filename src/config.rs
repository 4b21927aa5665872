//! # Configuration
//!
//! Layered configuration for the data-access core. Sources, lowest priority
//! first:
//!
//! 1. compiled defaults ([`PlacementConfig::default`])
//! 2. an optional file (`PLACEMENT_CONFIG_PATH`, or an explicit path)
//! 3. environment variables prefixed with `PLACEMENT_`, using `__` between
//!    nested keys (`PLACEMENT_DATABASE__MAX_CONNECTIONS=20`)
//! 4. `DATABASE_URL`, which always wins for the connection string

use crate::error::{DataError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

const ENV_PREFIX: &str = "PLACEMENT";
const CONFIG_PATH_VAR: &str = "PLACEMENT_CONFIG_PATH";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlacementConfig {
    pub database: DatabaseConfig,
    pub query: QueryConfig,
    pub enrichment: EnrichmentConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_ms: u64,
    pub busy_timeout_ms: u64,
    pub create_if_missing: bool,
    pub run_migrations: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    pub default_page_size: u32,
    pub max_page_size: u32,
}

/// How derived per-row metrics are computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FanOutStrategy {
    /// One concurrent task per metric per row, each on its own read-only scope.
    PerRow,
    /// One grouped query per metric across all rows, joined in memory.
    Batched,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichmentConfig {
    pub strategy: FanOutStrategy,
    /// Rows whose metric tasks may be in flight at the same time (`PerRow` only).
    pub row_concurrency: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://placement.db".to_string(),
            max_connections: 10,
            min_connections: 1,
            acquire_timeout_ms: 5_000,
            busy_timeout_ms: 5_000,
            create_if_missing: true,
            run_migrations: true,
        }
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_page_size: 25,
            max_page_size: 200,
        }
    }
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            strategy: FanOutStrategy::Batched,
            row_concurrency: 1,
        }
    }
}

impl DatabaseConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    /// Config pointing at a database file, with defaults for everything else.
    pub fn for_path(path: &Path) -> Self {
        Self {
            database_url: format!("sqlite://{}", path.display()),
            ..Self::default()
        }
    }
}

impl QueryConfig {
    /// Clamp a caller-requested page size into the configured bounds.
    pub fn page_size(&self, requested: Option<u32>) -> u32 {
        match requested {
            Some(0) | None => self.default_page_size,
            Some(size) => size.min(self.max_page_size),
        }
    }
}

impl PlacementConfig {
    /// Load configuration from defaults, `PLACEMENT_CONFIG_PATH` and the environment.
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_VAR).ok();
        Self::load_from(path.as_deref().map(Path::new))
    }

    /// Load configuration with an explicit (optional) file layer.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&Self::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let builder = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("database.database_url", std::env::var("DATABASE_URL").ok())?;

        let config: PlacementConfig = builder.build()?.try_deserialize()?;
        config.validate()?;

        tracing::debug!(
            database_url = %config.database.database_url,
            max_connections = config.database.max_connections,
            strategy = ?config.enrichment.strategy,
            "configuration loaded"
        );

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let db = &self.database;
        if db.database_url.trim().is_empty() {
            return Err(DataError::Configuration(
                "database.database_url must not be empty".to_string(),
            ));
        }
        if db.max_connections == 0 {
            return Err(DataError::Configuration(
                "database.max_connections must be at least 1".to_string(),
            ));
        }
        if db.min_connections > db.max_connections {
            return Err(DataError::Configuration(format!(
                "database.min_connections ({}) exceeds max_connections ({})",
                db.min_connections, db.max_connections
            )));
        }
        if self.query.default_page_size == 0 || self.query.max_page_size == 0 {
            return Err(DataError::Configuration(
                "query page sizes must be positive".to_string(),
            ));
        }
        if self.query.default_page_size > self.query.max_page_size {
            return Err(DataError::Configuration(
                "query.default_page_size exceeds query.max_page_size".to_string(),
            ));
        }
        if self.enrichment.row_concurrency == 0 {
            return Err(DataError::Configuration(
                "enrichment.row_concurrency must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
