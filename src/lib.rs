#![allow(clippy::doc_markdown)] // Allow technical terms like SQLite, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Placement Data
//!
//! Multi-tenant transactional data-access core for the placement platform.
//!
//! ## Overview
//!
//! Every business service talks to the relational store through three pieces:
//!
//! - a **transaction scope** ([`database::TransactionScope`]) that owns one
//!   open transaction, and its borrowed form handed to nested calls
//! - **query processors** ([`query_builder::QueryProcessor`]) that compose a
//!   statement from typed predicates, joins, ordering and paging
//! - a **generic repository** ([`repository::Repository`]) that folds the
//!   processors, adds the tenant and soft-delete guards and runs the result on
//!   the caller's scope
//!
//! On top of those sit association mutation
//! ([`repository::associations`]) and bounded fan-out metric enrichment
//! ([`enrichment::Enricher`]).
//!
//! ## Module Organization
//!
//! - [`config`] - Layered configuration
//! - [`database`] - Pool, migrations and transaction scopes
//! - [`query_builder`] - Predicate algebra, processors and SQL rendering
//! - [`repository`] - Generic repository, writes, preloading, associations
//! - [`enrichment`] - Derived per-row counts
//! - [`models`] - Entity trait and catalog entities
//! - [`services`] - Catalog service built on the layers above
//! - [`error`] - Structured error handling
//! - [`logging`] - Structured logging setup
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use placement_data::config::PlacementConfig;
//! use placement_data::database::{AccessMode, DatabaseConnection};
//! use placement_data::models::Module;
//! use placement_data::query_builder::{Predicate, QueryProcessor};
//! use placement_data::repository::Repository;
//! use uuid::Uuid;
//!
//! # async fn example(tenant_id: Uuid) -> placement_data::Result<()> {
//! let config = PlacementConfig::load()?;
//! let db = DatabaseConnection::connect(&config.database).await?;
//! let modules = Repository::<Module>::new();
//!
//! let mut scope = db.begin(AccessMode::ReadOnly).await?;
//! let page = modules
//!     .get_page_for_tenant(
//!         &mut scope,
//!         tenant_id,
//!         25,
//!         0,
//!         &[QueryProcessor::filter(Predicate::like("modules.name", "%Rust%"))],
//!     )
//!     .await?;
//! scope.commit().await?;
//!
//! println!("{} of {} modules", page.items.len(), page.total_count);
//! # Ok(())
//! # }
//! ```
//!
//! ## Testing
//!
//! ```bash
//! cargo test --lib    # Unit tests
//! cargo test          # Unit and integration tests against temporary SQLite files
//! ```

pub mod config;
pub mod constants;
pub mod database;
pub mod enrichment;
pub mod error;
pub mod logging;
pub mod models;
pub mod query_builder;
pub mod repository;
pub mod services;

pub use config::{DatabaseConfig, EnrichmentConfig, FanOutStrategy, PlacementConfig, QueryConfig};
pub use database::{AccessMode, BorrowedScope, DatabaseConnection, TransactionScope, UnitOfWork};
pub use enrichment::{CountMetric, Enricher};
pub use error::{DataError, Result};
pub use query_builder::{Page, Predicate, QueryProcessor, TotalCount};
pub use repository::{FieldMap, Repository, RepositoryConfig};
