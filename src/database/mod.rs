//! # Database Operations
//!
//! Pooled SQLite access, schema migrations and transaction scopes.
//!
//! ## Key Components
//!
//! - [`connection`] - pool construction, scope creation, health checks
//! - [`migrations`] - embedded, versioned schema migrations
//! - [`transaction`] - owned and borrowed units of work
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use placement_data::config::DatabaseConfig;
//! use placement_data::database::{AccessMode, DatabaseConnection};
//!
//! # async fn example() -> placement_data::error::Result<()> {
//! let db = DatabaseConnection::connect(&DatabaseConfig::default()).await?;
//! let scope = db.begin(AccessMode::ReadOnly).await?;
//! scope.commit().await?;
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod migrations;
pub mod transaction;

pub use connection::DatabaseConnection;
pub use migrations::DatabaseMigrations;
pub use transaction::{AccessMode, BorrowedScope, TransactionScope, UnitOfWork};
