//! # Transaction scopes
//!
//! A [`TransactionScope`] owns one open transaction on a pooled connection
//! and is the only handle that can end it. Nested calls receive a
//! [`BorrowedScope`], which runs statements on the same transaction but has
//! no `commit` or `rollback`. Both implement [`UnitOfWork`], the interface
//! repositories consume.
//!
//! ```rust,ignore
//! let mut scope = db.begin(AccessMode::ReadWrite).await?;
//! modules.add(&mut scope, &module).await?;
//! link_tags(&mut scope.borrow_scope(), &module, &tag_ids).await?;
//! scope.commit().await?;
//! ```
//!
//! Dropping an owned scope that was never ended rolls the transaction back.

use crate::error::{DataError, Result};
use serde::{Deserialize, Serialize};
use sqlx::{Sqlite, SqliteConnection, Transaction};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessMode {
    ReadOnly,
    ReadWrite,
}

/// A transactional connection that repository operations run on.
pub trait UnitOfWork: Send {
    /// Connection for reads.
    fn connection(&mut self) -> Result<&mut SqliteConnection>;

    fn access_mode(&self) -> AccessMode;

    /// Identifies the owning transaction in logs.
    fn scope_id(&self) -> Uuid;

    /// Connection for writes; read-only scopes refuse.
    fn writable_connection(&mut self) -> Result<&mut SqliteConnection> {
        if self.access_mode() == AccessMode::ReadOnly {
            tracing::warn!(scope_id = %self.scope_id(), "write rejected by read-only scope");
            return Err(DataError::ReadOnlyScope);
        }
        self.connection()
    }
}

/// Owned unit of work. `commit` and `rollback` consume it, so a scope ends
/// exactly once.
pub struct TransactionScope {
    tx: Option<Transaction<'static, Sqlite>>,
    mode: AccessMode,
    id: Uuid,
}

impl std::fmt::Debug for TransactionScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionScope")
            .field("id", &self.id)
            .field("mode", &self.mode)
            .field("open", &self.tx.is_some())
            .finish()
    }
}

impl TransactionScope {
    pub(crate) fn new(tx: Transaction<'static, Sqlite>, mode: AccessMode) -> Self {
        let id = Uuid::new_v4();
        tracing::debug!(scope_id = %id, mode = ?mode, "transaction scope opened");
        Self {
            tx: Some(tx),
            mode,
            id,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn mode(&self) -> AccessMode {
        self.mode
    }

    /// Lend this scope to a nested call without giving up ownership.
    pub fn borrow_scope(&mut self) -> BorrowedScope<'_> {
        BorrowedScope { owner: self }
    }

    pub async fn commit(mut self) -> Result<()> {
        let tx = self.take()?;
        tx.commit().await?;
        tracing::debug!(scope_id = %self.id, "transaction scope committed");
        Ok(())
    }

    pub async fn rollback(mut self) -> Result<()> {
        let tx = self.take()?;
        tx.rollback().await?;
        tracing::debug!(scope_id = %self.id, "transaction scope rolled back");
        Ok(())
    }

    fn take(&mut self) -> Result<Transaction<'static, Sqlite>> {
        self.tx
            .take()
            .ok_or_else(|| DataError::Storage("transaction scope already ended".to_string()))
    }
}

impl UnitOfWork for TransactionScope {
    fn connection(&mut self) -> Result<&mut SqliteConnection> {
        match self.tx.as_mut() {
            Some(tx) => Ok(&mut **tx),
            None => Err(DataError::Storage(
                "transaction scope already ended".to_string(),
            )),
        }
    }

    fn access_mode(&self) -> AccessMode {
        self.mode
    }

    fn scope_id(&self) -> Uuid {
        self.id
    }
}

impl Drop for TransactionScope {
    fn drop(&mut self) {
        if self.tx.is_some() {
            // sqlx rolls the transaction back when it is dropped.
            tracing::warn!(
                scope_id = %self.id,
                "transaction scope dropped while open; rolling back"
            );
        }
    }
}

/// A non-owning view of a [`TransactionScope`] for nested calls.
#[derive(Debug)]
pub struct BorrowedScope<'s> {
    owner: &'s mut TransactionScope,
}

impl BorrowedScope<'_> {
    /// Lend the same transaction further down.
    pub fn reborrow(&mut self) -> BorrowedScope<'_> {
        BorrowedScope {
            owner: &mut *self.owner,
        }
    }
}

impl UnitOfWork for BorrowedScope<'_> {
    fn connection(&mut self) -> Result<&mut SqliteConnection> {
        self.owner.connection()
    }

    fn access_mode(&self) -> AccessMode {
        self.owner.mode
    }

    fn scope_id(&self) -> Uuid {
        self.owner.id
    }
}
