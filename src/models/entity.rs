use crate::constants::columns;
use crate::error::{DataError, Result};
use crate::query_builder::Value;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::FromRow;
use uuid::Uuid;

/// Audit columns shared by every entity. Flattened into entity rows with
/// `#[sqlx(flatten)]` and `#[serde(flatten)]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct AuditFields {
    pub created_at: DateTime<Utc>,
    pub created_by: Uuid,
    pub updated_at: DateTime<Utc>,
    pub updated_by: Uuid,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted_by: Option<Uuid>,
}

impl AuditFields {
    /// Stamps for a record created now by `actor`.
    pub fn created_by(actor: Uuid) -> Self {
        let now = Utc::now();
        Self {
            created_at: now,
            created_by: actor,
            updated_at: now,
            updated_by: actor,
            deleted_at: None,
            deleted_by: None,
        }
    }

    pub fn touch(&mut self, actor: Uuid) {
        self.updated_at = Utc::now();
        self.updated_by = actor;
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Values in [`columns::AUDIT`] order.
    pub fn values(&self) -> Vec<Value> {
        vec![
            self.created_at.into(),
            self.created_by.into(),
            self.updated_at.into(),
            self.updated_by.into(),
            self.deleted_at.into(),
            self.deleted_by.into(),
        ]
    }
}

/// How a relation is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    /// `target.foreign_key` references the owner's id.
    HasMany { foreign_key: &'static str },
    /// A join table keyed by the two identifiers, without audit columns.
    ManyToMany {
        join_table: &'static str,
        owner_key: &'static str,
        related_key: &'static str,
    },
}

/// A named association from one entity type to another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Relation {
    pub name: &'static str,
    pub target_table: &'static str,
    pub kind: RelationKind,
    pub target_soft_delete: bool,
}

/// Related rows fetched for one owner during eager loading.
#[derive(Default)]
pub struct Related {
    rows: Vec<SqliteRow>,
}

impl std::fmt::Debug for Related {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Related")
            .field("rows", &self.rows.len())
            .finish()
    }
}

impl Related {
    pub(crate) fn new(rows: Vec<SqliteRow>) -> Self {
        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn decode<T>(&self) -> Result<Vec<T>>
    where
        T: for<'r> FromRow<'r, SqliteRow>,
    {
        self.rows
            .iter()
            .map(|row| T::from_row(row).map_err(DataError::from))
            .collect()
    }
}

/// A persisted record.
///
/// `COLUMNS` lists every stored column in schema order and `values()` returns
/// the matching values, which is all the repository needs to insert, update
/// and upsert a row.
pub trait Entity: for<'r> FromRow<'r, SqliteRow> + Send + Sync + Unpin + 'static {
    const TABLE: &'static str;

    /// Stored columns, starting with `id` and `tenant_id`.
    const COLUMNS: &'static [&'static str];

    /// Whether default reads exclude rows with a `deleted_at`.
    const SOFT_DELETE: bool = true;

    /// Columns never written by an update.
    const IMMUTABLE_COLUMNS: &'static [&'static str] = &columns::IMMUTABLE;

    fn id(&self) -> Uuid;

    fn tenant_id(&self) -> Uuid;

    /// Column values aligned with `COLUMNS`.
    fn values(&self) -> Vec<Value>;

    fn relations() -> &'static [Relation] {
        &[]
    }

    /// Store eagerly loaded rows on the relation field.
    fn attach(&mut self, relation: &str, _related: Related) -> Result<()> {
        Err(DataError::unknown_relation(Self::TABLE, relation))
    }

    /// Already loaded children of `relation`, for nested eager loading.
    fn children_mut(&mut self, _relation: &str) -> Vec<&mut dyn Preload> {
        Vec::new()
    }

    fn relation(name: &str) -> Option<&'static Relation> {
        Self::relations().iter().find(|r| r.name == name)
    }

    fn mutable_columns() -> Vec<&'static str> {
        Self::COLUMNS
            .iter()
            .copied()
            .filter(|c| !Self::IMMUTABLE_COLUMNS.contains(c))
            .collect()
    }
}

/// Object-safe view of an entity used while walking a preload tree, where
/// owners of different types are handled uniformly.
pub trait Preload: Send {
    fn entity_id(&self) -> Uuid;

    fn table(&self) -> &'static str;

    fn relation_def(&self, name: &str) -> Option<&'static Relation>;

    fn attach_related(&mut self, relation: &str, related: Related) -> Result<()>;

    fn nested_mut(&mut self, relation: &str) -> Vec<&mut dyn Preload>;
}

impl<E: Entity> Preload for E {
    fn entity_id(&self) -> Uuid {
        self.id()
    }

    fn table(&self) -> &'static str {
        E::TABLE
    }

    fn relation_def(&self, name: &str) -> Option<&'static Relation> {
        E::relation(name)
    }

    fn attach_related(&mut self, relation: &str, related: Related) -> Result<()> {
        self.attach(relation, related)
    }

    fn nested_mut(&mut self, relation: &str) -> Vec<&mut dyn Preload> {
        self.children_mut(relation)
    }
}
