//! # System Constants
//!
//! Column names and defaults shared by the query builder, the repository and
//! the schema.

/// Columns every persisted entity carries.
pub mod columns {
    pub const ID: &str = "id";
    pub const TENANT_ID: &str = "tenant_id";
    pub const CREATED_AT: &str = "created_at";
    pub const CREATED_BY: &str = "created_by";
    pub const UPDATED_AT: &str = "updated_at";
    pub const UPDATED_BY: &str = "updated_by";
    pub const DELETED_AT: &str = "deleted_at";
    pub const DELETED_BY: &str = "deleted_by";

    /// Audit columns in schema order, following `id` and `tenant_id`.
    pub const AUDIT: [&str; 6] = [
        CREATED_AT, CREATED_BY, UPDATED_AT, UPDATED_BY, DELETED_AT, DELETED_BY,
    ];

    /// Never part of an UPDATE's SET list.
    pub const IMMUTABLE: [&str; 4] = [ID, TENANT_ID, CREATED_AT, CREATED_BY];
}

/// Alias of the owner key projected alongside eagerly loaded rows.
pub const PRELOAD_OWNER_KEY: &str = "__owner_id";

/// Largest `IN` list bound in one statement. Longer key lists are split so
/// every statement stays under SQLite's 999 bound-parameter floor.
pub const MAX_IN_LIST_BINDS: usize = 400;

/// Ordering applied by the `*_in_order` reads when none is configured.
pub const DEFAULT_ORDER: &[&str] = &["created_at DESC", "id ASC"];

/// Ordering applied to eagerly loaded rows when the preload has none.
pub const PRELOAD_ORDER: &[&str] = &["created_at ASC", "id ASC"];

/// Operation names used in structured database logs.
pub mod operations {
    pub const INSERT: &str = "insert";
    pub const UPDATE: &str = "update";
    pub const UPSERT: &str = "upsert";
    pub const UPDATE_FIELDS: &str = "update_fields";
    pub const SOFT_DELETE: &str = "soft_delete";
    pub const LINK: &str = "link_associations";
    pub const UNLINK: &str = "unlink_associations";
}
