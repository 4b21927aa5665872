//! Write operations. Every write needs a read-write scope.

use super::{executor, Repository};
use crate::constants::{columns, operations};
use crate::database::UnitOfWork;
use crate::error::{DataError, Result};
use crate::logging::log_database_operation;
use crate::models::Entity;
use crate::query_builder::value::validate_identifier;
use crate::query_builder::{Column, Predicate, QueryProcessor, Rendered, Value};
use crate::query_builder::value::SqlWriter;
use chrono::Utc;
use std::time::Instant;
use uuid::Uuid;

/// Named column values for a partial update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldMap {
    fields: Vec<(String, Value)>,
}

impl FieldMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `column` to `value`, replacing an earlier value for the same column.
    pub fn set(mut self, column: &str, value: impl Into<Value>) -> Self {
        let value = value.into();
        match self.fields.iter_mut().find(|(name, _)| name == column) {
            Some(entry) => entry.1 = value,
            None => self.fields.push((column.to_string(), value)),
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }
}

fn log_write(operation: &str, table: &str, id: Option<Uuid>, started: Instant, details: Option<&str>) {
    log_database_operation(
        operation,
        Some(table),
        id,
        "success",
        Some(started.elapsed().as_millis() as u64),
        details,
    );
}

fn write_column_list(writer: &mut SqlWriter, columns: &[&str]) {
    for (i, column) in columns.iter().enumerate() {
        if i > 0 {
            writer.push(", ");
        }
        writer.push_identifier(column);
    }
}

fn write_values(writer: &mut SqlWriter, values: &[Value]) {
    for (i, value) in values.iter().enumerate() {
        if i > 0 {
            writer.push(", ");
        }
        writer.push_value(value);
    }
}

impl<E: Entity> Repository<E> {
    fn row_values(entity: &E) -> Result<Vec<Value>> {
        let values = entity.values();
        if values.len() != E::COLUMNS.len() {
            return Err(DataError::invalid_query(format!(
                "{} produced {} values for {} columns",
                E::TABLE,
                values.len(),
                E::COLUMNS.len()
            )));
        }
        Ok(values)
    }

    pub(crate) fn render_insert(entity: &E) -> Result<Rendered> {
        let values = Self::row_values(entity)?;
        let mut writer = SqlWriter::new();
        writer.push("INSERT INTO ");
        writer.push_identifier(E::TABLE);
        writer.push(" (");
        write_column_list(&mut writer, E::COLUMNS);
        writer.push(") VALUES (");
        write_values(&mut writer, &values);
        writer.push(")");
        writer.finish()
    }

    pub(crate) fn render_update(entity: &E) -> Result<Rendered> {
        let values = Self::row_values(entity)?;
        let mut writer = SqlWriter::new();
        writer.push("UPDATE ");
        writer.push_identifier(E::TABLE);
        writer.push(" SET ");

        let mut first = true;
        for (column, value) in E::COLUMNS.iter().zip(&values) {
            if E::IMMUTABLE_COLUMNS.contains(column) {
                continue;
            }
            if !first {
                writer.push(", ");
            }
            first = false;
            writer.push_identifier(column);
            writer.push(" = ");
            writer.push_value(value);
        }

        writer.push(" WHERE ");
        let mut guards = vec![
            Predicate::eq(columns::ID, entity.id()),
            Predicate::eq(columns::TENANT_ID, entity.tenant_id()),
        ];
        if E::SOFT_DELETE {
            guards.push(Predicate::is_null(columns::DELETED_AT));
        }
        Predicate::and(guards).write(&mut writer);
        writer.finish()
    }

    pub(crate) fn render_upsert(entity: &E) -> Result<Rendered> {
        let values = Self::row_values(entity)?;
        let mut writer = SqlWriter::new();
        writer.push("INSERT INTO ");
        writer.push_identifier(E::TABLE);
        writer.push(" (");
        write_column_list(&mut writer, E::COLUMNS);
        writer.push(") VALUES (");
        write_values(&mut writer, &values);
        writer.push(") ON CONFLICT(id) DO UPDATE SET ");

        let mutable = E::mutable_columns();
        for (i, column) in mutable.iter().enumerate() {
            if i > 0 {
                writer.push(", ");
            }
            writer.push_identifier(column);
            writer.push(" = excluded.");
            writer.push_identifier(column);
        }
        // A row owned by another tenant is left untouched; zero rows change.
        writer.push(" WHERE ");
        writer.push_identifier(&format!("{}.{}", E::TABLE, columns::TENANT_ID));
        writer.push(" = excluded.tenant_id");
        if E::SOFT_DELETE {
            writer.push(" AND ");
            writer.push_identifier(&format!("{}.{}", E::TABLE, columns::DELETED_AT));
            writer.push(" IS NULL");
        }
        writer.finish()
    }

    /// Counts the row with `entity`'s id under `entity`'s tenant, deleted or not.
    fn render_owned_lookup(entity: &E) -> Result<Rendered> {
        let mut writer = SqlWriter::new();
        writer.push("SELECT COUNT(*) FROM ");
        writer.push_identifier(E::TABLE);
        writer.push(" WHERE ");
        Predicate::and(vec![
            Predicate::eq(columns::ID, entity.id()),
            Predicate::eq(columns::TENANT_ID, entity.tenant_id()),
        ])
        .write(&mut writer);
        writer.finish()
    }

    /// Insert a new record. A unique-key collision is `Conflict`.
    pub async fn add<U>(&self, uow: &mut U, entity: &E) -> Result<()>
    where
        U: UnitOfWork + ?Sized,
    {
        let started = Instant::now();
        let rendered = Self::render_insert(entity)?;
        executor::execute(uow.writable_connection()?, &rendered).await?;
        log_write(operations::INSERT, E::TABLE, Some(entity.id()), started, None);
        Ok(())
    }

    /// Overwrite every mutable column of the record matched on
    /// `(id, tenant_id)`. No match is `NotFound`.
    pub async fn update<U>(&self, uow: &mut U, entity: &E) -> Result<()>
    where
        U: UnitOfWork + ?Sized,
    {
        let started = Instant::now();
        let rendered = Self::render_update(entity)?;
        let affected = executor::execute(uow.writable_connection()?, &rendered).await?;
        if affected == 0 {
            return Err(DataError::not_found(E::TABLE, format!("id {}", entity.id())));
        }
        log_write(operations::UPDATE, E::TABLE, Some(entity.id()), started, None);
        Ok(())
    }

    /// Insert, or overwrite the record with the same primary key. A record
    /// with that key under another tenant is never overwritten (`Conflict`),
    /// and a soft-deleted record is never revived (`NotFound`).
    pub async fn save<U>(&self, uow: &mut U, entity: &E) -> Result<()>
    where
        U: UnitOfWork + ?Sized,
    {
        let started = Instant::now();
        let rendered = Self::render_upsert(entity)?;
        let conn = uow.writable_connection()?;
        let affected = executor::execute(&mut *conn, &rendered).await?;
        if affected == 0 {
            let owned = executor::fetch_i64(&mut *conn, &Self::render_owned_lookup(entity)?).await?;
            if owned > 0 {
                return Err(DataError::not_found(
                    E::TABLE,
                    format!("id {} is deleted", entity.id()),
                ));
            }
            return Err(DataError::Conflict(format!(
                "{}: id {} belongs to another tenant",
                E::TABLE,
                entity.id()
            )));
        }
        log_write(operations::UPSERT, E::TABLE, Some(entity.id()), started, None);
        Ok(())
    }

    /// Set the named fields on every row matched by `processors`. Returns
    /// the number of rows changed. An update without a filter is refused.
    pub async fn update_with_map<U>(
        &self,
        uow: &mut U,
        fields: &FieldMap,
        processors: &[QueryProcessor],
    ) -> Result<u64>
    where
        U: UnitOfWork + ?Sized,
    {
        self.update_fields(uow, None, fields, processors).await
    }

    pub async fn update_with_map_for_tenant<U>(
        &self,
        uow: &mut U,
        tenant_id: Uuid,
        fields: &FieldMap,
        processors: &[QueryProcessor],
    ) -> Result<u64>
    where
        U: UnitOfWork + ?Sized,
    {
        self.update_fields(uow, Some(tenant_id), fields, processors)
            .await
    }

    async fn update_fields<U>(
        &self,
        uow: &mut U,
        tenant_id: Option<Uuid>,
        fields: &FieldMap,
        processors: &[QueryProcessor],
    ) -> Result<u64>
    where
        U: UnitOfWork + ?Sized,
    {
        let started = Instant::now();
        let rendered = self.render_field_update(tenant_id, fields, processors)?;
        let affected = executor::execute(uow.writable_connection()?, &rendered).await?;
        let details = format!("{} fields, {affected} rows", fields.len());
        log_write(operations::UPDATE_FIELDS, E::TABLE, None, started, Some(&details));
        Ok(affected)
    }

    pub(crate) fn render_field_update(
        &self,
        tenant_id: Option<Uuid>,
        fields: &FieldMap,
        processors: &[QueryProcessor],
    ) -> Result<Rendered> {
        if fields.is_empty() {
            return Err(DataError::invalid_query("update_with_map needs at least one field"));
        }
        for (column, value) in fields.iter() {
            validate_identifier(column)?;
            if !E::COLUMNS.contains(&column) {
                return Err(DataError::invalid_query(format!(
                    "{} has no column '{column}'",
                    E::TABLE
                )));
            }
            if E::IMMUTABLE_COLUMNS.contains(&column) {
                return Err(DataError::invalid_query(format!(
                    "column '{column}' of {} cannot be updated",
                    E::TABLE
                )));
            }
            if matches!(value, Value::List(_)) {
                return Err(DataError::invalid_query(format!(
                    "column '{column}' cannot be set to a list"
                )));
            }
        }

        let builder = self.builder(processors, tenant_id)?;
        if let Some(error) = builder.error() {
            return Err(error.clone());
        }
        if builder.is_raw() || builder.has_joins() || builder.is_grouped() {
            return Err(DataError::invalid_query(
                "update_with_map supports filters only",
            ));
        }
        if !builder.has_filters() {
            return Err(DataError::invalid_query(
                "refusing to update without a filter",
            ));
        }

        let mut writer = SqlWriter::new();
        writer.push("UPDATE ");
        writer.push_identifier(builder.table_name());
        if builder.alias() != builder.table_name() {
            writer.push(" AS ");
            writer.push_identifier(builder.alias());
        }
        writer.push(" SET ");
        for (i, (column, value)) in fields.iter().enumerate() {
            if i > 0 {
                writer.push(", ");
            }
            writer.push_identifier(column);
            writer.push(" = ");
            writer.push_value(value);
        }
        builder.write_where(&mut writer);
        writer.finish()
    }

    /// Mark the visible record `id` deleted by `actor`. Deleting a record
    /// that is already deleted, or absent, is `NotFound`.
    pub async fn soft_delete<U>(
        &self,
        uow: &mut U,
        tenant_id: Uuid,
        id: Uuid,
        actor: Uuid,
    ) -> Result<()>
    where
        U: UnitOfWork + ?Sized,
    {
        if !E::SOFT_DELETE {
            return Err(DataError::invalid_query(format!(
                "{} does not support soft delete",
                E::TABLE
            )));
        }
        let started = Instant::now();
        let now = Utc::now();
        let fields = FieldMap::new()
            .set(columns::DELETED_AT, now)
            .set(columns::DELETED_BY, actor)
            .set(columns::UPDATED_AT, now)
            .set(columns::UPDATED_BY, actor);
        let filter = QueryProcessor::filter(Predicate::eq(
            Column::qualified(E::TABLE, columns::ID),
            id,
        ));

        let rendered = self.render_field_update(Some(tenant_id), &fields, &[filter])?;
        let affected = executor::execute(uow.writable_connection()?, &rendered).await?;
        if affected == 0 {
            return Err(DataError::not_found(E::TABLE, format!("id {id}")));
        }
        log_write(operations::SOFT_DELETE, E::TABLE, Some(id), started, None);
        Ok(())
    }
}
