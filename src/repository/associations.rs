//! Association mutation.
//!
//! A relation is synced by diffing the current link set against the
//! requested one, so repeating a call with the same ids changes nothing.
//! Only links change: many-to-many rows in the join table, or the foreign
//! key column of has-many children. Related entities are never deleted.
//!
//! Every related id must name a live record in the owner's tenant; one
//! that does not fails the whole call with `NotFound` before any link is
//! touched.

use super::{executor, Repository};
use crate::constants::{columns, operations};
use crate::database::UnitOfWork;
use crate::error::{DataError, Result};
use crate::logging::log_database_operation;
use crate::models::{Entity, Relation, RelationKind};
use crate::query_builder::value::SqlWriter;
use crate::query_builder::{Column, Join, Predicate, QueryBuilder, Rendered};
use sqlx::FromRow;
use std::collections::HashSet;
use std::time::Instant;
use uuid::Uuid;

#[derive(Debug, FromRow)]
struct LinkedId {
    related_id: Uuid,
}

/// Requested ids without repeats, first occurrence kept.
fn dedupe(ids: &[Uuid]) -> Vec<Uuid> {
    let mut seen = HashSet::with_capacity(ids.len());
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}

/// Ids currently linked to `owner_id`. With `visible_only`, links to
/// deleted or foreign-tenant rows are left out.
fn linked_ids_query(
    relation: &Relation,
    owner_id: Uuid,
    tenant_id: Uuid,
    visible_only: bool,
) -> Result<Rendered> {
    let target = relation.target_table;
    let builder = match relation.kind {
        RelationKind::HasMany { foreign_key } => {
            let mut builder = QueryBuilder::new(target)
                .select(&[format!("{target}.{} AS related_id", columns::ID).as_str()])
                .filter(Predicate::eq(Column::qualified(target, foreign_key), owner_id))
                .scope_to_tenant(tenant_id);
            if visible_only && relation.target_soft_delete {
                builder = builder.exclude_deleted();
            }
            builder
        }
        RelationKind::ManyToMany {
            join_table,
            owner_key,
            related_key,
        } => {
            let builder = QueryBuilder::new(join_table)
                .select(&[format!("{join_table}.{related_key} AS related_id").as_str()])
                .filter(Predicate::eq(Column::qualified(join_table, owner_key), owner_id));
            if !visible_only {
                builder
            } else {
                let mut joined = builder
                    .join(Join::inner(
                        target,
                        Predicate::columns_eq(
                            Column::qualified(target, columns::ID),
                            Column::qualified(join_table, related_key),
                        ),
                    ))
                    .filter(Predicate::eq(
                        Column::qualified(target, columns::TENANT_ID),
                        tenant_id,
                    ));
                if relation.target_soft_delete {
                    joined = joined.filter(Predicate::is_null(Column::qualified(
                        target,
                        columns::DELETED_AT,
                    )));
                }
                joined
            }
        }
    };
    builder
        .order_by("related_id ASC")
        .build_select()
}

fn link_statement(relation: &Relation, owner_id: Uuid, tenant_id: Uuid, ids: &[Uuid]) -> Result<Rendered> {
    let mut writer = SqlWriter::new();
    match relation.kind {
        RelationKind::HasMany { foreign_key } => {
            writer.push("UPDATE ");
            writer.push_identifier(relation.target_table);
            writer.push(" SET ");
            writer.push_identifier(foreign_key);
            writer.push(" = ");
            writer.push_value(&owner_id.into());
            writer.push(" WHERE ");
            Predicate::eq(columns::TENANT_ID, tenant_id).write(&mut writer);
            writer.push(" AND ");
            Predicate::in_list(columns::ID, ids.iter().copied()).write(&mut writer);
        }
        RelationKind::ManyToMany {
            join_table,
            owner_key,
            related_key,
        } => {
            writer.push("INSERT OR IGNORE INTO ");
            writer.push_identifier(join_table);
            writer.push(" (");
            writer.push_identifier(owner_key);
            writer.push(", ");
            writer.push_identifier(related_key);
            writer.push(") VALUES ");
            for (i, id) in ids.iter().enumerate() {
                if i > 0 {
                    writer.push(", ");
                }
                writer.push("(");
                writer.push_value(&owner_id.into());
                writer.push(", ");
                writer.push_value(&(*id).into());
                writer.push(")");
            }
        }
    }
    writer.finish()
}

fn unlink_statement(relation: &Relation, owner_id: Uuid, tenant_id: Uuid, ids: &[Uuid]) -> Result<Rendered> {
    let mut writer = SqlWriter::new();
    match relation.kind {
        RelationKind::HasMany { foreign_key } => {
            writer.push("UPDATE ");
            writer.push_identifier(relation.target_table);
            writer.push(" SET ");
            writer.push_identifier(foreign_key);
            writer.push(" = NULL WHERE ");
            Predicate::eq(columns::TENANT_ID, tenant_id).write(&mut writer);
            writer.push(" AND ");
            Predicate::eq(foreign_key, owner_id).write(&mut writer);
            writer.push(" AND ");
            Predicate::in_list(columns::ID, ids.iter().copied()).write(&mut writer);
        }
        RelationKind::ManyToMany {
            join_table,
            owner_key,
            related_key,
        } => {
            writer.push("DELETE FROM ");
            writer.push_identifier(join_table);
            writer.push(" WHERE ");
            Predicate::eq(owner_key, owner_id).write(&mut writer);
            writer.push(" AND ");
            Predicate::in_list(related_key, ids.iter().copied()).write(&mut writer);
        }
    }
    writer.finish()
}

impl<E: Entity> Repository<E> {
    fn relation_for(name: &str) -> Result<&'static Relation> {
        E::relation(name).ok_or_else(|| DataError::unknown_relation(E::TABLE, name))
    }

    async fn ensure_owner_visible<U>(&self, uow: &mut U, owner: &E) -> Result<()>
    where
        U: UnitOfWork + ?Sized,
    {
        let builder = Self::by_id(self.builder(&[], Some(owner.tenant_id()))?, owner.id());
        let exists = executor::fetch_i64(uow.connection()?, &builder.build_exists()?).await?;
        if exists == 0 {
            return Err(DataError::not_found(E::TABLE, format!("id {}", owner.id())));
        }
        Ok(())
    }

    async fn ensure_related_visible<U>(
        &self,
        uow: &mut U,
        relation: &Relation,
        tenant_id: Uuid,
        ids: &[Uuid],
    ) -> Result<()>
    where
        U: UnitOfWork + ?Sized,
    {
        if ids.is_empty() {
            return Ok(());
        }
        let mut builder = QueryBuilder::new(relation.target_table)
            .filter(Predicate::in_list(
                Column::qualified(relation.target_table, columns::ID),
                ids.iter().copied(),
            ))
            .scope_to_tenant(tenant_id);
        if relation.target_soft_delete {
            builder = builder.exclude_deleted();
        }
        let found = executor::fetch_i64(uow.connection()?, &builder.build_count()?).await?;
        if found != ids.len() as i64 {
            return Err(DataError::not_found(
                relation.target_table,
                format!("{} of {} requested ids", ids.len() as i64 - found, ids.len()),
            ));
        }
        Ok(())
    }

    async fn linked_ids<U>(
        &self,
        uow: &mut U,
        relation: &Relation,
        owner: &E,
        visible_only: bool,
    ) -> Result<Vec<Uuid>>
    where
        U: UnitOfWork + ?Sized,
    {
        let rendered = linked_ids_query(relation, owner.id(), owner.tenant_id(), visible_only)?;
        let rows: Vec<LinkedId> = executor::fetch_all(uow.connection()?, &rendered).await?;
        Ok(rows.into_iter().map(|row| row.related_id).collect())
    }

    async fn link<U>(&self, uow: &mut U, relation: &Relation, owner: &E, ids: &[Uuid]) -> Result<u64>
    where
        U: UnitOfWork + ?Sized,
    {
        if ids.is_empty() {
            return Ok(0);
        }
        let started = Instant::now();
        let rendered = link_statement(relation, owner.id(), owner.tenant_id(), ids)?;
        let affected = executor::execute(uow.writable_connection()?, &rendered).await?;
        let details = format!("{}: {affected} linked", relation.name);
        log_database_operation(
            operations::LINK,
            Some(E::TABLE),
            Some(owner.id()),
            "success",
            Some(started.elapsed().as_millis() as u64),
            Some(&details),
        );
        Ok(affected)
    }

    async fn unlink<U>(&self, uow: &mut U, relation: &Relation, owner: &E, ids: &[Uuid]) -> Result<u64>
    where
        U: UnitOfWork + ?Sized,
    {
        if ids.is_empty() {
            return Ok(0);
        }
        let started = Instant::now();
        let rendered = unlink_statement(relation, owner.id(), owner.tenant_id(), ids)?;
        let affected = executor::execute(uow.writable_connection()?, &rendered).await?;
        let details = format!("{}: {affected} unlinked", relation.name);
        log_database_operation(
            operations::UNLINK,
            Some(E::TABLE),
            Some(owner.id()),
            "success",
            Some(started.elapsed().as_millis() as u64),
            Some(&details),
        );
        Ok(affected)
    }

    /// Make `related_ids` the exact link set of `relation`. An empty slice
    /// removes every link.
    pub async fn replace_associations<U>(
        &self,
        uow: &mut U,
        owner: &E,
        relation: &str,
        related_ids: &[Uuid],
    ) -> Result<()>
    where
        U: UnitOfWork + ?Sized,
    {
        let relation = Self::relation_for(relation)?;
        uow.writable_connection()?;
        self.ensure_owner_visible(uow, owner).await?;

        let wanted = dedupe(related_ids);
        self.ensure_related_visible(uow, relation, owner.tenant_id(), &wanted)
            .await?;

        let current: HashSet<Uuid> = self
            .linked_ids(uow, relation, owner, false)
            .await?
            .into_iter()
            .collect();
        let wanted_set: HashSet<Uuid> = wanted.iter().copied().collect();

        let to_remove: Vec<Uuid> = current
            .iter()
            .copied()
            .filter(|id| !wanted_set.contains(id))
            .collect();
        let to_add: Vec<Uuid> = wanted
            .iter()
            .copied()
            .filter(|id| !current.contains(id))
            .collect();

        self.unlink(uow, relation, owner, &to_remove).await?;
        self.link(uow, relation, owner, &to_add).await?;
        tracing::debug!(
            table = E::TABLE,
            relation = relation.name,
            added = to_add.len(),
            removed = to_remove.len(),
            "associations replaced"
        );
        Ok(())
    }

    /// Link `related_ids`, leaving existing links in place.
    pub async fn append_associations<U>(
        &self,
        uow: &mut U,
        owner: &E,
        relation: &str,
        related_ids: &[Uuid],
    ) -> Result<()>
    where
        U: UnitOfWork + ?Sized,
    {
        let relation = Self::relation_for(relation)?;
        uow.writable_connection()?;
        self.ensure_owner_visible(uow, owner).await?;

        let wanted = dedupe(related_ids);
        self.ensure_related_visible(uow, relation, owner.tenant_id(), &wanted)
            .await?;

        let current: HashSet<Uuid> = self
            .linked_ids(uow, relation, owner, false)
            .await?
            .into_iter()
            .collect();
        let to_add: Vec<Uuid> = wanted.into_iter().filter(|id| !current.contains(id)).collect();
        self.link(uow, relation, owner, &to_add).await?;
        Ok(())
    }

    /// Unlink only `related_ids`. Ids that are not linked are ignored.
    pub async fn remove_associations<U>(
        &self,
        uow: &mut U,
        owner: &E,
        relation: &str,
        related_ids: &[Uuid],
    ) -> Result<()>
    where
        U: UnitOfWork + ?Sized,
    {
        let relation = Self::relation_for(relation)?;
        uow.writable_connection()?;
        self.ensure_owner_visible(uow, owner).await?;
        self.unlink(uow, relation, owner, &dedupe(related_ids)).await?;
        Ok(())
    }

    /// Ids of live records currently linked through `relation`.
    pub async fn association_ids<U>(&self, uow: &mut U, owner: &E, relation: &str) -> Result<Vec<Uuid>>
    where
        U: UnitOfWork + ?Sized,
    {
        let relation = Self::relation_for(relation)?;
        self.linked_ids(uow, relation, owner, true).await
    }
}
