//! Eager loading of relations.
//!
//! Requested paths (`"sub_topics"`, `"sub_topics.programming_questions"`)
//! become a tree. Each tree level issues one query per relation for all
//! owners at that level, selecting the owner key alongside the related row,
//! and hands every owner its rows. Nested levels then run over the children
//! that were just attached.

use super::executor;
use super::qualify_clause;
use crate::constants::{columns, MAX_IN_LIST_BINDS, PRELOAD_ORDER, PRELOAD_OWNER_KEY};
use crate::error::{DataError, Result};
use crate::models::{Entity, Preload, Related, Relation, RelationKind};
use crate::query_builder::builder::PreloadRequest;
use crate::query_builder::{Column, Join, Predicate, QueryBuilder, QueryProcessor, Rendered};
use futures::future::BoxFuture;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
struct PreloadNode {
    name: String,
    processors: Vec<QueryProcessor>,
    children: Vec<PreloadNode>,
}

impl PreloadNode {
    fn insert(&mut self, path: &str, processors: &[QueryProcessor]) {
        let mut node = self;
        for segment in path.split('.').map(str::trim).filter(|s| !s.is_empty()) {
            let index = match node.children.iter().position(|c| c.name == segment) {
                Some(index) => index,
                None => {
                    node.children.push(PreloadNode {
                        name: segment.to_string(),
                        ..PreloadNode::default()
                    });
                    node.children.len() - 1
                }
            };
            node = &mut node.children[index];
        }
        node.processors.extend(processors.iter().cloned());
    }
}

/// The relations to load for one read.
#[derive(Debug, Clone, Default)]
pub(crate) struct PreloadTree {
    root: PreloadNode,
}

impl PreloadTree {
    pub fn build(defaults: &[String], requests: &[PreloadRequest]) -> Self {
        let mut root = PreloadNode::default();
        for path in defaults {
            root.insert(path, &[]);
        }
        for request in requests {
            root.insert(&request.path, &request.processors);
        }
        Self { root }
    }

    pub fn is_empty(&self) -> bool {
        self.root.children.is_empty()
    }

    pub async fn load<E: Entity>(
        &self,
        conn: &mut SqliteConnection,
        rows: &mut [E],
        tenant_id: Option<Uuid>,
    ) -> Result<()> {
        let owners: Vec<&mut dyn Preload> = rows.iter_mut().map(|r| r as &mut dyn Preload).collect();
        load_level(conn, owners, &self.root, tenant_id).await
    }
}

fn load_level<'a>(
    conn: &'a mut SqliteConnection,
    mut owners: Vec<&'a mut dyn Preload>,
    node: &'a PreloadNode,
    tenant_id: Option<Uuid>,
) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        let owner_table = match owners.first() {
            Some(owner) => owner.table(),
            None => return Ok(()),
        };

        for child in &node.children {
            let relation = owners[0]
                .relation_def(&child.name)
                .ok_or_else(|| DataError::unknown_relation(owner_table, &child.name))?;

            let owner_ids: Vec<Uuid> = owners.iter().map(|o| o.entity_id()).collect();
            let mut rows = Vec::new();
            for chunk in owner_ids.chunks(MAX_IN_LIST_BINDS) {
                let rendered = related_query(relation, chunk, &child.processors, tenant_id)?;
                rows.extend(executor::fetch_rows(&mut *conn, &rendered).await?);
            }
            attach_grouped(&mut owners, &child.name, rows)?;

            tracing::debug!(
                table = owner_table,
                relation = relation.name,
                owners = owner_ids.len(),
                "preloaded relation"
            );

            if !child.children.is_empty() {
                let mut nested: Vec<&mut dyn Preload> = Vec::new();
                for owner in owners.iter_mut() {
                    nested.extend(owner.nested_mut(&child.name));
                }
                load_level(&mut *conn, nested, child, tenant_id).await?;
            }
        }
        Ok(())
    })
}

fn attach_grouped(
    owners: &mut [&mut dyn Preload],
    relation: &str,
    rows: Vec<SqliteRow>,
) -> Result<()> {
    let mut grouped: HashMap<Uuid, Vec<SqliteRow>> = HashMap::new();
    for row in rows {
        let owner: Uuid = row.try_get(PRELOAD_OWNER_KEY)?;
        grouped.entry(owner).or_default().push(row);
    }

    for owner in owners.iter_mut() {
        let related = grouped.remove(&owner.entity_id()).unwrap_or_default();
        owner.attach_related(relation, Related::new(related))?;
    }
    Ok(())
}

fn related_query(
    relation: &Relation,
    owner_ids: &[Uuid],
    processors: &[QueryProcessor],
    tenant_id: Option<Uuid>,
) -> Result<Rendered> {
    let mut builder = QueryBuilder::new(relation.target_table).apply(processors);
    if builder.is_raw() {
        return Err(DataError::invalid_query(
            "raw_query cannot scope an eager load",
        ));
    }
    let alias = builder.alias().to_string();

    if let Some(tenant_id) = tenant_id {
        builder = builder.scope_to_tenant(tenant_id);
    }
    if relation.target_soft_delete {
        builder = builder.exclude_deleted();
    }
    if !builder.has_order() {
        builder = PRELOAD_ORDER
            .iter()
            .fold(builder, |b, clause| b.order_by(&qualify_clause(&alias, clause)));
    }

    let owner_key = match relation.kind {
        RelationKind::HasMany { foreign_key } => {
            builder = builder.filter(Predicate::in_list(
                Column::qualified(&alias, foreign_key),
                owner_ids.iter().copied(),
            ));
            format!("{alias}.{foreign_key}")
        }
        RelationKind::ManyToMany {
            join_table,
            owner_key,
            related_key,
        } => {
            builder = builder
                .join(Join::inner(
                    join_table,
                    Predicate::columns_eq(
                        Column::qualified(join_table, related_key),
                        Column::qualified(&alias, columns::ID),
                    ),
                ))
                .filter(Predicate::in_list(
                    Column::qualified(join_table, owner_key),
                    owner_ids.iter().copied(),
                ));
            format!("{join_table}.{owner_key}")
        }
    };

    let projection = [
        format!("{alias}.*"),
        format!("{owner_key} AS {PRELOAD_OWNER_KEY}"),
    ];
    builder
        .clear_pagination()
        .select(&[projection[0].as_str(), projection[1].as_str()])
        .build_select()
}
