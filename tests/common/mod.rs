//! Shared fixtures: a migrated SQLite file per test and seed helpers.

#![allow(dead_code)]

use placement_data::config::{DatabaseConfig, PlacementConfig};
use placement_data::database::{AccessMode, DatabaseConnection};
use placement_data::models::{
    Entity, Module, NewModule, NewProgrammingQuestion, ProgrammingQuestion, SubTopic, Tag,
};
use placement_data::repository::Repository;
use tempfile::TempDir;
use uuid::Uuid;

/// A fresh database that lives as long as the value.
pub struct TestDb {
    pub db: DatabaseConnection,
    pub config: PlacementConfig,
    _dir: TempDir,
}

impl TestDb {
    pub async fn new() -> Self {
        Self::with_config(PlacementConfig::default()).await
    }

    pub async fn with_config(mut config: PlacementConfig) -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        config.database = DatabaseConfig {
            max_connections: 5,
            acquire_timeout_ms: 2_000,
            ..DatabaseConfig::for_path(&dir.path().join("placement.db"))
        };
        let db = DatabaseConnection::connect(&config.database)
            .await
            .expect("connect test database");
        Self {
            db,
            config,
            _dir: dir,
        }
    }
}

/// Identities for one test tenant.
#[derive(Debug, Clone, Copy)]
pub struct Tenant {
    pub id: Uuid,
    pub actor: Uuid,
}

impl Tenant {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            actor: Uuid::new_v4(),
        }
    }
}

pub async fn insert<E: Entity>(db: &DatabaseConnection, entity: &E) {
    let mut scope = db.begin(AccessMode::ReadWrite).await.expect("begin");
    Repository::<E>::new()
        .add(&mut scope, entity)
        .await
        .expect("insert fixture");
    scope.commit().await.expect("commit");
}

pub async fn seed_module(db: &DatabaseConnection, tenant: Tenant, name: &str) -> Module {
    let module = Module::new(
        tenant.id,
        tenant.actor,
        NewModule {
            name: name.to_string(),
            description: Some(format!("{name} description")),
            tag_ids: Vec::new(),
        },
    );
    insert(db, &module).await;
    module
}

pub async fn seed_sub_topic(
    db: &DatabaseConnection,
    tenant: Tenant,
    module_id: Uuid,
    name: &str,
) -> SubTopic {
    let sub_topic = SubTopic::new(tenant.id, tenant.actor, module_id, name);
    insert(db, &sub_topic).await;
    sub_topic
}

pub async fn seed_question(
    db: &DatabaseConnection,
    tenant: Tenant,
    module_id: Uuid,
    sub_topic_id: Option<Uuid>,
    title: &str,
    difficulty: i64,
    score: i64,
) -> ProgrammingQuestion {
    let question = ProgrammingQuestion::new(
        tenant.id,
        tenant.actor,
        NewProgrammingQuestion {
            module_id,
            sub_topic_id,
            title: title.to_string(),
            difficulty,
            score,
        },
    );
    insert(db, &question).await;
    question
}

pub async fn seed_tag(db: &DatabaseConnection, tenant: Tenant, name: &str) -> Tag {
    let tag = Tag::new(tenant.id, tenant.actor, name);
    insert(db, &tag).await;
    tag
}

/// Five questions with `(difficulty, score)` of
/// `(5, 10) (5, 5) (3, 10) (5, 20) (1, 10)`.
pub async fn seed_question_grid(db: &DatabaseConnection, tenant: Tenant) -> Module {
    let module = seed_module(db, tenant, "Grid").await;
    for (i, (difficulty, score)) in [(5, 10), (5, 5), (3, 10), (5, 20), (1, 10)]
        .into_iter()
        .enumerate()
    {
        seed_question(db, tenant, module.id, None, &format!("q{i}"), difficulty, score).await;
    }
    module
}
