use crate::common::{seed_module, seed_question, seed_sub_topic, seed_tag, Tenant, TestDb};
use placement_data::database::AccessMode;
use placement_data::models::{Module, NewModule};
use placement_data::query_builder::{Predicate, QueryProcessor};
use placement_data::repository::{Repository, RepositoryConfig};

#[tokio::test]
async fn test_nested_preload_attaches_children_per_owner() {
    let test_db = TestDb::new().await;
    let tenant = Tenant::new();
    let rich = seed_module(&test_db.db, tenant, "Rich").await;
    let bare = seed_module(&test_db.db, tenant, "Bare").await;
    let topic = seed_sub_topic(&test_db.db, tenant, rich.id, "Borrowing").await;
    seed_sub_topic(&test_db.db, tenant, rich.id, "Lifetimes").await;
    seed_question(&test_db.db, tenant, rich.id, Some(topic.id), "q1", 2, 10).await;
    seed_question(&test_db.db, tenant, rich.id, Some(topic.id), "q2", 3, 10).await;
    let modules = Repository::<Module>::new();

    let mut scope = test_db.db.begin(AccessMode::ReadOnly).await.unwrap();
    let loaded = modules
        .get_all_for_tenant(
            &mut scope,
            tenant.id,
            &[
                QueryProcessor::preload_associations(&["sub_topics.programming_questions"]),
                QueryProcessor::order_by("modules.name ASC"),
            ],
        )
        .await
        .unwrap();
    scope.commit().await.unwrap();

    assert_eq!(loaded.len(), 2);
    assert_eq!(loaded[0].id, bare.id);
    assert!(loaded[0].sub_topics.is_empty());

    let rich_loaded = &loaded[1];
    let mut names: Vec<&str> = rich_loaded.sub_topics.iter().map(|s| s.name.as_str()).collect();
    names.sort_unstable();
    assert_eq!(names, vec!["Borrowing", "Lifetimes"]);
    for sub_topic in &rich_loaded.sub_topics {
        let expected = if sub_topic.id == topic.id { 2 } else { 0 };
        assert_eq!(sub_topic.programming_questions.len(), expected);
    }
}

#[tokio::test]
async fn test_conditional_preload_filters_related_rows() {
    let test_db = TestDb::new().await;
    let tenant = Tenant::new();
    let module = seed_module(&test_db.db, tenant, "Filtered").await;
    seed_sub_topic(&test_db.db, tenant, module.id, "Keep me").await;
    seed_sub_topic(&test_db.db, tenant, module.id, "Drop me").await;
    let modules = Repository::<Module>::new();

    let mut scope = test_db.db.begin(AccessMode::ReadOnly).await.unwrap();
    let loaded = modules
        .get_for_tenant(
            &mut scope,
            tenant.id,
            module.id,
            &[QueryProcessor::preload_with_condition(
                "sub_topics",
                vec![QueryProcessor::filter(Predicate::like(
                    "sub_topics.name",
                    "Keep%",
                ))],
            )],
        )
        .await
        .unwrap();
    scope.commit().await.unwrap();

    assert_eq!(loaded.sub_topics.len(), 1);
    assert_eq!(loaded.sub_topics[0].name, "Keep me");
}

#[tokio::test]
async fn test_configured_preloads_apply_to_every_read() {
    let test_db = TestDb::new().await;
    let tenant = Tenant::new();
    let module = seed_module(&test_db.db, tenant, "Labelled").await;
    let tag = seed_tag(&test_db.db, tenant, "systems").await;
    let modules = Repository::<Module>::with_config(RepositoryConfig {
        preloads: vec!["tags".to_string()],
        ..RepositoryConfig::default()
    });

    let mut scope = test_db.db.begin(AccessMode::ReadWrite).await.unwrap();
    modules
        .replace_associations(&mut scope, &module, "tags", &[tag.id])
        .await
        .unwrap();
    let loaded = modules
        .get_for_tenant(&mut scope, tenant.id, module.id, &[])
        .await
        .unwrap();
    scope.commit().await.unwrap();

    assert_eq!(loaded.tags.len(), 1);
    assert_eq!(loaded.tags[0].name, "systems");
}

#[tokio::test]
async fn test_unknown_preload_is_an_error() {
    let test_db = TestDb::new().await;
    let tenant = Tenant::new();
    seed_module(&test_db.db, tenant, "Plain").await;
    let modules = Repository::<Module>::new();

    let mut scope = test_db.db.begin(AccessMode::ReadOnly).await.unwrap();
    let result = modules
        .get_all_for_tenant(
            &mut scope,
            tenant.id,
            &[QueryProcessor::preload_associations(&["authors"])],
        )
        .await;
    assert!(result.is_err());
    scope.rollback().await.unwrap();
}

#[tokio::test]
async fn test_preload_spans_more_owners_than_one_statement_binds() {
    let test_db = TestDb::new().await;
    let tenant = Tenant::new();
    let modules = Repository::<Module>::new();

    let mut scope = test_db.db.begin(AccessMode::ReadWrite).await.unwrap();
    for i in 0..450 {
        let module = Module::new(
            tenant.id,
            tenant.actor,
            NewModule {
                name: format!("m{i:03}"),
                ..NewModule::default()
            },
        );
        modules.add(&mut scope, &module).await.unwrap();
    }
    scope.commit().await.unwrap();
    let last = seed_module(&test_db.db, tenant, "zz-last").await;
    seed_sub_topic(&test_db.db, tenant, last.id, "Tail").await;

    let mut scope = test_db.db.begin(AccessMode::ReadOnly).await.unwrap();
    let loaded = modules
        .get_all_for_tenant(
            &mut scope,
            tenant.id,
            &[
                QueryProcessor::preload_associations(&["sub_topics"]),
                QueryProcessor::order_by("modules.name ASC"),
            ],
        )
        .await
        .unwrap();
    scope.commit().await.unwrap();

    assert_eq!(loaded.len(), 451);
    let tail = &loaded[450];
    assert_eq!(tail.id, last.id);
    assert_eq!(tail.sub_topics.len(), 1);
    assert_eq!(tail.sub_topics[0].name, "Tail");
    assert!(loaded[..450].iter().all(|m| m.sub_topics.is_empty()));
}
