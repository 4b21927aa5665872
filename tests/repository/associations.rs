use crate::common::{seed_module, seed_question, seed_sub_topic, seed_tag, Tenant, TestDb};
use placement_data::database::AccessMode;
use placement_data::error::DataError;
use placement_data::models::{Module, SubTopic, Tag};
use placement_data::repository::Repository;
use uuid::Uuid;

fn sorted(mut ids: Vec<Uuid>) -> Vec<Uuid> {
    ids.sort();
    ids
}

#[tokio::test]
async fn test_replace_associations_is_idempotent() {
    let test_db = TestDb::new().await;
    let tenant = Tenant::new();
    let module = seed_module(&test_db.db, tenant, "Tagged").await;
    let (a, b, c) = (
        seed_tag(&test_db.db, tenant, "a").await,
        seed_tag(&test_db.db, tenant, "b").await,
        seed_tag(&test_db.db, tenant, "c").await,
    );
    let modules = Repository::<Module>::new();

    let mut scope = test_db.db.begin(AccessMode::ReadWrite).await.unwrap();
    modules
        .replace_associations(&mut scope, &module, "tags", &[a.id, b.id])
        .await
        .unwrap();
    modules
        .replace_associations(&mut scope, &module, "tags", &[a.id, b.id, a.id])
        .await
        .unwrap();
    assert_eq!(
        modules.association_ids(&mut scope, &module, "tags").await.unwrap(),
        sorted(vec![a.id, b.id])
    );

    modules
        .replace_associations(&mut scope, &module, "tags", &[b.id, c.id])
        .await
        .unwrap();
    assert_eq!(
        modules.association_ids(&mut scope, &module, "tags").await.unwrap(),
        sorted(vec![b.id, c.id])
    );
    scope.commit().await.unwrap();
}

#[tokio::test]
async fn test_replace_with_empty_set_keeps_related_records() {
    let test_db = TestDb::new().await;
    let tenant = Tenant::new();
    let module = seed_module(&test_db.db, tenant, "Untagged").await;
    let tag = seed_tag(&test_db.db, tenant, "survivor").await;
    let modules = Repository::<Module>::new();
    let tags = Repository::<Tag>::new();

    let mut scope = test_db.db.begin(AccessMode::ReadWrite).await.unwrap();
    modules
        .replace_associations(&mut scope, &module, "tags", &[tag.id])
        .await
        .unwrap();
    modules
        .replace_associations(&mut scope, &module, "tags", &[])
        .await
        .unwrap();
    assert!(modules
        .association_ids(&mut scope, &module, "tags")
        .await
        .unwrap()
        .is_empty());
    let still_there = tags
        .get_for_tenant(&mut scope, tenant.id, tag.id, &[])
        .await
        .unwrap();
    scope.commit().await.unwrap();
    assert_eq!(still_there.name, "survivor");
}

#[tokio::test]
async fn test_append_and_remove_associations() {
    let test_db = TestDb::new().await;
    let tenant = Tenant::new();
    let module = seed_module(&test_db.db, tenant, "Growing").await;
    let (a, b) = (
        seed_tag(&test_db.db, tenant, "a").await,
        seed_tag(&test_db.db, tenant, "b").await,
    );
    let modules = Repository::<Module>::new();

    let mut scope = test_db.db.begin(AccessMode::ReadWrite).await.unwrap();
    modules
        .append_associations(&mut scope, &module, "tags", &[a.id])
        .await
        .unwrap();
    modules
        .append_associations(&mut scope, &module, "tags", &[a.id, b.id])
        .await
        .unwrap();
    assert_eq!(
        modules.association_ids(&mut scope, &module, "tags").await.unwrap(),
        sorted(vec![a.id, b.id])
    );

    modules
        .remove_associations(&mut scope, &module, "tags", &[a.id, Uuid::new_v4()])
        .await
        .unwrap();
    assert_eq!(
        modules.association_ids(&mut scope, &module, "tags").await.unwrap(),
        vec![b.id]
    );
    scope.commit().await.unwrap();
}

#[tokio::test]
async fn test_foreign_tenant_ids_fail_without_partial_links() {
    let test_db = TestDb::new().await;
    let (tenant, other) = (Tenant::new(), Tenant::new());
    let module = seed_module(&test_db.db, tenant, "Guarded").await;
    let own = seed_tag(&test_db.db, tenant, "own").await;
    let foreign = seed_tag(&test_db.db, other, "foreign").await;
    let modules = Repository::<Module>::new();

    let mut scope = test_db.db.begin(AccessMode::ReadWrite).await.unwrap();
    let refused = modules
        .replace_associations(&mut scope, &module, "tags", &[own.id, foreign.id])
        .await;
    assert!(refused.unwrap_err().is_not_found());
    assert!(modules
        .association_ids(&mut scope, &module, "tags")
        .await
        .unwrap()
        .is_empty());

    let unknown = modules
        .replace_associations(&mut scope, &module, "authors", &[own.id])
        .await;
    assert!(matches!(unknown, Err(DataError::InvalidQuery(_))));
    scope.commit().await.unwrap();
}

#[tokio::test]
async fn test_read_only_scope_refuses_association_changes() {
    let test_db = TestDb::new().await;
    let tenant = Tenant::new();
    let module = seed_module(&test_db.db, tenant, "Frozen").await;
    let tag = seed_tag(&test_db.db, tenant, "t").await;
    let modules = Repository::<Module>::new();

    let mut scope = test_db.db.begin(AccessMode::ReadOnly).await.unwrap();
    let refused = modules
        .replace_associations(&mut scope, &module, "tags", &[tag.id])
        .await;
    assert_eq!(refused, Err(DataError::ReadOnlyScope));
    scope.rollback().await.unwrap();
}

#[tokio::test]
async fn test_has_many_replace_moves_foreign_keys() {
    let test_db = TestDb::new().await;
    let tenant = Tenant::new();
    let module = seed_module(&test_db.db, tenant, "Owner").await;
    let first = seed_sub_topic(&test_db.db, tenant, module.id, "first").await;
    let second = seed_sub_topic(&test_db.db, tenant, module.id, "second").await;
    let q1 = seed_question(&test_db.db, tenant, module.id, Some(first.id), "q1", 1, 1).await;
    let q2 = seed_question(&test_db.db, tenant, module.id, None, "q2", 1, 1).await;
    let sub_topics = Repository::<SubTopic>::new();

    let mut scope = test_db.db.begin(AccessMode::ReadWrite).await.unwrap();
    sub_topics
        .replace_associations(&mut scope, &second, "programming_questions", &[q1.id, q2.id])
        .await
        .unwrap();
    assert_eq!(
        sub_topics
            .association_ids(&mut scope, &second, "programming_questions")
            .await
            .unwrap(),
        sorted(vec![q1.id, q2.id])
    );
    assert!(sub_topics
        .association_ids(&mut scope, &first, "programming_questions")
        .await
        .unwrap()
        .is_empty());

    sub_topics
        .replace_associations(&mut scope, &second, "programming_questions", &[q2.id])
        .await
        .unwrap();
    assert_eq!(
        sub_topics
            .association_ids(&mut scope, &second, "programming_questions")
            .await
            .unwrap(),
        vec![q2.id]
    );
    scope.commit().await.unwrap();
}
