use crate::common::{seed_module, seed_question_grid, Tenant, TestDb};
use placement_data::database::AccessMode;
use placement_data::error::DataError;
use placement_data::models::{Module, NewModule, ProgrammingQuestion};
use placement_data::query_builder::{Predicate, QueryProcessor};
use placement_data::repository::{FieldMap, Repository};

fn new_module(tenant: Tenant, name: &str) -> Module {
    Module::new(
        tenant.id,
        tenant.actor,
        NewModule {
            name: name.to_string(),
            ..NewModule::default()
        },
    )
}

#[tokio::test]
async fn test_add_duplicate_name_is_conflict_within_tenant_only() {
    let test_db = TestDb::new().await;
    let (tenant_a, tenant_b) = (Tenant::new(), Tenant::new());
    seed_module(&test_db.db, tenant_a, "Shared").await;
    let modules = Repository::<Module>::new();

    let mut scope = test_db.db.begin(AccessMode::ReadWrite).await.unwrap();
    let duplicate = modules.add(&mut scope, &new_module(tenant_a, "Shared")).await;
    assert!(duplicate.unwrap_err().is_conflict());
    scope.rollback().await.unwrap();

    let mut scope = test_db.db.begin(AccessMode::ReadWrite).await.unwrap();
    modules
        .add(&mut scope, &new_module(tenant_b, "Shared"))
        .await
        .unwrap();
    scope.commit().await.unwrap();
}

#[tokio::test]
async fn test_update_overwrites_within_tenant() {
    let test_db = TestDb::new().await;
    let (tenant, intruder) = (Tenant::new(), Tenant::new());
    let mut module = seed_module(&test_db.db, tenant, "Before").await;
    let modules = Repository::<Module>::new();

    module.name = "After".to_string();
    module.description = None;
    module.audit.touch(tenant.actor);

    let mut scope = test_db.db.begin(AccessMode::ReadWrite).await.unwrap();
    modules.update(&mut scope, &module).await.unwrap();

    let mut forged = module.clone();
    forged.tenant_id = intruder.id;
    let refused = modules.update(&mut scope, &forged).await;
    assert!(refused.unwrap_err().is_not_found());

    let stored = modules
        .get_for_tenant(&mut scope, tenant.id, module.id, &[])
        .await
        .unwrap();
    scope.commit().await.unwrap();

    assert_eq!(stored.name, "After");
    assert_eq!(stored.description, None);
    assert_eq!(stored.tenant_id, tenant.id);
}

#[tokio::test]
async fn test_save_inserts_then_overwrites() {
    let test_db = TestDb::new().await;
    let (tenant, intruder) = (Tenant::new(), Tenant::new());
    let modules = Repository::<Module>::new();
    let mut module = new_module(tenant, "Saved");

    let mut scope = test_db.db.begin(AccessMode::ReadWrite).await.unwrap();
    modules.save(&mut scope, &module).await.unwrap();
    module.name = "Saved again".to_string();
    modules.save(&mut scope, &module).await.unwrap();

    let mut forged = module.clone();
    forged.tenant_id = intruder.id;
    forged.name = "Hijacked".to_string();
    let refused = modules.save(&mut scope, &forged).await;
    assert!(refused.unwrap_err().is_conflict());

    let stored = modules
        .get_for_tenant(&mut scope, tenant.id, module.id, &[])
        .await
        .unwrap();
    scope.commit().await.unwrap();
    assert_eq!(stored.name, "Saved again");
    assert_eq!(stored.tenant_id, tenant.id);
}

#[tokio::test]
async fn test_update_with_map_touches_only_named_fields() {
    let test_db = TestDb::new().await;
    let tenant = Tenant::new();
    seed_question_grid(&test_db.db, tenant).await;
    let questions = Repository::<ProgrammingQuestion>::new();

    let mut scope = test_db.db.begin(AccessMode::ReadWrite).await.unwrap();
    let changed = questions
        .update_with_map_for_tenant(
            &mut scope,
            tenant.id,
            &FieldMap::new().set("score", 99_i64),
            &[QueryProcessor::filter(Predicate::eq(
                "programming_questions.difficulty",
                5_i64,
            ))],
        )
        .await
        .unwrap();
    assert_eq!(changed, 3);

    let all = questions
        .get_all_for_tenant(
            &mut scope,
            tenant.id,
            &[QueryProcessor::order_by("programming_questions.title ASC")],
        )
        .await
        .unwrap();
    scope.commit().await.unwrap();

    let scores: Vec<(i64, i64)> = all.iter().map(|q| (q.difficulty, q.score)).collect();
    assert_eq!(scores, vec![(5, 99), (5, 99), (3, 10), (5, 99), (1, 10)]);
    assert!(all.iter().all(|q| q.title.starts_with('q')));
}

#[tokio::test]
async fn test_update_with_map_refuses_unfiltered_and_foreign_tenant() {
    let test_db = TestDb::new().await;
    let tenant = Tenant::new();
    seed_question_grid(&test_db.db, tenant).await;
    let questions = Repository::<ProgrammingQuestion>::new();
    let fields = FieldMap::new().set("score", 0_i64);

    let mut scope = test_db.db.begin(AccessMode::ReadWrite).await.unwrap();
    let unfiltered = questions.update_with_map(&mut scope, &fields, &[]).await;
    assert!(matches!(unfiltered, Err(DataError::InvalidQuery(_))));

    let immutable = questions
        .update_with_map(
            &mut scope,
            &FieldMap::new().set("tenant_id", Tenant::new().id),
            &[QueryProcessor::filter(Predicate::gt("programming_questions.score", 0_i64))],
        )
        .await;
    assert!(matches!(immutable, Err(DataError::InvalidQuery(_))));

    let foreign = questions
        .update_with_map_for_tenant(
            &mut scope,
            Tenant::new().id,
            &fields,
            &[QueryProcessor::filter(Predicate::gt("programming_questions.score", 0_i64))],
        )
        .await
        .unwrap();
    assert_eq!(foreign, 0);
    scope.commit().await.unwrap();
}

#[tokio::test]
async fn test_soft_delete_is_idempotent_and_hidden_from_reads() {
    let test_db = TestDb::new().await;
    let tenant = Tenant::new();
    let module = seed_module(&test_db.db, tenant, "Doomed").await;
    let keeper = seed_module(&test_db.db, tenant, "Keeper").await;
    let modules = Repository::<Module>::new();

    let mut scope = test_db.db.begin(AccessMode::ReadWrite).await.unwrap();
    modules
        .soft_delete(&mut scope, tenant.id, module.id, tenant.actor)
        .await
        .unwrap();
    let again = modules
        .soft_delete(&mut scope, tenant.id, module.id, tenant.actor)
        .await;
    assert!(again.unwrap_err().is_not_found());
    scope.commit().await.unwrap();

    let mut scope = test_db.db.begin(AccessMode::ReadOnly).await.unwrap();
    let by_name = [QueryProcessor::filter(Predicate::eq("modules.name", "Doomed"))];
    assert!(modules
        .get_for_tenant(&mut scope, tenant.id, module.id, &[])
        .await
        .unwrap_err()
        .is_not_found());
    assert!(modules
        .get_record_for_tenant(&mut scope, tenant.id, &by_name)
        .await
        .unwrap_err()
        .is_not_found());
    let live: Vec<_> = modules
        .get_all_for_tenant(&mut scope, tenant.id, &[])
        .await
        .unwrap()
        .into_iter()
        .map(|m| m.id)
        .collect();
    assert_eq!(live, vec![keeper.id]);
    assert_eq!(modules.get_count_for_tenant(&mut scope, tenant.id, &[]).await.unwrap(), 1);
    assert!(!modules
        .does_record_exist_for_tenant(&mut scope, tenant.id, &by_name)
        .await
        .unwrap());
    let page = modules
        .get_page_for_tenant(&mut scope, tenant.id, 10, 0, &[])
        .await
        .unwrap();
    assert_eq!(page.total_count, 1);

    // Explicit opt-in still sees the row, with its audit stamps.
    let deleted = modules
        .get_record_for_tenant(
            &mut scope,
            tenant.id,
            &[QueryProcessor::with_deleted(), by_name[0].clone()],
        )
        .await
        .unwrap();
    assert!(deleted.audit.is_deleted());
    assert_eq!(deleted.audit.deleted_by, Some(tenant.actor));
    scope.commit().await.unwrap();
}

#[tokio::test]
async fn test_deleted_name_can_be_reused() {
    let test_db = TestDb::new().await;
    let tenant = Tenant::new();
    let module = seed_module(&test_db.db, tenant, "Recycled").await;
    let modules = Repository::<Module>::new();

    let mut scope = test_db.db.begin(AccessMode::ReadWrite).await.unwrap();
    modules
        .soft_delete(&mut scope, tenant.id, module.id, tenant.actor)
        .await
        .unwrap();
    modules
        .add(&mut scope, &new_module(tenant, "Recycled"))
        .await
        .unwrap();
    scope.commit().await.unwrap();
}

#[tokio::test]
async fn test_save_never_revives_a_deleted_record() {
    let test_db = TestDb::new().await;
    let tenant = Tenant::new();
    let stale = seed_module(&test_db.db, tenant, "Stale").await;
    let modules = Repository::<Module>::new();

    let mut scope = test_db.db.begin(AccessMode::ReadWrite).await.unwrap();
    modules
        .soft_delete(&mut scope, tenant.id, stale.id, tenant.actor)
        .await
        .unwrap();
    assert!(modules.update(&mut scope, &stale).await.unwrap_err().is_not_found());
    assert!(modules.save(&mut scope, &stale).await.unwrap_err().is_not_found());
    scope.commit().await.unwrap();

    let mut scope = test_db.db.begin(AccessMode::ReadOnly).await.unwrap();
    assert!(modules
        .get_for_tenant(&mut scope, tenant.id, stale.id, &[])
        .await
        .unwrap_err()
        .is_not_found());
    let deleted = modules
        .get_record_for_tenant(&mut scope, tenant.id, &[QueryProcessor::with_deleted()])
        .await
        .unwrap();
    assert!(deleted.audit.is_deleted());
    scope.commit().await.unwrap();
}
