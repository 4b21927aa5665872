use crate::common::{seed_module, Tenant, TestDb};
use futures::FutureExt;
use placement_data::database::{AccessMode, UnitOfWork};
use placement_data::error::DataError;
use placement_data::models::{Module, NewModule, Tag};
use placement_data::query_builder::QueryProcessor;
use placement_data::repository::Repository;

fn module(tenant: Tenant, name: &str) -> Module {
    Module::new(
        tenant.id,
        tenant.actor,
        NewModule {
            name: name.to_string(),
            ..NewModule::default()
        },
    )
}

async fn visible(test_db: &TestDb, tenant: Tenant, module: &Module) -> bool {
    let mut scope = test_db.db.begin(AccessMode::ReadOnly).await.unwrap();
    let found = Repository::<Module>::new()
        .get_for_tenant(&mut scope, tenant.id, module.id, &[])
        .await;
    scope.commit().await.unwrap();
    match found {
        Ok(_) => true,
        Err(DataError::NotFound(_)) => false,
        Err(other) => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_commit_persists_writes() {
    let test_db = TestDb::new().await;
    let tenant = Tenant::new();
    let module = module(tenant, "Committed");

    let mut scope = test_db.db.begin(AccessMode::ReadWrite).await.unwrap();
    Repository::<Module>::new().add(&mut scope, &module).await.unwrap();
    scope.commit().await.unwrap();

    assert!(visible(&test_db, tenant, &module).await);
}

#[tokio::test]
async fn test_rollback_discards_writes() {
    let test_db = TestDb::new().await;
    let tenant = Tenant::new();
    let module = module(tenant, "Rolled back");

    let mut scope = test_db.db.begin(AccessMode::ReadWrite).await.unwrap();
    Repository::<Module>::new().add(&mut scope, &module).await.unwrap();
    scope.rollback().await.unwrap();

    assert!(!visible(&test_db, tenant, &module).await);
}

#[tokio::test]
async fn test_dropped_scope_rolls_back() {
    let test_db = TestDb::new().await;
    let tenant = Tenant::new();
    let module = module(tenant, "Dropped");

    {
        let mut scope = test_db.db.begin(AccessMode::ReadWrite).await.unwrap();
        Repository::<Module>::new().add(&mut scope, &module).await.unwrap();
    }

    assert!(!visible(&test_db, tenant, &module).await);
}

#[tokio::test]
async fn test_read_only_scope_rejects_every_write() {
    let test_db = TestDb::new().await;
    let tenant = Tenant::new();
    let existing = seed_module(&test_db.db, tenant, "Existing").await;
    let modules = Repository::<Module>::new();

    let mut scope = test_db.db.begin(AccessMode::ReadOnly).await.unwrap();
    assert_eq!(scope.access_mode(), AccessMode::ReadOnly);

    let insert = modules.add(&mut scope, &module(tenant, "New")).await;
    assert_eq!(insert.unwrap_err(), DataError::ReadOnlyScope);

    let delete = modules
        .soft_delete(&mut scope, tenant.id, existing.id, tenant.actor)
        .await;
    assert_eq!(delete.unwrap_err(), DataError::ReadOnlyScope);

    let tag = Tag::new(tenant.id, tenant.actor, "core");
    let link = modules
        .replace_associations(&mut scope, &existing, "tags", &[tag.id])
        .await;
    assert_eq!(link.unwrap_err(), DataError::ReadOnlyScope);

    // Reads still work on the same scope.
    let count = modules.get_count_for_tenant(&mut scope, tenant.id, &[]).await.unwrap();
    assert_eq!(count, 1);
    scope.commit().await.unwrap();
}

#[tokio::test]
async fn test_read_only_scope_rejects_raw_writes_in_storage() {
    let test_db = TestDb::new().await;
    let tenant = Tenant::new();
    seed_module(&test_db.db, tenant, "Survivor").await;
    let modules = Repository::<Module>::new();

    let mut scope = test_db.db.begin(AccessMode::ReadOnly).await.unwrap();
    let deleted = modules
        .get_all(
            &mut scope,
            &[QueryProcessor::raw_query("DELETE FROM modules RETURNING *", vec![])],
        )
        .await;
    assert_eq!(deleted.unwrap_err(), DataError::ReadOnlyScope);

    let rows = modules
        .get_all(
            &mut scope,
            &[QueryProcessor::raw_query("SELECT * FROM modules", vec![])],
        )
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    scope.commit().await.unwrap();

    // The pooled connection is writable again for the next read-write scope.
    let mut scope = test_db.db.begin(AccessMode::ReadWrite).await.unwrap();
    modules.add(&mut scope, &module(tenant, "After")).await.unwrap();
    scope.commit().await.unwrap();

    let mut scope = test_db.db.begin(AccessMode::ReadOnly).await.unwrap();
    let all = modules
        .get_all(&mut scope, &[QueryProcessor::with_deleted()])
        .await
        .unwrap();
    assert_eq!(all.len(), 2);
    scope.commit().await.unwrap();
}

#[tokio::test]
async fn test_borrowed_scope_shares_the_transaction() {
    let test_db = TestDb::new().await;
    let tenant = Tenant::new();
    let first = module(tenant, "First");
    let second = module(tenant, "Second");
    let modules = Repository::<Module>::new();

    let mut scope = test_db.db.begin(AccessMode::ReadWrite).await.unwrap();
    let owner_id = scope.id();
    {
        let mut borrowed = scope.borrow_scope();
        assert_eq!(borrowed.scope_id(), owner_id);
        modules.add(&mut borrowed, &first).await.unwrap();

        let mut nested = borrowed.reborrow();
        modules.add(&mut nested, &second).await.unwrap();
    }
    // Uncommitted rows are visible inside the owning transaction.
    assert_eq!(
        modules.get_count_for_tenant(&mut scope, tenant.id, &[]).await.unwrap(),
        2
    );
    scope.rollback().await.unwrap();

    assert!(!visible(&test_db, tenant, &first).await);
    assert!(!visible(&test_db, tenant, &second).await);
}

#[tokio::test]
async fn test_in_transaction_commits_on_ok() {
    let test_db = TestDb::new().await;
    let tenant = Tenant::new();
    let created = module(tenant, "Closure");
    let inserted = created.clone();

    let id = test_db
        .db
        .in_transaction(AccessMode::ReadWrite, move |scope| {
            async move {
                Repository::<Module>::new().add(scope, &inserted).await?;
                Ok(inserted.id)
            }
            .boxed()
        })
        .await
        .unwrap();

    assert_eq!(id, created.id);
    assert!(visible(&test_db, tenant, &created).await);
}

#[tokio::test]
async fn test_in_transaction_rolls_back_on_err() {
    let test_db = TestDb::new().await;
    let tenant = Tenant::new();
    let created = module(tenant, "Closure");
    let inserted = created.clone();

    let result: Result<(), DataError> = test_db
        .db
        .in_transaction(AccessMode::ReadWrite, move |scope| {
            async move {
                Repository::<Module>::new().add(scope, &inserted).await?;
                Err(DataError::Validation("abort".into()))
            }
            .boxed()
        })
        .await;

    assert_eq!(result.unwrap_err(), DataError::Validation("abort".into()));
    assert!(!visible(&test_db, tenant, &created).await);
}
