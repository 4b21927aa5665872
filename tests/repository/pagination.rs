use crate::common::{seed_module, seed_question, Tenant, TestDb};
use placement_data::database::AccessMode;
use placement_data::models::{Module, ProgrammingQuestion};
use placement_data::query_builder::{QueryProcessor, TotalCount};
use placement_data::repository::Repository;
use proptest::prelude::*;
use sqlx::FromRow;
use std::collections::HashSet;
use uuid::Uuid;

#[derive(Debug, FromRow)]
struct DifficultyGroup {
    difficulty: i64,
}

async fn collect_pages(rows: usize, limit: u32) -> (Vec<Uuid>, Vec<i64>, HashSet<Uuid>) {
    let test_db = TestDb::new().await;
    let tenant = Tenant::new();
    let mut seeded = HashSet::new();
    for i in 0..rows {
        seeded.insert(seed_module(&test_db.db, tenant, &format!("m{i}")).await.id);
    }
    // Another tenant's rows never leak into the count.
    seed_module(&test_db.db, Tenant::new(), "elsewhere").await;

    let modules = Repository::<Module>::new();
    let mut scope = test_db.db.begin(AccessMode::ReadOnly).await.unwrap();
    let (mut ids, mut totals) = (Vec::new(), Vec::new());
    let mut offset = 0;
    loop {
        let page = modules
            .get_page_for_tenant(&mut scope, tenant.id, limit, offset, &[])
            .await
            .unwrap();
        totals.push(page.total_count);
        if page.items.is_empty() {
            break;
        }
        assert!(page.items.len() <= limit as usize);
        ids.extend(page.items.into_iter().map(|m| m.id));
        offset += limit;
    }
    scope.commit().await.unwrap();
    (ids, totals, seeded)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(8))]

    /// Walking every page visits each row exactly once, and every page
    /// reports the same total.
    #[test]
    fn pages_partition_the_collection(rows in 0usize..9, limit in 1u32..5) {
        let (ids, totals, seeded) = tokio_test::block_on(collect_pages(rows, limit));

        prop_assert_eq!(ids.len(), rows);
        let unique: HashSet<Uuid> = ids.iter().copied().collect();
        prop_assert_eq!(unique, seeded);
        prop_assert!(totals.iter().all(|t| *t == rows as i64));
    }
}

#[tokio::test]
async fn test_grouped_page_total_counts_groups() {
    let test_db = TestDb::new().await;
    let tenant = Tenant::new();
    let module = seed_module(&test_db.db, tenant, "Grouped").await;
    for (i, difficulty) in [1, 1, 2, 3, 3, 3, 4].into_iter().enumerate() {
        seed_question(&test_db.db, tenant, module.id, None, &format!("q{i}"), difficulty, 1).await;
    }
    let questions = Repository::<ProgrammingQuestion>::new();
    let total = TotalCount::new();

    let mut scope = test_db.db.begin(AccessMode::ReadOnly).await.unwrap();
    let groups: Vec<DifficultyGroup> = questions
        .scan_for_tenant(
            &mut scope,
            tenant.id,
            &[
                QueryProcessor::select(&["programming_questions.difficulty AS difficulty"]),
                QueryProcessor::group_by("programming_questions.difficulty"),
                QueryProcessor::order_by("programming_questions.difficulty ASC"),
                QueryProcessor::paginate(2, 1, &total),
            ],
        )
        .await
        .unwrap();
    scope.commit().await.unwrap();

    let difficulties: Vec<i64> = groups.iter().map(|g| g.difficulty).collect();
    assert_eq!(difficulties, vec![2, 3]);
    assert_eq!(total.get(), 4);
}

#[tokio::test]
async fn test_page_beyond_the_end_is_empty_with_total() {
    let test_db = TestDb::new().await;
    let tenant = Tenant::new();
    for name in ["a", "b", "c"] {
        seed_module(&test_db.db, tenant, name).await;
    }
    let modules = Repository::<Module>::new();

    let mut scope = test_db.db.begin(AccessMode::ReadOnly).await.unwrap();
    let page = modules
        .get_page_for_tenant(&mut scope, tenant.id, 10, 50, &[])
        .await
        .unwrap();
    scope.commit().await.unwrap();

    assert!(page.items.is_empty());
    assert_eq!(page.total_count, 3);
    assert_eq!(page.total_pages(), 1);
}
