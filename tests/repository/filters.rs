use crate::common::{seed_question_grid, Tenant, TestDb};
use placement_data::database::AccessMode;
use placement_data::models::ProgrammingQuestion;
use placement_data::query_builder::{FieldFilter, Operator, QueryProcessor, Value};
use placement_data::repository::Repository;
use proptest::prelude::*;

const GRID: [(i64, i64); 5] = [(5, 10), (5, 5), (3, 10), (5, 20), (1, 10)];

async fn matching(tenant: Tenant, test_db: &TestDb, processor: QueryProcessor) -> Vec<(i64, i64)> {
    let questions = Repository::<ProgrammingQuestion>::new();
    let mut scope = test_db.db.begin(AccessMode::ReadOnly).await.unwrap();
    let mut rows: Vec<(i64, i64)> = questions
        .get_all_for_tenant(&mut scope, tenant.id, &[processor])
        .await
        .unwrap()
        .into_iter()
        .map(|q| (q.difficulty, q.score))
        .collect();
    scope.commit().await.unwrap();
    rows.sort_unstable();
    rows
}

#[tokio::test]
async fn test_operator_filter_returns_exact_intersection() {
    let test_db = TestDb::new().await;
    let tenant = Tenant::new();
    seed_question_grid(&test_db.db, tenant).await;

    let rows = matching(
        tenant,
        &test_db,
        QueryProcessor::filter_with_operator(
            &["difficulty", "score"],
            &["=?", ">=?"],
            &["AND", "OR"],
            vec![5_i64.into(), 10_i64.into()],
        ),
    )
    .await;
    assert_eq!(rows, vec![(5, 10), (5, 20)]);
}

#[tokio::test]
async fn test_operator_filter_or_runs_stay_inside_tenant() {
    let test_db = TestDb::new().await;
    let (tenant, other) = (Tenant::new(), Tenant::new());
    seed_question_grid(&test_db.db, tenant).await;
    seed_question_grid(&test_db.db, other).await;

    // difficulty = 1 OR score < 10 AND difficulty = 5
    let rows = matching(
        tenant,
        &test_db,
        QueryProcessor::filter_fields(vec![
            FieldFilter::new("difficulty", Operator::Eq, 1_i64).or_next(),
            FieldFilter::new("score", Operator::Lt, 10_i64),
            FieldFilter::new("difficulty", Operator::Eq, 5_i64),
        ]),
    )
    .await;
    assert_eq!(rows, vec![(1, 10), (5, 5)]);
}

#[tokio::test]
async fn test_operator_filter_in_list() {
    let test_db = TestDb::new().await;
    let tenant = Tenant::new();
    seed_question_grid(&test_db.db, tenant).await;

    let rows = matching(
        tenant,
        &test_db,
        QueryProcessor::filter_with_operator(
            &["difficulty"],
            &["IN (?)"],
            &[],
            vec![Value::List(vec![1_i64.into(), 3_i64.into()])],
        ),
    )
    .await;
    assert_eq!(rows, vec![(1, 10), (3, 10)]);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(6))]

    /// `difficulty = d AND score >= s` selects exactly the grid rows an
    /// in-memory filter selects.
    #[test]
    fn operator_filter_matches_in_memory_filter(d in 0i64..6, s in 0i64..25) {
        let rows = tokio_test::block_on(async {
            let test_db = TestDb::new().await;
            let tenant = Tenant::new();
            seed_question_grid(&test_db.db, tenant).await;
            matching(
                tenant,
                &test_db,
                QueryProcessor::filter_with_operator(
                    &["difficulty", "score"],
                    &["=?", ">=?"],
                    &["AND"],
                    vec![d.into(), s.into()],
                ),
            )
            .await
        });

        let mut expected: Vec<(i64, i64)> = GRID
            .iter()
            .copied()
            .filter(|(difficulty, score)| *difficulty == d && *score >= s)
            .collect();
        expected.sort_unstable();
        prop_assert_eq!(rows, expected);
    }
}
