//! End-to-end workload scenarios against the in-memory store: contiguous
//! fill, exact range verification, and the update/delete cursor discipline.

use shard_stress::keyspace::{self, RangeQuery};
use shard_stress::store::{SortOrder, StoreClient};
use shard_stress::{
    Document, IdMode, MemoryStore, OpWeights, ValueRange, WorkloadConfig, WorkloadDriver,
};

fn insert_only_weights() -> OpWeights {
    OpWeights {
        query: 0,
        insert: 1,
        update: 0,
        delete: 0,
    }
}

fn seeded_driver(
    weights: OpWeights,
    seed: u64,
    id_mode: IdMode,
) -> (WorkloadDriver<MemoryStore>, MemoryStore) {
    let store = MemoryStore::new();
    let config = WorkloadConfig {
        weights,
        seed: Some(seed),
        id_mode,
        report_every: 0,
        ..Default::default()
    };
    let driver = WorkloadDriver::new(store.clone(), config).unwrap();
    (driver, store)
}

fn drain_values(store: &MemoryStore, query: &RangeQuery) -> Vec<i32> {
    let mut stream = store.find(query, SortOrder::Ascending).unwrap();
    let mut values = Vec::new();
    while let Some(doc) = stream.next().unwrap() {
        values.push(doc.value);
    }
    values
}

#[test]
fn insert_only_run_populates_contiguous_keyspace() {
    let (mut driver, store) = seeded_driver(insert_only_weights(), 42, IdMode::Incremental);
    driver.run_ticks(300).unwrap();

    assert_eq!(driver.cursors().inserted, 300);
    assert_eq!(store.document_count(), 300);

    let mut docs = store.documents();
    docs.sort_by_key(|d| d.value);
    let values: Vec<i32> = docs.iter().map(|d| d.value).collect();
    assert_eq!(values, (0..300).collect::<Vec<i32>>());

    // Every mix field sits within its smear window of the true value.
    for doc in &docs {
        for (i, mix) in doc.mix.iter().enumerate() {
            let bound = 1i64 << i;
            let d = i64::from(keyspace::wrap(i64::from(*mix) - i64::from(doc.value)));
            assert!(
                d >= -bound && d < bound,
                "value {} mix[{i}] = {mix} outside +-{bound}",
                doc.value
            );
        }
    }
}

#[test]
fn range_query_returns_exact_sparse_progression() {
    let (mut driver, store) = seeded_driver(insert_only_weights(), 43, IdMode::Incremental);
    driver.run_ticks(300).unwrap();

    // The driver's own verification passes over the full range.
    driver.query_once().unwrap();

    // And the raw result set is exactly 0, 2, ..., 298.
    let query = RangeQuery::build(driver.client_id(), 5, 4, ValueRange::from_pair(0, 300), 1);
    let values = drain_values(&store, &query);
    let expected: Vec<i32> = (0..300).step_by(2).collect();
    assert_eq!(values.len(), 150);
    assert_eq!(values, expected);
}

#[test]
fn verification_fails_when_an_expected_value_is_missing() {
    let (mut driver, store) = seeded_driver(insert_only_weights(), 44, IdMode::Incremental);
    driver.run_ticks(300).unwrap();
    driver.query_once().unwrap();

    assert!(store.remove_value(driver.client_id(), 250));

    let err = driver.query_once().unwrap_err();
    assert!(err.is_verification(), "expected verification failure, got {err}");
}

#[test]
fn verification_fails_on_an_unexpected_extra_document() {
    let (mut driver, store) = seeded_driver(insert_only_weights(), 45, IdMode::Incremental);
    driver.run_ticks(100).unwrap();

    // A duplicate of an expected value breaks the progression.
    let mut rng = {
        use rand::SeedableRng;
        rand::rngs::StdRng::seed_from_u64(9)
    };
    store
        .insert(Document::generate(
            &mut rng,
            driver.client_id(),
            IdMode::Incremental,
            40,
        ))
        .unwrap();

    let err = driver.query_once().unwrap_err();
    assert!(err.is_verification());
}

#[test]
fn deletes_walk_odd_values_and_leave_queries_exact() {
    let (mut driver, store) = seeded_driver(insert_only_weights(), 46, IdMode::Incremental);
    driver.run_ticks(50).unwrap();

    for _ in 0..10 {
        driver.delete_once().unwrap();
    }
    assert_eq!(driver.cursors().deleted, 21);
    assert_eq!(store.document_count(), 40);
    let surviving: Vec<i32> = store.documents().iter().map(|d| d.value).collect();
    for odd in (1..21).step_by(2) {
        assert!(!surviving.contains(&odd), "value {odd} should be deleted");
    }

    // The even lattice is untouched, so verification still passes.
    driver.query_once().unwrap();
}

#[test]
fn updates_mark_alternate_documents_without_breaking_queries() {
    let (mut driver, store) = seeded_driver(insert_only_weights(), 47, IdMode::Incremental);
    driver.run_ticks(10).unwrap();

    for _ in 0..3 {
        driver.update_once().unwrap();
    }
    assert_eq!(driver.cursors().updated, 6);

    let updated: Vec<i32> = store
        .documents()
        .into_iter()
        .filter(|d| d.updated)
        .map(|d| d.value)
        .collect();
    assert_eq!(updated, vec![0, 2, 4]);

    driver.query_once().unwrap();
}

#[test]
fn update_and_delete_never_race_ahead_of_inserts() {
    let (mut driver, store) = seeded_driver(insert_only_weights(), 48, IdMode::Incremental);

    // No headroom at all: both are silent no-ops with no store traffic.
    driver.update_once().unwrap();
    driver.delete_once().unwrap();
    assert_eq!(driver.cursors().updated, 0);
    assert_eq!(driver.cursors().deleted, 1);
    assert_eq!(store.update_calls(), 0);
    assert_eq!(store.remove_calls(), 0);
}

#[test]
fn incremental_ids_follow_value_order_and_random_ids_do_not_collide() {
    let (mut driver, store) = seeded_driver(insert_only_weights(), 49, IdMode::Incremental);
    driver.run_ticks(20).unwrap();
    let mut docs = store.documents();
    docs.sort_by_key(|d| d.value);
    for pair in docs.windows(2) {
        assert!(pair[0].id.0 < pair[1].id.0);
    }

    let (mut driver, store) = seeded_driver(insert_only_weights(), 50, IdMode::Random);
    driver.run_ticks(200).unwrap();
    let mut ids: Vec<u128> = store.documents().iter().map(|d| d.id.0).collect();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 200);
}

#[test]
fn mixed_seeded_run_completes_with_verification_intact() {
    let (mut driver, store) = seeded_driver(OpWeights::default(), 1234, IdMode::Incremental);
    driver.run_ticks(2000).unwrap();

    let counts = driver.op_counts();
    let total: u64 = counts.iter().map(|(_, c)| c).sum();
    assert_eq!(total, 2000);
    // The skewed default weights grow the keyspace faster than deletes eat it.
    assert!(driver.cursors().inserted > driver.cursors().deleted);
    assert!(store.document_count() > 0);

    // A final explicit verification over the full range still holds.
    driver.query_once().unwrap();
}

#[test]
fn concurrent_clients_do_not_interfere() {
    let store = MemoryStore::new();
    let config_a = WorkloadConfig {
        weights: insert_only_weights(),
        seed: Some(51),
        report_every: 0,
        ..Default::default()
    };
    let config_b = WorkloadConfig {
        weights: insert_only_weights(),
        seed: Some(52),
        report_every: 0,
        ..Default::default()
    };
    let mut a = WorkloadDriver::new(store.clone(), config_a).unwrap();
    let mut b = WorkloadDriver::new(store.clone(), config_b).unwrap();

    a.run_ticks(100).unwrap();
    b.run_ticks(60).unwrap();
    assert_ne!(a.client_id(), b.client_id());
    assert_eq!(store.document_count(), 160);

    // Each driver verifies only its own documents.
    a.query_once().unwrap();
    b.query_once().unwrap();
}
