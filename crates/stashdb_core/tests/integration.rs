//! End-to-end scenarios through the database facade.

use stashdb_core::{BulkOptions, Database, StashResult, TransactionOptions};
use stashdb_engine::{
    EngineError, EngineTransaction, MemoryEngine, Record, StoreKey, StoreName, TransactionMode,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

fn items() -> StoreName {
    StoreName::new("items")
}

fn record(key: &str) -> Record {
    Record::new(StoreKey::from(key), key.as_bytes().to_vec())
}

#[tokio::test]
async fn bulk_write_of_unique_records_succeeds() {
    let engine = MemoryEngine::with_stores(["items"]);
    let db = Database::new(engine.clone());

    let result = db
        .bulk_write(
            &items(),
            vec![record("a"), record("b"), record("c")],
            BulkOptions::new(),
        )
        .await
        .unwrap();

    assert_eq!(result.success, 3);
    assert_eq!(result.failed, 0);
    assert_eq!(engine.store_len(&items()), 3);
}

#[tokio::test]
async fn bulk_write_with_duplicate_reports_the_failed_index() {
    let engine = MemoryEngine::with_stores(["items"]);
    engine.seed(&items(), [record("dup")]).unwrap();
    let db = Database::new(engine);

    let result = db
        .bulk_write(&items(), vec![record("dup"), record("new")], BulkOptions::new())
        .await
        .unwrap();

    assert_eq!(result.success, 1);
    assert_eq!(result.failed, 1);
    assert_eq!(result.failed_indices, vec![0]);
}

#[tokio::test]
async fn bulk_write_never_submits_for_empty_input() {
    let engine = MemoryEngine::with_stores(["items"]);
    let db = Database::new(engine.clone());

    let result = db
        .bulk_write(&items(), Vec::new(), BulkOptions::new())
        .await
        .unwrap();

    assert_eq!(result.success, 0);
    assert_eq!(result.failed, 0);
    assert_eq!(engine.transactions_started(), 0);
}

#[tokio::test]
async fn bulk_delete_filters_invalid_keys() {
    let engine = MemoryEngine::with_stores(["items"]);
    engine.seed(&items(), [record("validKey")]).unwrap();
    let db = Database::new(engine.clone());

    let result = db
        .bulk_delete(
            &items(),
            vec![StoreKey::default(), StoreKey::from("validKey")],
            BulkOptions::new(),
        )
        .await
        .unwrap();

    assert_eq!(result.success, 1);
    assert_eq!(result.failed, 1);
    assert_eq!(result.failed_indices, vec![0]);
    assert_eq!(result.errors[0].code(), "INVALID_KEY");
    assert_eq!(engine.store_len(&items()), 0);
}

#[tokio::test(start_paused = true)]
async fn slow_work_times_out_and_aborts() {
    let engine = MemoryEngine::with_stores(["items"]);
    engine.set_op_delay(Some(Duration::from_millis(500)));
    let db = Database::new(engine.clone());

    let started = Instant::now();
    let result: StashResult<()> = db
        .execute(
            vec![items()],
            TransactionMode::ReadOnly,
            TransactionOptions::new().with_timeout(Duration::from_millis(50)),
            |ctx| async move {
                ctx.txn().get(&items(), &StoreKey::from("x")).settled().await.ok();
                Ok(())
            },
        )
        .await;

    let error = result.unwrap_err();
    assert_eq!(error.code(), "TRANSACTION_TIMEOUT");
    assert!(!error.recommendation().is_empty());
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(50) && elapsed <= Duration::from_millis(100));
    assert_eq!(engine.transactions_aborted(), 1);
}

#[tokio::test(start_paused = true)]
async fn execute_retries_at_most_n_plus_one_times() {
    let engine = MemoryEngine::with_stores(["items"]);
    engine.fail_transactions(10, EngineError::storage("flaky backend"));
    let db = Database::new(engine.clone());

    let result: StashResult<()> = db
        .execute(
            vec![items()],
            TransactionMode::ReadWrite,
            TransactionOptions::new()
                .with_retries(2)
                .with_retry_delay(Duration::from_millis(10)),
            |ctx| async move {
                ctx.txn().insert(&items(), record("k")).settled().await.ok();
                Ok(())
            },
        )
        .await;

    assert!(result.is_err());
    assert_eq!(engine.transactions_started(), 3);
}

#[tokio::test]
async fn progress_reports_every_batch_boundary_despite_failures() {
    let engine = MemoryEngine::with_stores(["items"]);
    // The first batch fails once and recovers on retry; every batch
    // boundary must still report.
    engine.fail_transactions(1, EngineError::storage("flaky backend"));
    let db = Database::new(engine);

    let calls: Arc<Mutex<Vec<(usize, usize)>>> = Arc::default();
    let seen = Arc::clone(&calls);
    let records: Vec<Record> = (0..45).map(|i| record(&format!("key-{i:03}"))).collect();

    let result = db
        .bulk_write(
            &items(),
            records,
            BulkOptions::new()
                .with_batch_size(10)
                .with_retry_delay(Duration::from_millis(1))
                .with_progress(move |done, total| seen.lock().unwrap().push((done, total))),
        )
        .await
        .unwrap();

    assert_eq!(result.success + result.failed, 45);
    let calls = calls.lock().unwrap();
    assert!(calls.windows(2).all(|w| w[0].0 < w[1].0));
    assert_eq!(calls.last().unwrap(), &(45, 45));
}
