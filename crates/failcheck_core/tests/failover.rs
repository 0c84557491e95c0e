//! End-to-end tests: generator and reconciler against an in-memory remote.

use failcheck_core::{
    Generator, GeneratorConfig, LocalLog, LogReader, MemoryRemote, Record, ReconcileConfig,
    Reconciler, RecordId, RunStats,
};
use std::path::Path;
use std::time::Duration;
use tempfile::tempdir;
use tokio_util::sync::CancellationToken;

fn config(path: &Path) -> GeneratorConfig {
    GeneratorConfig::new(path)
        .with_pause(Duration::from_millis(1))
        .with_timeout(Duration::from_millis(100))
        .with_sync_on_write(false)
}

fn logged_ids(path: &Path) -> Vec<RecordId> {
    LogReader::open(path)
        .unwrap()
        .map(|r| r.unwrap().id)
        .collect()
}

async fn run_until(
    config: GeneratorConfig,
    remote: &MemoryRemote,
    inserts: u64,
) -> RunStats {
    let cancel = CancellationToken::new();
    remote.cancel_after_inserts(inserts, cancel.clone());
    Generator::new(config, remote.clone(), cancel)
        .run()
        .await
        .unwrap()
}

#[tokio::test]
async fn failed_insert_keeps_local_entry_and_advances() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("stamps.log");
    let remote = MemoryRemote::new();
    remote.fail_insert(3);

    let stats = run_until(config(&path), &remote, 5).await;

    assert_eq!(logged_ids(&path), vec![1, 2, 3, 4, 5]);
    assert_eq!(remote.stamp_ids(), vec![1, 2, 4, 5]);
    assert_eq!(stats.remote_failed, 1);
    assert_eq!(stats.remote_inserted, 4);
    // The connection survived the rejected statement.
    assert_eq!(remote.connects(), 1);
}

#[tokio::test]
async fn dropped_connection_reconnects_without_reusing_ids() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("stamps.log");
    let remote = MemoryRemote::new();
    remote.drop_connection_on_insert(2);

    let stats = run_until(config(&path), &remote, 4).await;

    assert_eq!(logged_ids(&path), vec![1, 2, 3, 4]);
    assert_eq!(remote.stamp_ids(), vec![1, 3, 4]);
    assert_eq!(remote.connects(), 2);
    assert_eq!(stats.connects, 2);
    assert_eq!(remote.sessions_lost(), 1);
    assert_eq!(remote.open_sessions(), 0);
}

#[tokio::test]
async fn stalled_insert_times_out_and_reconnects() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("stamps.log");
    let remote = MemoryRemote::new();
    remote.stall_insert(2);

    let stats = run_until(config(&path), &remote, 3).await;

    assert_eq!(logged_ids(&path), vec![1, 2, 3]);
    assert_eq!(remote.stamp_ids(), vec![1, 3]);
    assert_eq!(stats.remote_failed, 1);
    assert_eq!(remote.connects(), 2);
    assert_eq!(remote.open_sessions(), 0);
}

#[tokio::test]
async fn refused_connects_consume_no_ids() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("stamps.log");
    let remote = MemoryRemote::new();
    remote.refuse_connects(3);

    let stats = run_until(config(&path), &remote, 2).await;

    assert_eq!(stats.connect_failures, 3);
    assert_eq!(stats.connects, 1);
    assert_eq!(logged_ids(&path), vec![1, 2]);
    assert_eq!(remote.stamp_ids(), vec![1, 2]);
}

#[tokio::test]
async fn next_id_failure_retries_from_connect() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("stamps.log");
    let remote = MemoryRemote::new();
    remote.seed_stamps([1, 2, 3]);
    remote.fail_next_id(2);

    let stats = run_until(config(&path), &remote, 2).await;

    assert_eq!(stats.connects, 3);
    assert_eq!(logged_ids(&path), vec![4, 5]);
    assert_eq!(remote.stamp_ids(), vec![1, 2, 3, 4, 5]);
}

#[tokio::test]
async fn resume_continues_after_remote_max() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("stamps.log");
    let remote = MemoryRemote::new();
    remote.seed_stamps([1, 2, 7]);

    run_until(config(&path), &remote, 2).await;

    assert_eq!(logged_ids(&path), vec![8, 9]);
    assert_eq!(remote.stamp_ids(), vec![1, 2, 7, 8, 9]);
}

#[tokio::test]
async fn restart_without_reset_appends_to_history() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("stamps.log");
    let remote = MemoryRemote::new();

    run_until(config(&path), &remote, 3).await;
    run_until(config(&path), &remote, 2).await;

    assert_eq!(logged_ids(&path), vec![1, 2, 3, 4, 5]);
    assert_eq!(remote.stamp_ids(), vec![1, 2, 3, 4, 5]);
}

#[tokio::test]
async fn reset_restarts_numbering_at_one() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("stamps.log");
    let mut log = LocalLog::open(&path, false).unwrap();
    for id in 1..=20 {
        log.append(&Record::now(id, "old")).unwrap();
    }
    log.close().unwrap();

    let remote = MemoryRemote::new();
    remote.seed_stamps(1..=20);

    run_until(config(&path).with_reset(true), &remote, 3).await;

    assert_eq!(logged_ids(&path), vec![1, 2, 3]);
    assert_eq!(remote.stamp_ids(), vec![1, 2, 3]);
}

#[tokio::test]
async fn reset_proceeds_when_truncate_fails() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("stamps.log");
    let remote = MemoryRemote::new();
    remote.seed_stamps([1]);
    remote.fail_truncate(true);

    let stats = run_until(config(&path).with_reset(true), &remote, 3).await;

    // Id 1 clashes with the leftover row; the loop carries on.
    assert_eq!(logged_ids(&path), vec![1, 2, 3]);
    assert_eq!(stats.remote_failed, 1);
    assert_eq!(remote.stamp_ids(), vec![1, 2, 3]);
}

#[tokio::test]
async fn reset_waits_for_reconnect_when_truncate_loses_connection() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("stamps.log");
    let remote = MemoryRemote::new();
    remote.drop_connection_on_truncate();

    let stats = run_until(config(&path).with_reset(true), &remote, 3).await;

    // Nothing was written on the dead session; id 1 went out after reconnecting.
    assert_eq!(logged_ids(&path), vec![1, 2, 3]);
    assert_eq!(remote.stamp_ids(), vec![1, 2, 3]);
    assert_eq!(stats.remote_failed, 0);
    assert_eq!(stats.connects, 2);
    assert_eq!(remote.sessions_lost(), 1);
    assert_eq!(remote.open_sessions(), 0);

    let result = Reconciler::new(ReconcileConfig::new(&path), remote.clone())
        .run()
        .await
        .unwrap();
    assert!(result.is_clean());
}

#[tokio::test]
async fn failed_truncate_pauses_before_first_write() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("stamps.log");
    let remote = MemoryRemote::new();
    remote.fail_truncate(true);

    let stats = run_until(config(&path).with_reset(true), &remote, 2).await;

    // The failed truncation takes a cycle of its own on the same session.
    assert_eq!(stats.cycles, 3);
    assert_eq!(stats.connects, 1);
    assert_eq!(logged_ids(&path), vec![1, 2]);
    assert_eq!(remote.stamp_ids(), vec![1, 2]);
}

#[tokio::test]
async fn cancellation_during_connect_is_clean() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("stamps.log");
    let remote = MemoryRemote::new();
    remote.stall_connects(true);

    let cancel = CancellationToken::new();
    let stopper = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        stopper.cancel();
    });

    let generator = Generator::new(
        config(&path).with_timeout(Duration::from_secs(30)),
        remote.clone(),
        cancel,
    );
    let stats = tokio::time::timeout(Duration::from_secs(5), generator.run())
        .await
        .expect("generator should stop promptly")
        .unwrap();

    assert_eq!(stats.generated, 0);
    assert!(logged_ids(&path).is_empty());
    assert_eq!(remote.open_sessions(), 0);
}

#[tokio::test]
async fn cancellation_during_stalled_insert_is_clean() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("stamps.log");
    let remote = MemoryRemote::new();
    remote.stall_insert(2);

    let cancel = CancellationToken::new();
    let stopper = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        stopper.cancel();
    });

    let generator = Generator::new(
        config(&path).with_timeout(Duration::from_secs(30)),
        remote.clone(),
        cancel,
    );
    let stats = generator.run().await.unwrap();

    assert_eq!(logged_ids(&path), vec![1, 2]);
    assert_eq!(stats.generated, 2);
    assert_eq!(stats.remote_failed, 1);
    assert_eq!(remote.open_sessions(), 0);

    // Every line in the file is complete.
    let content = std::fs::read_to_string(&path).unwrap();
    assert!(content.ends_with('\n'));
    assert_eq!(content.lines().count(), 2);
}

#[tokio::test]
async fn reconciliation_after_failover_finds_lost_rows() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("stamps.log");
    let remote = MemoryRemote::new();
    remote.fail_insert(3);

    run_until(config(&path), &remote, 6).await;

    // The failover loses a row that had been acknowledged.
    remote.lose_stamps([5]);

    let result = Reconciler::new(ReconcileConfig::new(&path), remote.clone())
        .run()
        .await
        .unwrap();

    let mut missing: Vec<_> = result.missing.iter().map(|r| r.id).collect();
    missing.sort_unstable();
    assert_eq!(missing, vec![3, 5]);
    assert_eq!(result.loaded, Some(6));
    assert_eq!(remote.open_sessions(), 0);
}
