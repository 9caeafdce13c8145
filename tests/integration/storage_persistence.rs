//! SQLite persistence across reopen
//!
//! - Results and configuration survive closing the store
//! - Limits and ordering hold on a reopened database
//! - Clearing frees disk space

use std::sync::Arc;

use netdash::storage::{AppConfig, StorageBackend, sqlite::SqliteBackend};
use pretty_assertions::assert_eq;

use crate::helpers::*;

#[tokio::test]
async fn test_results_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("netdash.db");

    let ids = {
        let store = SqliteBackend::new(&path).await.unwrap();
        let mut ids = vec![];
        for i in 0..5 {
            ids.push(store.save_result(measurement_at(minute(i), i as f64)).await.unwrap().id);
        }
        store.close().await.unwrap();
        ids
    };

    let store = SqliteBackend::new(&path).await.unwrap();
    let latest: Vec<i64> = store
        .get_latest_results(3)
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.id)
        .collect();
    assert_eq!(latest, vec![ids[4], ids[3], ids[2]]);

    let graph: Vec<f64> = store
        .get_graph_data(3)
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.download_mbps)
        .collect();
    assert_eq!(graph, vec![2.0, 3.0, 4.0]);

    let next = store.save_result(measurement_at(minute(10), 0.0)).await.unwrap();
    assert!(next.id > ids[4]);
}

#[tokio::test]
async fn test_config_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("netdash.db");

    {
        let store = SqliteBackend::new(&path).await.unwrap();
        store
            .update_config(AppConfig::new(Some("1234".to_string()), "*/30 * * * *", 25))
            .await
            .unwrap();
        store.close().await.unwrap();
    }

    let store = SqliteBackend::new(&path).await.unwrap();
    assert_eq!(
        store.get_config().await.unwrap(),
        AppConfig::new(Some("1234".to_string()), "*/30 * * * *", 25)
    );
}

#[tokio::test]
async fn test_timestamps_keep_millisecond_precision() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteBackend::new(dir.path().join("netdash.db")).await.unwrap();

    let created_at = minute(5) + chrono::Duration::milliseconds(123);
    let saved = store.save_result(measurement_at(created_at, 1.0)).await.unwrap();

    let loaded = store.get_latest_results(1).await.unwrap();
    assert_eq!(loaded, vec![saved]);
    assert_eq!(loaded[0].created_at, created_at);
}

#[tokio::test]
async fn test_shared_store_concurrent_saves() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(SqliteBackend::new(dir.path().join("netdash.db")).await.unwrap());

    let tasks: Vec<_> = (0..20)
        .map(|i| {
            let store = store.clone();
            tokio::spawn(async move { store.save_result(measurement_at(minute(i), i as f64)).await })
        })
        .collect();

    let mut ids: Vec<i64> = futures::future::join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap().id)
        .collect();
    ids.sort_unstable();
    ids.dedup();

    assert_eq!(ids.len(), 20);
    assert_eq!(store.get_db_stats().await.unwrap().total_tests, 20);
}

#[tokio::test]
async fn test_clear_then_stats() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteBackend::new(dir.path().join("netdash.db")).await.unwrap();
    for i in 0..50 {
        store.save_result(measurement_at(minute(i % 60), 1.0)).await.unwrap();
    }

    let before = store.get_db_stats().await.unwrap();
    assert_eq!(before.total_tests, 50);

    assert_eq!(store.clear_results().await.unwrap(), 50);

    let after = store.get_db_stats().await.unwrap();
    assert_eq!(after.total_tests, 0);
    assert!(after.db_size_bytes <= before.db_size_bytes);
    assert!(store.get_latest_results(10).await.unwrap().is_empty());
}
