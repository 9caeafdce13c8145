//! Single-flight behaviour under concurrent triggers
//!
//! - Exactly one of many simultaneous triggers executes the probe
//! - Losers get `AlreadyRunning` without touching the store
//! - The next trigger after completion runs normally

use std::sync::Arc;
use std::time::Duration;

use netdash::probe::{ProbeError, ProbeRunner, SpeedtestRunner};
use netdash::storage::{StorageBackend, memory::MemoryBackend};

use crate::helpers::*;

#[tokio::test]
async fn test_concurrent_spawned_runs_execute_once() {
    let store = Arc::new(MemoryBackend::new());
    let executor = Arc::new(
        ScriptedExecutor::succeeding(speedtest_output(12_500_000, 7))
            .with_delay(Duration::from_millis(200)),
    );
    let runner = Arc::new(SpeedtestRunner::new(store.clone(), executor.clone()));

    let tasks: Vec<_> = (0..10)
        .map(|_| {
            let runner = runner.clone();
            tokio::spawn(async move { runner.run().await })
        })
        .collect();

    let results: Vec<_> = futures::future::join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let succeeded = results.iter().filter(|r| r.is_ok()).count();
    let rejected = results
        .iter()
        .filter(|r| matches!(r, Err(ProbeError::AlreadyRunning)))
        .count();

    assert_eq!(succeeded, 1);
    assert_eq!(rejected, 9);
    assert_eq!(executor.calls(), 1);
    assert_eq!(store.get_all_results().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_run_after_completion_is_accepted() {
    let store = Arc::new(MemoryBackend::new());
    let executor = Arc::new(
        ScriptedExecutor::succeeding(speedtest_output(12_500_000, 7))
            .with_delay(Duration::from_millis(50)),
    );
    let runner = Arc::new(SpeedtestRunner::new(store.clone(), executor.clone()));

    let (first, second) = tokio::join!(runner.run(), runner.run());
    assert!(first.is_ok() ^ second.is_ok());

    runner.run().await.unwrap();
    assert_eq!(executor.calls(), 2);
    assert_eq!(store.get_all_results().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_concurrent_readers_during_run() {
    let store = Arc::new(MemoryBackend::new());
    let executor = Arc::new(
        ScriptedExecutor::succeeding(speedtest_output(12_500_000, 7))
            .with_delay(Duration::from_millis(100)),
    );
    let runner = Arc::new(SpeedtestRunner::new(store.clone(), executor));

    let run = tokio::spawn({
        let runner = runner.clone();
        async move { runner.run().await }
    });

    let readers: Vec<_> = (0..5)
        .map(|_| {
            let store = store.clone();
            tokio::spawn(async move { store.get_latest_results(10).await })
        })
        .collect();

    for reader in futures::future::join_all(readers).await {
        assert!(reader.unwrap().unwrap().len() <= 1);
    }
    run.await.unwrap().unwrap();
    assert!(!runner.is_running());
}
