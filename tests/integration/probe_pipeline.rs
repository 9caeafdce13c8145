//! End-to-end runs: executor output → parser → store
//!
//! - Parsed values land in the store unchanged
//! - Failed runs leave the history untouched
//! - The real command wrapper works against a scripted binary

use std::sync::Arc;

use assert_matches::assert_matches;
use netdash::probe::{ProbeError, ProbeRunner, SpeedtestRunner};
use netdash::storage::{StorageBackend, memory::MemoryBackend};
use pretty_assertions::assert_eq;

use crate::helpers::*;

#[tokio::test]
async fn test_run_persists_parsed_measurement() {
    let store = Arc::new(MemoryBackend::new());
    let executor = Arc::new(ScriptedExecutor::succeeding(speedtest_output(
        12_500_000, 7,
    )));
    let runner = SpeedtestRunner::new(store.clone(), executor.clone());

    let result = runner.run().await.unwrap();

    assert_eq!(executor.calls(), 1);
    assert_eq!(result.download_mbps, 100.0);
    assert_eq!(result.upload_mbps, 10.0);
    assert_eq!(result.ping_ms, 12.3);
    assert_eq!(result.packet_loss_pct, 0.1);
    assert_eq!(result.server_id, 7);
    assert_eq!(result.server_name, "S");
    assert_eq!(result.isp, "ISP");

    let latest = store.get_latest_results(10).await.unwrap();
    assert_eq!(latest, vec![result]);
}

#[tokio::test]
async fn test_consecutive_runs_append_history() {
    let store = Arc::new(MemoryBackend::new());
    let executor = Arc::new(ScriptedExecutor::succeeding(speedtest_output(
        12_500_000, 7,
    )));
    let runner = SpeedtestRunner::new(store.clone(), executor.clone());

    let first = runner.run().await.unwrap();
    let second = runner.run().await.unwrap();

    assert!(second.id > first.id);
    assert_eq!(store.get_db_stats().await.unwrap().total_tests, 2);
}

#[tokio::test]
async fn test_failed_execution_keeps_history() {
    let store = Arc::new(MemoryBackend::new());
    let runner = SpeedtestRunner::new(store.clone(), Arc::new(ScriptedExecutor::failing()));

    assert_matches!(runner.run().await, Err(ProbeError::ExecutionFailed(_)));
    assert!(!runner.is_running());
    assert!(store.get_all_results().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_output_without_result_keeps_history() {
    let store = Arc::new(MemoryBackend::new());
    let output = r#"{"type":"error","error":"Configuration - Could not retrieve or read configuration"}"#;
    let runner = SpeedtestRunner::new(
        store.clone(),
        Arc::new(ScriptedExecutor::succeeding(output.to_string())),
    );

    assert_matches!(runner.run().await, Err(ProbeError::ParseFailed));
    assert!(store.get_all_results().await.unwrap().is_empty());
}

#[cfg(all(unix, feature = "storage-sqlite"))]
#[tokio::test]
async fn test_scripted_binary_into_sqlite() {
    use std::os::unix::fs::PermissionsExt;

    use netdash::probe::SpeedtestCommand;
    use netdash::storage::{AppConfig, sqlite::SqliteBackend};

    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(SqliteBackend::new(dir.path().join("netdash.db")).await.unwrap());
    store
        .update_config(AppConfig::new(Some("4242".to_string()), "manual", 10))
        .await
        .unwrap();

    // Records its arguments, then prints a result line
    let args_file = dir.path().join("args.txt");
    let script = dir.path().join("speedtest");
    std::fs::write(
        &script,
        format!(
            "#!/bin/sh\necho \"$@\" > '{}'\necho 'Speedtest by Ookla' >&2\ncat <<'JSON'\n{}JSON\n",
            args_file.display(),
            speedtest_output(25_000_000, 4242)
        ),
    )
    .unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

    let runner = SpeedtestRunner::new(store.clone(), Arc::new(SpeedtestCommand::new(&script)));
    let result = runner.run().await.unwrap();

    assert_eq!(result.download_mbps, 200.0);
    assert_eq!(result.server_id, 4242);
    assert_eq!(
        std::fs::read_to_string(&args_file).unwrap().trim(),
        "--accept-license --accept-gdpr --format=jsonl --server-id=4242"
    );

    let stored = store.get_latest_results(1).await.unwrap();
    assert_eq!(stored, vec![result]);
    store.close().await.unwrap();
}
