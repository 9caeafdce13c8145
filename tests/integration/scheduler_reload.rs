//! Scheduler driving the real runner, with time paused
//!
//! - Scheduled ticks end up as stored results
//! - Configuration edits followed by a reload change what fires
//! - A slow probe causes skipped ticks, never overlapping runs

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use netdash::probe::SpeedtestRunner;
use netdash::scheduler::{Schedule, ScheduleState, Scheduler, validate_schedule};
use netdash::storage::{AppConfig, StorageBackend, memory::MemoryBackend};

use crate::helpers::*;

fn pipeline(
    schedule: &str,
    probe_time: Duration,
) -> (Arc<MemoryBackend>, Arc<ScriptedExecutor>, Arc<dyn Schedule>) {
    let store = Arc::new(MemoryBackend::with_config(AppConfig::new(None, schedule, 10)));
    let executor = Arc::new(
        ScriptedExecutor::succeeding(speedtest_output(12_500_000, 7)).with_delay(probe_time),
    );
    let runner = Arc::new(SpeedtestRunner::new(store.clone(), executor.clone()));
    let scheduler: Arc<dyn Schedule> = Arc::new(Scheduler::new(store.clone(), runner));
    (store, executor, scheduler)
}

/// Mirrors what a configuration editor does: validate, persist, reload
async fn edit_schedule(store: &MemoryBackend, scheduler: &dyn Schedule, schedule: &str) -> ScheduleState {
    validate_schedule(schedule).unwrap();
    let current = store.get_config().await.unwrap();
    store
        .update_config(AppConfig::new(current.server_id, schedule, current.history_limit))
        .await
        .unwrap();
    scheduler.reload().await
}

#[tokio::test(start_paused = true)]
async fn test_scheduled_ticks_are_stored() {
    let (store, executor, scheduler) = pipeline("* * * * *", Duration::ZERO);
    assert_matches!(scheduler.start().await, ScheduleState::Active { .. });

    tokio::time::sleep(Duration::from_secs(150)).await;

    let stored = store.get_all_results().await.unwrap().len();
    assert!((2..=3).contains(&stored), "expected 2 or 3 results, got {stored}");
    assert_eq!(stored, executor.calls());
}

#[tokio::test(start_paused = true)]
async fn test_switch_to_manual_and_back() {
    let (store, executor, scheduler) = pipeline("* * * * *", Duration::ZERO);
    scheduler.start().await;

    tokio::time::sleep(Duration::from_secs(90)).await;
    let before = executor.calls();
    assert!(before >= 1);

    assert_eq!(edit_schedule(&store, scheduler.as_ref(), "manual").await, ScheduleState::Disabled);
    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(executor.calls(), before);

    assert_matches!(
        edit_schedule(&store, scheduler.as_ref(), "* * * * *").await,
        ScheduleState::Active { .. }
    );
    tokio::time::sleep(Duration::from_secs(150)).await;
    assert!(executor.calls() >= before + 2);
}

#[tokio::test(start_paused = true)]
async fn test_slow_probe_skips_ticks() {
    // Each probe takes 150 s, so roughly every other tick finds the runner busy
    let (store, executor, scheduler) = pipeline("* * * * *", Duration::from_secs(150));
    scheduler.start().await;

    tokio::time::sleep(Duration::from_secs(600)).await;

    let executed = executor.calls();
    assert!(executed >= 2, "expected at least 2 runs, got {executed}");
    assert!(executed <= 5, "expected skipped ticks, got {executed} runs");
    assert!(store.get_all_results().await.unwrap().len() <= executed);
}
