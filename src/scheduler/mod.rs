//! Recurring probe runs driven by the stored schedule expression
//!
//! ## Lifecycle
//!
//! ```text
//! start() → reload() → read config → manual/empty → no entry
//!                                  → cron        → spawn timer task → fire → runner.run()
//!                                  → invalid     → log, no entry
//! ```
//!
//! At most one timer task exists. Every `reload()` aborts the current one
//! before looking at the configuration again, so calling it repeatedly is
//! harmless.

pub mod error;
pub mod expression;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};

use crate::probe::ProbeRunner;
use crate::storage::StorageBackend;

pub use error::ScheduleError;
pub use expression::{CronSchedule, validate_schedule};

/// Wall-clock lag (seconds) after which missed ticks are dropped instead of replayed
const MAX_CATCH_UP_SECS: i64 = 60;

/// What a reload ended up installing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleState {
    /// No automatic runs (schedule is manual or empty, or the engine is not
    /// started yet)
    Disabled,

    /// A timer entry is installed
    Active {
        expression: String,
        next_fire: Option<DateTime<Utc>>,
    },

    /// The stored expression could not be parsed; runs are manual-only
    Invalid { expression: String, reason: String },
}

/// Start/reload contract consumed by whatever edits the configuration
#[async_trait]
pub trait Schedule: Send + Sync {
    /// Start the engine and install the stored schedule
    async fn start(&self) -> ScheduleState;

    /// Drop the current entry and install whatever is stored now
    async fn reload(&self) -> ScheduleState;
}

/// The single installed timer
struct ScheduleEntry {
    expression: String,
    task: JoinHandle<()>,
    next_fire: watch::Receiver<Option<DateTime<Utc>>>,
}

/// Cron-driven trigger for the probe runner
pub struct Scheduler {
    store: Arc<dyn StorageBackend>,
    runner: Arc<dyn ProbeRunner>,
    entry: Mutex<Option<ScheduleEntry>>,
    started: AtomicBool,
}

impl Scheduler {
    pub fn new(store: Arc<dyn StorageBackend>, runner: Arc<dyn ProbeRunner>) -> Self {
        Self {
            store,
            runner,
            entry: Mutex::new(None),
            started: AtomicBool::new(false),
        }
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Next planned fire time, `None` when no entry is installed
    pub async fn next_fire(&self) -> Option<DateTime<Utc>> {
        self.entry
            .lock()
            .await
            .as_ref()
            .and_then(|entry| *entry.next_fire.borrow())
    }

    /// Expression of the installed entry, if any
    pub async fn active_expression(&self) -> Option<String> {
        self.entry
            .lock()
            .await
            .as_ref()
            .map(|entry| entry.expression.clone())
    }

    /// Stop the engine and drop the installed entry
    ///
    /// Runs already handed to the runner are not interrupted.
    pub async fn shutdown(&self) {
        self.started.store(false, Ordering::Release);
        if let Some(entry) = self.entry.lock().await.take() {
            entry.task.abort();
            info!("scheduler stopped (was '{}')", entry.expression);
        }
    }

    fn spawn_entry(&self, schedule: CronSchedule) -> ScheduleEntry {
        let first = schedule.next_after(&Utc::now());
        let (next_tx, next_rx) = watch::channel(first);
        let expression = schedule.expression().to_string();
        let task = tokio::spawn(run_timer(schedule, self.runner.clone(), next_tx));

        ScheduleEntry {
            expression,
            task,
            next_fire: next_rx,
        }
    }
}

#[async_trait]
impl Schedule for Scheduler {
    async fn start(&self) -> ScheduleState {
        if !self.started.swap(true, Ordering::AcqRel) {
            info!("scheduler started");
        }
        self.reload().await
    }

    #[instrument(skip(self))]
    async fn reload(&self) -> ScheduleState {
        // Held for the whole reload so concurrent reloads cannot both install
        let mut entry = self.entry.lock().await;

        if let Some(previous) = entry.take() {
            previous.task.abort();
            debug!("removed schedule '{}'", previous.expression);
        }

        let config = match self.store.get_config().await {
            Ok(config) => config,
            Err(e) => {
                error!("could not read configuration, automatic runs disabled: {}", e);
                return ScheduleState::Disabled;
            }
        };

        if config.is_manual() {
            info!("automated schedule disabled");
            return ScheduleState::Disabled;
        }

        let schedule = match CronSchedule::parse(&config.schedule) {
            Ok(schedule) => schedule,
            Err(e) => {
                error!("{}", e);
                let ScheduleError::InvalidExpression { expression, reason } = e;
                return ScheduleState::Invalid { expression, reason };
            }
        };

        if !self.is_started() {
            debug!("scheduler not started, '{}' not installed", schedule.expression());
            return ScheduleState::Disabled;
        }

        let installed = self.spawn_entry(schedule);
        let state = ScheduleState::Active {
            expression: installed.expression.clone(),
            next_fire: *installed.next_fire.borrow(),
        };
        info!("schedule updated: {}", installed.expression);
        *entry = Some(installed);

        state
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if let Some(entry) = self.entry.get_mut().take() {
            entry.task.abort();
        }
    }
}

/// Timer loop of one installed entry
///
/// Fire times come from the wall clock; sleeping uses tokio's clock,
/// anchored once at install time. A large wall-clock lag (suspend, clock
/// jump) re-anchors and skips the missed ticks.
async fn run_timer(
    schedule: CronSchedule,
    runner: Arc<dyn ProbeRunner>,
    next_tx: watch::Sender<Option<DateTime<Utc>>>,
) {
    let mut anchor_wall = Utc::now();
    let mut anchor = Instant::now();
    let mut cursor = anchor_wall;

    loop {
        let Some(next) = schedule.next_after(&cursor) else {
            warn!("schedule '{}' has no future occurrence", schedule.expression());
            next_tx.send_replace(None);
            return;
        };
        next_tx.send_replace(Some(next));

        let offset = (next - anchor_wall).to_std().unwrap_or_default();
        tokio::time::sleep_until(anchor + offset).await;

        let now = Utc::now();
        if (now - next).num_seconds() > MAX_CATCH_UP_SECS {
            warn!("clock jumped past {}, skipping missed runs", next);
            anchor_wall = now;
            anchor = Instant::now();
            cursor = now;
            continue;
        }

        info!("triggering scheduled speedtest");
        let runner = runner.clone();
        tokio::spawn(async move {
            match runner.run().await {
                Ok(_) => {}
                Err(e) if e.is_already_running() => {
                    debug!("scheduled run skipped, another run is in progress")
                }
                Err(e) => warn!("scheduled run failed: {}", e),
            }
        });

        cursor = next;
    }
}
