//! Guarded probe runner
//!
//! ## Message Flow
//!
//! ```text
//! run() → acquire guard → read config → spawn speedtest → parse output → save result
//!            │
//!            └─── busy → AlreadyRunning (nothing started)
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{error, info, instrument};

use super::command::{ProbeExecutor, speedtest_args};
use super::error::{ProbeError, ProbeResult};
use super::guard::RunGuard;
use super::output::parse_output;
use crate::storage::{MeasurementResult, StorageBackend};

/// Starts probe runs, at most one at a time
#[async_trait]
pub trait ProbeRunner: Send + Sync {
    /// Run one measurement and persist it
    ///
    /// Returns [`ProbeError::AlreadyRunning`] immediately if another run is
    /// in flight.
    async fn run(&self) -> ProbeResult<MeasurementResult>;

    /// Whether a run is in flight right now
    fn is_running(&self) -> bool;
}

/// Runs the Ookla speedtest and stores what it measured
pub struct SpeedtestRunner {
    store: Arc<dyn StorageBackend>,
    executor: Arc<dyn ProbeExecutor>,
    guard: RunGuard,
}

impl SpeedtestRunner {
    pub fn new(store: Arc<dyn StorageBackend>, executor: Arc<dyn ProbeExecutor>) -> Self {
        Self {
            store,
            executor,
            guard: RunGuard::new(),
        }
    }
}

#[async_trait]
impl ProbeRunner for SpeedtestRunner {
    #[instrument(skip(self))]
    async fn run(&self) -> ProbeResult<MeasurementResult> {
        let Some(_permit) = self.guard.try_acquire() else {
            info!("test skipped: another test is running");
            return Err(ProbeError::AlreadyRunning);
        };

        info!("starting speedtest");

        let config = self.store.get_config().await.map_err(|e| {
            error!("could not read configuration: {}", e);
            ProbeError::ConfigUnavailable(e)
        })?;

        let args = speedtest_args(config.server_id.as_deref());
        let output = self
            .executor
            .execute(&args)
            .await
            .inspect_err(|e| error!("{}", e))?;

        let reading = parse_output(&output).inspect_err(|e| error!("{}", e))?;
        let measurement = reading.into_measurement(Utc::now());

        let stored = self
            .store
            .save_result(measurement)
            .await
            .map_err(ProbeError::PersistenceFailed)?;

        info!(
            "result: DL {:.2} Mbps | UL {:.2} Mbps | Ping {:.0} ms | Loss {:.1}% | ISP {}",
            stored.download_mbps,
            stored.upload_mbps,
            stored.ping_ms,
            stored.packet_loss_pct,
            stored.isp
        );

        Ok(stored)
    }

    fn is_running(&self) -> bool {
        self.guard.is_running()
    }
}
