//! Row definitions for the result store
//!
//! ## Tables
//!
//! - `test_results`: append-only measurement history. Rows are inserted by
//!   the probe runner and only ever removed (individually or all at once),
//!   never updated.
//! - `app_config`: exactly one row holding the runtime configuration that
//!   the scheduler and the history views read.
//!
//! Timestamps are persisted as Unix milliseconds (UTC).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Schedule installed on first start
pub const DEFAULT_SCHEDULE: &str = "0 * * * *";

/// Number of results shown in history views when nothing else is configured
pub const DEFAULT_HISTORY_LIMIT: i64 = 10;

/// Schedule sentinel meaning "only run when triggered by hand"
pub const MANUAL_SCHEDULE: &str = "manual";

/// Empty and `manual` (any case) both mean "no automatic runs"
pub fn is_manual_schedule(expression: &str) -> bool {
    let expression = expression.trim();
    expression.is_empty() || expression.eq_ignore_ascii_case(MANUAL_SCHEDULE)
}

/// A persisted measurement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementResult {
    /// Assigned by the store on insert, strictly increasing
    pub id: i64,

    /// Download throughput (Mbit/s)
    pub download_mbps: f64,

    /// Upload throughput (Mbit/s)
    pub upload_mbps: f64,

    /// Idle latency (ms)
    pub ping_ms: f64,

    /// Packet loss (percent)
    pub packet_loss_pct: f64,

    pub isp: String,
    pub server_id: i64,
    pub server_name: String,

    /// When the measurement finished (always UTC)
    pub created_at: DateTime<Utc>,
}

/// A measurement that has not been persisted yet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMeasurement {
    pub download_mbps: f64,
    pub upload_mbps: f64,
    pub ping_ms: f64,
    pub packet_loss_pct: f64,
    pub isp: String,
    pub server_id: i64,
    pub server_name: String,
    pub created_at: DateTime<Utc>,
}

impl NewMeasurement {
    /// Attach the id assigned by the store
    pub fn with_id(self, id: i64) -> MeasurementResult {
        MeasurementResult {
            id,
            download_mbps: self.download_mbps,
            upload_mbps: self.upload_mbps,
            ping_ms: self.ping_ms,
            packet_loss_pct: self.packet_loss_pct,
            isp: self.isp,
            server_id: self.server_id,
            server_name: self.server_name,
            created_at: self.created_at,
        }
    }
}

/// Runtime configuration, stored as a single row
///
/// Values handed to the store should go through [`AppConfig::new`] or
/// [`AppConfig::normalized`]; the store normalizes again before writing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Explicit Ookla server to measure against (`None` = let the probe pick)
    pub server_id: Option<String>,

    /// Cron expression, [`MANUAL_SCHEDULE`], or empty (disabled)
    pub schedule: String,

    /// Number of results shown in history views (always >= 1 once normalized)
    pub history_limit: i64,
}

impl AppConfig {
    pub fn new(
        server_id: Option<String>,
        schedule: impl Into<String>,
        history_limit: i64,
    ) -> Self {
        Self {
            server_id,
            schedule: schedule.into(),
            history_limit,
        }
        .normalized()
    }

    /// Trim text fields, drop a blank server override and replace a
    /// non-positive history limit with [`DEFAULT_HISTORY_LIMIT`].
    pub fn normalized(self) -> Self {
        let server_id = self
            .server_id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty());
        let history_limit = if self.history_limit <= 0 {
            DEFAULT_HISTORY_LIMIT
        } else {
            self.history_limit
        };

        Self {
            server_id,
            schedule: self.schedule.trim().to_string(),
            history_limit,
        }
    }

    /// Whether automatic runs are switched off
    pub fn is_manual(&self) -> bool {
        is_manual_schedule(&self.schedule)
    }

    /// History limit as a row count for the query methods
    pub fn history_limit(&self) -> usize {
        usize::try_from(self.history_limit)
            .ok()
            .filter(|limit| *limit > 0)
            .unwrap_or(DEFAULT_HISTORY_LIMIT as usize)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server_id: None,
            schedule: DEFAULT_SCHEDULE.to_string(),
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }
}
