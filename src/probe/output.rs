//! Parsing of the speedtest CLI's line-delimited JSON output
//!
//! The probe prints one JSON object per line. Every object carries a `type`
//! discriminator; progress objects (`testStart`, `ping`, `download`, ...)
//! are ignored, `log` and `error` objects are logged, and the first
//! `result` object is the measurement. Anything that is not a JSON object
//! (banners, license text, stray stderr) is skipped.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, trace, warn};

use super::error::{ProbeError, ProbeResult};
use crate::storage::NewMeasurement;

/// Fields every line is decoded with first
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,

    #[serde(default)]
    error: Option<String>,

    #[serde(default)]
    message: Option<String>,

    /// Severity of `log` objects (`info`, `warning`, `error`)
    #[serde(default)]
    level: Option<String>,
}

impl Envelope {
    /// Failure reported by the probe on this line, if any
    ///
    /// The CLI uses both dedicated `error` objects and `log` objects with
    /// `level: "error"`.
    fn reported_error(&self) -> Option<&str> {
        if let Some(error) = self.error.as_deref().filter(|e| !e.is_empty()) {
            return Some(error);
        }
        match self.kind.as_str() {
            "error" => Some(self.message.as_deref().unwrap_or("no message")),
            "log" if self
                .level
                .as_deref()
                .is_some_and(|level| level.eq_ignore_ascii_case("error")) =>
            {
                Some(self.message.as_deref().unwrap_or("no message"))
            }
            _ => None,
        }
    }
}

/// Body of a `type: "result"` line
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResultLine {
    #[serde(default)]
    ping: Ping,

    /// Omitted by the CLI when loss could not be measured
    #[serde(default)]
    packet_loss: Option<f64>,

    #[serde(default)]
    download: Transfer,

    #[serde(default)]
    upload: Transfer,

    #[serde(default)]
    server: Server,

    #[serde(default)]
    isp: String,
}

#[derive(Debug, Default, Deserialize)]
struct Ping {
    #[serde(default)]
    latency: f64,
}

#[derive(Debug, Default, Deserialize)]
struct Transfer {
    /// bytes per second
    #[serde(default)]
    bandwidth: u64,
}

#[derive(Debug, Default, Deserialize)]
struct Server {
    #[serde(default)]
    id: i64,

    #[serde(default)]
    name: String,
}

/// A measurement as reported by the probe, before it gets a timestamp
#[derive(Debug, Clone, PartialEq)]
pub struct SpeedtestReading {
    pub download_mbps: f64,
    pub upload_mbps: f64,
    pub ping_ms: f64,
    pub packet_loss_pct: f64,
    pub isp: String,
    pub server_id: i64,
    pub server_name: String,
}

impl SpeedtestReading {
    pub fn into_measurement(self, created_at: DateTime<Utc>) -> NewMeasurement {
        NewMeasurement {
            download_mbps: self.download_mbps,
            upload_mbps: self.upload_mbps,
            ping_ms: self.ping_ms,
            packet_loss_pct: self.packet_loss_pct,
            isp: self.isp,
            server_id: self.server_id,
            server_name: self.server_name,
            created_at,
        }
    }
}

impl From<ResultLine> for SpeedtestReading {
    fn from(line: ResultLine) -> Self {
        Self {
            download_mbps: bytes_per_sec_to_mbps(line.download.bandwidth),
            upload_mbps: bytes_per_sec_to_mbps(line.upload.bandwidth),
            ping_ms: line.ping.latency,
            packet_loss_pct: line.packet_loss.unwrap_or_default(),
            isp: line.isp,
            server_id: line.server.id,
            server_name: line.server.name,
        }
    }
}

/// Bytes/s → Mbit/s
pub fn bytes_per_sec_to_mbps(bandwidth: u64) -> f64 {
    bandwidth as f64 * 8.0 / 1_000_000.0
}

/// Scan probe output for the first `result` object
///
/// Error objects are logged and do not stop the scan, a later result still
/// wins. Returns [`ProbeError::ParseFailed`] when no result shows up.
pub fn parse_output(output: &str) -> ProbeResult<SpeedtestReading> {
    for line in output.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let Ok(envelope) = serde_json::from_str::<Envelope>(line) else {
            trace!("skipping non-JSON output line");
            continue;
        };

        if envelope.kind == "result" {
            match serde_json::from_str::<ResultLine>(line) {
                Ok(result) => return Ok(result.into()),
                Err(e) => {
                    warn!("malformed result object: {}", e);
                    continue;
                }
            }
        }

        if let Some(error) = envelope.reported_error() {
            warn!("speedtest reported an error: {}", error);
        } else if envelope.kind == "log" {
            if let Some(message) = &envelope.message {
                debug!("speedtest: {}", message);
            }
        }
    }

    Err(ProbeError::ParseFailed)
}
