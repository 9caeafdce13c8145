//! Error types for probe runs

use std::fmt;

use crate::storage::StorageError;

/// Result type alias for probe runs
pub type ProbeResult<T> = Result<T, ProbeError>;

/// Why a probe run did not produce a stored measurement
///
/// None of these leave the runner unusable; the next call starts fresh.
#[derive(Debug)]
pub enum ProbeError {
    /// Another run holds the guard; nothing was started
    AlreadyRunning,

    /// The configuration could not be read, so no process was started
    ConfigUnavailable(StorageError),

    /// The probe could not be spawned or exited unsuccessfully
    ExecutionFailed(String),

    /// The probe output contained no `result` object
    ParseFailed,

    /// The measurement succeeded but could not be stored
    PersistenceFailed(StorageError),
}

impl ProbeError {
    /// True for the "busy" outcome, which callers usually treat as a no-op
    pub fn is_already_running(&self) -> bool {
        matches!(self, ProbeError::AlreadyRunning)
    }
}

impl fmt::Display for ProbeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeError::AlreadyRunning => write!(f, "a measurement is already in progress"),
            ProbeError::ConfigUnavailable(err) => {
                write!(f, "could not read configuration: {}", err)
            }
            ProbeError::ExecutionFailed(msg) => write!(f, "execution failed: {}", msg),
            ProbeError::ParseFailed => write!(f, "failed to parse speedtest result"),
            ProbeError::PersistenceFailed(err) => {
                write!(f, "failed to store measurement: {}", err)
            }
        }
    }
}

impl std::error::Error for ProbeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ProbeError::ConfigUnavailable(err) | ProbeError::PersistenceFailed(err) => Some(err),
            _ => None,
        }
    }
}
