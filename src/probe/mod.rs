//! Probe execution
//!
//! Wraps the external Ookla `speedtest` CLI:
//!
//! - [`command`]: builds the argument list and spawns the process
//! - [`output`]: turns its line-delimited JSON into a reading
//! - [`guard`]: makes sure only one run is in flight
//! - [`runner`]: ties the above together and stores the result

pub mod command;
pub mod error;
pub mod guard;
pub mod output;
pub mod runner;

pub use command::{ProbeExecutor, SpeedtestCommand};
pub use error::{ProbeError, ProbeResult};
pub use guard::{RunGuard, RunPermit};
pub use output::{SpeedtestReading, parse_output};
pub use runner::{ProbeRunner, SpeedtestRunner};
