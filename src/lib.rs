//! Scheduled network speed measurements
//!
//! - [`storage`]: measurement history and runtime configuration
//! - [`probe`]: single-flight runner around the Ookla speedtest CLI
//! - [`scheduler`]: cron-driven trigger for the runner, reloadable at runtime

pub mod config;
pub mod probe;
pub mod scheduler;
pub mod storage;
pub mod util;
