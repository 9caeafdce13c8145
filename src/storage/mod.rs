//! Result store
//!
//! This module provides a trait-based abstraction over the measurement
//! history and the singleton runtime configuration.
//!
//! ## Design
//!
//! - **Trait-based**: `StorageBackend` is what the probe runner, the
//!   scheduler and any presentation layer program against
//! - **Async**: All operations are async for compatibility with Tokio
//! - **Short transactions**: Every operation is its own unit of work; only
//!   `clear_results` spans more than one statement
//!
//! ## Backends
//!
//! - **SQLite** (default): Embedded database in WAL mode
//! - **In-Memory**: No persistence, for tests and throwaway runs
//!
//! ## Usage
//!
//! ```no_run
//! use netdash::storage::{StorageBackend, sqlite::SqliteBackend};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let backend = SqliteBackend::new("data/netdash.db").await?;
//!     let latest = backend.get_latest_results(10).await?;
//!     println!("{} results", latest.len());
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod error;
pub mod memory;
pub mod schema;
#[cfg(feature = "storage-sqlite")]
pub mod sqlite;

pub use backend::{DbStats, StorageBackend};
pub use error::{StorageError, StorageResult};
pub use schema::{AppConfig, MeasurementResult, NewMeasurement};
