//! Storage backend trait definition
//!
//! This module defines the `StorageBackend` trait that the probe runner,
//! the scheduler and any presentation layer talk to.

use async_trait::async_trait;
use serde::Serialize;

use super::error::StorageResult;
use super::schema::{AppConfig, MeasurementResult, NewMeasurement};

/// Size and row count of the result store
///
/// Recomputed on every request, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DbStats {
    /// Number of stored measurements
    pub total_tests: u64,

    /// Footprint of all files backing the store, human readable
    pub db_size: String,

    /// Same footprint in bytes
    pub db_size_bytes: u64,
}

/// Trait for the result and configuration store
///
/// ## Ordering
///
/// All ordered reads sort by creation time and break ties by id, so two
/// measurements saved within the same millisecond keep insertion order.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync`; the scheduler task, the probe
/// runner and manual callers share one instance behind an `Arc`.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Get up to `limit` most recent results, newest first
    async fn get_latest_results(&self, limit: usize) -> StorageResult<Vec<MeasurementResult>>;

    /// Same rows as [`get_latest_results`](Self::get_latest_results), oldest
    /// first (for time-series charts)
    async fn get_graph_data(&self, limit: usize) -> StorageResult<Vec<MeasurementResult>>;

    /// Full history, oldest first
    async fn get_all_results(&self) -> StorageResult<Vec<MeasurementResult>>;

    /// Persist a new measurement and return it with its assigned id
    async fn save_result(&self, result: NewMeasurement) -> StorageResult<MeasurementResult>;

    /// Delete a single result
    ///
    /// Deleting an id that does not exist is not an error; the return value
    /// tells whether a row was removed.
    async fn delete_result(&self, id: i64) -> StorageResult<bool>;

    /// Delete every result and reclaim the freed space
    ///
    /// Returns the number of deleted rows.
    async fn clear_results(&self) -> StorageResult<u64>;

    /// Read the singleton configuration
    async fn get_config(&self) -> StorageResult<AppConfig>;

    /// Replace the singleton configuration's fields in place
    async fn update_config(&self, config: AppConfig) -> StorageResult<()>;

    /// Row count and on-disk footprint
    async fn get_db_stats(&self) -> StorageResult<DbStats>;

    /// Close the backend and release resources
    async fn close(&self) -> StorageResult<()>;
}
