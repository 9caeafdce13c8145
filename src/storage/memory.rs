//! In-memory storage backend (no persistence)
//!
//! Implements the full `StorageBackend` contract on top of a vector guarded
//! by a `RwLock`. It's useful for:
//! - Testing the probe runner and scheduler without a database file
//! - Short-lived runs where history does not need to survive a restart
//!
//! ## Limitations
//!
//! - **No persistence**: All data lost on restart
//! - **No footprint**: `get_db_stats` always reports 0 B

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use super::backend::{DbStats, StorageBackend};
use super::error::StorageResult;
use super::schema::{AppConfig, MeasurementResult, NewMeasurement};
use crate::util::format_bytes;

#[derive(Debug, Default)]
struct MemoryState {
    /// Results in insertion order
    results: Vec<MeasurementResult>,

    /// Last id handed out (never reused, also not after a clear)
    last_id: i64,

    config: AppConfig,
}

/// In-memory storage backend
#[derive(Debug, Default)]
pub struct MemoryBackend {
    state: RwLock<MemoryState>,
}

impl MemoryBackend {
    /// Create a new in-memory backend with the default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new in-memory backend with the given configuration
    pub fn with_config(config: AppConfig) -> Self {
        Self {
            state: RwLock::new(MemoryState {
                config: config.normalized(),
                ..MemoryState::default()
            }),
        }
    }

    /// Results sorted oldest first, ties broken by id
    fn sorted(results: &[MeasurementResult]) -> Vec<MeasurementResult> {
        let mut sorted = results.to_vec();
        sorted.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        sorted
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn get_latest_results(&self, limit: usize) -> StorageResult<Vec<MeasurementResult>> {
        let state = self.state.read().await;
        let results = Self::sorted(&state.results)
            .into_iter()
            .rev()
            .take(limit)
            .collect();
        Ok(results)
    }

    async fn get_graph_data(&self, limit: usize) -> StorageResult<Vec<MeasurementResult>> {
        let mut results = self.get_latest_results(limit).await?;
        results.reverse();
        Ok(results)
    }

    async fn get_all_results(&self) -> StorageResult<Vec<MeasurementResult>> {
        let state = self.state.read().await;
        Ok(Self::sorted(&state.results))
    }

    async fn save_result(&self, result: NewMeasurement) -> StorageResult<MeasurementResult> {
        let mut state = self.state.write().await;
        state.last_id += 1;
        let stored = result.with_id(state.last_id);
        state.results.push(stored.clone());
        debug!("in-memory backend: saved result {}", stored.id);
        Ok(stored)
    }

    async fn delete_result(&self, id: i64) -> StorageResult<bool> {
        let mut state = self.state.write().await;
        let before = state.results.len();
        state.results.retain(|r| r.id != id);
        Ok(state.results.len() < before)
    }

    async fn clear_results(&self) -> StorageResult<u64> {
        let mut state = self.state.write().await;
        let deleted = state.results.len() as u64;
        state.results.clear();
        Ok(deleted)
    }

    async fn get_config(&self) -> StorageResult<AppConfig> {
        Ok(self.state.read().await.config.clone())
    }

    async fn update_config(&self, config: AppConfig) -> StorageResult<()> {
        self.state.write().await.config = config.normalized();
        Ok(())
    }

    async fn get_db_stats(&self) -> StorageResult<DbStats> {
        let state = self.state.read().await;
        Ok(DbStats {
            total_tests: state.results.len() as u64,
            db_size: format_bytes(0),
            db_size_bytes: 0,
        })
    }

    async fn close(&self) -> StorageResult<()> {
        debug!("closing in-memory backend (no-op)");
        Ok(())
    }
}
