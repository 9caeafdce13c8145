//! SQLite storage backend implementation
//!
//! This module provides a SQLite-based implementation of the `StorageBackend` trait.
//!
//! ## Features
//!
//! - **Embedded**: No separate database server required
//! - **WAL mode**: Readers keep working while a measurement is written
//! - **Full auto-vacuum**: Clearing the history actually shrinks the file
//! - **Migrations**: Automatic schema versioning with sqlx
//!
//! ## Files on disk
//!
//! Besides the database file itself SQLite keeps `<name>-wal` and
//! `<name>-shm` next to it while the pool is open. The reported footprint
//! covers all of them.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteAutoVacuum, SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow,
    SqliteSynchronous,
};
use sqlx::{Pool, Row, Sqlite};
use tracing::{debug, info, instrument, warn};

use super::backend::{DbStats, StorageBackend};
use super::error::{StorageError, StorageResult};
use super::schema::{
    AppConfig, DEFAULT_HISTORY_LIMIT, DEFAULT_SCHEDULE, MeasurementResult, NewMeasurement,
};
use crate::util::format_bytes;

const RESULT_COLUMNS: &str = "id, created_at, download, upload, ping, packet_loss, isp, server_id, server_name";

/// SQLite storage backend
///
/// Stores the measurement history and the runtime configuration in a local
/// SQLite database file.
pub struct SqliteBackend {
    pool: Pool<Sqlite>,
    db_path: PathBuf,
}

impl SqliteBackend {
    /// Open (or create) the result store
    ///
    /// This will:
    /// 1. Create the parent directory if it doesn't exist
    /// 2. Open the database with WAL journaling and full auto-vacuum
    /// 3. Run migrations to create both tables
    /// 4. Seed the default configuration row, or repair a stored history
    ///    limit of zero
    ///
    /// ## Example
    ///
    /// ```no_run
    /// # use netdash::storage::sqlite::SqliteBackend;
    /// # async fn example() -> anyhow::Result<()> {
    /// let backend = SqliteBackend::new("data/netdash.db").await?;
    /// # Ok(())
    /// # }
    /// ```
    #[instrument(skip_all)]
    pub async fn new(db_path: impl AsRef<Path>) -> StorageResult<Self> {
        let db_path = db_path.as_ref().to_path_buf();

        info!("initializing SQLite backend at: {}", db_path.display());

        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        // auto_vacuum has to be in place before the first table is created
        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .auto_vacuum(SqliteAutoVacuum::Full)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;

        debug!("running database migrations");
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| StorageError::MigrationFailed(e.to_string()))?;

        let backend = Self { pool, db_path };
        backend.ensure_config().await?;

        info!("database connected successfully");
        Ok(backend)
    }

    /// Seed the configuration row on first start, repair it otherwise
    async fn ensure_config(&self) -> StorageResult<()> {
        let seeded = sqlx::query(
            r#"
            INSERT OR IGNORE INTO app_config (id, ookla_server_id, cron_schedule, history_limit)
            VALUES (1, '', ?, ?)
            "#,
        )
        .bind(DEFAULT_SCHEDULE)
        .bind(DEFAULT_HISTORY_LIMIT)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::MigrationFailed(e.to_string()))?;

        if seeded.rows_affected() > 0 {
            info!("created default configuration");
            return Ok(());
        }

        let repaired = sqlx::query("UPDATE app_config SET history_limit = ? WHERE history_limit <= 0")
            .bind(DEFAULT_HISTORY_LIMIT)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::MigrationFailed(e.to_string()))?;

        if repaired.rows_affected() > 0 {
            warn!(
                "stored history limit was not positive, reset to {}",
                DEFAULT_HISTORY_LIMIT
            );
        }

        Ok(())
    }

    /// Helper to convert timestamp to Unix milliseconds for SQLite
    fn timestamp_to_millis(dt: &DateTime<Utc>) -> i64 {
        dt.timestamp_millis()
    }

    /// Helper to convert Unix milliseconds from SQLite to DateTime
    fn millis_to_timestamp(millis: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(millis).unwrap_or_else(|| {
            warn!("stored timestamp {} is out of range, using current time", millis);
            Utc::now()
        })
    }

    fn row_to_result(row: &SqliteRow) -> MeasurementResult {
        MeasurementResult {
            id: row.get("id"),
            download_mbps: row.get("download"),
            upload_mbps: row.get("upload"),
            ping_ms: row.get("ping"),
            packet_loss_pct: row.get("packet_loss"),
            isp: row.get::<Option<String>, _>("isp").unwrap_or_default(),
            server_id: row.get::<Option<i64>, _>("server_id").unwrap_or_default(),
            server_name: row.get::<Option<String>, _>("server_name").unwrap_or_default(),
            created_at: Self::millis_to_timestamp(row.get("created_at")),
        }
    }

    /// Sum of the database file and its `-wal`/`-shm` companions
    fn footprint_bytes(&self) -> u64 {
        let Some(file_name) = self.db_path.file_name().map(|n| n.to_string_lossy().to_string())
        else {
            return 0;
        };
        let dir = match self.db_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("could not list {}: {}", dir.display(), e);
                return 0;
            }
        };

        entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name().to_string_lossy().starts_with(&file_name))
            .filter_map(|entry| entry.metadata().ok())
            .filter(|meta| meta.is_file())
            .map(|meta| meta.len())
            .sum()
    }
}

#[async_trait]
impl StorageBackend for SqliteBackend {
    #[instrument(skip(self))]
    async fn get_latest_results(&self, limit: usize) -> StorageResult<Vec<MeasurementResult>> {
        let sql = format!(
            "SELECT {RESULT_COLUMNS} FROM test_results ORDER BY created_at DESC, id DESC LIMIT ?"
        );

        let rows = sqlx::query(&sql)
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await?;

        let results: Vec<MeasurementResult> = rows.iter().map(Self::row_to_result).collect();
        debug!("query returned {} results", results.len());
        Ok(results)
    }

    #[instrument(skip(self))]
    async fn get_graph_data(&self, limit: usize) -> StorageResult<Vec<MeasurementResult>> {
        let mut results = self.get_latest_results(limit).await?;
        // Reverse to get chronological order (oldest first)
        results.reverse();
        Ok(results)
    }

    #[instrument(skip(self))]
    async fn get_all_results(&self) -> StorageResult<Vec<MeasurementResult>> {
        let sql = format!("SELECT {RESULT_COLUMNS} FROM test_results ORDER BY created_at ASC, id ASC");

        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;

        Ok(rows.iter().map(Self::row_to_result).collect())
    }

    #[instrument(skip(self, result), fields(server_id = result.server_id))]
    async fn save_result(&self, result: NewMeasurement) -> StorageResult<MeasurementResult> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO test_results (
                created_at, download, upload, ping, packet_loss,
                isp, server_id, server_name
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(Self::timestamp_to_millis(&result.created_at))
        .bind(result.download_mbps)
        .bind(result.upload_mbps)
        .bind(result.ping_ms)
        .bind(result.packet_loss_pct)
        .bind(&result.isp)
        .bind(result.server_id)
        .bind(&result.server_name)
        .execute(&self.pool)
        .await?;

        let id = inserted.last_insert_rowid();
        debug!("saved result {}", id);
        Ok(result.with_id(id))
    }

    #[instrument(skip(self))]
    async fn delete_result(&self, id: i64) -> StorageResult<bool> {
        let deleted = sqlx::query("DELETE FROM test_results WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?
            .rows_affected();

        if deleted == 0 {
            debug!("result {} does not exist, nothing to delete", id);
        } else {
            info!("deleted result {}", id);
        }

        Ok(deleted > 0)
    }

    #[instrument(skip(self))]
    async fn clear_results(&self) -> StorageResult<u64> {
        let mut tx = self.pool.begin().await?;

        let deleted = sqlx::query("DELETE FROM test_results")
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;

        info!("cleared {} results", deleted);

        // Best effort: fold the WAL back into the (auto-vacuumed) main file
        if let Err(e) = sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)")
            .execute(&self.pool)
            .await
        {
            warn!("space reclamation after clear failed: {}", e);
        }

        Ok(deleted)
    }

    #[instrument(skip(self))]
    async fn get_config(&self) -> StorageResult<AppConfig> {
        let row = sqlx::query(
            "SELECT ookla_server_id, cron_schedule, history_limit FROM app_config WHERE id = 1",
        )
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StorageError::ConfigMissing)?;

        let server_id: String = row.get("ookla_server_id");

        Ok(AppConfig {
            server_id: Some(server_id).filter(|id| !id.is_empty()),
            schedule: row.get("cron_schedule"),
            history_limit: row.get("history_limit"),
        })
    }

    #[instrument(skip(self, config), fields(schedule = %config.schedule))]
    async fn update_config(&self, config: AppConfig) -> StorageResult<()> {
        let config = config.normalized();

        let updated = sqlx::query(
            r#"
            UPDATE app_config
            SET ookla_server_id = ?, cron_schedule = ?, history_limit = ?
            WHERE id = 1
            "#,
        )
        .bind(config.server_id.as_deref().unwrap_or(""))
        .bind(&config.schedule)
        .bind(config.history_limit)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if updated == 0 {
            return Err(StorageError::ConfigMissing);
        }

        info!("configuration updated");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_db_stats(&self) -> StorageResult<DbStats> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM test_results")
            .fetch_one(&self.pool)
            .await?;

        let db_size_bytes = self.footprint_bytes();

        Ok(DbStats {
            total_tests: row.0.max(0) as u64,
            db_size: format_bytes(db_size_bytes),
            db_size_bytes,
        })
    }

    async fn close(&self) -> StorageResult<()> {
        info!("closing SQLite backend");
        self.pool.close().await;
        Ok(())
    }
}
