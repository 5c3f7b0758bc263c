//! SQLite storage backend implementation
//!
//! Implements every storage trait on top of a single sqlx connection pool.
//!
//! ## Features
//!
//! - **Embedded**: No separate database server required
//! - **WAL mode**: Better concurrency for reads during writes
//! - **Migrations**: Automatic schema versioning with sqlx
//!
//! Timestamps are stored as unix milliseconds.

use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Pool, Row, Sqlite};
use tracing::{debug, info, instrument};

use super::backend::{HealthSampleStore, IncidentStore, TargetRegistry};
use super::error::{StorageError, StorageResult};
use crate::model::{
    HealthSample, HealthStatus, Incident, MonitoringFrequency, NewTarget, Target, TargetFilter,
    TargetId, WindowUnit,
};

const TARGET_COLUMNS: &str =
    "id, address, method, frequency, contact, status, created_at, updated_at";

/// SQLite storage backend
pub struct SqliteBackend {
    pool: Pool<Sqlite>,
}

impl SqliteBackend {
    /// Open (or create) the database file and run migrations
    #[instrument(skip_all)]
    pub async fn new(db_path: impl AsRef<Path>) -> StorageResult<Self> {
        let db_path_str = db_path.as_ref().to_string_lossy().to_string();

        info!("initializing SQLite backend at: {}", db_path_str);

        let options = SqliteConnectOptions::new()
            .filename(&db_path_str)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;

        debug!("running database migrations");
        sqlx::migrate!("./migrations").run(&pool).await?;

        info!("database migrations complete");

        Ok(Self { pool })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    fn timestamp_to_millis(dt: &DateTime<Utc>) -> i64 {
        dt.timestamp_millis()
    }

    fn millis_to_timestamp(millis: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(millis).unwrap_or_default()
    }

    fn parse_column<T: FromStr>(row: &SqliteRow, column: &str) -> StorageResult<T>
    where
        T::Err: std::fmt::Display,
    {
        let raw: String = row.try_get(column)?;
        raw.parse()
            .map_err(|e: T::Err| StorageError::Corrupt(format!("{column}: {e}")))
    }

    fn target_from_row(row: &SqliteRow) -> StorageResult<Target> {
        Ok(Target {
            id: row.try_get("id")?,
            address: row.try_get("address")?,
            method: Self::parse_column(row, "method")?,
            frequency: Self::parse_column(row, "frequency")?,
            contact: row.try_get("contact")?,
            status: Self::parse_column(row, "status")?,
            created_at: Self::millis_to_timestamp(row.try_get("created_at")?),
            updated_at: Self::millis_to_timestamp(row.try_get("updated_at")?),
        })
    }

    fn sample_from_row(row: &SqliteRow) -> StorageResult<HealthSample> {
        Ok(HealthSample {
            target_id: row.try_get("target_id")?,
            success: row.try_get::<i64, _>("success")? != 0,
            observed_at: Self::millis_to_timestamp(row.try_get("observed_at")?),
        })
    }

    async fn touch(&self, sql: &str, id: TargetId, value: &str) -> StorageResult<()> {
        let result = sqlx::query(sql)
            .bind(value)
            .bind(Self::timestamp_to_millis(&Utc::now()))
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(id));
        }
        Ok(())
    }
}

#[async_trait]
impl TargetRegistry for SqliteBackend {
    async fn find_by_id(&self, id: TargetId) -> StorageResult<Target> {
        let sql = format!("SELECT {TARGET_COLUMNS} FROM targets WHERE id = ?");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StorageError::NotFound(id))?;

        Self::target_from_row(&row)
    }

    #[instrument(skip(self))]
    async fn fetch_all(
        &self,
        filter: TargetFilter,
        limit: usize,
        offset: usize,
    ) -> StorageResult<Vec<Target>> {
        let mut clauses = Vec::new();
        let mut args = Vec::new();

        if let Some(method) = filter.method {
            clauses.push("method = ?");
            args.push(method.as_str());
        }
        if let Some(status) = filter.status {
            clauses.push("status = ?");
            args.push(status.as_str());
        }
        if let Some(frequency) = filter.frequency {
            clauses.push("frequency = ?");
            args.push(frequency.as_str());
        }

        let where_clause = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };

        let sql = format!(
            "SELECT {TARGET_COLUMNS} FROM targets {where_clause} ORDER BY id ASC LIMIT ? OFFSET ?"
        );

        let mut query = sqlx::query(&sql);
        for arg in args {
            query = query.bind(arg);
        }
        let rows = query
            .bind(limit as i64)
            .bind(offset as i64)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::target_from_row).collect()
    }

    async fn add(&self, target: NewTarget) -> StorageResult<TargetId> {
        let now = Self::timestamp_to_millis(&Utc::now());
        let row = sqlx::query(
            r#"
            INSERT INTO targets (address, method, frequency, contact, status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(&target.address)
        .bind(target.method.as_str())
        .bind(target.frequency.as_str())
        .bind(&target.contact)
        .bind(HealthStatus::Pending.as_str())
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        let id: TargetId = row.try_get("id")?;
        debug!("registered target {id} ({})", target.address);
        Ok(id)
    }

    async fn delete(&self, id: TargetId) -> StorageResult<()> {
        let result = sqlx::query("DELETE FROM targets WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(id));
        }
        Ok(())
    }

    async fn update_status(&self, id: TargetId, status: HealthStatus) -> StorageResult<()> {
        self.touch(
            "UPDATE targets SET status = ?, updated_at = ? WHERE id = ?",
            id,
            status.as_str(),
        )
        .await
    }

    async fn update_frequency(
        &self,
        id: TargetId,
        frequency: MonitoringFrequency,
    ) -> StorageResult<()> {
        self.touch(
            "UPDATE targets SET frequency = ?, updated_at = ? WHERE id = ?",
            id,
            frequency.as_str(),
        )
        .await
    }
}

#[async_trait]
impl IncidentStore for SqliteBackend {
    async fn open(&self, target_id: TargetId, at: DateTime<Utc>) -> StorageResult<()> {
        // the partial unique index turns a second open incident into an ignored insert
        sqlx::query("INSERT OR IGNORE INTO incidents (target_id, opened_at) VALUES (?, ?)")
            .bind(target_id)
            .bind(Self::timestamp_to_millis(&at))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn resolve(&self, target_id: TargetId, at: DateTime<Utc>) -> StorageResult<()> {
        sqlx::query(
            "UPDATE incidents SET resolved_at = ? WHERE target_id = ? AND resolved_at IS NULL",
        )
        .bind(Self::timestamp_to_millis(&at))
        .bind(target_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn count_in_window(
        &self,
        target_id: TargetId,
        amount: u32,
        unit: WindowUnit,
        now: DateTime<Utc>,
    ) -> StorageResult<u64> {
        let since = now - unit.span(amount);
        let row = sqlx::query(
            "SELECT COUNT(*) AS incident_count FROM incidents WHERE target_id = ? AND opened_at >= ?",
        )
        .bind(target_id)
        .bind(Self::timestamp_to_millis(&since))
        .fetch_one(&self.pool)
        .await?;

        let count: i64 = row.try_get("incident_count")?;
        Ok(count.max(0) as u64)
    }

    async fn latest(&self, target_id: TargetId) -> StorageResult<Option<Incident>> {
        let row = sqlx::query(
            r#"
            SELECT target_id, opened_at, resolved_at FROM incidents
            WHERE target_id = ?
            ORDER BY opened_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(target_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            Ok(Incident {
                target_id: row.try_get("target_id")?,
                opened_at: Self::millis_to_timestamp(row.try_get("opened_at")?),
                resolved_at: row
                    .try_get::<Option<i64>, _>("resolved_at")?
                    .map(Self::millis_to_timestamp),
            })
        })
        .transpose()
    }
}

#[async_trait]
impl HealthSampleStore for SqliteBackend {
    async fn append(&self, sample: HealthSample) -> StorageResult<()> {
        sqlx::query("INSERT INTO health_samples (target_id, success, observed_at) VALUES (?, ?, ?)")
            .bind(sample.target_id)
            .bind(i64::from(sample.success))
            .bind(Self::timestamp_to_millis(&sample.observed_at))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn latest(&self, target_id: TargetId) -> StorageResult<Option<HealthSample>> {
        let row = sqlx::query(
            r#"
            SELECT target_id, success, observed_at FROM health_samples
            WHERE target_id = ?
            ORDER BY observed_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(target_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::sample_from_row).transpose()
    }

    async fn latest_with_outcome(
        &self,
        target_id: TargetId,
        success: bool,
    ) -> StorageResult<Option<HealthSample>> {
        let row = sqlx::query(
            r#"
            SELECT target_id, success, observed_at FROM health_samples
            WHERE target_id = ? AND success = ?
            ORDER BY observed_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(target_id)
        .bind(i64::from(success))
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::sample_from_row).transpose()
    }
}
