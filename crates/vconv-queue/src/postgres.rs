//! PostgreSQL job store.
//!
//! Claims run inside a transaction with `FOR UPDATE SKIP LOCKED`, so any
//! number of worker processes can poll the same table without blocking on
//! each other or double-claiming a row.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::FromRow;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use vconv_models::{Job, JobId, JobStatus};

use crate::error::{QueueError, QueueResult};
use crate::store::{check_new_job, JobStore, MAX_RUNNING_PROGRESS};

/// Default pool size.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Table DDL. Each statement runs separately; all are idempotent.
const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS conversion_jobs (
        id               UUID PRIMARY KEY,
        status           TEXT NOT NULL DEFAULT 'queued'
                         CHECK (status IN ('queued', 'processing', 'done', 'failed')),
        progress         SMALLINT NOT NULL DEFAULT 0
                         CHECK (progress BETWEEN 0 AND 100),
        preset           TEXT NOT NULL
                         CHECK (preset IN ('original', '1080p', '720p', '480p')),
        input_key        TEXT NOT NULL,
        input_size_bytes BIGINT NOT NULL DEFAULT 0 CHECK (input_size_bytes >= 0),
        output_key       TEXT NOT NULL DEFAULT '',
        error            TEXT NOT NULL DEFAULT '',
        created_at       TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at       TIMESTAMPTZ NOT NULL DEFAULT now(),
        CONSTRAINT conversion_jobs_done_has_output
            CHECK ((status = 'done') = (output_key <> '')),
        CONSTRAINT conversion_jobs_done_is_complete
            CHECK ((status = 'done') = (progress = 100))
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS conversion_jobs_queued_idx
        ON conversion_jobs (created_at) WHERE status = 'queued'
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS conversion_jobs_created_at_idx
        ON conversion_jobs (created_at)
    "#,
];

const JOB_COLUMNS: &str = "id, status, progress, preset, input_key, input_size_bytes, \
                           output_key, error, created_at, updated_at";

/// Database connection settings.
#[derive(Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("url", &"<redacted>")
            .field("max_connections", &self.max_connections)
            .field("acquire_timeout", &self.acquire_timeout)
            .finish()
    }
}

impl DatabaseConfig {
    /// Create config from environment variables. `DATABASE_URL` is required.
    pub fn from_env() -> QueueResult<Self> {
        let url = std::env::var("DATABASE_URL")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| QueueError::connection_failed("DATABASE_URL not set"))?;

        Ok(Self {
            url,
            max_connections: std::env::var("DATABASE_MAX_CONNECTIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_MAX_CONNECTIONS),
            acquire_timeout: Duration::from_secs(10),
        })
    }
}

#[derive(Debug, FromRow)]
struct JobRow {
    id: Uuid,
    status: String,
    progress: i16,
    preset: String,
    input_key: String,
    input_size_bytes: i64,
    output_key: String,
    error: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<JobRow> for Job {
    type Error = QueueError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse()
            .map_err(|e| QueueError::corrupt(format!("job {}: {}", row.id, e)))?;
        let preset = row
            .preset
            .parse()
            .map_err(|e| QueueError::corrupt(format!("job {}: {}", row.id, e)))?;
        let progress = u8::try_from(row.progress)
            .ok()
            .filter(|p| *p <= 100)
            .ok_or_else(|| {
                QueueError::corrupt(format!("job {}: progress {}", row.id, row.progress))
            })?;

        Ok(Job {
            id: JobId(row.id),
            status,
            progress,
            preset,
            input_key: row.input_key,
            input_size_bytes: row.input_size_bytes.max(0) as u64,
            output_key: row.output_key,
            error: row.error,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Job store backed by a PostgreSQL table.
#[derive(Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    /// Wrap an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a pool from configuration.
    pub async fn connect(config: &DatabaseConfig) -> QueueResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect(&config.url)
            .await
            .map_err(|e| QueueError::connection_failed(e.to_string()))?;

        info!(
            max_connections = config.max_connections,
            "Connected to job database"
        );
        Ok(Self { pool })
    }

    /// Create from environment variables.
    pub async fn from_env() -> QueueResult<Self> {
        let config = DatabaseConfig::from_env()?;
        Self::connect(&config).await
    }

    /// Create the jobs table and indexes if missing.
    pub async fn ensure_schema(&self) -> QueueResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        debug!("Job schema ready");
        Ok(())
    }

    /// Explain a zero-row terminal update.
    async fn transition_error(&self, id: &JobId, to: JobStatus) -> QueueError {
        match self.get(id).await {
            Ok(Some(job)) => QueueError::invalid_transition(*id, job.status, to),
            Ok(None) => QueueError::JobNotFound(*id),
            Err(e) => e,
        }
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn insert(&self, job: &Job) -> QueueResult<()> {
        check_new_job(job)?;

        let result = sqlx::query(
            r#"
            INSERT INTO conversion_jobs
                (id, status, progress, preset, input_key, input_size_bytes,
                 output_key, error, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(job.id.0)
        .bind(job.status.as_str())
        .bind(i16::from(job.progress))
        .bind(job.preset.as_str())
        .bind(&job.input_key)
        .bind(i64::try_from(job.input_size_bytes).unwrap_or(i64::MAX))
        .bind(&job.output_key)
        .bind(&job.error)
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(QueueError::Duplicate(job.id))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn claim_next(&self) -> QueueResult<Option<Job>> {
        let mut tx = self.pool.begin().await?;

        let candidate: Option<(Uuid,)> = sqlx::query_as(
            r#"
            SELECT id
            FROM conversion_jobs
            WHERE status = 'queued'
            ORDER BY created_at ASC
            LIMIT 1
            FOR UPDATE SKIP LOCKED
            "#,
        )
        .fetch_optional(&mut *tx)
        .await?;

        let Some((id,)) = candidate else {
            tx.commit().await?;
            return Ok(None);
        };

        let row: JobRow = sqlx::query_as(&format!(
            r#"
            UPDATE conversion_jobs
            SET status = 'processing', progress = 0, error = '', updated_at = now()
            WHERE id = $1
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        debug!(job_id = %id, "Claimed job");
        Job::try_from(row).map(Some)
    }

    async fn update_progress(&self, id: &JobId, progress: u8) -> QueueResult<()> {
        let progress = i16::from(progress.min(MAX_RUNNING_PROGRESS));

        sqlx::query(
            r#"
            UPDATE conversion_jobs
            SET progress = $2, updated_at = now()
            WHERE id = $1 AND status = 'processing' AND progress < $2
            "#,
        )
        .bind(id.0)
        .bind(progress)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn complete(&self, id: &JobId, output_key: &str) -> QueueResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE conversion_jobs
            SET status = 'done', progress = 100, output_key = $2, error = '',
                updated_at = now()
            WHERE id = $1 AND status = 'processing'
            "#,
        )
        .bind(id.0)
        .bind(output_key)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(self.transition_error(id, JobStatus::Done).await);
        }
        Ok(())
    }

    async fn fail(&self, id: &JobId, error: &str) -> QueueResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE conversion_jobs
            SET status = 'failed', error = $2, updated_at = now()
            WHERE id = $1 AND status = 'processing'
            "#,
        )
        .bind(id.0)
        .bind(error)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(self.transition_error(id, JobStatus::Failed).await);
        }
        Ok(())
    }

    async fn get(&self, id: &JobId) -> QueueResult<Option<Job>> {
        let row: Option<JobRow> = sqlx::query_as(&format!(
            "SELECT {JOB_COLUMNS} FROM conversion_jobs WHERE id = $1"
        ))
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Job::try_from).transpose()
    }

    async fn list_created_before(&self, cutoff: DateTime<Utc>) -> QueueResult<Vec<Job>> {
        let rows: Vec<JobRow> = sqlx::query_as(&format!(
            "SELECT {JOB_COLUMNS} FROM conversion_jobs WHERE created_at < $1 ORDER BY created_at ASC"
        ))
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        let jobs = rows
            .into_iter()
            .filter_map(|row| match Job::try_from(row) {
                Ok(job) => Some(job),
                Err(e) => {
                    warn!("Skipping unreadable job record: {}", e);
                    None
                }
            })
            .collect();
        Ok(jobs)
    }

    async fn delete(&self, id: &JobId) -> QueueResult<bool> {
        let result = sqlx::query(
            "DELETE FROM conversion_jobs WHERE id = $1 AND status <> 'processing'",
        )
        .bind(id.0)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vconv_models::Preset;

    fn row() -> JobRow {
        let now = Utc::now();
        JobRow {
            id: Uuid::new_v4(),
            status: "processing".to_string(),
            progress: 42,
            preset: "1080p".to_string(),
            input_key: "inputs/a.mp4".to_string(),
            input_size_bytes: 1024,
            output_key: String::new(),
            error: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_row_conversion() {
        let job = Job::try_from(row()).unwrap();
        assert_eq!(job.status, JobStatus::Processing);
        assert_eq!(job.preset, Preset::P1080);
        assert_eq!(job.progress, 42);
        assert_eq!(job.input_size_bytes, 1024);
    }

    #[test]
    fn test_corrupt_rows_are_rejected() {
        let mut bad_status = row();
        bad_status.status = "paused".to_string();
        assert!(matches!(Job::try_from(bad_status), Err(QueueError::Corrupt(_))));

        let mut bad_preset = row();
        bad_preset.preset = "4k".to_string();
        assert!(matches!(Job::try_from(bad_preset), Err(QueueError::Corrupt(_))));

        let mut bad_progress = row();
        bad_progress.progress = 101;
        assert!(matches!(Job::try_from(bad_progress), Err(QueueError::Corrupt(_))));
    }

    #[test]
    fn test_database_config_redacts_url() {
        let config = DatabaseConfig {
            url: "postgres://user:hunter2@db/vconv".to_string(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            acquire_timeout: Duration::from_secs(1),
        };
        assert!(!format!("{:?}", config).contains("hunter2"));
    }
}
