//! Job records and the claim queue.
//!
//! The `jobs` table is the durable work queue: creation inserts a `created`
//! row, workers claim by atomically flipping `created -> running`, and the
//! controller records terminal outcomes. This store is the only mutator of
//! job rows.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::FromRow;
use tracing::info;

use cartograph_protocol::{JobId, JobStatus, JobType};

use crate::error::{DbError, Result};
use crate::pool::DbPool;

/// A job row in domain form.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub id: JobId,
    pub job_type: JobType,
    pub status: JobStatus,
    /// Opaque key-value map; `ui_exploration` requires `endpoint_id` and
    /// `project_id`.
    pub config: Value,
    pub result: Option<Value>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields for inserting a new job.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub job_type: JobType,
    pub status: JobStatus,
    pub config: Value,
    pub created_by: String,
}

impl NewJob {
    pub fn new(job_type: JobType, config: Value, created_by: impl Into<String>) -> Self {
        Self {
            job_type,
            status: JobStatus::Created,
            config,
            created_by: created_by.into(),
        }
    }
}

/// Partial update applied by [`JobStore::update`].
///
/// A `status` setter is still subject to the transition DAG; the fallback
/// failure path uses it for `running -> failed`, nothing can use it to
/// resurrect a terminal job.
#[derive(Debug, Clone, Default)]
pub struct JobUpdate {
    pub config: Option<Value>,
    pub result: Option<Value>,
    pub status: Option<JobStatus>,
}

impl JobUpdate {
    pub fn result(value: Value) -> Self {
        Self {
            result: Some(value),
            ..Default::default()
        }
    }
}

#[derive(Debug, FromRow)]
struct JobRow {
    id: String,
    job_type: String,
    status: String,
    config: String,
    result: Option<String>,
    start_time: Option<DateTime<Utc>>,
    end_time: Option<DateTime<Utc>>,
    duration_ms: Option<i64>,
    created_by: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl JobRow {
    fn into_job(self) -> Result<Job> {
        Ok(Job {
            id: JobId::parse(&self.id).map_err(|e| DbError::invalid_state(e.to_string()))?,
            job_type: JobType::parse(&self.job_type)
                .map_err(|e| DbError::invalid_state(e.to_string()))?,
            status: JobStatus::parse(&self.status)
                .map_err(|e| DbError::invalid_state(e.to_string()))?,
            config: serde_json::from_str(&self.config)?,
            result: self.result.as_deref().map(serde_json::from_str).transpose()?,
            start_time: self.start_time,
            end_time: self.end_time,
            duration_ms: self.duration_ms,
            created_by: self.created_by,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Queue totals for operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRow)]
pub struct JobStats {
    pub created: i64,
    pub running: i64,
    pub success: i64,
    pub failed: i64,
    pub stopped: i64,
}

/// Repository over the `jobs` table.
#[derive(Clone)]
pub struct JobStore {
    pool: DbPool,
}

impl JobStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Insert a new job. The initial status must be `created`.
    pub async fn create(&self, job: NewJob) -> Result<Job> {
        if job.status != JobStatus::Created {
            return Err(DbError::invalid_state(format!(
                "jobs are inserted as 'created', got '{}'",
                job.status
            )));
        }

        let id = JobId::new();
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO jobs (id, job_type, status, config, created_by, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.as_str())
        .bind(job.job_type.as_str())
        .bind(JobStatus::Created.as_str())
        .bind(serde_json::to_string(&job.config)?)
        .bind(&job.created_by)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        info!(job_id = %id, job_type = %job.job_type, "Job created");
        self.get(&id).await
    }

    /// Atomically claim the oldest `created` job, transitioning it to
    /// `running` and stamping `start_time`.
    ///
    /// One transaction: select the FIFO head, then a conditional
    /// `UPDATE ... WHERE status = 'created'`. If another claimer won the
    /// race, `rows_affected` is 0 and the call returns `None`; the caller's
    /// drain loop retries naturally.
    pub async fn claim_next_created(&self) -> Result<Option<Job>> {
        let mut tx = self.pool.begin().await?;

        let job_id: Option<String> = sqlx::query_scalar(
            r#"
            SELECT id FROM jobs
            WHERE status = 'created'
            ORDER BY created_at ASC, id ASC
            LIMIT 1
            "#,
        )
        .fetch_optional(&mut *tx)
        .await?;

        let Some(job_id) = job_id else {
            tx.commit().await?;
            return Ok(None);
        };

        let now = Utc::now();
        let rows_affected = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'running',
                start_time = ?,
                updated_at = ?
            WHERE id = ? AND status = 'created'
            "#,
        )
        .bind(now)
        .bind(now)
        .bind(&job_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if rows_affected == 0 {
            // Another worker claimed it between the select and the update.
            tx.commit().await?;
            return Ok(None);
        }

        let row: JobRow = sqlx::query_as("SELECT * FROM jobs WHERE id = ?")
            .bind(&job_id)
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;

        info!(job_id = %job_id, "Claimed job");
        row.into_job().map(Some)
    }

    /// Explicit `created -> running` transition for callers that own the job
    /// by other means. Fails unless the current status is `created`.
    pub async fn start(&self, id: &JobId) -> Result<Job> {
        let now = Utc::now();
        let rows_affected = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'running',
                start_time = ?,
                updated_at = ?
            WHERE id = ? AND status = 'created'
            "#,
        )
        .bind(now)
        .bind(now)
        .bind(id.as_str())
        .execute(&self.pool)
        .await?
        .rows_affected();

        if rows_affected == 0 {
            let current = self.get(id).await?;
            return Err(DbError::invalid_state(format!(
                "cannot start job {} from status '{}'",
                id, current.status
            )));
        }
        self.get(id).await
    }

    /// Record a terminal outcome: `running -> {success, failed, stopped}`.
    ///
    /// Sets `end_time` and computes the duration from `start_time`. Returns
    /// `DbError::JobNotRunning` if the job is in any other state.
    pub async fn complete(
        &self,
        id: &JobId,
        terminal_status: JobStatus,
        result: Option<Value>,
    ) -> Result<Job> {
        if !terminal_status.is_terminal() {
            return Err(DbError::invalid_state(format!(
                "'{}' is not a terminal status",
                terminal_status
            )));
        }

        let mut tx = self.pool.begin().await?;

        let row: Option<JobRow> = sqlx::query_as("SELECT * FROM jobs WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(&mut *tx)
            .await?;
        let Some(row) = row else {
            return Err(DbError::not_found(format!("job {}", id)));
        };
        let current = row.into_job()?;
        if current.status != JobStatus::Running {
            return Err(DbError::JobNotRunning(
                id.to_string(),
                current.status.as_str().to_string(),
            ));
        }

        let end = Utc::now();
        let duration_ms = current
            .start_time
            .map(|start| (end - start).num_milliseconds());

        let rows_affected = sqlx::query(
            r#"
            UPDATE jobs
            SET status = ?,
                result = ?,
                end_time = ?,
                duration_ms = ?,
                updated_at = ?
            WHERE id = ? AND status = 'running'
            "#,
        )
        .bind(terminal_status.as_str())
        .bind(result.map(|r| serde_json::to_string(&r)).transpose()?)
        .bind(end)
        .bind(duration_ms)
        .bind(end)
        .bind(id.as_str())
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if rows_affected == 0 {
            return Err(DbError::JobNotRunning(
                id.to_string(),
                "unknown".to_string(),
            ));
        }
        tx.commit().await?;

        info!(job_id = %id, status = %terminal_status, "Job completed");
        self.get(id).await
    }

    /// Partial update. Status setters are checked against the transition DAG
    /// relative to the current row.
    pub async fn update(&self, id: &JobId, update: JobUpdate) -> Result<Job> {
        let mut tx = self.pool.begin().await?;

        let row: Option<JobRow> = sqlx::query_as("SELECT * FROM jobs WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(&mut *tx)
            .await?;
        let Some(row) = row else {
            return Err(DbError::not_found(format!("job {}", id)));
        };
        let current = row.into_job()?;

        if let Some(next) = update.status {
            if !current.status.can_transition_to(next) {
                return Err(DbError::invalid_state(format!(
                    "job {} cannot move from '{}' to '{}'",
                    id, current.status, next
                )));
            }
        }

        let status = update.status.unwrap_or(current.status);
        let config = match update.config {
            Some(c) => c,
            None => current.config,
        };
        let result = match update.result {
            Some(r) => Some(r),
            None => current.result,
        };
        let now = Utc::now();

        sqlx::query(
            r#"
            UPDATE jobs
            SET status = ?, config = ?, result = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(status.as_str())
        .bind(serde_json::to_string(&config)?)
        .bind(result.map(|r| serde_json::to_string(&r)).transpose()?)
        .bind(now)
        .bind(id.as_str())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        self.get(id).await
    }

    /// Point read.
    pub async fn get(&self, id: &JobId) -> Result<Job> {
        let row: Option<JobRow> = sqlx::query_as("SELECT * FROM jobs WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => row.into_job(),
            None => Err(DbError::not_found(format!("job {}", id))),
        }
    }

    /// Jobs created by `user`, newest first.
    pub async fn list_by_creator(
        &self,
        user: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Job>> {
        let rows: Vec<JobRow> = sqlx::query_as(
            r#"
            SELECT * FROM jobs
            WHERE created_by = ?
            ORDER BY created_at DESC, id DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(user)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(JobRow::into_job).collect()
    }

    pub async fn count_by_creator(&self, user: &str) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM jobs WHERE created_by = ?")
            .bind(user)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Queue totals. Abandoned jobs show up as `running` rows whose
    /// `start_time` is stale with no `end_time`.
    pub async fn stats(&self) -> Result<JobStats> {
        let stats: JobStats = sqlx::query_as(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE status = 'created') as created,
                COUNT(*) FILTER (WHERE status = 'running') as running,
                COUNT(*) FILTER (WHERE status = 'success') as success,
                COUNT(*) FILTER (WHERE status = 'failed') as failed,
                COUNT(*) FILTER (WHERE status = 'stopped') as stopped
            FROM jobs
            "#,
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(stats)
    }
}
