//! Control-plane operations: the transport-agnostic surface HTTP handlers
//! and the CLI call into.

use std::sync::Arc;

use serde_json::{json, Value};
use thiserror::Error;
use tracing::info;

use cartograph_db::{DbError, Job, JobStats, JobStore, NewJob};
use cartograph_protocol::defaults::STOPPED_BY_USER_MESSAGE;
use cartograph_protocol::{JobId, JobStatus, JobType};

use crate::pool::WorkNotifier;
use crate::stops::StopRegistry;

#[derive(Debug, Error)]
pub enum ControlError {
    #[error(transparent)]
    Db(#[from] DbError),

    /// The requested transition conflicts with the job's current status.
    #[error("job {id} is not running (status: {status})")]
    NotRunning { id: String, status: String },
}

/// Job-facing control plane.
#[derive(Clone)]
pub struct ControlPlane {
    jobs: JobStore,
    notifier: WorkNotifier,
    stops: Arc<StopRegistry>,
}

impl ControlPlane {
    pub fn new(jobs: JobStore, notifier: WorkNotifier, stops: Arc<StopRegistry>) -> Self {
        Self {
            jobs,
            notifier,
            stops,
        }
    }

    /// Insert a `created` job and hint the pool, non-blockingly.
    pub async fn create_job(
        &self,
        job_type: JobType,
        config: Value,
        created_by: &str,
    ) -> Result<Job, ControlError> {
        let job = self
            .jobs
            .create(NewJob::new(job_type, config, created_by))
            .await?;
        self.notifier.notify();
        Ok(job)
    }

    pub async fn get_job(&self, id: &JobId) -> Result<Job, ControlError> {
        Ok(self.jobs.get(id).await?)
    }

    pub async fn list_jobs(
        &self,
        created_by: &str,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Job>, i64), ControlError> {
        let jobs = self.jobs.list_by_creator(created_by, limit, offset).await?;
        let total = self.jobs.count_by_creator(created_by).await?;
        Ok((jobs, total))
    }

    pub async fn stats(&self) -> Result<JobStats, ControlError> {
        Ok(self.jobs.stats().await?)
    }

    /// Stop a running job: cancel its context and record the `stopped`
    /// outcome.
    ///
    /// The transition is conditional on the current status, so a job that
    /// just succeeded stays `success` — the status guard, not the token,
    /// arbitrates the race.
    pub async fn stop_job(&self, id: &JobId) -> Result<Job, ControlError> {
        let job = self.jobs.get(id).await?;
        if job.status != JobStatus::Running {
            return Err(ControlError::NotRunning {
                id: id.to_string(),
                status: job.status.as_str().to_string(),
            });
        }

        self.stops.cancel(id);
        match self
            .jobs
            .complete(
                id,
                JobStatus::Stopped,
                Some(json!({"reason": STOPPED_BY_USER_MESSAGE})),
            )
            .await
        {
            Ok(job) => {
                info!(job_id = %id, "Job stopped");
                Ok(job)
            }
            // Lost the race against the pipeline's own terminal write.
            Err(DbError::JobNotRunning(_, _)) => Ok(self.jobs.get(id).await?),
            Err(err) => Err(err.into()),
        }
    }
}
