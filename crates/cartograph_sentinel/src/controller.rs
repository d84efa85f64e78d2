//! Per-job orchestration: dependency loading, budgets, the pipeline run,
//! persistence, and the terminal transition.

use std::sync::Arc;

use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use cartograph_agent::{
    Budget, BrowserBridge, ExplorationPipeline, LanguageModel, PipelineError,
};
use cartograph_db::{
    CatalogStore, DbError, Job, JobStore, JobUpdate, NewProcedure, ProcedureStore, RunStore,
};
use cartograph_protocol::defaults::STOPPED_BY_USER_MESSAGE;
use cartograph_protocol::{
    AgentConfig, AssetKind, EndpointId, JobStatus, ProjectId, ValidationLimits,
};
use cartograph_storage::BlobStore;
use cartograph_trackers::{IssueTracker, NewIssue};

use crate::stops::StopRegistry;

/// Produces a fresh bridge handle per job; the controller owns its
/// connect/close lifecycle.
pub type BridgeFactory = Arc<dyn Fn() -> Arc<dyn BrowserBridge> + Send + Sync>;

/// Drives one claimed job at a time from `running` to a terminal status.
pub struct JobController {
    jobs: JobStore,
    procedures: ProcedureStore,
    catalog: CatalogStore,
    runs: RunStore,
    llm: Arc<dyn LanguageModel>,
    blobs: Arc<dyn BlobStore>,
    new_bridge: BridgeFactory,
    stops: Arc<StopRegistry>,
    config: AgentConfig,
    limits: ValidationLimits,
    /// Optional: failed runs are filed here, best-effort.
    tracker: Option<Arc<dyn IssueTracker>>,
}

impl JobController {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        jobs: JobStore,
        procedures: ProcedureStore,
        catalog: CatalogStore,
        runs: RunStore,
        llm: Arc<dyn LanguageModel>,
        blobs: Arc<dyn BlobStore>,
        new_bridge: BridgeFactory,
        stops: Arc<StopRegistry>,
        config: AgentConfig,
        limits: ValidationLimits,
        tracker: Option<Arc<dyn IssueTracker>>,
    ) -> Self {
        Self {
            jobs,
            procedures,
            catalog,
            runs,
            llm,
            blobs,
            new_bridge,
            stops,
            config,
            limits,
            tracker,
        }
    }

    /// Entry point for a job the worker has already claimed.
    ///
    /// Never propagates pipeline failures: every outcome ends in a terminal
    /// transition, with a fallback partial update if the transition itself
    /// fails.
    pub async fn run_claimed(&self, job: Job) {
        let job_id = job.id.clone();
        // Register before the first await: the job is already `running` in
        // the database, so a stop can land at any moment and must find a
        // token to cancel (or be remembered by the registry).
        let cancel = self.stops.register(&job_id);
        let outcome = self.execute(job, cancel).await;

        let (status, result) = match outcome {
            Ok(result) => (JobStatus::Success, result),
            Err(err) if err_is_cancelled(&err) => (
                JobStatus::Stopped,
                json!({"reason": STOPPED_BY_USER_MESSAGE}),
            ),
            Err(err) => {
                warn!(job_id = %job_id, error = %err, "Job failed");
                self.file_failure_issue(&job_id, &err).await;
                (JobStatus::Failed, json!({"error": err.to_string()}))
            }
        };

        match self
            .jobs
            .complete(&job_id, status, Some(result.clone()))
            .await
        {
            Ok(_) => {}
            Err(DbError::JobNotRunning(_, current)) => {
                // A stop request finished the job first; the guarded
                // transition is the arbiter, so leave it be.
                info!(job_id = %job_id, status = %current, "Terminal transition already recorded");
            }
            Err(err) => {
                error!(job_id = %job_id, error = %err, "Terminal transition failed, falling back");
                let fallback = JobUpdate {
                    status: Some(JobStatus::Failed),
                    result: Some(result),
                    ..Default::default()
                };
                if let Err(err) = self.jobs.update(&job_id, fallback).await {
                    error!(job_id = %job_id, error = %err, "Fallback update failed");
                }
            }
        }
        self.stops.deregister(&job_id);
    }

    /// Best-effort issue for a failed run; tracker faults only log.
    async fn file_failure_issue(&self, job_id: &cartograph_protocol::JobId, err: &RunError) {
        let Some(tracker) = &self.tracker else {
            return;
        };
        let issue = NewIssue {
            title: format!("Exploration job {job_id} failed"),
            body: err.to_string(),
        };
        if let Err(tracker_err) = tracker.create_issue(issue).await {
            warn!(job_id = %job_id, error = %tracker_err, "Failure issue not filed");
        }
    }

    async fn execute(&self, job: Job, cancel: CancellationToken) -> Result<Value, RunError> {
        let endpoint_id = config_id::<EndpointId>(&job.config, "endpoint_id")?;
        let project_id = config_id::<ProjectId>(&job.config, "project_id")?;

        let endpoint = self.catalog.get_endpoint(&endpoint_id).await?;
        let project = self.catalog.get_project(&project_id).await?;
        if endpoint.project_id != project.id {
            return Err(RunError::Config(format!(
                "endpoint {} does not belong to project {}",
                endpoint.id, project.id
            )));
        }
        if project.created_by != job.created_by {
            return Err(RunError::Unauthorized(format!(
                "user {} does not own project {}",
                job.created_by, project.id
            )));
        }

        // No-op when the claim already moved the job to running.
        if job.status == JobStatus::Created {
            self.jobs.start(&job.id).await?;
        }

        let budget = Budget::starting_now(self.config.time_limit(), self.config.max_iterations);

        // A stop may already have landed while dependencies were loading;
        // don't open a browser session for a job that is unwinding.
        if cancel.is_cancelled() {
            return Err(RunError::Pipeline(PipelineError::Cancelled));
        }

        let bridge = (self.new_bridge)();
        let pipeline = ExplorationPipeline::new(
            Arc::clone(&self.llm),
            Arc::clone(&bridge),
            Arc::clone(&self.blobs),
            self.limits.clone(),
        );

        bridge
            .connect()
            .await
            .map_err(|e| RunError::Pipeline(PipelineError::Bridge(e)))?;
        let run = pipeline
            .run(
                &job.id,
                &endpoint.base_url,
                &endpoint.credentials,
                project.id.as_str(),
                &job.created_by,
                &cancel,
                &budget,
            )
            .await;
        // The bridge is per-job and closes on every exit path.
        if let Err(err) = bridge.close().await {
            warn!(job_id = %job.id, error = %err, "Bridge close failed");
        }
        let output = run?;

        let procedure = self
            .procedures
            .create(NewProcedure {
                project_id: project.id.clone(),
                name: output.procedure.name.clone(),
                description: output.procedure.description.clone(),
                steps: output.procedure.steps.clone(),
                created_by: job.created_by.clone(),
            })
            .await?;

        // Best-effort artefact links; bytes already live in blob storage.
        for interaction in &output.exploration.interactions {
            if let Some(path) = &interaction.artifact_path {
                if let Err(err) = self
                    .runs
                    .add_asset(&job.id, AssetKind::Screenshot, path)
                    .await
                {
                    warn!(job_id = %job.id, error = %err, "Asset link not recorded");
                }
            }
        }

        info!(
            job_id = %job.id,
            procedure_id = %procedure.id,
            steps = procedure.steps.len(),
            "Exploration job produced a procedure"
        );
        Ok(json!({
            "procedure_id": procedure.id.as_str(),
            "procedure_name": procedure.name,
            "steps_count": procedure.steps.len(),
        }))
    }
}

/// Internal error union for one run.
#[derive(Debug, thiserror::Error)]
enum RunError {
    #[error("invalid job config: {0}")]
    Config(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

fn err_is_cancelled(err: &RunError) -> bool {
    matches!(err, RunError::Pipeline(p) if p.is_cancelled())
}

fn config_id<T: std::str::FromStr>(config: &Value, key: &str) -> Result<T, RunError>
where
    T::Err: std::fmt::Display,
{
    let raw = config
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| RunError::Config(format!("missing {key}")))?;
    raw.parse::<T>()
        .map_err(|e| RunError::Config(format!("malformed {key}: {e}")))
}
