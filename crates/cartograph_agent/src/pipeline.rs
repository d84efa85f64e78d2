//! Stage orchestration: Plan -> Explore -> Document under shared budgets.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::info;

use cartograph_protocol::{Credential, ExplorationResult, JobId, ValidationLimits};
use cartograph_security::{ProcedureInput, Validator};
use cartograph_storage::BlobStore;

use crate::bridge::BrowserBridge;
use crate::documenter::{DocumentedProcedure, Documenter};
use crate::error::{PipelineError, Result};
use crate::explorer::Explorer;
use crate::llm::LanguageModel;
use crate::planner::Planner;

/// Per-job budgets: an absolute deadline and the explorer's iteration cap.
#[derive(Debug, Clone, Copy)]
pub struct Budget {
    pub deadline: Instant,
    pub time_limit: Duration,
    pub max_iterations: u32,
}

impl Budget {
    /// Deadline measured from now.
    pub fn starting_now(time_limit: Duration, max_iterations: u32) -> Self {
        Self {
            deadline: Instant::now() + time_limit,
            time_limit,
            max_iterations,
        }
    }

    pub fn expired(&self) -> bool {
        Instant::now() >= self.deadline
    }

    pub(crate) fn check(&self) -> Result<()> {
        if self.expired() {
            Err(PipelineError::DeadlineExceeded(format!(
                "{:?} time budget",
                self.time_limit
            )))
        } else {
            Ok(())
        }
    }
}

/// Run a suspension point under the job's cancellation token and deadline.
///
/// Cancellation wins over completion, and the deadline converts into
/// `DeadlineExceeded` so a slow collaborator cannot overrun the budget by
/// more than this one call.
pub(crate) async fn guarded<T, E, F>(
    cancel: &CancellationToken,
    budget: &Budget,
    fut: F,
) -> Result<T>
where
    F: Future<Output = std::result::Result<T, E>>,
    PipelineError: From<E>,
{
    if cancel.is_cancelled() {
        return Err(PipelineError::Cancelled);
    }
    budget.check()?;

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(PipelineError::Cancelled),
        outcome = tokio::time::timeout_at(budget.deadline, fut) => match outcome {
            Ok(inner) => inner.map_err(PipelineError::from),
            Err(_) => Err(PipelineError::DeadlineExceeded(format!(
                "{:?} time budget",
                budget.time_limit
            ))),
        }
    }
}

/// Everything the controller needs to persist after a successful run.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub procedure: DocumentedProcedure,
    pub exploration: ExplorationResult,
}

/// The three-stage exploration agent.
pub struct ExplorationPipeline {
    planner: Planner,
    explorer: Explorer,
    documenter: Documenter,
    limits: ValidationLimits,
}

impl ExplorationPipeline {
    pub fn new(
        llm: Arc<dyn LanguageModel>,
        bridge: Arc<dyn BrowserBridge>,
        blobs: Arc<dyn BlobStore>,
        limits: ValidationLimits,
    ) -> Self {
        Self {
            planner: Planner::new(Arc::clone(&llm)),
            explorer: Explorer::new(Arc::clone(&llm), bridge, blobs),
            documenter: Documenter::new(llm),
            limits,
        }
    }

    /// Run all stages for one job. The bridge must already be connected;
    /// the controller owns its lifecycle.
    pub async fn run(
        &self,
        job_id: &JobId,
        target_url: &str,
        credentials: &[Credential],
        project_id: &str,
        created_by: &str,
        cancel: &CancellationToken,
        budget: &Budget,
    ) -> Result<PipelineOutput> {
        let plan = self
            .planner
            .plan(target_url, credentials, cancel, budget)
            .await?;
        info!(job_id = %job_id, strategy = %plan.strategy, "Exploration planned");

        let exploration = self
            .explorer
            .explore(job_id, &plan, cancel, budget)
            .await?;
        info!(
            job_id = %job_id,
            interactions = exploration.interactions.len(),
            "Exploration finished"
        );

        let procedure = self
            .documenter
            .document(&plan, &exploration, cancel, budget)
            .await?;

        let validator = Validator::new(self.limits.clone());
        validator.validate_for_script_generation(&ProcedureInput {
            name: &procedure.name,
            description: &procedure.description,
            steps: &procedure.steps,
            project_id,
            created_by,
        })?;

        Ok(PipelineOutput {
            procedure,
            exploration,
        })
    }
}
