//! Assembly: wire configuration, repositories, collaborators, the worker
//! pool, and the control plane into one running unit.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::info;

use cartograph_agent::LanguageModel;
use cartograph_db::{init_schema, CatalogStore, DbPool, JobStore, ProcedureStore, RunStore};
use cartograph_protocol::SystemConfig;
use cartograph_storage::BlobStore;
use cartograph_trackers::IssueTracker;

use crate::control::ControlPlane;
use crate::controller::{BridgeFactory, JobController};
use crate::pool::WorkerPool;
use crate::stops::StopRegistry;

/// A running Cartograph core: control plane plus worker pool.
pub struct Sentinel {
    control: ControlPlane,
    pool: WorkerPool,
    shutdown: CancellationToken,
}

impl Sentinel {
    /// Bootstrap the schema, build every store, and start the pool.
    ///
    /// The language model and bridge factory are the deployment's choice of
    /// collaborators; everything else comes from configuration.
    pub async fn start(
        db: DbPool,
        config: &SystemConfig,
        llm: Arc<dyn LanguageModel>,
        new_bridge: BridgeFactory,
        tracker: Option<Arc<dyn IssueTracker>>,
    ) -> Result<Self> {
        init_schema(&db).await.context("Schema bootstrap failed")?;

        let blobs: Arc<dyn BlobStore> = Arc::from(
            cartograph_storage::open(&config.storage).context("Blob storage unavailable")?,
        );

        let shutdown = CancellationToken::new();
        let stops = Arc::new(StopRegistry::new(shutdown.clone()));

        let jobs = JobStore::new(db.clone());
        let controller = Arc::new(JobController::new(
            jobs.clone(),
            ProcedureStore::new(db.clone()),
            CatalogStore::new(db.clone()),
            RunStore::new(db),
            llm,
            blobs,
            new_bridge,
            Arc::clone(&stops),
            config.agent.clone(),
            config.limits.clone(),
            tracker,
        ));

        let pool = WorkerPool::start(
            config.agent.max_concurrent_workers,
            jobs.clone(),
            controller,
            shutdown.clone(),
        );
        let control = ControlPlane::new(jobs, pool.notifier(), stops);

        info!("Sentinel started");
        Ok(Self {
            control,
            pool,
            shutdown,
        })
    }

    pub fn control(&self) -> ControlPlane {
        self.control.clone()
    }

    /// Graceful shutdown: workers observe the cancellation at their next
    /// suspension point; claimed jobs are abandoned in `running` for
    /// operator attention.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        self.pool.shutdown().await;
    }
}
