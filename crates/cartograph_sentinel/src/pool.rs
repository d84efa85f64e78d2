//! Worker pool with a lossy work-notification channel.
//!
//! The queue of record is the database; the channel is only a wake-up
//! hint. Senders never block (a full channel drops the hint), and workers
//! drain every claimable job after each wake-up, so dropped hints cannot
//! lose work.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use cartograph_db::JobStore;

use crate::controller::JobController;

/// Non-blocking sender half of the work-hint channel.
#[derive(Clone)]
pub struct WorkNotifier {
    tx: mpsc::Sender<()>,
}

impl WorkNotifier {
    /// Hint that work is available. Dropped silently when the channel is
    /// full; the next enqueue or drain picks the job up.
    pub fn notify(&self) {
        let _ = self.tx.try_send(());
    }

    /// A notifier with no pool behind it, for one-shot tools that enqueue
    /// into the database and rely on a running pool's poll tick.
    pub fn detached() -> Self {
        let (tx, _rx) = mpsc::channel(1);
        Self { tx }
    }
}

/// Fallback poll cadence; covers hints dropped on a full channel and jobs
/// enqueued by other processes.
const POLL_INTERVAL: std::time::Duration = std::time::Duration::from_secs(2);

/// Fixed-size pool of cooperative workers.
pub struct WorkerPool {
    notifier: WorkNotifier,
    shutdown: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `workers` tasks sharing one hint channel of the same capacity.
    pub fn start(
        workers: usize,
        jobs: JobStore,
        controller: Arc<JobController>,
        shutdown: CancellationToken,
    ) -> Self {
        let workers = workers.max(1);
        let (tx, rx) = mpsc::channel::<()>(workers);
        let rx = Arc::new(tokio::sync::Mutex::new(rx));

        let mut handles: Vec<JoinHandle<()>> = (0..workers)
            .map(|index| {
                let jobs = jobs.clone();
                let controller = Arc::clone(&controller);
                let shutdown = shutdown.clone();
                let rx = Arc::clone(&rx);
                tokio::spawn(async move {
                    worker_loop(index, jobs, controller, shutdown, rx).await;
                })
            })
            .collect();

        // Poll tick: re-hint periodically so dropped hints and externally
        // enqueued jobs are picked up without a notification.
        handles.push(tokio::spawn({
            let tx = tx.clone();
            let shutdown = shutdown.clone();
            async move {
                loop {
                    tokio::select! {
                        _ = shutdown.cancelled() => return,
                        _ = tokio::time::sleep(POLL_INTERVAL) => {
                            let _ = tx.try_send(());
                        }
                    }
                }
            }
        }));

        info!(workers, "Worker pool started");
        Self {
            notifier: WorkNotifier { tx },
            shutdown,
            handles,
        }
    }

    pub fn notifier(&self) -> WorkNotifier {
        self.notifier.clone()
    }

    /// Cancel the pool and wait for every worker to park.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        for handle in self.handles {
            let _ = handle.await;
        }
        info!("Worker pool stopped");
    }
}

/// One worker: wait for a hint or shutdown, then drain the queue.
async fn worker_loop(
    index: usize,
    jobs: JobStore,
    controller: Arc<JobController>,
    shutdown: CancellationToken,
    rx: Arc<tokio::sync::Mutex<mpsc::Receiver<()>>>,
) {
    loop {
        {
            let mut rx = rx.lock().await;
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!(worker = index, "Worker shutting down");
                    return;
                }
                hint = rx.recv() => {
                    if hint.is_none() {
                        // All senders gone; nothing will ever wake us again.
                        return;
                    }
                }
            }
        }

        // Drain: claim until the repository reports no claimable job.
        loop {
            if shutdown.is_cancelled() {
                return;
            }
            match jobs.claim_next_created().await {
                Ok(Some(job)) => {
                    debug!(worker = index, job_id = %job.id, "Dispatching claimed job");
                    controller.run_claimed(job).await;
                }
                Ok(None) => break,
                Err(err) => {
                    error!(worker = index, error = %err, "Claim failed");
                    break;
                }
            }
        }
    }
}
