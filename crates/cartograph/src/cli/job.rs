//! `cartograph job`: queue operations against the configured database.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Subcommand;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use cartograph_db::{Job, JobStore};
use cartograph_protocol::{JobId, JobType, SystemConfig};
use cartograph_sentinel::{ControlPlane, StopRegistry, WorkNotifier};

#[derive(Subcommand, Debug)]
pub enum JobCommand {
    /// Submit a ui_exploration job
    Submit {
        #[arg(long)]
        endpoint_id: String,
        #[arg(long)]
        project_id: String,
        #[arg(long)]
        user: String,
    },
    /// List jobs created by a user
    List {
        #[arg(long)]
        user: String,
        #[arg(long, default_value_t = 20)]
        limit: i64,
        #[arg(long, default_value_t = 0)]
        offset: i64,
    },
    /// Show one job
    Get { id: String },
    /// Stop a running job
    Stop { id: String },
    /// Queue totals by status
    Stats,
}

pub async fn run(command: JobCommand, config: &SystemConfig) -> Result<()> {
    let pool = super::connect(config).await?;
    let control = ControlPlane::new(
        JobStore::new(pool),
        WorkNotifier::detached(),
        Arc::new(StopRegistry::new(CancellationToken::new())),
    );

    match command {
        JobCommand::Submit {
            endpoint_id,
            project_id,
            user,
        } => {
            let job = control
                .create_job(
                    JobType::UiExploration,
                    json!({"endpoint_id": endpoint_id, "project_id": project_id}),
                    &user,
                )
                .await
                .context("Job submission failed")?;
            println!("{}", job.id);
        }
        JobCommand::List {
            user,
            limit,
            offset,
        } => {
            let (jobs, total) = control.list_jobs(&user, limit, offset).await?;
            for job in &jobs {
                print_job(job);
            }
            println!("{} of {total} job(s)", jobs.len());
        }
        JobCommand::Get { id } => {
            let id: JobId = id.parse().context("Invalid job id")?;
            let job = control.get_job(&id).await?;
            print_job(&job);
            if let Some(result) = &job.result {
                println!("result: {result}");
            }
        }
        JobCommand::Stop { id } => {
            let id: JobId = id.parse().context("Invalid job id")?;
            let job = control.stop_job(&id).await.context("Stop rejected")?;
            print_job(&job);
        }
        JobCommand::Stats => {
            let stats = control.stats().await?;
            println!(
                "created={} running={} success={} failed={} stopped={}",
                stats.created, stats.running, stats.success, stats.failed, stats.stopped
            );
        }
    }
    Ok(())
}

fn print_job(job: &Job) {
    let duration = job
        .duration_ms
        .map(|ms| format!("{ms}ms"))
        .unwrap_or_else(|| "-".to_string());
    println!(
        "{}  {:<8}  {:<15}  by {}  {}",
        job.id, job.status, job.job_type, job.created_by, duration
    );
}
