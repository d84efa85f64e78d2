//! End-to-end job lifecycle against scripted collaborators.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use cartograph_agent::BrowserBridge;
use cartograph_db::{Job, ProcedureStore};
use cartograph_protocol::{
    AgentConfig, JobId, JobStatus, JobType, StorageConfig, SystemConfig,
};
use cartograph_sentinel::{BridgeFactory, ControlError, Sentinel};
use cartograph_test_utils::{memory_pool, seed_catalog, RecordingBridge, ScriptedModel};

struct Harness {
    sentinel: Sentinel,
    pool: cartograph_db::DbPool,
    bridge: Arc<RecordingBridge>,
    tracker: Arc<cartograph_trackers::InMemoryTracker>,
    project_id: cartograph_protocol::ProjectId,
    endpoint_id: cartograph_protocol::EndpointId,
    _blob_dir: tempfile::TempDir,
}

async fn harness(model: ScriptedModel, agent: AgentConfig) -> Harness {
    let pool = memory_pool().await;
    let (project_id, endpoint_id) = seed_catalog(&pool, "alice").await;

    let blob_dir = tempfile::tempdir().unwrap();
    let config = SystemConfig {
        storage: StorageConfig::Local {
            root: blob_dir.path().to_path_buf(),
        },
        agent,
        ..Default::default()
    };

    let bridge = Arc::new(RecordingBridge::new());
    let factory: BridgeFactory = {
        let bridge = Arc::clone(&bridge);
        Arc::new(move || Arc::clone(&bridge) as Arc<dyn BrowserBridge>)
    };
    let tracker = Arc::new(cartograph_trackers::InMemoryTracker::default());

    let sentinel = Sentinel::start(
        pool.clone(),
        &config,
        Arc::new(model),
        factory,
        Some(tracker.clone() as Arc<dyn cartograph_trackers::IssueTracker>),
    )
    .await
    .unwrap();

    Harness {
        sentinel,
        pool,
        bridge,
        tracker,
        project_id,
        endpoint_id,
        _blob_dir: blob_dir,
    }
}

fn exploration_config(h: &Harness) -> serde_json::Value {
    json!({
        "endpoint_id": h.endpoint_id.as_str(),
        "project_id": h.project_id.as_str(),
    })
}

async fn wait_for_terminal(h: &Harness, id: &JobId) -> Job {
    for _ in 0..500 {
        let job = h.sentinel.control().get_job(id).await.unwrap();
        if job.status.is_terminal() {
            return job;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job never reached a terminal status");
}

async fn wait_for_status(h: &Harness, id: &JobId, status: JobStatus) {
    for _ in 0..500 {
        let job = h.sentinel.control().get_job(id).await.unwrap();
        if job.status == status {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job never reached {status}");
}

#[tokio::test]
async fn happy_path_job_produces_a_procedure() {
    let h = harness(ScriptedModel::happy_path(), AgentConfig::default()).await;

    let job = h
        .sentinel
        .control()
        .create_job(JobType::UiExploration, exploration_config(&h), "alice")
        .await
        .unwrap();
    assert_eq!(job.status, JobStatus::Created);

    let done = wait_for_terminal(&h, &job.id).await;
    assert_eq!(done.status, JobStatus::Success);
    let result = done.result.unwrap();
    assert_eq!(result["steps_count"], 3);
    assert_eq!(result["procedure_name"], "Login and dashboard");

    let procedures = ProcedureStore::new(h.pool.clone());
    let heads = procedures.list_by_project(&h.project_id, 10, 0).await.unwrap();
    assert_eq!(heads.len(), 1);
    assert_eq!(heads[0].version, 1);
    assert!(heads[0].is_latest);
    assert_eq!(heads[0].created_by, "alice");

    assert!(h.bridge.was_closed());
    h.sentinel.shutdown().await;
}

#[tokio::test]
async fn stop_while_running_ends_in_stopped() {
    let model = ScriptedModel::happy_path().with_delay(Duration::from_millis(150));
    let h = harness(model, AgentConfig::default()).await;

    let job = h
        .sentinel
        .control()
        .create_job(JobType::UiExploration, exploration_config(&h), "alice")
        .await
        .unwrap();

    wait_for_status(&h, &job.id, JobStatus::Running).await;
    let stopped = h.sentinel.control().stop_job(&job.id).await.unwrap();
    assert_eq!(stopped.status, JobStatus::Stopped);
    assert_eq!(stopped.result.unwrap()["reason"], "stopped by user");

    // the worker unwinds and the status stays stopped
    let final_job = wait_for_terminal(&h, &job.id).await;
    assert_eq!(final_job.status, JobStatus::Stopped);

    // the per-job bridge connection was closed on the way out
    for _ in 0..500 {
        if h.bridge.was_closed() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(h.bridge.was_closed());
    h.sentinel.shutdown().await;
}

#[tokio::test]
async fn deadline_expiry_fails_the_job() {
    let model = ScriptedModel::happy_path().with_delay(Duration::from_secs(1));
    let agent = AgentConfig {
        time_limit_ms: 100,
        ..Default::default()
    };
    let h = harness(model, agent).await;

    let job = h
        .sentinel
        .control()
        .create_job(JobType::UiExploration, exploration_config(&h), "alice")
        .await
        .unwrap();

    let done = wait_for_terminal(&h, &job.id).await;
    assert_eq!(done.status, JobStatus::Failed);
    let message = done.result.unwrap()["error"].as_str().unwrap().to_string();
    assert!(message.contains("deadline"), "message was: {message}");
    h.sentinel.shutdown().await;
}

#[tokio::test]
async fn stop_rejects_jobs_that_are_not_running() {
    let h = harness(ScriptedModel::happy_path(), AgentConfig::default()).await;

    let job = h
        .sentinel
        .control()
        .create_job(JobType::UiExploration, exploration_config(&h), "alice")
        .await
        .unwrap();
    let done = wait_for_terminal(&h, &job.id).await;
    assert_eq!(done.status, JobStatus::Success);

    // a succeeded job is never rewritten to stopped
    let err = h.sentinel.control().stop_job(&job.id).await.unwrap_err();
    assert!(matches!(err, ControlError::NotRunning { .. }));
    let still = h.sentinel.control().get_job(&job.id).await.unwrap();
    assert_eq!(still.status, JobStatus::Success);
    h.sentinel.shutdown().await;
}

#[tokio::test]
async fn malformed_config_fails_the_job() {
    let h = harness(ScriptedModel::happy_path(), AgentConfig::default()).await;

    let job = h
        .sentinel
        .control()
        .create_job(
            JobType::UiExploration,
            json!({"endpoint_id": "not-a-uuid"}),
            "alice",
        )
        .await
        .unwrap();

    let done = wait_for_terminal(&h, &job.id).await;
    assert_eq!(done.status, JobStatus::Failed);
    let message = done.result.unwrap()["error"].as_str().unwrap().to_string();
    assert!(message.contains("project_id") || message.contains("endpoint_id"));
    h.sentinel.shutdown().await;
}

#[tokio::test]
async fn unauthorised_creator_fails_the_job() {
    let h = harness(ScriptedModel::happy_path(), AgentConfig::default()).await;

    let job = h
        .sentinel
        .control()
        .create_job(JobType::UiExploration, exploration_config(&h), "mallory")
        .await
        .unwrap();

    let done = wait_for_terminal(&h, &job.id).await;
    assert_eq!(done.status, JobStatus::Failed);
    let message = done.result.unwrap()["error"].as_str().unwrap().to_string();
    assert!(message.contains("does not own"));

    // the failure was filed with the configured tracker
    use cartograph_trackers::IssueTracker;
    let issues = h.tracker.list_issues().await.unwrap();
    assert_eq!(issues.len(), 1);
    assert!(issues[0].title.contains(job.id.as_str()));
    h.sentinel.shutdown().await;
}

#[tokio::test]
async fn listing_reflects_created_jobs() {
    let h = harness(ScriptedModel::happy_path(), AgentConfig::default()).await;

    let job = h
        .sentinel
        .control()
        .create_job(JobType::UiExploration, exploration_config(&h), "alice")
        .await
        .unwrap();
    wait_for_terminal(&h, &job.id).await;

    let (jobs, total) = h.sentinel.control().list_jobs("alice", 10, 0).await.unwrap();
    assert_eq!(total, 1);
    assert_eq!(jobs[0].id, job.id);

    let stats = h.sentinel.control().stats().await.unwrap();
    assert_eq!(stats.success, 1);
    h.sentinel.shutdown().await;
}
