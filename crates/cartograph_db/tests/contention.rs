//! Contention behaviour of the claim queue and the commit path.
//!
//! These run against a file-backed database so concurrent tasks go through
//! real transactions rather than a shared in-memory handle.

use serde_json::json;

use cartograph_db::{
    init_schema, DbConfig, DbPool, JobStore, NewJob, NewProcedure, ProcedureStore,
};
use cartograph_protocol::{JobType, ProjectId};

async fn file_pool(dir: &tempfile::TempDir) -> DbPool {
    let path = dir.path().join("state.sqlite");
    let mut config = DbConfig::sqlite(path.to_string_lossy());
    // Serialise writers on one connection; the repositories' conditional
    // updates do the correctness work, this keeps sqlite from reporting
    // busy snapshots under test parallelism.
    config.max_connections = 1;
    let pool = config.connect().await.unwrap();
    init_schema(&pool).await.unwrap();
    pool
}

async fn seed_project(pool: &DbPool) -> ProjectId {
    let id = ProjectId::new();
    sqlx::query(
        "INSERT INTO projects (id, name, created_by, created_at, updated_at) VALUES (?, 'QA', 'alice', ?, ?)",
    )
    .bind(id.as_str())
    .bind(chrono::Utc::now())
    .bind(chrono::Utc::now())
    .execute(pool)
    .await
    .unwrap();
    id
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn one_job_two_claimers_exactly_one_winner() {
    let dir = tempfile::tempdir().unwrap();
    let pool = file_pool(&dir).await;
    let store = JobStore::new(pool);

    store
        .create(NewJob::new(
            JobType::UiExploration,
            json!({"endpoint_id": "e", "project_id": "p"}),
            "alice",
        ))
        .await
        .unwrap();

    let a = {
        let store = store.clone();
        tokio::spawn(async move { store.claim_next_created().await.unwrap() })
    };
    let b = {
        let store = store.clone();
        tokio::spawn(async move { store.claim_next_created().await.unwrap() })
    };

    let (a, b) = (a.await.unwrap(), b.await.unwrap());
    let winners = [&a, &b].iter().filter(|r| r.is_some()).count();
    assert_eq!(winners, 1, "exactly one claimer wins the created job");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn many_claimers_drain_fifo_without_duplicates() {
    let dir = tempfile::tempdir().unwrap();
    let pool = file_pool(&dir).await;
    let store = JobStore::new(pool);

    let mut created = Vec::new();
    for _ in 0..6 {
        let job = store
            .create(NewJob::new(
                JobType::UiExploration,
                json!({"endpoint_id": "e", "project_id": "p"}),
                "alice",
            ))
            .await
            .unwrap();
        created.push(job.id);
    }

    let mut tasks = Vec::new();
    for _ in 0..3 {
        let store = store.clone();
        tasks.push(tokio::spawn(async move {
            let mut mine = Vec::new();
            while let Some(job) = store.claim_next_created().await.unwrap() {
                mine.push(job.id);
            }
            mine
        }));
    }

    let mut claimed = Vec::new();
    for task in tasks {
        claimed.extend(task.await.unwrap());
    }
    claimed.sort_by(|a, b| a.as_str().cmp(b.as_str()));
    let mut expected: Vec<_> = created.clone();
    expected.sort_by(|a, b| a.as_str().cmp(b.as_str()));
    assert_eq!(claimed, expected, "every job claimed exactly once");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn contended_commits_serialise_into_consecutive_versions() {
    let dir = tempfile::tempdir().unwrap();
    let pool = file_pool(&dir).await;
    let project = seed_project(&pool).await;
    let store = ProcedureStore::new(pool);

    let root = store
        .create(NewProcedure {
            project_id: project,
            name: "Checkout".into(),
            description: "Full checkout flow".into(),
            steps: vec![json!({"action": "click", "selector": "#buy"})],
            created_by: "alice".into(),
        })
        .await
        .unwrap();

    let a = {
        let store = store.clone();
        let id = root.id.clone();
        tokio::spawn(async move { store.commit_draft(&id).await.unwrap() })
    };
    let b = {
        let store = store.clone();
        let id = root.id.clone();
        tokio::spawn(async move { store.commit_draft(&id).await.unwrap() })
    };

    let (a, b) = (a.await.unwrap(), b.await.unwrap());
    let mut versions = vec![a.version, b.version];
    versions.sort_unstable();
    assert_eq!(versions, vec![2, 3], "both commits succeed, serialised");

    let history = store.get_version_history(&root.id).await.unwrap();
    let latest: Vec<_> = history
        .iter()
        .filter(|p| p.version >= 1 && p.is_latest)
        .collect();
    assert_eq!(latest.len(), 1, "exactly one committed head");
    assert_eq!(latest[0].version, 3);
}
