//! Schema bootstrap (DDL).

use cartograph_protocol::JobStatus;

use crate::error::Result;
use crate::pool::DbPool;

/// Create every table and index if absent.
///
/// The CHECK constraint on `jobs.status` is generated from the canonical
/// enum so the database and the code cannot drift.
pub async fn init_schema(pool: &DbPool) -> Result<()> {
    let status_values = JobStatus::ALL
        .iter()
        .map(|status| format!("'{}'", status.as_str()))
        .collect::<Vec<_>>()
        .join(",");

    let ddl = format!(
        r#"
        CREATE TABLE IF NOT EXISTS projects (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            created_by TEXT NOT NULL,
            created_at TIMESTAMP NOT NULL,
            updated_at TIMESTAMP NOT NULL
        );

        CREATE TABLE IF NOT EXISTS endpoints (
            id TEXT PRIMARY KEY,
            project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            base_url TEXT NOT NULL,
            credentials TEXT NOT NULL DEFAULT '[]',
            created_by TEXT NOT NULL,
            created_at TIMESTAMP NOT NULL,
            updated_at TIMESTAMP NOT NULL
        );

        CREATE TABLE IF NOT EXISTS jobs (
            id TEXT PRIMARY KEY,
            job_type TEXT NOT NULL,
            status TEXT NOT NULL CHECK (status IN ({status_values})),
            config TEXT NOT NULL DEFAULT '{{}}',
            result TEXT,
            start_time TIMESTAMP,
            end_time TIMESTAMP,
            duration_ms INTEGER,
            created_by TEXT NOT NULL,
            created_at TIMESTAMP NOT NULL,
            updated_at TIMESTAMP NOT NULL
        );
        CREATE INDEX IF NOT EXISTS ix_jobs_status_created ON jobs(status, created_at);
        CREATE INDEX IF NOT EXISTS ix_jobs_creator ON jobs(created_by, created_at DESC);

        CREATE TABLE IF NOT EXISTS procedures (
            id TEXT PRIMARY KEY,
            project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            steps TEXT NOT NULL DEFAULT '[]',
            created_by TEXT NOT NULL,
            version INTEGER NOT NULL,
            is_latest INTEGER NOT NULL DEFAULT 0,
            parent_id TEXT REFERENCES procedures(id) ON DELETE CASCADE,
            created_at TIMESTAMP NOT NULL,
            updated_at TIMESTAMP NOT NULL
        );
        CREATE INDEX IF NOT EXISTS ix_procedures_project_latest
            ON procedures(project_id, is_latest);
        CREATE INDEX IF NOT EXISTS ix_procedures_chain ON procedures(parent_id, version);
        CREATE UNIQUE INDEX IF NOT EXISTS ux_procedures_chain_version
            ON procedures(COALESCE(parent_id, id), version);

        CREATE TABLE IF NOT EXISTS run_step_notes (
            id TEXT PRIMARY KEY,
            run_id TEXT NOT NULL,
            step_index INTEGER NOT NULL,
            note TEXT NOT NULL,
            created_at TIMESTAMP NOT NULL
        );
        CREATE INDEX IF NOT EXISTS ix_run_step_notes_run ON run_step_notes(run_id, step_index);

        CREATE TABLE IF NOT EXISTS run_assets (
            id TEXT PRIMARY KEY,
            run_id TEXT NOT NULL,
            kind TEXT NOT NULL,
            path TEXT NOT NULL,
            created_at TIMESTAMP NOT NULL
        );
        CREATE INDEX IF NOT EXISTS ix_run_assets_run ON run_assets(run_id);
        "#,
        status_values = status_values,
    );

    let mut conn = pool.acquire().await?;
    for statement in ddl.split(';') {
        let statement = statement.trim();
        if statement.is_empty() {
            continue;
        }
        sqlx::query(statement).execute(&mut *conn).await?;
    }
    Ok(())
}
