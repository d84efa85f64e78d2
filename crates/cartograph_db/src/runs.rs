//! Step notes and captured assets linked to a test-run identity.
//!
//! Blob references here are weak: the blob store owns the bytes, these rows
//! hold the path. Deleting a row never cascades to storage.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use cartograph_protocol::{AssetKind, JobId};

use crate::error::Result;
use crate::pool::DbPool;

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct StepNote {
    pub id: String,
    pub run_id: String,
    pub step_index: i64,
    pub note: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct RunAsset {
    pub id: String,
    pub run_id: String,
    pub kind: String,
    pub path: String,
    pub created_at: DateTime<Utc>,
}

/// Repository over `run_step_notes` and `run_assets`.
#[derive(Clone)]
pub struct RunStore {
    pool: DbPool,
}

impl RunStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn add_step_note(
        &self,
        run_id: &JobId,
        step_index: i64,
        note: &str,
    ) -> Result<StepNote> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO run_step_notes (id, run_id, step_index, note, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(run_id.as_str())
        .bind(step_index)
        .bind(note)
        .bind(now)
        .execute(&self.pool)
        .await?;

        let row = sqlx::query_as("SELECT * FROM run_step_notes WHERE id = ?")
            .bind(&id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row)
    }

    pub async fn list_step_notes(&self, run_id: &JobId) -> Result<Vec<StepNote>> {
        let rows = sqlx::query_as(
            "SELECT * FROM run_step_notes WHERE run_id = ? ORDER BY step_index ASC",
        )
        .bind(run_id.as_str())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn add_asset(&self, run_id: &JobId, kind: AssetKind, path: &str) -> Result<RunAsset> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO run_assets (id, run_id, kind, path, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(run_id.as_str())
        .bind(kind.as_str())
        .bind(path)
        .bind(now)
        .execute(&self.pool)
        .await?;

        let row = sqlx::query_as("SELECT * FROM run_assets WHERE id = ?")
            .bind(&id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row)
    }

    pub async fn list_assets(&self, run_id: &JobId) -> Result<Vec<RunAsset>> {
        let rows =
            sqlx::query_as("SELECT * FROM run_assets WHERE run_id = ? ORDER BY created_at ASC")
                .bind(run_id.as_str())
                .fetch_all(&self.pool)
                .await?;
        Ok(rows)
    }
}
