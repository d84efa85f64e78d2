//! Versioned procedure chains with a draft/commit model.
//!
//! A chain is the set of rows sharing one root: the root is version 1
//! (`parent_id` null), later versions and the version-0 draft point at it.
//! Committed rows are immutable; all edits land on the draft until
//! [`ProcedureStore::commit_draft`] promotes it under a single transaction.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::FromRow;
use tracing::info;

use cartograph_protocol::{ProcedureId, ProjectId, DRAFT_VERSION};

use crate::error::{DbError, Result};
use crate::pool::DbPool;

/// A procedure row in domain form.
#[derive(Debug, Clone, PartialEq)]
pub struct Procedure {
    pub id: ProcedureId,
    pub project_id: ProjectId,
    pub name: String,
    pub description: String,
    /// Ordered step objects; order is significant and preserved.
    pub steps: Vec<Value>,
    pub created_by: String,
    pub version: i64,
    pub is_latest: bool,
    pub parent_id: Option<ProcedureId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Procedure {
    /// Identity of the chain root (version 1).
    pub fn root_id(&self) -> &ProcedureId {
        self.parent_id.as_ref().unwrap_or(&self.id)
    }
}

/// Fields for creating a chain (version 1 plus its draft).
#[derive(Debug, Clone)]
pub struct NewProcedure {
    pub project_id: ProjectId,
    pub name: String,
    pub description: String,
    pub steps: Vec<Value>,
    pub created_by: String,
}

/// Partial update applied to the draft row only.
#[derive(Debug, Clone, Default)]
pub struct DraftUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub steps: Option<Vec<Value>>,
}

/// Field-level difference between the draft and the latest committed row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DraftDiff {
    pub name_changed: bool,
    pub description_changed: bool,
    pub steps_changed: bool,
}

impl DraftDiff {
    /// True when the draft matches the committed head exactly.
    pub fn is_clean(&self) -> bool {
        !(self.name_changed || self.description_changed || self.steps_changed)
    }
}

#[derive(Debug, FromRow)]
struct ProcedureRow {
    id: String,
    project_id: String,
    name: String,
    description: String,
    steps: String,
    created_by: String,
    version: i64,
    is_latest: bool,
    parent_id: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ProcedureRow {
    fn into_procedure(self) -> Result<Procedure> {
        Ok(Procedure {
            id: ProcedureId::parse(&self.id)
                .map_err(|e| DbError::invalid_state(e.to_string()))?,
            project_id: ProjectId::parse(&self.project_id)
                .map_err(|e| DbError::invalid_state(e.to_string()))?,
            name: self.name,
            description: self.description,
            steps: serde_json::from_str(&self.steps)?,
            created_by: self.created_by,
            version: self.version,
            is_latest: self.is_latest,
            parent_id: self
                .parent_id
                .as_deref()
                .map(ProcedureId::parse)
                .transpose()
                .map_err(|e| DbError::invalid_state(e.to_string()))?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Repository over the `procedures` table.
#[derive(Clone)]
pub struct ProcedureStore {
    pool: DbPool,
}

impl ProcedureStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Create a new chain: version 1 (`is_latest`, no parent) and its
    /// version-0 draft seeded from the same fields, in one transaction.
    pub async fn create(&self, new: NewProcedure) -> Result<Procedure> {
        let root_id = ProcedureId::new();
        let draft_id = ProcedureId::new();
        let now = Utc::now();
        let steps_json = serde_json::to_string(&new.steps)?;

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO procedures
                (id, project_id, name, description, steps, created_by,
                 version, is_latest, parent_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, 1, 1, NULL, ?, ?)
            "#,
        )
        .bind(root_id.as_str())
        .bind(new.project_id.as_str())
        .bind(&new.name)
        .bind(&new.description)
        .bind(&steps_json)
        .bind(&new.created_by)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO procedures
                (id, project_id, name, description, steps, created_by,
                 version, is_latest, parent_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, 0, 0, ?, ?, ?)
            "#,
        )
        .bind(draft_id.as_str())
        .bind(new.project_id.as_str())
        .bind(&new.name)
        .bind(&new.description)
        .bind(&steps_json)
        .bind(&new.created_by)
        .bind(root_id.as_str())
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        info!(procedure_id = %root_id, "Procedure chain created");
        self.get(&root_id).await
    }

    /// Point read of any row by its identity.
    pub async fn get(&self, id: &ProcedureId) -> Result<Procedure> {
        let row: Option<ProcedureRow> = sqlx::query_as("SELECT * FROM procedures WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => row.into_procedure(),
            None => Err(DbError::not_found(format!("procedure {}", id))),
        }
    }

    /// The committed head of the chain containing `id`.
    pub async fn get_latest_committed(&self, id: &ProcedureId) -> Result<Procedure> {
        let root = self.resolve_root(id).await?;
        let row: Option<ProcedureRow> = sqlx::query_as(
            r#"
            SELECT * FROM procedures
            WHERE (id = ? OR parent_id = ?) AND version >= 1 AND is_latest = 1
            "#,
        )
        .bind(root.as_str())
        .bind(root.as_str())
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => row.into_procedure(),
            None => Err(DbError::NoCommittedVersion(id.to_string())),
        }
    }

    /// The version-0 draft of the chain containing `id`.
    pub async fn get_draft(&self, id: &ProcedureId) -> Result<Procedure> {
        let root = self.resolve_root(id).await?;
        let row: Option<ProcedureRow> = sqlx::query_as(
            "SELECT * FROM procedures WHERE parent_id = ? AND version = ?",
        )
        .bind(root.as_str())
        .bind(DRAFT_VERSION)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => row.into_procedure(),
            None => Err(DbError::DraftNotFound(id.to_string())),
        }
    }

    /// Partial update restricted to the draft row. The version guard in the
    /// UPDATE keeps committed rows untouchable even if a caller passes a
    /// committed row's identity.
    pub async fn update_draft(&self, id: &ProcedureId, update: DraftUpdate) -> Result<Procedure> {
        let draft = self.get_draft(id).await?;

        let name = update.name.unwrap_or(draft.name);
        let description = update.description.unwrap_or(draft.description);
        let steps = update.steps.unwrap_or(draft.steps);
        let now = Utc::now();

        sqlx::query(
            r#"
            UPDATE procedures
            SET name = ?, description = ?, steps = ?, updated_at = ?
            WHERE id = ? AND version = 0
            "#,
        )
        .bind(&name)
        .bind(&description)
        .bind(serde_json::to_string(&steps)?)
        .bind(now)
        .bind(draft.id.as_str())
        .execute(&self.pool)
        .await?;

        self.get_draft(id).await
    }

    /// Copy the latest committed fields back into the draft, creating the
    /// draft row if it is missing. Requires a committed version.
    pub async fn reset_draft(&self, id: &ProcedureId) -> Result<Procedure> {
        let latest = self.get_latest_committed(id).await?;
        let root = latest.root_id().clone();
        let steps_json = serde_json::to_string(&latest.steps)?;
        let now = Utc::now();

        let rows_affected = sqlx::query(
            r#"
            UPDATE procedures
            SET name = ?, description = ?, steps = ?, updated_at = ?
            WHERE parent_id = ? AND version = 0
            "#,
        )
        .bind(&latest.name)
        .bind(&latest.description)
        .bind(&steps_json)
        .bind(now)
        .bind(root.as_str())
        .execute(&self.pool)
        .await?
        .rows_affected();

        if rows_affected == 0 {
            sqlx::query(
                r#"
                INSERT INTO procedures
                    (id, project_id, name, description, steps, created_by,
                     version, is_latest, parent_id, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, 0, 0, ?, ?, ?)
                "#,
            )
            .bind(ProcedureId::new().as_str())
            .bind(latest.project_id.as_str())
            .bind(&latest.name)
            .bind(&latest.description)
            .bind(&steps_json)
            .bind(&latest.created_by)
            .bind(root.as_str())
            .bind(now)
            .bind(now)
            .execute(&self.pool)
            .await?;
        }

        self.get_draft(id).await
    }

    /// Promote the draft into a new committed version.
    ///
    /// One transaction: clear `is_latest` on the head (this write also
    /// serialises concurrent commits on the chain), read `max(version)`,
    /// insert `max + 1` from the draft's fields with `parent_id = root`.
    pub async fn commit_draft(&self, id: &ProcedureId) -> Result<Procedure> {
        let mut tx = self.pool.begin().await?;

        let root = self.resolve_root_tx(&mut tx, id).await?;
        let draft: Option<ProcedureRow> = sqlx::query_as(
            "SELECT * FROM procedures WHERE parent_id = ? AND version = ?",
        )
        .bind(root.as_str())
        .bind(DRAFT_VERSION)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(draft) = draft else {
            return Err(DbError::DraftNotFound(id.to_string()));
        };
        let draft = draft.into_procedure()?;

        let new = self
            .insert_next_version(&mut tx, &root, &draft)
            .await?;
        tx.commit().await?;

        info!(procedure_id = %root, version = new.version, "Draft committed");
        Ok(new)
    }

    /// Legacy promotion that sources fields from an arbitrary row in the
    /// chain instead of the draft. Same transactional discipline.
    pub async fn create_version(&self, original_id: &ProcedureId) -> Result<Procedure> {
        let mut tx = self.pool.begin().await?;

        let original: Option<ProcedureRow> =
            sqlx::query_as("SELECT * FROM procedures WHERE id = ?")
                .bind(original_id.as_str())
                .fetch_optional(&mut *tx)
                .await?;
        let Some(original) = original else {
            return Err(DbError::not_found(format!("procedure {}", original_id)));
        };
        let original = original.into_procedure()?;
        let root = original.root_id().clone();

        let new = self
            .insert_next_version(&mut tx, &root, &original)
            .await?;
        tx.commit().await?;

        info!(procedure_id = %root, version = new.version, "Version created");
        Ok(new)
    }

    /// Compare the draft against the latest committed version.
    pub async fn diff_draft(&self, id: &ProcedureId) -> Result<DraftDiff> {
        let draft = self.get_draft(id).await?;
        let latest = self.get_latest_committed(id).await?;
        Ok(DraftDiff {
            name_changed: draft.name != latest.name,
            description_changed: draft.description != latest.description,
            steps_changed: draft.steps != latest.steps,
        })
    }

    /// Every row in the chain (root, descendants, draft), version descending.
    pub async fn get_version_history(&self, id: &ProcedureId) -> Result<Vec<Procedure>> {
        let root = self.resolve_root(id).await?;
        let rows: Vec<ProcedureRow> = sqlx::query_as(
            r#"
            SELECT * FROM procedures
            WHERE id = ? OR parent_id = ?
            ORDER BY version DESC
            "#,
        )
        .bind(root.as_str())
        .bind(root.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(ProcedureRow::into_procedure).collect()
    }

    /// Committed heads in a project, newest first.
    pub async fn list_by_project(
        &self,
        project_id: &ProjectId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Procedure>> {
        let rows: Vec<ProcedureRow> = sqlx::query_as(
            r#"
            SELECT * FROM procedures
            WHERE project_id = ? AND is_latest = 1
            ORDER BY updated_at DESC, id DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(project_id.as_str())
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(ProcedureRow::into_procedure).collect()
    }

    pub async fn count_by_project(&self, project_id: &ProjectId) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM procedures WHERE project_id = ? AND is_latest = 1",
        )
        .bind(project_id.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn resolve_root(&self, id: &ProcedureId) -> Result<ProcedureId> {
        let parent: Option<Option<String>> =
            sqlx::query_scalar("SELECT parent_id FROM procedures WHERE id = ?")
                .bind(id.as_str())
                .fetch_optional(&self.pool)
                .await?;
        match parent {
            None => Err(DbError::not_found(format!("procedure {}", id))),
            Some(None) => Ok(id.clone()),
            Some(Some(root)) => {
                ProcedureId::parse(&root).map_err(|e| DbError::invalid_state(e.to_string()))
            }
        }
    }

    async fn resolve_root_tx(
        &self,
        tx: &mut sqlx::Transaction<'_, crate::pool::Db>,
        id: &ProcedureId,
    ) -> Result<ProcedureId> {
        let parent: Option<Option<String>> =
            sqlx::query_scalar("SELECT parent_id FROM procedures WHERE id = ?")
                .bind(id.as_str())
                .fetch_optional(&mut **tx)
                .await?;
        match parent {
            None => Err(DbError::not_found(format!("procedure {}", id))),
            Some(None) => Ok(id.clone()),
            Some(Some(root)) => {
                ProcedureId::parse(&root).map_err(|e| DbError::invalid_state(e.to_string()))
            }
        }
    }

    /// Shared tail of `commit_draft`/`create_version`: demote the head,
    /// compute `max + 1`, insert the new committed row from `source` fields.
    async fn insert_next_version(
        &self,
        tx: &mut sqlx::Transaction<'_, crate::pool::Db>,
        root: &ProcedureId,
        source: &Procedure,
    ) -> Result<Procedure> {
        sqlx::query(
            r#"
            UPDATE procedures
            SET is_latest = 0
            WHERE (id = ? OR parent_id = ?) AND version >= 1 AND is_latest = 1
            "#,
        )
        .bind(root.as_str())
        .bind(root.as_str())
        .execute(&mut **tx)
        .await?;

        let max_version: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT MAX(version) FROM procedures
            WHERE (id = ? OR parent_id = ?) AND version >= 1
            "#,
        )
        .bind(root.as_str())
        .bind(root.as_str())
        .fetch_one(&mut **tx)
        .await?;
        let new_version = max_version.unwrap_or(0) + 1;

        let new_id = ProcedureId::new();
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO procedures
                (id, project_id, name, description, steps, created_by,
                 version, is_latest, parent_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, 1, ?, ?, ?)
            "#,
        )
        .bind(new_id.as_str())
        .bind(source.project_id.as_str())
        .bind(&source.name)
        .bind(&source.description)
        .bind(serde_json::to_string(&source.steps)?)
        .bind(&source.created_by)
        .bind(new_version)
        .bind(root.as_str())
        .bind(now)
        .bind(now)
        .execute(&mut **tx)
        .await?;

        let row: ProcedureRow = sqlx::query_as("SELECT * FROM procedures WHERE id = ?")
            .bind(new_id.as_str())
            .fetch_one(&mut **tx)
            .await?;
        row.into_procedure()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::DbConfig;
    use crate::schema::init_schema;
    use serde_json::json;

    async fn setup() -> (ProcedureStore, ProjectId) {
        let pool = DbConfig::sqlite_memory().connect().await.unwrap();
        init_schema(&pool).await.unwrap();
        let project = ProjectId::new();
        sqlx::query(
            "INSERT INTO projects (id, name, created_by, created_at, updated_at) VALUES (?, 'QA', 'alice', ?, ?)",
        )
        .bind(project.as_str())
        .bind(Utc::now())
        .bind(Utc::now())
        .execute(&pool)
        .await
        .unwrap();
        (ProcedureStore::new(pool), project)
    }

    fn login_procedure(project: &ProjectId) -> NewProcedure {
        NewProcedure {
            project_id: project.clone(),
            name: "Login flow".into(),
            description: "Sign in with valid credentials".into(),
            steps: vec![
                json!({"action": "navigate", "url": "https://app.example.com"}),
                json!({"action": "type", "selector": "#user", "value": "alice"}),
                json!({"action": "click", "selector": "#submit"}),
            ],
            created_by: "alice".into(),
        }
    }

    #[tokio::test]
    async fn create_seeds_version_one_and_draft() {
        let (store, project) = setup().await;
        let root = store.create(login_procedure(&project)).await.unwrap();
        assert_eq!(root.version, 1);
        assert!(root.is_latest);
        assert!(root.parent_id.is_none());

        let draft = store.get_draft(&root.id).await.unwrap();
        assert_eq!(draft.version, 0);
        assert_eq!(draft.parent_id.as_ref(), Some(&root.id));
        assert_eq!(draft.steps, root.steps);
    }

    #[tokio::test]
    async fn update_draft_never_touches_committed_rows() {
        let (store, project) = setup().await;
        let root = store.create(login_procedure(&project)).await.unwrap();

        let update = DraftUpdate {
            name: Some("Login flow v2".into()),
            ..Default::default()
        };
        let draft = store.update_draft(&root.id, update).await.unwrap();
        assert_eq!(draft.name, "Login flow v2");

        let committed = store.get_latest_committed(&root.id).await.unwrap();
        assert_eq!(committed.name, "Login flow");
        assert_eq!(committed.version, 1);
    }

    #[tokio::test]
    async fn commit_draft_promotes_and_flips_latest() {
        let (store, project) = setup().await;
        let root = store.create(login_procedure(&project)).await.unwrap();
        store
            .update_draft(
                &root.id,
                DraftUpdate {
                    description: Some("Now with MFA".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let v2 = store.commit_draft(&root.id).await.unwrap();
        assert_eq!(v2.version, 2);
        assert!(v2.is_latest);
        assert_eq!(v2.parent_id.as_ref(), Some(&root.id));
        assert_eq!(v2.description, "Now with MFA");

        let history = store.get_version_history(&root.id).await.unwrap();
        let latest: Vec<_> = history
            .iter()
            .filter(|p| p.version >= 1 && p.is_latest)
            .collect();
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].version, 2);
    }

    #[tokio::test]
    async fn versions_stay_contiguous() {
        let (store, project) = setup().await;
        let root = store.create(login_procedure(&project)).await.unwrap();
        for _ in 0..3 {
            store.commit_draft(&root.id).await.unwrap();
        }

        let history = store.get_version_history(&root.id).await.unwrap();
        let mut versions: Vec<i64> = history
            .iter()
            .filter(|p| p.version >= 1)
            .map(|p| p.version)
            .collect();
        versions.sort_unstable();
        assert_eq!(versions, vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn reset_draft_restores_latest_committed_fields() {
        let (store, project) = setup().await;
        let root = store.create(login_procedure(&project)).await.unwrap();
        store
            .update_draft(
                &root.id,
                DraftUpdate {
                    name: Some("Scratch".into()),
                    steps: Some(vec![json!({"action": "wait"})]),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        store.reset_draft(&root.id).await.unwrap();
        let draft = store.get_draft(&root.id).await.unwrap();
        let latest = store.get_latest_committed(&root.id).await.unwrap();
        assert_eq!(draft.name, latest.name);
        assert_eq!(draft.description, latest.description);
        assert_eq!(draft.steps, latest.steps);
    }

    #[tokio::test]
    async fn diff_tracks_draft_edits_and_resets() {
        let (store, project) = setup().await;
        let root = store.create(login_procedure(&project)).await.unwrap();
        assert!(store.diff_draft(&root.id).await.unwrap().is_clean());

        store
            .update_draft(
                &root.id,
                DraftUpdate {
                    name: Some("Login flow (wip)".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let diff = store.diff_draft(&root.id).await.unwrap();
        assert!(diff.name_changed);
        assert!(!diff.steps_changed);

        store.reset_draft(&root.id).await.unwrap();
        assert!(store.diff_draft(&root.id).await.unwrap().is_clean());
    }

    #[tokio::test]
    async fn history_is_version_descending_with_draft_last() {
        let (store, project) = setup().await;
        let root = store.create(login_procedure(&project)).await.unwrap();
        store.commit_draft(&root.id).await.unwrap();

        let history = store.get_version_history(&root.id).await.unwrap();
        let versions: Vec<i64> = history.iter().map(|p| p.version).collect();
        assert_eq!(versions, vec![2, 1, 0]);
    }

    #[tokio::test]
    async fn create_version_sources_from_arbitrary_row() {
        let (store, project) = setup().await;
        let root = store.create(login_procedure(&project)).await.unwrap();
        store
            .update_draft(
                &root.id,
                DraftUpdate {
                    name: Some("Changed in draft".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        store.commit_draft(&root.id).await.unwrap();

        // Re-promote the original v1 fields, ignoring the draft.
        let v3 = store.create_version(&root.id).await.unwrap();
        assert_eq!(v3.version, 3);
        assert_eq!(v3.name, "Login flow");
        assert!(v3.is_latest);
    }

    #[tokio::test]
    async fn listing_returns_only_committed_heads() {
        let (store, project) = setup().await;
        let a = store.create(login_procedure(&project)).await.unwrap();
        store.commit_draft(&a.id).await.unwrap();
        store.create(login_procedure(&project)).await.unwrap();

        assert_eq!(store.count_by_project(&project).await.unwrap(), 2);
        let heads = store.list_by_project(&project, 10, 0).await.unwrap();
        assert_eq!(heads.len(), 2);
        assert!(heads.iter().all(|p| p.is_latest && p.version >= 1));
    }

    #[tokio::test]
    async fn steps_round_trip_exactly() {
        let (store, project) = setup().await;
        let steps = vec![
            json!({"action": "navigate", "url": "https://app.example.com"}),
            json!({"action": "wait", "timeout": 1500}),
            json!({"action": "wait", "timeout": "2500"}),
            json!({"action": "screenshot", "value": "after-login.png"}),
        ];
        let mut new = login_procedure(&project);
        new.steps = steps.clone();
        let root = store.create(new).await.unwrap();

        let read = store.get(&root.id).await.unwrap();
        assert_eq!(read.steps, steps);
    }

    #[tokio::test]
    async fn missing_chain_reports_not_found() {
        let (store, _) = setup().await;
        let ghost = ProcedureId::new();
        assert!(matches!(
            store.get_draft(&ghost).await,
            Err(DbError::NotFound(_))
        ));
    }
}
