//! Projects and endpoints: the rows the controller resolves before running
//! an exploration job.

use chrono::{DateTime, Utc};
use sqlx::FromRow;

use cartograph_protocol::{Credential, EndpointId, ProjectId};

use crate::error::{DbError, Result};
use crate::pool::DbPool;

/// A project groups procedures and scopes authorisation.
#[derive(Debug, Clone, PartialEq)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    pub description: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An endpoint is a deployed application the explorer drives.
#[derive(Debug, Clone, PartialEq)]
pub struct Endpoint {
    pub id: EndpointId,
    pub project_id: ProjectId,
    pub name: String,
    pub base_url: String,
    pub credentials: Vec<Credential>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct ProjectRow {
    id: String,
    name: String,
    description: String,
    created_by: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct EndpointRow {
    id: String,
    project_id: String,
    name: String,
    base_url: String,
    credentials: String,
    created_by: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Repository over `projects` and `endpoints`.
#[derive(Clone)]
pub struct CatalogStore {
    pool: DbPool,
}

impl CatalogStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn create_project(
        &self,
        name: &str,
        description: &str,
        created_by: &str,
    ) -> Result<Project> {
        let id = ProjectId::new();
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO projects (id, name, description, created_by, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.as_str())
        .bind(name)
        .bind(description)
        .bind(created_by)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        self.get_project(&id).await
    }

    pub async fn get_project(&self, id: &ProjectId) -> Result<Project> {
        let row: Option<ProjectRow> = sqlx::query_as("SELECT * FROM projects WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Err(DbError::not_found(format!("project {}", id)));
        };
        Ok(Project {
            id: ProjectId::parse(&row.id).map_err(|e| DbError::invalid_state(e.to_string()))?,
            name: row.name,
            description: row.description,
            created_by: row.created_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }

    pub async fn create_endpoint(
        &self,
        project_id: &ProjectId,
        name: &str,
        base_url: &str,
        credentials: &[Credential],
        created_by: &str,
    ) -> Result<Endpoint> {
        let id = EndpointId::new();
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO endpoints
                (id, project_id, name, base_url, credentials, created_by, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.as_str())
        .bind(project_id.as_str())
        .bind(name)
        .bind(base_url)
        .bind(serde_json::to_string(credentials)?)
        .bind(created_by)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        self.get_endpoint(&id).await
    }

    pub async fn get_endpoint(&self, id: &EndpointId) -> Result<Endpoint> {
        let row: Option<EndpointRow> = sqlx::query_as("SELECT * FROM endpoints WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Err(DbError::not_found(format!("endpoint {}", id)));
        };
        Ok(Endpoint {
            id: EndpointId::parse(&row.id).map_err(|e| DbError::invalid_state(e.to_string()))?,
            project_id: ProjectId::parse(&row.project_id)
                .map_err(|e| DbError::invalid_state(e.to_string()))?,
            name: row.name,
            base_url: row.base_url,
            credentials: serde_json::from_str(&row.credentials)?,
            created_by: row.created_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
