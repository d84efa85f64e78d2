//! Uniform issue-tracker capability.
//!
//! Every provider exposes the same five operations; errors are tagged with
//! the provider's name, and a missing issue is a distinct kind so callers
//! can branch on it. Provider dispatch happens once, at construction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Tracker operation result type.
pub type Result<T> = std::result::Result<T, TrackerError>;

/// Provider-tagged tracker errors.
#[derive(Debug, Error)]
pub enum TrackerError {
    /// The issue id resolves to nothing; distinct from transport failures.
    #[error("[{provider}] issue not found: {id}")]
    IssueNotFound { provider: &'static str, id: String },

    #[error("[{provider}] connection check failed: {message}")]
    ConnectionFailed {
        provider: &'static str,
        message: String,
    },

    #[error("[{provider}] provider error: {message}")]
    Provider {
        provider: &'static str,
        message: String,
    },

    #[error("Tracker provider {0} not compiled in")]
    NotCompiled(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueStatus {
    Open,
    Resolved,
}

/// An issue as the core sees it, independent of provider shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub id: String,
    pub title: String,
    pub body: String,
    pub status: IssueStatus,
    pub created_at: DateTime<Utc>,
}

/// Fields for opening a new issue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewIssue {
    pub title: String,
    pub body: String,
}

/// The capability set every provider implements.
#[async_trait]
pub trait IssueTracker: Send + Sync {
    /// Provider tag used in errors and logs.
    fn provider(&self) -> &'static str;

    async fn create_issue(&self, issue: NewIssue) -> Result<Issue>;
    async fn get_issue(&self, id: &str) -> Result<Issue>;
    async fn list_issues(&self) -> Result<Vec<Issue>>;
    async fn resolve_issue(&self, id: &str) -> Result<Issue>;
    async fn validate_connection(&self) -> Result<()>;
}

/// Provider selection; resolved once at construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "snake_case")]
pub enum TrackerConfig {
    /// Process-local tracker for development and tests.
    InMemory,
}

/// Construct the configured provider.
pub fn connect(config: &TrackerConfig) -> Result<Box<dyn IssueTracker>> {
    match config {
        TrackerConfig::InMemory => Ok(Box::new(InMemoryTracker::default())),
    }
}

/// Process-local tracker backed by a map.
#[derive(Default)]
pub struct InMemoryTracker {
    issues: Mutex<HashMap<String, Issue>>,
}

const IN_MEMORY: &str = "in_memory";

#[async_trait]
impl IssueTracker for InMemoryTracker {
    fn provider(&self) -> &'static str {
        IN_MEMORY
    }

    async fn create_issue(&self, issue: NewIssue) -> Result<Issue> {
        let created = Issue {
            id: Uuid::new_v4().to_string(),
            title: issue.title,
            body: issue.body,
            status: IssueStatus::Open,
            created_at: Utc::now(),
        };
        self.issues
            .lock()
            .await
            .insert(created.id.clone(), created.clone());
        Ok(created)
    }

    async fn get_issue(&self, id: &str) -> Result<Issue> {
        self.issues
            .lock()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| TrackerError::IssueNotFound {
                provider: IN_MEMORY,
                id: id.to_string(),
            })
    }

    async fn list_issues(&self) -> Result<Vec<Issue>> {
        let issues = self.issues.lock().await;
        let mut all: Vec<Issue> = issues.values().cloned().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(all)
    }

    async fn resolve_issue(&self, id: &str) -> Result<Issue> {
        let mut issues = self.issues.lock().await;
        let issue = issues
            .get_mut(id)
            .ok_or_else(|| TrackerError::IssueNotFound {
                provider: IN_MEMORY,
                id: id.to_string(),
            })?;
        issue.status = IssueStatus::Resolved;
        Ok(issue.clone())
    }

    async fn validate_connection(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_get_resolve_cycle() {
        let tracker = connect(&TrackerConfig::InMemory).unwrap();
        tracker.validate_connection().await.unwrap();

        let issue = tracker
            .create_issue(NewIssue {
                title: "Login regression".into(),
                body: "Submit button dead on staging".into(),
            })
            .await
            .unwrap();
        assert_eq!(issue.status, IssueStatus::Open);

        let resolved = tracker.resolve_issue(&issue.id).await.unwrap();
        assert_eq!(resolved.status, IssueStatus::Resolved);

        let listed = tracker.list_issues().await.unwrap();
        assert_eq!(listed.len(), 1);
    }

    #[tokio::test]
    async fn missing_issue_is_a_distinct_error() {
        let tracker = connect(&TrackerConfig::InMemory).unwrap();
        let err = tracker.get_issue("ghost").await.unwrap_err();
        assert!(matches!(err, TrackerError::IssueNotFound { .. }));
        assert!(err.to_string().contains("in_memory"));
    }
}
