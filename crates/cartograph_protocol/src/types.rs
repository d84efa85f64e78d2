//! Core payload types: jobs, steps, and the transient exploration DTOs.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Version number reserved for the mutable draft row of a procedure chain.
pub const DRAFT_VERSION: i64 = 0;

// ============================================================================
// Jobs
// ============================================================================

/// Kind of work a job performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum JobType {
    /// Autonomous browser exploration that produces a test procedure.
    UiExploration,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::UiExploration => "ui_exploration",
        }
    }

    pub fn parse(value: &str) -> Result<Self, StepParseError> {
        match value {
            "ui_exploration" => Ok(JobType::UiExploration),
            other => Err(StepParseError::new(format!("unknown job type: {other}"))),
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Job lifecycle state.
///
/// Transitions form a strict DAG: `created -> running -> {success, failed,
/// stopped}`. The repository is the only mutator and enforces the DAG.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Created,
    Running,
    Success,
    Failed,
    Stopped,
}

impl JobStatus {
    pub const ALL: [JobStatus; 5] = [
        JobStatus::Created,
        JobStatus::Running,
        JobStatus::Success,
        JobStatus::Failed,
        JobStatus::Stopped,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Created => "created",
            JobStatus::Running => "running",
            JobStatus::Success => "success",
            JobStatus::Failed => "failed",
            JobStatus::Stopped => "stopped",
        }
    }

    pub fn parse(value: &str) -> Result<Self, StepParseError> {
        match value {
            "created" => Ok(JobStatus::Created),
            "running" => Ok(JobStatus::Running),
            "success" => Ok(JobStatus::Success),
            "failed" => Ok(JobStatus::Failed),
            "stopped" => Ok(JobStatus::Stopped),
            other => Err(StepParseError::new(format!("unknown job status: {other}"))),
        }
    }

    /// Terminal states are sinks: no further transition is valid.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Success | JobStatus::Failed | JobStatus::Stopped
        )
    }

    /// Whether the DAG permits moving from `self` to `next`.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        match (self, next) {
            (JobStatus::Created, JobStatus::Running) => true,
            (JobStatus::Running, JobStatus::Success)
            | (JobStatus::Running, JobStatus::Failed)
            | (JobStatus::Running, JobStatus::Stopped) => true,
            _ => false,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Steps
// ============================================================================

/// Error raised when a step or enum value cannot be interpreted.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct StepParseError {
    message: String,
}

impl StepParseError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Timeout accepted as either a JSON number or a numeric string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TimeoutValue {
    Millis(f64),
    Text(String),
}

impl TimeoutValue {
    /// Numeric value, if the payload is a number or parses as one.
    pub fn as_millis(&self) -> Option<f64> {
        match self {
            TimeoutValue::Millis(n) => Some(*n),
            TimeoutValue::Text(s) => s.trim().parse().ok(),
        }
    }
}

/// One step of a test procedure, discriminated by its `action` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    Navigate {
        url: String,
    },
    Click {
        selector: String,
    },
    Type {
        selector: String,
        value: String,
    },
    Wait {
        #[serde(skip_serializing_if = "Option::is_none")]
        timeout: Option<TimeoutValue>,
    },
    AssertText {
        selector: String,
        value: String,
    },
    Screenshot {
        /// Filename for the captured image.
        value: String,
    },
}

impl Step {
    /// The closed set of recognised action discriminants.
    pub const ACTIONS: [&'static str; 6] = [
        "navigate",
        "click",
        "type",
        "wait",
        "assert_text",
        "screenshot",
    ];

    pub fn action(&self) -> &'static str {
        match self {
            Step::Navigate { .. } => "navigate",
            Step::Click { .. } => "click",
            Step::Type { .. } => "type",
            Step::Wait { .. } => "wait",
            Step::AssertText { .. } => "assert_text",
            Step::Screenshot { .. } => "screenshot",
        }
    }
}

// ============================================================================
// Exploration DTOs (never persisted)
// ============================================================================

/// A credential the explorer may use when driving the target application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    pub username: String,
    pub password: String,
}

/// Output of the planner stage; input to the explorer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplorationPlan {
    pub target_url: String,
    pub strategy: String,
    #[serde(default)]
    pub page_areas: Vec<String>,
    #[serde(default)]
    pub planned_actions: Vec<String>,
    #[serde(default)]
    pub credentials: Vec<Credential>,
}

/// A single tool invocation the explorer performed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    pub action: String,
    pub target: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_path: Option<String>,
}

/// Output of the explorer stage; input to the documenter.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExplorationResult {
    pub interactions: Vec<Interaction>,
    pub summary: String,
}

// ============================================================================
// Prompt / asset selectors
// ============================================================================

/// Framework the generated script targets; selects a fixed instruction block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetFramework {
    Playwright,
    Selenium,
}

impl TargetFramework {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetFramework::Playwright => "playwright",
            TargetFramework::Selenium => "selenium",
        }
    }
}

/// Kind of artefact captured during a run; part of the blob path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    Screenshot,
    DomSnapshot,
}

impl AssetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetKind::Screenshot => "screenshots",
            AssetKind::DomSnapshot => "dom",
        }
    }
}
