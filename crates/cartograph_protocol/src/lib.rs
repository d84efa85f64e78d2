//! Shared payload types and configuration for Cartograph.
//!
//! Everything that crosses a crate boundary lives here: typed identifiers,
//! the job and procedure wire shapes, step programs, the transient
//! exploration plan/result DTOs, and system configuration.

pub mod config;
pub mod defaults;
pub mod ids;
pub mod paths;
pub mod types;

pub use config::{AgentConfig, StorageConfig, SystemConfig, ValidationLimits};
pub use ids::{EndpointId, IdParseError, JobId, ProcedureId, ProjectId, RunId};
pub use types::{
    AssetKind, Credential, ExplorationPlan, ExplorationResult, Interaction, JobStatus, JobType,
    Step, StepParseError, TargetFramework, TimeoutValue, DRAFT_VERSION,
};
