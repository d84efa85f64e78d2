//! Pipeline error kinds.
//!
//! The controller maps these onto terminal job outcomes: `Cancelled`
//! becomes `stopped`, everything else becomes `failed` with the message in
//! the job result.

use thiserror::Error;

use cartograph_security::ValidationError;
use cartograph_storage::StorageError;

use crate::bridge::BridgeError;
use crate::llm::LlmError;

/// Pipeline result type.
pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("plan generation failed: {0}")]
    Plan(String),

    #[error("documentation failed: {0}")]
    Document(String),

    #[error("language model error: {0}")]
    Llm(#[from] LlmError),

    #[error("bridge error: {0}")]
    Bridge(#[from] BridgeError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("deadline exceeded after {0}")]
    DeadlineExceeded(String),

    #[error("cancelled")]
    Cancelled,

    #[error("internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// Whether the failure came from an external stop rather than a fault.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, PipelineError::Cancelled)
    }
}
