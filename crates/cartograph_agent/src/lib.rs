//! The Cartograph exploration agent.
//!
//! Three stages — Plan, Explore, Document — run under a per-job deadline
//! and iteration budget, against collaborator contracts for the language
//! model, the browser bridge, and blob storage. The prompt builder for
//! LLM script generation also lives here; it is pure and never calls the
//! model itself.

pub mod bridge;
pub mod documenter;
pub mod error;
pub mod explorer;
pub mod llm;
pub mod pipeline;
pub mod planner;
pub mod prompt;

pub use bridge::{BridgeError, BrowserBridge, CapturedImage, ToolOutcome};
pub use documenter::{DocumentedProcedure, Documenter};
pub use error::{PipelineError, Result};
pub use explorer::Explorer;
pub use llm::{LanguageModel, LlmError};
pub use pipeline::{Budget, ExplorationPipeline, PipelineOutput};
pub use planner::Planner;
pub use prompt::{build_script_prompt, ScriptSource};
