//! Browser-automation bridge contract.
//!
//! The bridge owns the browser session: connect once per job, invoke named
//! tools sequentially, close on every exit path. Capability is
//! provider-defined; the tool names here are the ones the explorer emits.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

pub const TOOL_NAVIGATE: &str = "navigate";
pub const TOOL_CLICK: &str = "click";
pub const TOOL_TYPE: &str = "type";
pub const TOOL_WAIT: &str = "wait";
pub const TOOL_SCREENSHOT: &str = "screenshot";

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("bridge connection failed: {0}")]
    Connect(String),

    #[error("tool {tool} failed: {message}")]
    Invoke { tool: String, message: String },

    #[error("bridge closed")]
    Closed,
}

/// Image captured by a tool invocation, to be persisted by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedImage {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// Observation returned by one tool invocation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolOutcome {
    /// Serialised page state (DOM snapshot) after the invocation.
    pub page_state: Option<String>,
    /// Screenshot captured by the invocation, if any.
    pub screenshot: Option<CapturedImage>,
}

#[async_trait]
pub trait BrowserBridge: Send + Sync {
    async fn connect(&self) -> Result<(), BridgeError>;
    async fn close(&self) -> Result<(), BridgeError>;
    async fn invoke(&self, tool: &str, args: &Value) -> Result<ToolOutcome, BridgeError>;
}
