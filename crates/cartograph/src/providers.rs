//! Offline collaborators for local development.
//!
//! `serve` runs with these unless a deployment wires real providers into
//! the sentinel: the model replays a deterministic minimal exploration and
//! the bridge fabricates observations without a browser. Jobs run end to
//! end, so the queue, budgets, stop handling and persistence can all be
//! exercised on a laptop.

use async_trait::async_trait;
use serde_json::{json, Value};

use cartograph_agent::{
    BridgeError, BrowserBridge, CapturedImage, LanguageModel, LlmError, ToolOutcome,
};

/// Deterministic model: answers each pipeline stage from its prompt shape.
pub struct DryRunModel;

#[async_trait]
impl LanguageModel for DryRunModel {
    async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        if prompt.contains("You are planning an autonomous exploration") {
            return Ok(json!({
                "strategy": "open the landing page and capture it",
                "page_areas": ["landing"],
                "planned_actions": ["navigate to the target", "take a screenshot"]
            })
            .to_string());
        }
        if prompt.contains("Propose exactly one next step") {
            // one navigate, one screenshot, then done; the transcript in
            // the prompt tells us which turn this is
            if prompt.contains("(nothing yet)") {
                return Ok(json!({"tool": "navigate", "args": {"url": "about:blank"}}).to_string());
            }
            if !prompt.contains("landing.png") {
                return Ok(
                    json!({"tool": "screenshot", "args": {"value": "landing.png"}}).to_string(),
                );
            }
            return Ok(json!({"done": true, "summary": "captured the landing page"}).to_string());
        }
        if prompt.contains("repeatable test procedure") {
            return Ok(json!({
                "name": "Landing page smoke",
                "description": "Opens the target and captures the landing page",
                "steps": [
                    {"action": "navigate", "url": "about:blank"},
                    {"action": "screenshot", "value": "landing.png"}
                ]
            })
            .to_string());
        }
        Err(LlmError::new("dry-run model received an unknown prompt"))
    }
}

/// Bridge that fabricates observations without touching a browser.
pub struct DryRunBridge;

#[async_trait]
impl BrowserBridge for DryRunBridge {
    async fn connect(&self) -> Result<(), BridgeError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), BridgeError> {
        Ok(())
    }

    async fn invoke(&self, tool: &str, args: &Value) -> Result<ToolOutcome, BridgeError> {
        let screenshot = (tool == "screenshot").then(|| CapturedImage {
            filename: args
                .get("value")
                .and_then(Value::as_str)
                .unwrap_or("capture.png")
                .to_string(),
            bytes: Vec::new(),
        });
        Ok(ToolOutcome {
            page_state: Some(format!("<html data-tool=\"{tool}\"/>")),
            screenshot,
        })
    }
}
