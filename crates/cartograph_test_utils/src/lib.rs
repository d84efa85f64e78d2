//! Test infrastructure shared across Cartograph crates.
//!
//! Scripted collaborators (language model, browser bridge) and in-memory
//! database helpers so pipeline and controller tests run hermetically.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use cartograph_agent::{
    BridgeError, BrowserBridge, CapturedImage, LanguageModel, LlmError, ToolOutcome,
};
use cartograph_db::{init_schema, CatalogStore, DbConfig, DbPool};
use cartograph_protocol::Credential;

/// Language model that replays a fixed list of replies.
pub struct ScriptedModel {
    replies: Mutex<VecDeque<String>>,
    /// Artificial latency per call, for deadline tests.
    delay: Duration,
}

impl ScriptedModel {
    pub fn new(replies: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Replies for a happy-path run: plan, a few tool calls, done, document.
    pub fn happy_path() -> Self {
        Self::new([
            json!({
                "strategy": "log in, then walk the primary navigation",
                "page_areas": ["login", "dashboard"],
                "planned_actions": ["open the app", "sign in", "capture the dashboard"]
            })
            .to_string(),
            json!({"tool": "navigate", "args": {"url": "https://app.example.com"}}).to_string(),
            json!({"tool": "type", "args": {"selector": "#user", "value": "alice"}}).to_string(),
            json!({"tool": "screenshot", "args": {"value": "dashboard.png"}}).to_string(),
            json!({"done": true, "summary": "covered login and dashboard"}).to_string(),
            json!({
                "name": "Login and dashboard",
                "description": "Signs in and verifies the dashboard renders",
                "steps": [
                    {"action": "navigate", "url": "https://app.example.com"},
                    {"action": "type", "selector": "#user", "value": "alice"},
                    {"action": "screenshot", "value": "dashboard.png"}
                ]
            })
            .to_string(),
        ])
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn generate(&self, _prompt: &str) -> Result<String, LlmError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let next = self.replies.lock().expect("scripted replies").pop_front();
        next.ok_or_else(|| LlmError::new("scripted model ran out of replies"))
    }
}

/// Bridge that records invocations and fabricates observations.
#[derive(Default)]
pub struct RecordingBridge {
    invocations: Mutex<Vec<(String, Value)>>,
    connected: Mutex<bool>,
    closed: Mutex<bool>,
    /// Artificial latency per invocation, for deadline tests.
    delay: Duration,
}

impl RecordingBridge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn invocations(&self) -> Vec<(String, Value)> {
        self.invocations.lock().expect("invocations").clone()
    }

    pub fn was_closed(&self) -> bool {
        *self.closed.lock().expect("closed flag")
    }
}

#[async_trait]
impl BrowserBridge for RecordingBridge {
    async fn connect(&self) -> Result<(), BridgeError> {
        *self.connected.lock().expect("connected flag") = true;
        Ok(())
    }

    async fn close(&self) -> Result<(), BridgeError> {
        *self.closed.lock().expect("closed flag") = true;
        Ok(())
    }

    async fn invoke(&self, tool: &str, args: &Value) -> Result<ToolOutcome, BridgeError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.invocations
            .lock()
            .expect("invocations")
            .push((tool.to_string(), args.clone()));

        let screenshot = (tool == "screenshot").then(|| CapturedImage {
            filename: args
                .get("value")
                .and_then(Value::as_str)
                .unwrap_or("capture.png")
                .to_string(),
            bytes: b"png".to_vec(),
        });
        Ok(ToolOutcome {
            page_state: Some(format!("<html data-after=\"{tool}\"/>")),
            screenshot,
        })
    }
}

/// Fresh in-memory database with the schema applied.
pub async fn memory_pool() -> DbPool {
    let pool = DbConfig::sqlite_memory()
        .connect()
        .await
        .expect("in-memory pool");
    init_schema(&pool).await.expect("schema");
    pool
}

/// Seed a project and endpoint owned by `user`; returns their ids.
pub async fn seed_catalog(
    pool: &DbPool,
    user: &str,
) -> (cartograph_protocol::ProjectId, cartograph_protocol::EndpointId) {
    let catalog = CatalogStore::new(pool.clone());
    let project = catalog
        .create_project("QA", "exploration fixtures", user)
        .await
        .expect("project");
    let endpoint = catalog
        .create_endpoint(
            &project.id,
            "staging",
            "https://app.example.com",
            &[Credential {
                username: "alice".into(),
                password: "secret".into(),
            }],
            user,
        )
        .await
        .expect("endpoint");
    (project.id, endpoint.id)
}
