//! Language model contract: single-shot text completion.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("{message}")]
pub struct LlmError {
    message: String,
}

impl LlmError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Single-shot completion: prompt in, text out.
///
/// Timeouts and retries belong to the provider; the pipeline only wraps
/// calls in its own deadline and cancellation guards.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, LlmError>;
}

/// Pull the first JSON object out of a model reply.
///
/// Providers wrap JSON in prose or code fences often enough that parsing
/// the raw reply first and then the widest `{...}` slice is the practical
/// order.
pub fn extract_json(text: &str) -> Option<serde_json::Value> {
    if let Ok(value) = serde_json::from_str(text.trim()) {
        return Some(value);
    }
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_bare_json() {
        let v = extract_json(r#"{"done": true}"#).unwrap();
        assert_eq!(v["done"], true);
    }

    #[test]
    fn extracts_fenced_json() {
        let text = "Here is the plan:\n```json\n{\"strategy\": \"breadth first\"}\n```\nGood luck!";
        let v = extract_json(text).unwrap();
        assert_eq!(v["strategy"], "breadth first");
    }

    #[test]
    fn no_object_yields_none() {
        assert!(extract_json("no json here").is_none());
    }
}
