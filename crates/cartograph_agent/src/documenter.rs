//! Documenter stage: exploration result in, procedure out.

use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use cartograph_protocol::{ExplorationPlan, ExplorationResult};

use crate::error::{PipelineError, Result};
use crate::llm::{extract_json, LanguageModel};
use crate::pipeline::{guarded, Budget};

const DOCUMENT_PROMPT: &str = "\
An autonomous exploration of {target_url} just finished.

Summary: {summary}
Interactions, in order:
{interactions}

Write it up as a repeatable test procedure. Reply with a single JSON object:
{
  \"name\": \"<short procedure name>\",
  \"description\": \"<what the procedure verifies>\",
  \"steps\": [
    {\"action\": \"navigate|click|type|wait|assert_text|screenshot\", ...}
  ]
}
Each step object carries the keys its action needs: navigate takes url;
click takes selector; type takes selector and value; assert_text takes
selector and value; screenshot takes value (a filename); wait takes an
optional timeout.";

/// The documenter's output, pending validation and persistence.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentedProcedure {
    pub name: String,
    pub description: String,
    pub steps: Vec<Value>,
}

pub struct Documenter {
    llm: Arc<dyn LanguageModel>,
}

impl Documenter {
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self { llm }
    }

    pub async fn document(
        &self,
        plan: &ExplorationPlan,
        result: &ExplorationResult,
        cancel: &CancellationToken,
        budget: &Budget,
    ) -> Result<DocumentedProcedure> {
        let interactions = if result.interactions.is_empty() {
            "(none)".to_string()
        } else {
            result
                .interactions
                .iter()
                .map(|i| format!("- {} {}", i.action, i.target))
                .collect::<Vec<_>>()
                .join("\n")
        };
        let prompt = DOCUMENT_PROMPT
            .replace("{target_url}", &plan.target_url)
            .replace("{summary}", &result.summary)
            .replace("{interactions}", &interactions);

        let reply = guarded(cancel, budget, self.llm.generate(&prompt)).await?;
        let value = extract_json(&reply).ok_or_else(|| {
            PipelineError::Document("model reply contained no procedure JSON".into())
        })?;

        let name = value
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| PipelineError::Document("procedure is missing a name".into()))?
            .to_string();
        let description = value
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let steps = value
            .get("steps")
            .and_then(Value::as_array)
            .cloned()
            .ok_or_else(|| PipelineError::Document("procedure is missing steps".into()))?;

        Ok(DocumentedProcedure {
            name,
            description,
            steps,
        })
    }
}
