//! Planner stage: target URL in, exploration plan out.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use cartograph_protocol::{Credential, ExplorationPlan};

use crate::error::{PipelineError, Result};
use crate::llm::{extract_json, LanguageModel};
use crate::pipeline::{guarded, Budget};

const PLAN_PROMPT: &str = "\
You are planning an autonomous exploration of a web application so its key
user flows can be documented as test procedures.

Target URL: {target_url}
Available accounts: {accounts}

Reply with a single JSON object:
{
  \"strategy\": \"<one-paragraph exploration strategy>\",
  \"page_areas\": [\"<page or area label>\", ...],
  \"planned_actions\": [\"<high-level action>\", ...]
}";

pub struct Planner {
    llm: Arc<dyn LanguageModel>,
}

impl Planner {
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self { llm }
    }

    /// Produce a plan. Deterministic with respect to the model reply; a
    /// reply without a usable JSON object is a terminal plan failure.
    pub async fn plan(
        &self,
        target_url: &str,
        credentials: &[Credential],
        cancel: &CancellationToken,
        budget: &Budget,
    ) -> Result<ExplorationPlan> {
        let accounts = if credentials.is_empty() {
            "none".to_string()
        } else {
            credentials
                .iter()
                .map(|c| c.username.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        };
        let prompt = PLAN_PROMPT
            .replace("{target_url}", target_url)
            .replace("{accounts}", &accounts);

        let reply = guarded(cancel, budget, self.llm.generate(&prompt)).await?;
        let value = extract_json(&reply)
            .ok_or_else(|| PipelineError::Plan("model reply contained no JSON plan".into()))?;

        let strategy = value
            .get("strategy")
            .and_then(|v| v.as_str())
            .ok_or_else(|| PipelineError::Plan("plan is missing a strategy".into()))?
            .to_string();
        let page_areas = string_list(&value, "page_areas");
        let planned_actions = string_list(&value, "planned_actions");

        Ok(ExplorationPlan {
            target_url: target_url.to_string(),
            strategy,
            page_areas,
            planned_actions,
            credentials: credentials.to_vec(),
        })
    }
}

fn string_list(value: &serde_json::Value, key: &str) -> Vec<String> {
    value
        .get(key)
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}
