//! Explorer stage: a bounded tool-use loop against the language model.
//!
//! Each turn the model proposes one tool invocation; the bridge executes
//! it; the observation is appended to the transcript the next turn sees.
//! The loop ends when the model signals done, the iteration cap is hit,
//! the deadline expires, or the job is cancelled.

use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use cartograph_protocol::paths::run_asset_path;
use cartograph_protocol::{AssetKind, ExplorationPlan, ExplorationResult, Interaction, JobId};
use cartograph_storage::BlobStore;

use crate::bridge::BrowserBridge;
use crate::error::{PipelineError, Result};
use crate::llm::{extract_json, LanguageModel};
use crate::pipeline::{guarded, Budget};

const EXPLORE_PROMPT: &str = "\
You are exploring a web application through browser tools, following this
plan:

Strategy: {strategy}
Target: {target_url}
Areas of interest: {page_areas}

Transcript of what has happened so far:
{transcript}

Propose exactly one next step as a single JSON object, either
{\"tool\": \"navigate|click|type|wait|screenshot\", \"args\": {...}}
or, when the plan is sufficiently covered,
{\"done\": true, \"summary\": \"<what was explored>\"}";

/// Cap on page state carried into the next prompt; bridges can return
/// full DOM dumps that would swamp the context otherwise.
const MAX_OBSERVATION_CHARS: usize = 2_000;

enum Directive {
    Invoke { tool: String, args: Value },
    Done { summary: String },
}

pub struct Explorer {
    llm: Arc<dyn LanguageModel>,
    bridge: Arc<dyn BrowserBridge>,
    blobs: Arc<dyn BlobStore>,
}

impl Explorer {
    pub fn new(
        llm: Arc<dyn LanguageModel>,
        bridge: Arc<dyn BrowserBridge>,
        blobs: Arc<dyn BlobStore>,
    ) -> Self {
        Self { llm, bridge, blobs }
    }

    /// Drive the tool-use loop. Performs at most `budget.max_iterations`
    /// tool invocations.
    pub async fn explore(
        &self,
        job_id: &JobId,
        plan: &ExplorationPlan,
        cancel: &CancellationToken,
        budget: &Budget,
    ) -> Result<ExplorationResult> {
        let mut transcript: Vec<String> = Vec::new();
        let mut result = ExplorationResult::default();

        for iteration in 0..budget.max_iterations {
            let transcript_text = if transcript.is_empty() {
                "(nothing yet)".to_string()
            } else {
                transcript.join("\n")
            };
            let prompt = EXPLORE_PROMPT
                .replace("{strategy}", &plan.strategy)
                .replace("{target_url}", &plan.target_url)
                .replace("{page_areas}", &plan.page_areas.join(", "))
                .replace("{transcript}", &transcript_text);

            let reply = guarded(cancel, budget, self.llm.generate(&prompt)).await?;
            match parse_directive(&reply)? {
                Directive::Done { summary } => {
                    result.summary = summary;
                    return Ok(result);
                }
                Directive::Invoke { tool, args } => {
                    debug!(job_id = %job_id, iteration, tool = %tool, "Tool invocation");
                    let outcome =
                        guarded(cancel, budget, self.bridge.invoke(&tool, &args)).await?;

                    let mut artifact_path = None;
                    if let Some(image) = outcome.screenshot {
                        let path =
                            run_asset_path(job_id, AssetKind::Screenshot, &image.filename);
                        guarded(cancel, budget, self.blobs.upload(&path, &image.bytes))
                            .await?;
                        artifact_path = Some(path);
                    }

                    let target = invocation_target(&args);
                    transcript.push(observation_line(&tool, &target, outcome.page_state));
                    result.interactions.push(Interaction {
                        action: tool,
                        target,
                        artifact_path,
                    });
                }
            }
        }

        result.summary = format!(
            "exploration stopped at the {}-iteration cap",
            budget.max_iterations
        );
        Ok(result)
    }
}

fn parse_directive(reply: &str) -> Result<Directive> {
    let value = extract_json(reply).ok_or_else(|| {
        PipelineError::Internal("explorer reply contained no tool directive".into())
    })?;

    if value.get("done").and_then(Value::as_bool) == Some(true) {
        let summary = value
            .get("summary")
            .and_then(Value::as_str)
            .unwrap_or("exploration complete")
            .to_string();
        return Ok(Directive::Done { summary });
    }

    let tool = value
        .get("tool")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            PipelineError::Internal("explorer directive is missing a tool name".into())
        })?
        .to_string();
    let args = value.get("args").cloned().unwrap_or(Value::Null);
    Ok(Directive::Invoke { tool, args })
}

fn invocation_target(args: &Value) -> String {
    for key in ["selector", "url", "value"] {
        if let Some(target) = args.get(key).and_then(Value::as_str) {
            return target.to_string();
        }
    }
    String::new()
}

fn observation_line(tool: &str, target: &str, page_state: Option<String>) -> String {
    match page_state {
        Some(state) => {
            // char-wise, not byte-wise: snapshots carry multi-byte text and
            // a byte truncation could split a codepoint
            let mut kept: String = state.chars().take(MAX_OBSERVATION_CHARS).collect();
            if kept.len() < state.len() {
                kept.push_str("...");
            }
            format!("{tool} {target} -> {kept}")
        }
        None => format!("{tool} {target} -> ok"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_observations_are_capped_with_a_marker() {
        let state = "x".repeat(MAX_OBSERVATION_CHARS + 10);
        let line = observation_line("click", "#go", Some(state));
        assert!(line.ends_with("..."));
        assert!(line.chars().count() < MAX_OBSERVATION_CHARS + 32);
    }

    #[test]
    fn multi_byte_snapshots_truncate_on_char_boundaries() {
        // every char is 3 bytes, so byte 2000 would land mid-codepoint
        let state = "語".repeat(MAX_OBSERVATION_CHARS + 5);
        let line = observation_line("navigate", "https://例.example", Some(state));
        assert!(line.ends_with("..."));
        assert_eq!(
            line.chars().filter(|c| *c == '語').count(),
            MAX_OBSERVATION_CHARS
        );
    }

    #[test]
    fn short_observations_pass_through_unmarked() {
        let line = observation_line("type", "#user", Some("<html/>".to_string()));
        assert_eq!(line, "type #user -> <html/>");
    }
}
