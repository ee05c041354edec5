//! Decision Engine - chooses which tools to run for a query
//!
//! Provides:
//! - Tool selection by a language model over the tool catalog
//! - Strict parsing of the model output into typed, validated ToolCalls
//! - A deterministic default when nothing is selected
//! - A deterministic fallback when the model call fails

use crate::context::{
    render_history, ConfidenceLevel, ConversationTurn, ImageInput, UserContext,
    VectorSearchReference,
};
use crate::errors::DecisionError;
use crate::tools::{RagArgs, ToolArguments, ToolCall, ToolCatalog, ToolType};
use queryforge_common::config::DecisionSettings;
use queryforge_common::metrics::{self, PhaseTimer};
use queryforge_common::{AppError, GenerateRequest, LlmClient};
use regex_lite::Regex;
use serde::Deserialize;
use std::sync::{Arc, OnceLock};
use tracing::{info, instrument, warn};

/// Reasoning attached to the default `answer_directly` call
pub const NO_TOOLS_REASONING: &str = "no tools selected — default fallback";

/// Characters of each reference chunk shown to the model
const CHUNK_PREVIEW_CHARS: usize = 200;

/// How the tool list was produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecisionOutcome {
    /// The model selected at least one tool
    Selected,
    /// The model selected nothing; a direct answer was substituted
    DefaultedToDirect,
    /// The model call failed; the RAG fallback was substituted
    FailedOver { cause: String },
}

/// Output of one decision
#[derive(Debug, Clone)]
pub struct Decision {
    /// Never empty
    pub tool_calls: Vec<ToolCall>,
    pub outcome: DecisionOutcome,
}

impl Decision {
    pub fn is_failure_fallback(&self) -> bool {
        matches!(self.outcome, DecisionOutcome::FailedOver { .. })
    }
}

#[derive(Debug, Deserialize)]
struct RawDecision {
    #[serde(alias = "tools")]
    tool_calls: Vec<RawToolCall>,
}

#[derive(Debug, Deserialize)]
struct RawToolCall {
    #[serde(alias = "name")]
    tool: String,
    #[serde(default)]
    arguments: serde_json::Value,
    #[serde(default)]
    reasoning: String,
}

/// LLM-backed tool selection
pub struct DecisionEngine {
    llm: Arc<dyn LlmClient>,
    catalog: Arc<ToolCatalog>,
    settings: DecisionSettings,
}

impl DecisionEngine {
    pub fn new(llm: Arc<dyn LlmClient>, catalog: Arc<ToolCatalog>, settings: DecisionSettings) -> Self {
        Self {
            llm,
            catalog,
            settings,
        }
    }

    /// Decide which tools to run. Always returns at least one ToolCall.
    #[instrument(skip_all, fields(chunks = vector_reference.chunk_contents.len(), has_image = image.is_some()))]
    pub async fn decide(
        &self,
        query: &str,
        vector_reference: &VectorSearchReference,
        user_context: &UserContext,
        history: &[ConversationTurn],
        image: Option<&ImageInput>,
    ) -> Decision {
        let timer = PhaseTimer::start();

        let decision = match self
            .request_tool_calls(query, vector_reference, user_context, history, image)
            .await
        {
            Ok(tool_calls) if tool_calls.is_empty() => {
                info!("Decision model selected no tools, answering directly");
                Decision {
                    tool_calls: vec![ToolCall::new(
                        ToolArguments::empty(ToolType::AnswerDirectly),
                        NO_TOOLS_REASONING,
                    )],
                    outcome: DecisionOutcome::DefaultedToDirect,
                }
            }
            Ok(tool_calls) => Decision {
                tool_calls,
                outcome: DecisionOutcome::Selected,
            },
            Err(err) => {
                warn!(error = %err, kind = err.kind(), "Decision failed, using RAG fallback");
                self.failure_fallback(query, vector_reference, &err)
            }
        };

        let fallback_reason = match &decision.outcome {
            DecisionOutcome::Selected => None,
            DecisionOutcome::DefaultedToDirect => Some("no_tools_selected"),
            DecisionOutcome::FailedOver { .. } => Some("decision_failed"),
        };
        metrics::record_decision(timer.elapsed_secs(), fallback_reason);

        info!(
            tools = ?decision.tool_calls.iter().map(|c| c.tool_type.as_str()).collect::<Vec<_>>(),
            latency_ms = timer.elapsed_ms(),
            "Tools decided"
        );
        decision
    }

    async fn request_tool_calls(
        &self,
        query: &str,
        vector_reference: &VectorSearchReference,
        user_context: &UserContext,
        history: &[ConversationTurn],
        image: Option<&ImageInput>,
    ) -> Result<Vec<ToolCall>, DecisionError> {
        let request = GenerateRequest::new(self.build_prompt(
            query,
            vector_reference,
            user_context,
            history,
            image,
        ))
        .with_system_prompt(self.system_prompt())
        .with_temperature(self.settings.temperature)
        .with_max_tokens(self.settings.max_tokens)
        .json();

        let timeout = self.settings.timeout();
        let raw = match tokio::time::timeout(timeout, self.llm.generate(request)).await {
            Err(_) => {
                return Err(DecisionError::Timeout {
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
            Ok(Err(AppError::LlmTimeout { timeout_ms })) => {
                return Err(DecisionError::Timeout { timeout_ms })
            }
            Ok(result) => result?,
        };

        parse_tool_calls(&raw)
    }

    /// The single RAG call used when the decision itself failed
    fn failure_fallback(
        &self,
        query: &str,
        vector_reference: &VectorSearchReference,
        error: &DecisionError,
    ) -> Decision {
        let arguments = ToolArguments::UseRagContext(RagArgs {
            query: Some(query.to_string()),
            chunk_contents: Some(vector_reference.top(self.settings.fallback_chunk_count)),
            top_k: None,
            confidence_cap: Some(ConfidenceLevel::Low),
        });
        let cause = error.to_string();
        let call = ToolCall::new(
            arguments,
            format!("decision fallback to internal knowledge: {}", cause),
        );

        Decision {
            tool_calls: vec![call],
            outcome: DecisionOutcome::FailedOver { cause },
        }
    }

    fn system_prompt(&self) -> String {
        format!(
            r#"You are the tool router of a university student assistant. Choose the tools needed to answer the user's latest message.

Rules:
- The vector search reference is evidence, not a rule. A high score does not force use_rag_context and a low score does not rule out answer_directly.
- When the best matching reference chunk is a form or template and the user asks for a document, prefer fill_form.
- You may choose several tools when they complement each other, e.g. use_rag_context with search_web when internal information may be outdated.
- Choose analyze_image only when an image is attached.
- Use only tool names listed below.

{catalog}
Respond with a single JSON object and nothing else:
{{"tool_calls": [{{"tool": "<tool name>", "arguments": {{}}, "reasoning": "<one sentence>"}}]}}"#,
            catalog = self.catalog.render_for_prompt()
        )
    }

    fn build_prompt(
        &self,
        query: &str,
        vector_reference: &VectorSearchReference,
        user_context: &UserContext,
        history: &[ConversationTurn],
        image: Option<&ImageInput>,
    ) -> String {
        let mut prompt = String::new();

        let profile = user_context.describe();
        if !profile.is_empty() {
            prompt.push_str(&format!("User profile:\n{}\n\n", profile));
        }

        let skip = history.len().saturating_sub(self.settings.history_turns);
        if skip < history.len() {
            prompt.push_str(&format!(
                "Recent conversation:\n{}\n\n",
                render_history(&history[skip..])
            ));
        }

        if vector_reference.is_empty() {
            prompt.push_str("Vector search reference: no matching internal documents.\n\n");
        } else {
            prompt.push_str(&format!(
                "Vector search reference (advisory): max_score={:.2}\n",
                vector_reference.max_score
            ));
            for (i, chunk) in vector_reference.chunk_contents.iter().enumerate() {
                let preview: String = chunk.content.chars().take(CHUNK_PREVIEW_CHARS).collect();
                prompt.push_str(&format!(
                    "{}. [{}] {}: {}\n",
                    i + 1,
                    chunk.score.map(|s| format!("{:.2}", s)).unwrap_or_else(|| "-".into()),
                    chunk.title,
                    preview
                ));
            }
            prompt.push('\n');
        }

        if let Some(image) = image {
            prompt.push_str(&format!(
                "Attached image: {} ({} bytes)\n\n",
                image.format,
                image.bytes.len()
            ));
        }

        prompt.push_str(&format!("User message: {}", query));
        prompt
    }
}

fn fence_pattern() -> Option<&'static Regex> {
    static FENCE: OnceLock<Option<Regex>> = OnceLock::new();
    FENCE
        .get_or_init(|| Regex::new(r"(?s)```(?:json)?\s*(.*?)```").ok())
        .as_ref()
}

/// Locate the JSON object in a model response, tolerating code fences and prose
fn extract_json(raw: &str) -> Option<&str> {
    let body = fence_pattern()
        .and_then(|re| re.captures(raw))
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or(raw);

    let start = body.find('{')?;
    let end = body.rfind('}')?;
    (end > start).then(|| &body[start..=end])
}

/// Parse the decision model output; any bad entry rejects the whole response
pub(crate) fn parse_tool_calls(raw: &str) -> Result<Vec<ToolCall>, DecisionError> {
    let json = extract_json(raw).ok_or_else(|| DecisionError::Malformed {
        reason: "no JSON object in response".to_string(),
    })?;

    let decision: RawDecision = serde_json::from_str(json).map_err(|e| DecisionError::Malformed {
        reason: e.to_string(),
    })?;

    decision
        .tool_calls
        .into_iter()
        .map(|raw_call| {
            let tool: ToolType = raw_call
                .tool
                .parse()
                .map_err(|_| DecisionError::UnknownTool {
                    name: raw_call.tool.clone(),
                })?;

            let arguments = ToolArguments::from_json(tool, raw_call.arguments).map_err(|e| {
                DecisionError::InvalidArguments {
                    tool,
                    reason: e.to_string(),
                }
            })?;
            arguments
                .validate()
                .map_err(|e| DecisionError::InvalidArguments {
                    tool,
                    reason: e.to_string(),
                })?;

            Ok(ToolCall::new(arguments, raw_call.reasoning))
        })
        .collect()
}
