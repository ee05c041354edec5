//! Retrieval-augmented answering over the injected chunks

use super::{mismatch, required_query};
use crate::context::{ChunkContent, ConfidenceLevel};
use crate::errors::ToolError;
use crate::executor::{ExecutionContext, ToolHandler};
use crate::locale;
use crate::tools::{RagOutput, ToolArguments, ToolResult, ToolType};
use async_trait::async_trait;
use queryforge_common::config::RagSettings;
use queryforge_common::{GenerateRequest, LlmClient};
use std::sync::Arc;

/// Marker the model is told to emit when the chunks do not answer the question
const INSUFFICIENT_MARKER: &str = "[INSUFFICIENT_CONTEXT]";

pub struct RagHandler {
    llm: Arc<dyn LlmClient>,
    settings: RagSettings,
}

impl RagHandler {
    pub fn new(llm: Arc<dyn LlmClient>, settings: RagSettings) -> Self {
        Self { llm, settings }
    }

    /// Numbered context block, cut at `max_context_chars`
    fn build_context(&self, chunks: &[ChunkContent]) -> String {
        let mut context = String::new();
        for (i, chunk) in chunks.iter().enumerate() {
            let entry = format!("[{}] {}\n{}\n\n", i + 1, chunk.title, chunk.content);
            let remaining = self.settings.max_context_chars.saturating_sub(context.chars().count());
            if remaining == 0 {
                break;
            }
            context.extend(entry.chars().take(remaining));
        }
        context
    }

    fn score_confidence(&self, chunks: &[ChunkContent], insufficient: bool) -> ConfidenceLevel {
        let best = chunks
            .iter()
            .filter_map(|c| c.score)
            .fold(0.0_f32, f32::max);

        if !insufficient && best >= self.settings.high_confidence_score {
            ConfidenceLevel::High
        } else {
            ConfidenceLevel::Medium
        }
    }
}

#[async_trait]
impl ToolHandler for RagHandler {
    fn tool_type(&self) -> ToolType {
        ToolType::UseRagContext
    }

    async fn execute(
        &self,
        arguments: &ToolArguments,
        context: &ExecutionContext,
    ) -> Result<ToolResult, ToolError> {
        let ToolArguments::UseRagContext(args) = arguments else {
            return Err(mismatch(self.tool_type(), arguments));
        };
        let query = required_query(self.tool_type(), args.query.as_deref())?;

        let mut chunks = args.chunk_contents.clone().unwrap_or_default();
        if let Some(top_k) = args.top_k {
            chunks.truncate(top_k);
        }

        if chunks.is_empty() {
            return Ok(ToolResult::Rag(RagOutput {
                answer: locale::no_internal_information(context.language).to_string(),
                sources: Vec::new(),
                confidence: ConfidenceLevel::Low,
            }));
        }

        let system_prompt = format!(
            "You answer questions for university students using only the numbered context below. \
             Do not use outside knowledge. If the context does not contain the answer, start your \
             reply with {} and say what is missing. Answer in {}.\n\nContext:\n{}",
            INSUFFICIENT_MARKER,
            context.language.name(),
            self.build_context(&chunks)
        );
        let request = GenerateRequest::new(format!("Question: {}", query))
            .with_system_prompt(system_prompt)
            .with_temperature(0.2)
            .with_max_tokens(self.settings.max_tokens);

        let sources = source_titles(&chunks);
        let answer = match self.llm.generate(request).await {
            Ok(answer) => answer,
            // Retrieval succeeded, so keep the chunks for the audit trail
            Err(e) => {
                return Err(ToolError::Partial {
                    tool: self.tool_type(),
                    message: format!("model call failed after retrieval: {}", e),
                    partial: Box::new(ToolResult::Rag(RagOutput {
                        answer: self.build_context(&chunks).trim_end().to_string(),
                        sources,
                        confidence: ConfidenceLevel::Low,
                    })),
                })
            }
        };

        let trimmed = answer.trim_start();
        let insufficient = trimmed.starts_with(INSUFFICIENT_MARKER);
        let answer = trimmed.trim_start_matches(INSUFFICIENT_MARKER).trim().to_string();

        let mut confidence = self.score_confidence(&chunks, insufficient);
        if let Some(cap) = args.confidence_cap {
            confidence = confidence.capped_at(cap);
        }

        Ok(ToolResult::Rag(RagOutput {
            answer,
            sources,
            confidence,
        }))
    }
}

/// Distinct chunk titles (or ids) in retrieval order
fn source_titles(chunks: &[ChunkContent]) -> Vec<String> {
    let mut sources: Vec<String> = Vec::new();
    for chunk in chunks {
        let source = if chunk.title.is_empty() {
            chunk.chunk_id.clone()
        } else {
            chunk.title.clone()
        };
        if !sources.contains(&source) {
            sources.push(source);
        }
    }
    sources
}
