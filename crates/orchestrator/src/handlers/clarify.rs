//! Clarification requests for ambiguous queries

use super::{mismatch, required_query};
use crate::errors::ToolError;
use crate::executor::{ExecutionContext, ToolHandler};
use crate::locale;
use crate::tools::{ClarificationOutput, ToolArguments, ToolResult, ToolType};
use async_trait::async_trait;
use queryforge_common::{GenerateRequest, LlmClient};
use serde::Deserialize;
use std::sync::Arc;
use tracing::warn;

const MAX_SUGGESTIONS: usize = 5;

#[derive(Debug, Deserialize)]
struct GeneratedClarification {
    question: String,
    #[serde(default)]
    suggestions: Vec<String>,
}

pub struct ClarifyHandler {
    llm: Arc<dyn LlmClient>,
}

impl ClarifyHandler {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    async fn generate(
        &self,
        query: &str,
        ambiguity: Option<&str>,
        context: &ExecutionContext,
    ) -> queryforge_common::Result<GeneratedClarification> {
        let mut prompt = format!("User message: {}", query);
        if let Some(ambiguity) = ambiguity {
            prompt.push_str(&format!("\nWhat is unclear: {}", ambiguity));
        }

        let request = GenerateRequest::new(prompt)
            .with_system_prompt(format!(
                "The user's message to a university assistant is ambiguous. Write one short \
                 clarifying question and up to {} concrete rephrasings the user might have meant. \
                 Write in {}. Respond with JSON: {{\"question\": \"...\", \"suggestions\": [\"...\"]}}",
                MAX_SUGGESTIONS,
                context.language.name()
            ))
            .with_temperature(0.3)
            .with_max_tokens(300)
            .json();

        let raw = self.llm.generate(request).await?;
        Ok(serde_json::from_str(raw.trim())?)
    }
}

#[async_trait]
impl ToolHandler for ClarifyHandler {
    fn tool_type(&self) -> ToolType {
        ToolType::ClarifyQuestion
    }

    async fn execute(
        &self,
        arguments: &ToolArguments,
        context: &ExecutionContext,
    ) -> Result<ToolResult, ToolError> {
        let ToolArguments::ClarifyQuestion(args) = arguments else {
            return Err(mismatch(self.tool_type(), arguments));
        };
        let query = required_query(self.tool_type(), args.query.as_deref())?;

        if !args.suggestions.is_empty() {
            return Ok(ToolResult::Clarification(ClarificationOutput {
                clarification_prompt: locale::default_clarification(context.language).to_string(),
                suggestions: args.suggestions.clone(),
            }));
        }

        let output = match self.generate(query, args.ambiguity.as_deref(), context).await {
            Ok(generated) if !generated.question.trim().is_empty() => ClarificationOutput {
                clarification_prompt: generated.question.trim().to_string(),
                suggestions: generated.suggestions.into_iter().take(MAX_SUGGESTIONS).collect(),
            },
            outcome => {
                if let Err(err) = outcome {
                    warn!(error = %err, "Clarification generation failed, using default prompt");
                }
                ClarificationOutput {
                    clarification_prompt: locale::default_clarification(context.language).to_string(),
                    suggestions: Vec::new(),
                }
            }
        };

        Ok(ToolResult::Clarification(output))
    }
}
