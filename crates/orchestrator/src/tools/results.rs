//! Typed tool result shapes

use super::ToolType;
use crate::context::ConfidenceLevel;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RagOutput {
    pub answer: String,
    /// Titles (or ids) of the chunks the answer is grounded in
    pub sources: Vec<String>,
    pub confidence: ConfidenceLevel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebSearchOutput {
    pub results: Vec<WebResult>,
    pub query_used: String,
    pub source_urls: Vec<String>,
    pub summary: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectAnswerOutput {
    pub answer: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormOutput {
    pub form_markdown: String,
    pub form_type: String,
    pub pre_filled_fields: BTreeMap<String, String>,
    pub missing_fields: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClarificationOutput {
    pub clarification_prompt: String,
    pub suggestions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageAnalysisOutput {
    pub analysis: String,
    pub image_format: String,
}

/// Result recorded on a ToolCall
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ToolResult {
    Rag(RagOutput),
    WebSearch(WebSearchOutput),
    DirectAnswer(DirectAnswerOutput),
    Form(FormOutput),
    Clarification(ClarificationOutput),
    ImageAnalysis(ImageAnalysisOutput),
    Skipped { reason: String },
}

impl ToolResult {
    /// The tool this shape belongs to; `None` for skip records
    pub fn tool_type(&self) -> Option<ToolType> {
        match self {
            ToolResult::Rag(_) => Some(ToolType::UseRagContext),
            ToolResult::WebSearch(_) => Some(ToolType::SearchWeb),
            ToolResult::DirectAnswer(_) => Some(ToolType::AnswerDirectly),
            ToolResult::Form(_) => Some(ToolType::FillForm),
            ToolResult::Clarification(_) => Some(ToolType::ClarifyQuestion),
            ToolResult::ImageAnalysis(_) => Some(ToolType::AnalyzeImage),
            ToolResult::Skipped { .. } => None,
        }
    }

    /// Self-reported confidence, only RAG carries one
    pub fn confidence(&self) -> Option<ConfidenceLevel> {
        match self {
            ToolResult::Rag(output) => Some(output.confidence),
            _ => None,
        }
    }

    /// Plain text usable as an answer on its own
    pub fn raw_text(&self) -> Option<String> {
        let text = match self {
            ToolResult::Rag(output) => output.answer.clone(),
            ToolResult::WebSearch(output) => output.summary.clone(),
            ToolResult::DirectAnswer(output) => output.answer.clone(),
            ToolResult::Form(output) => output.form_markdown.clone(),
            ToolResult::Clarification(output) => {
                let mut text = output.clarification_prompt.clone();
                for suggestion in &output.suggestions {
                    text.push_str("\n- ");
                    text.push_str(suggestion);
                }
                text
            }
            ToolResult::ImageAnalysis(output) => output.analysis.clone(),
            ToolResult::Skipped { .. } => return None,
        };
        if text.trim().is_empty() {
            None
        } else {
            Some(text)
        }
    }

    /// Compact, type-specific summary for streaming `tool_end` events
    pub fn summary(&self) -> serde_json::Value {
        match self {
            ToolResult::Rag(output) => json!({
                "answer_preview": preview(&output.answer, 200),
                "sources": output.sources,
                "confidence": output.confidence,
            }),
            ToolResult::WebSearch(output) => json!({
                "result_count": output.results.len(),
                "query_used": output.query_used,
                "source_urls": output.source_urls,
            }),
            ToolResult::DirectAnswer(output) => json!({
                "answer_preview": preview(&output.answer, 200),
            }),
            ToolResult::Form(output) => json!({
                "form_type": output.form_type,
                "pre_filled_fields": output.pre_filled_fields.len(),
                "missing_fields": output.missing_fields,
            }),
            ToolResult::Clarification(output) => json!({
                "clarification_prompt": output.clarification_prompt,
                "suggestions": output.suggestions,
            }),
            ToolResult::ImageAnalysis(output) => json!({
                "analysis_preview": preview(&output.analysis, 200),
                "image_format": output.image_format,
            }),
            ToolResult::Skipped { reason } => json!({ "reason": reason }),
        }
    }
}

/// Truncate to at most `max_chars` characters on a char boundary
pub(crate) fn preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push('…');
    out
}
