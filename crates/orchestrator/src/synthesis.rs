//! Synthesis - merges tool outputs into one final answer
//!
//! Provides:
//! - Blocking synthesis through a single model call
//! - Streaming synthesis forwarding text deltas as `answer_chunk` events
//! - Verbatim passthrough of a lone form or clarification result
//! - Fallback to raw tool text, then to a localized apology

use crate::context::{Language, UserContext};
use crate::errors::SynthesisError;
use crate::events::{EventSink, OrchestrationEvent};
use crate::locale;
use crate::tools::{ToolCall, ToolResult, ToolType};
use futures::StreamExt;
use queryforge_common::config::SynthesisSettings;
use queryforge_common::metrics::{self, PhaseTimer};
use queryforge_common::{GenerateRequest, LlmClient};
use std::sync::Arc;
use tracing::{instrument, warn};

/// Where the final answer came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerOrigin {
    /// Written by the synthesis model
    Model,
    /// A single form or clarification output, used verbatim
    Passthrough,
    /// Raw text of the first successful tool, after synthesis failed
    ToolFallback,
    /// Fixed apology; nothing usable was produced
    Apology,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesisOutput {
    pub answer: String,
    pub origin: AnswerOrigin,
    /// The synthesis failure behind a fallback or a cut-short stream
    pub error: Option<String>,
}

impl SynthesisOutput {
    fn new(answer: impl Into<String>, origin: AnswerOrigin) -> Self {
        Self {
            answer: answer.into(),
            origin,
            error: None,
        }
    }

    fn with_error(mut self, error: &SynthesisError) -> Self {
        self.error = Some(error.to_string());
        self
    }

    pub fn is_apology(&self) -> bool {
        self.origin == AnswerOrigin::Apology
    }

    pub fn fell_back(&self) -> bool {
        matches!(self.origin, AnswerOrigin::ToolFallback | AnswerOrigin::Apology)
    }
}

enum Prepared<'a> {
    Done(SynthesisOutput),
    Prompt(Vec<&'a ToolCall>),
}

pub struct Synthesizer {
    llm: Arc<dyn LlmClient>,
    settings: SynthesisSettings,
}

impl Synthesizer {
    pub fn new(llm: Arc<dyn LlmClient>, settings: SynthesisSettings) -> Self {
        Self { llm, settings }
    }

    /// Answer language for a user
    pub fn language_for(&self, user_context: &UserContext) -> Language {
        user_context.language_or(&self.settings.default_language)
    }

    /// Produce the final answer with one blocking model call
    #[instrument(skip_all, fields(mode = "blocking"))]
    pub async fn synthesize(
        &self,
        query: &str,
        calls: &[ToolCall],
        user_context: &UserContext,
    ) -> SynthesisOutput {
        let timer = PhaseTimer::start();
        let language = self.language_for(user_context);

        let output = match self.prepare(calls, language) {
            Prepared::Done(output) => output,
            Prepared::Prompt(successful) => {
                let request = self.build_request(query, &successful, user_context, language);
                let answer = self
                    .llm
                    .generate(request)
                    .await
                    .map_err(SynthesisError::from)
                    .and_then(|answer| {
                        let answer = answer.trim().to_string();
                        if answer.is_empty() {
                            Err(SynthesisError::EmptyAnswer)
                        } else {
                            Ok(answer)
                        }
                    });

                match answer {
                    Ok(answer) => SynthesisOutput::new(answer, AnswerOrigin::Model),
                    Err(err) => self.fallback(&successful, language, err),
                }
            }
        };

        metrics::record_synthesis(timer.elapsed_secs(), "blocking", output.fell_back());
        output
    }

    /// Produce the final answer, emitting it as `answer_chunk` events
    #[instrument(skip_all, fields(mode = "stream"))]
    pub async fn synthesize_stream(
        &self,
        query: &str,
        calls: &[ToolCall],
        user_context: &UserContext,
        sink: &EventSink,
    ) -> SynthesisOutput {
        let timer = PhaseTimer::start();
        let language = self.language_for(user_context);

        let output = match self.prepare(calls, language) {
            Prepared::Done(output) => {
                sink.emit(OrchestrationEvent::answer_chunk(output.answer.clone())).await;
                output
            }
            Prepared::Prompt(successful) => {
                let request = self.build_request(query, &successful, user_context, language);
                match self.llm.stream_generate(request).await {
                    Ok(mut stream) => {
                        let mut answer = String::new();
                        let mut failure = None;
                        while let Some(item) = stream.next().await {
                            match item {
                                Ok(delta) if delta.is_empty() => {}
                                Ok(delta) => {
                                    answer.push_str(&delta);
                                    sink.emit(OrchestrationEvent::answer_chunk(delta)).await;
                                }
                                Err(err) => {
                                    failure = Some(SynthesisError::from(err));
                                    break;
                                }
                            }
                        }

                        if answer.trim().is_empty() {
                            let err = failure.unwrap_or(SynthesisError::EmptyAnswer);
                            let output = self.fallback(&successful, language, err);
                            sink.emit(OrchestrationEvent::answer_chunk(output.answer.clone())).await;
                            output
                        } else {
                            let output = SynthesisOutput::new(answer, AnswerOrigin::Model);
                            match failure {
                                Some(err) => {
                                    warn!(error = %err, "Synthesis stream interrupted, keeping partial answer");
                                    output.with_error(&err)
                                }
                                None => output,
                            }
                        }
                    }
                    Err(err) => {
                        let output = self.fallback(&successful, language, err.into());
                        sink.emit(OrchestrationEvent::answer_chunk(output.answer.clone())).await;
                        output
                    }
                }
            }
        };

        metrics::record_synthesis(timer.elapsed_secs(), "stream", output.fell_back());
        output
    }

    /// Settle the cases that need no model call
    fn prepare<'a>(&self, calls: &'a [ToolCall], language: Language) -> Prepared<'a> {
        let successful: Vec<&ToolCall> = calls.iter().filter(|c| c.is_success()).collect();

        if successful.is_empty() {
            let err = SynthesisError::NoToolOutput;
            warn!(error = %err, "Answering with apology");
            return Prepared::Done(
                SynthesisOutput::new(locale::apology(language), AnswerOrigin::Apology).with_error(&err),
            );
        }

        if self.settings.passthrough_single_tool && successful.len() == 1 {
            let call = successful[0];
            if matches!(call.tool_type, ToolType::FillForm | ToolType::ClarifyQuestion) {
                if let Some(text) = call.result().and_then(ToolResult::raw_text) {
                    return Prepared::Done(SynthesisOutput::new(text, AnswerOrigin::Passthrough));
                }
            }
        }

        Prepared::Prompt(successful)
    }

    fn fallback(&self, successful: &[&ToolCall], language: Language, err: SynthesisError) -> SynthesisOutput {
        warn!(error = %err, "Synthesis failed, falling back");
        let raw = successful
            .iter()
            .find_map(|c| c.result().and_then(ToolResult::raw_text));
        match raw {
            Some(text) => SynthesisOutput::new(text, AnswerOrigin::ToolFallback).with_error(&err),
            None => SynthesisOutput::new(locale::apology(language), AnswerOrigin::Apology).with_error(&err),
        }
    }

    fn build_request(
        &self,
        query: &str,
        successful: &[&ToolCall],
        user_context: &UserContext,
        language: Language,
    ) -> GenerateRequest {
        let mut system_prompt = format!(
            "You are a university student assistant. Combine the tool outputs below into one \
             coherent answer to the user's question. Use only the information provided. Keep any \
             form markdown intact and cite URLs for information from the web. Answer in {}.",
            language.name()
        );
        if let Some(name) = &user_context.display_name {
            system_prompt.push_str(&format!(" The user's name is {}.", name));
        }

        let mut prompt = format!("Question: {}\n\nTool outputs:\n", query);
        for (i, call) in successful.iter().enumerate() {
            if let Some(result) = call.result() {
                prompt.push_str(&format!("\n[{}] {}\n", i + 1, format_result(result)));
            }
        }

        GenerateRequest::new(prompt)
            .with_system_prompt(system_prompt)
            .with_temperature(self.settings.temperature)
            .with_max_tokens(self.settings.max_tokens)
    }
}

/// Prompt rendering of one tool result
fn format_result(result: &ToolResult) -> String {
    match result {
        ToolResult::Rag(output) => format!(
            "Internal knowledge base answer:\n{}\nSources: {}",
            output.answer,
            output.sources.join("; ")
        ),
        ToolResult::WebSearch(output) => format!(
            "Web search results for \"{}\":\n{}\nURLs: {}",
            output.query_used,
            output.summary,
            output.source_urls.join(", ")
        ),
        ToolResult::DirectAnswer(output) => format!("General knowledge answer:\n{}", output.answer),
        ToolResult::Form(output) => {
            format!("Generated form ({}):\n{}", output.form_type, output.form_markdown)
        }
        ToolResult::Clarification(output) => format!(
            "Clarification needed:\n{}\nSuggestions: {}",
            output.clarification_prompt,
            output.suggestions.join("; ")
        ),
        ToolResult::ImageAnalysis(output) => {
            format!("Image analysis ({}):\n{}", output.image_format, output.analysis)
        }
        ToolResult::Skipped { reason } => format!("Skipped: {}", reason),
    }
}
