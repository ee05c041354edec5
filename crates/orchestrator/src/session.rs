//! OrchestrationResult - the auditable record of one run
//!
//! Created once per query, filled in phase by phase (decide, execute,
//! synthesize), and frozen by `complete`. ToolCalls are only ever appended.

use crate::context::{ConfidenceLevel, OrchestrationRequest, UserContext, VectorSearchReference};
use crate::errors::SessionError;
use crate::tools::ToolCall;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Phase timings; each is set exactly once
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OrchestrationMetrics {
    decision_time_ms: Option<u64>,
    tools_execution_time_ms: Option<u64>,
    synthesis_time_ms: Option<u64>,
    total_time_ms: Option<u64>,
}

fn set_once(slot: &mut Option<u64>, value: u64) -> bool {
    if slot.is_some() {
        return false;
    }
    *slot = Some(value);
    true
}

impl OrchestrationMetrics {
    pub fn decision_time_ms(&self) -> Option<u64> {
        self.decision_time_ms
    }

    pub fn tools_execution_time_ms(&self) -> Option<u64> {
        self.tools_execution_time_ms
    }

    pub fn synthesis_time_ms(&self) -> Option<u64> {
        self.synthesis_time_ms
    }

    pub fn total_time_ms(&self) -> Option<u64> {
        self.total_time_ms
    }

    pub fn record_decision(&mut self, ms: u64) -> bool {
        set_once(&mut self.decision_time_ms, ms)
    }

    pub fn record_tools_execution(&mut self, ms: u64) -> bool {
        set_once(&mut self.tools_execution_time_ms, ms)
    }

    pub fn record_synthesis(&mut self, ms: u64) -> bool {
        set_once(&mut self.synthesis_time_ms, ms)
    }

    fn record_total(&mut self, ms: u64) -> bool {
        set_once(&mut self.total_time_ms, ms)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OrchestrationResult {
    id: Uuid,
    session_id: String,
    message_id: Uuid,
    query: String,
    user_context: UserContext,
    vector_reference: VectorSearchReference,
    tool_calls: Vec<ToolCall>,
    final_answer: String,
    confidence_level: ConfidenceLevel,
    sources_used: Vec<String>,
    /// Why the decision phase fell back, when it did
    #[serde(skip_serializing_if = "Option::is_none")]
    decision_fallback: Option<String>,
    metrics: OrchestrationMetrics,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl OrchestrationResult {
    pub fn new(request: &OrchestrationRequest) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id: request.session_id.clone(),
            message_id: request.message_id,
            query: request.query.clone(),
            user_context: request.user_context.clone(),
            vector_reference: request.vector_reference.clone(),
            tool_calls: Vec::new(),
            final_answer: String::new(),
            confidence_level: ConfidenceLevel::Low,
            sources_used: Vec::new(),
            decision_fallback: None,
            metrics: OrchestrationMetrics::default(),
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn message_id(&self) -> Uuid {
        self.message_id
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn user_context(&self) -> &UserContext {
        &self.user_context
    }

    pub fn vector_reference(&self) -> &VectorSearchReference {
        &self.vector_reference
    }

    pub fn tool_calls(&self) -> &[ToolCall] {
        &self.tool_calls
    }

    pub fn final_answer(&self) -> &str {
        &self.final_answer
    }

    pub fn confidence_level(&self) -> ConfidenceLevel {
        self.confidence_level
    }

    pub fn sources_used(&self) -> &[String] {
        &self.sources_used
    }

    pub fn decision_fallback(&self) -> Option<&str> {
        self.decision_fallback.as_deref()
    }

    pub fn metrics(&self) -> &OrchestrationMetrics {
        &self.metrics
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn is_completed(&self) -> bool {
        self.completed_at.is_some()
    }

    fn ensure_open(&self) -> Result<(), SessionError> {
        if self.is_completed() {
            Err(SessionError::AlreadyCompleted(self.id))
        } else {
            Ok(())
        }
    }

    pub fn metrics_mut(&mut self) -> Result<&mut OrchestrationMetrics, SessionError> {
        self.ensure_open()?;
        Ok(&mut self.metrics)
    }

    pub fn set_decision_fallback(&mut self, cause: impl Into<String>) -> Result<(), SessionError> {
        self.ensure_open()?;
        self.decision_fallback = Some(cause.into());
        Ok(())
    }

    /// Append ToolCalls in order
    pub fn append_tool_calls(&mut self, calls: Vec<ToolCall>) -> Result<(), SessionError> {
        self.ensure_open()?;
        self.tool_calls.extend(calls);
        Ok(())
    }

    /// The calls, for in-place execution; the slice cannot grow or shrink
    pub fn tool_calls_mut(&mut self) -> Result<&mut [ToolCall], SessionError> {
        self.ensure_open()?;
        Ok(&mut self.tool_calls)
    }

    /// Record the answer and freeze the result
    pub fn complete(
        &mut self,
        final_answer: impl Into<String>,
        confidence_level: ConfidenceLevel,
        sources_used: Vec<String>,
        total_time_ms: u64,
    ) -> Result<(), SessionError> {
        self.ensure_open()?;
        self.final_answer = final_answer.into();
        self.confidence_level = confidence_level;
        self.sources_used = sources_used;
        self.metrics.record_total(total_time_ms);
        self.completed_at = Some(Utc::now());
        Ok(())
    }
}
