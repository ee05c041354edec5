//! Streaming events emitted during an orchestration run
//!
//! Order within one run: status(deciding_tools), tools_decided,
//! status(executing_tools), tool_start/tool_end per tool,
//! status(synthesizing), answer_chunk*, then status(completed) or error.

use crate::context::ConfidenceLevel;
use crate::tools::{ToolCall, ToolExecutionStatus, ToolType};
use futures::{stream, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

/// Terminal frame for SSE consumers
pub const SSE_DONE_FRAME: &str = "data: [DONE]\n\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    DecidingTools,
    ExecutingTools,
    Synthesizing,
    Completed,
}

/// Entry of a `tools_decided` event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecidedTool {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub tool_type: ToolType,
    pub reasoning: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrchestrationEvent {
    Status {
        status: RunStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        confidence: Option<ConfidenceLevel>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sources: Option<Vec<String>>,
    },
    ToolsDecided {
        tools: Vec<DecidedTool>,
    },
    ToolStart {
        id: Uuid,
        tool: ToolType,
    },
    ToolEnd {
        id: Uuid,
        tool: ToolType,
        status: ToolExecutionStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<serde_json::Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        execution_time_ms: Option<u64>,
    },
    AnswerChunk {
        content: String,
    },
    Error {
        message: String,
    },
}

impl OrchestrationEvent {
    pub fn status(status: RunStatus) -> Self {
        OrchestrationEvent::Status {
            status,
            confidence: None,
            sources: None,
        }
    }

    pub fn completed(confidence: ConfidenceLevel, sources: Vec<String>) -> Self {
        OrchestrationEvent::Status {
            status: RunStatus::Completed,
            confidence: Some(confidence),
            sources: Some(sources),
        }
    }

    pub fn tools_decided(calls: &[ToolCall]) -> Self {
        OrchestrationEvent::ToolsDecided {
            tools: calls
                .iter()
                .map(|c| DecidedTool {
                    id: c.id,
                    tool_type: c.tool_type,
                    reasoning: c.reasoning.clone(),
                })
                .collect(),
        }
    }

    pub fn tool_start(call: &ToolCall) -> Self {
        OrchestrationEvent::ToolStart {
            id: call.id,
            tool: call.tool_type,
        }
    }

    pub fn tool_end(call: &ToolCall) -> Self {
        OrchestrationEvent::ToolEnd {
            id: call.id,
            tool: call.tool_type,
            status: call.status(),
            error: call.error_message().map(str::to_string),
            result: call.result().map(|r| r.summary()),
            execution_time_ms: call.execution_time_ms(),
        }
    }

    pub fn answer_chunk(content: impl Into<String>) -> Self {
        OrchestrationEvent::AnswerChunk {
            content: content.into(),
        }
    }

    /// Whether this event ends the run's event sequence
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrchestrationEvent::Error { .. }
                | OrchestrationEvent::Status {
                    status: RunStatus::Completed,
                    ..
                }
        )
    }

    /// Render as a Server-Sent Events frame
    pub fn to_sse_frame(&self) -> String {
        match serde_json::to_string(self) {
            Ok(json) => format!("data: {}\n\n", json),
            Err(e) => format!(
                "data: {{\"type\":\"error\",\"message\":\"event encoding failed: {}\"}}\n\n",
                e
            ),
        }
    }
}

/// Render an event stream as SSE frames; the terminal event is followed
/// by [`SSE_DONE_FRAME`]
pub fn sse_frames<S>(events: S) -> impl Stream<Item = String>
where
    S: Stream<Item = OrchestrationEvent>,
{
    events.flat_map(|event| {
        let mut frames = vec![event.to_sse_frame()];
        if event.is_terminal() {
            frames.push(SSE_DONE_FRAME.to_string());
        }
        stream::iter(frames)
    })
}

/// Destination for one run's events; a disabled sink drops everything
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::Sender<OrchestrationEvent>>,
}

impl EventSink {
    pub fn new(tx: mpsc::Sender<OrchestrationEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.tx.is_some()
    }

    /// Deliver an event. A consumer that went away does not stop the run.
    pub async fn emit(&self, event: OrchestrationEvent) {
        if let Some(tx) = &self.tx {
            if tx.send(event).await.is_err() {
                debug!("Event receiver dropped, discarding event");
            }
        }
    }
}
