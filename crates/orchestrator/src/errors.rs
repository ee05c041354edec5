//! Orchestration error taxonomy
//!
//! Run-time failures (tool, decision, synthesis) are caught at their
//! call-sites and recorded on the run; only startup configuration
//! failures are ever returned to callers.

use crate::tools::{ToolExecutionStatus, ToolResult, ToolType};
use queryforge_common::AppError;
use thiserror::Error;

/// Failure of a single tool handler
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("{tool} failed: {message}")]
    Execution { tool: ToolType, message: String },

    #[error("{tool} failed: {message} (partial result kept)")]
    Partial {
        tool: ToolType,
        message: String,
        partial: Box<ToolResult>,
    },

    #[error("{tool} timed out after {timeout_ms}ms")]
    Timeout { tool: ToolType, timeout_ms: u64 },

    #[error("{tool} is missing required input: {field}")]
    MissingInput { tool: ToolType, field: String },

    #[error("{tool} received arguments for {received}")]
    ArgumentMismatch { tool: ToolType, received: ToolType },

    #[error("{tool} upstream error: {source}")]
    Upstream {
        tool: ToolType,
        #[source]
        source: AppError,
    },
}

impl ToolError {
    pub fn upstream(tool: ToolType, source: AppError) -> Self {
        ToolError::Upstream { tool, source }
    }

    /// Take the partial result out of the error, if any
    pub fn into_partial(self) -> (String, Option<ToolResult>) {
        match self {
            ToolError::Partial { message, partial, .. } => (message, Some(*partial)),
            other => (other.to_string(), None),
        }
    }
}

/// Failure of the decision mechanism
#[derive(Error, Debug)]
pub enum DecisionError {
    #[error("decision model call failed: {0}")]
    Upstream(#[from] AppError),

    #[error("decision model timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("malformed decision response: {reason}")]
    Malformed { reason: String },

    #[error("decision selected unknown tool '{name}'")]
    UnknownTool { name: String },

    #[error("invalid arguments for {tool}: {reason}")]
    InvalidArguments { tool: ToolType, reason: String },
}

impl DecisionError {
    /// Short label for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            DecisionError::Upstream(_) => "upstream",
            DecisionError::Timeout { .. } => "timeout",
            DecisionError::Malformed { .. } => "malformed",
            DecisionError::UnknownTool { .. } => "unknown_tool",
            DecisionError::InvalidArguments { .. } => "invalid_arguments",
        }
    }
}

/// Failure of the answer synthesis step
#[derive(Error, Debug)]
pub enum SynthesisError {
    #[error("synthesis model call failed: {0}")]
    Upstream(#[from] AppError),

    #[error("synthesis produced an empty answer")]
    EmptyAnswer,

    #[error("no successful tool output to synthesize")]
    NoToolOutput,
}

/// Illegal ToolCall lifecycle transition
#[derive(Error, Debug, PartialEq, Eq)]
#[error("cannot move tool call from {from} to {to}")]
pub struct TransitionError {
    pub from: ToolExecutionStatus,
    pub to: ToolExecutionStatus,
}

/// Mutation of a completed OrchestrationResult
#[derive(Error, Debug, PartialEq, Eq)]
pub enum SessionError {
    #[error("orchestration {0} is already completed")]
    AlreadyCompleted(uuid::Uuid),
}

/// Startup configuration failures
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("no handler registered for tool {0}")]
    MissingHandler(ToolType),

    #[error("handler for {0} registered twice")]
    DuplicateHandler(ToolType),

    #[error("tool catalog has no entry for {0}")]
    MissingCatalogEntry(ToolType),

    #[error(transparent)]
    App(#[from] AppError),
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
