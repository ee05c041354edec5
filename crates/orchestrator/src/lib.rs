//! QueryForge Orchestrator
//!
//! Decides which tools answer a query, runs them, and merges their output:
//! - Tool model, typed arguments/results and the static catalog
//! - LLM-backed decision engine with deterministic fallbacks
//! - Tool executor and the built-in handlers
//! - Confidence/source assessment and answer synthesis
//! - Auditable orchestration results and streaming events

pub mod assessment;
pub mod context;
pub mod decision;
pub mod engine;
pub mod errors;
pub mod events;
pub mod executor;
pub mod handlers;
pub mod locale;
pub mod session;
pub mod synthesis;
pub mod tools;

// Re-export commonly used types
pub use context::{
    ConfidenceLevel, ConversationTurn, ImageInput, Language, OrchestrationRequest,
    RequestAssembler, UserContext, VectorSearchReference,
};
pub use engine::{EngineOptions, QueryOrchestrator};
pub use errors::{OrchestratorError, Result};
pub use events::{sse_frames, OrchestrationEvent, RunStatus, SSE_DONE_FRAME};
pub use executor::{ExecutionContext, ToolExecutor, ToolHandler};
pub use session::{OrchestrationMetrics, OrchestrationResult};
pub use tools::{ToolCall, ToolExecutionStatus, ToolResult, ToolType};
