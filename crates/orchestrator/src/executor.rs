//! Tool Executor - dispatches ToolCalls to their handlers
//!
//! Every dispatch is wrapped the same way: inject run context, start the
//! call, run the handler under a timeout, then record success or failure on
//! the call itself. Nothing escapes this boundary.

use crate::context::{ImageInput, Language, UserContext, VectorSearchReference};
use crate::errors::{OrchestratorError, Result, ToolError};
use crate::tools::{
    ToolArguments, ToolCall, ToolCatalog, ToolExecutionStatus, ToolResult, ToolType,
};
use async_trait::async_trait;
use queryforge_common::metrics::{self, PhaseTimer};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};

/// Shared, read-only run context available to every handler
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub query: String,
    pub vector_reference: VectorSearchReference,
    pub image: Option<ImageInput>,
    pub user_context: UserContext,
    pub language: Language,
}

/// One capability, registered for exactly one ToolType
#[async_trait]
pub trait ToolHandler: Send + Sync {
    fn tool_type(&self) -> ToolType;

    async fn execute(
        &self,
        arguments: &ToolArguments,
        context: &ExecutionContext,
    ) -> std::result::Result<ToolResult, ToolError>;
}

/// Builder that validates the dispatch table against the catalog
pub struct ToolExecutorBuilder {
    handlers: Vec<Arc<dyn ToolHandler>>,
    tool_timeout: Duration,
}

impl ToolExecutorBuilder {
    pub fn new(tool_timeout: Duration) -> Self {
        Self {
            handlers: Vec::new(),
            tool_timeout,
        }
    }

    pub fn register(mut self, handler: Arc<dyn ToolHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    /// Every ToolType must have exactly one handler and one catalog entry
    pub fn build(self, catalog: &ToolCatalog) -> Result<ToolExecutor> {
        catalog.ensure_complete()?;

        let mut handlers: HashMap<ToolType, Arc<dyn ToolHandler>> = HashMap::new();
        for handler in self.handlers {
            let tool = handler.tool_type();
            if handlers.insert(tool, handler).is_some() {
                return Err(OrchestratorError::DuplicateHandler(tool));
            }
        }

        if let Some(missing) = ToolType::ALL.into_iter().find(|t| !handlers.contains_key(t)) {
            return Err(OrchestratorError::MissingHandler(missing));
        }

        Ok(ToolExecutor {
            handlers,
            tool_timeout: self.tool_timeout,
        })
    }
}

pub struct ToolExecutor {
    handlers: HashMap<ToolType, Arc<dyn ToolHandler>>,
    tool_timeout: Duration,
}

impl ToolExecutor {
    pub fn builder(tool_timeout: Duration) -> ToolExecutorBuilder {
        ToolExecutorBuilder::new(tool_timeout)
    }

    /// Run one pending ToolCall to a terminal state
    #[instrument(skip_all, fields(tool_id = %call.id, tool_type = %call.tool_type))]
    pub async fn execute(&self, call: &mut ToolCall, context: &ExecutionContext) {
        if call.status() != ToolExecutionStatus::Pending {
            warn!(status = %call.status(), "Tool call is not pending, not executing");
            return;
        }

        inject_context(&mut call.arguments, context);

        if let Err(err) = call.start_execution() {
            error!(error = %err, "Tool call lifecycle violated");
            return;
        }

        let timer = PhaseTimer::start();
        let outcome = match self.handlers.get(&call.tool_type) {
            Some(handler) => {
                match tokio::time::timeout(self.tool_timeout, handler.execute(&call.arguments, context)).await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(ToolError::Timeout {
                        tool: call.tool_type,
                        timeout_ms: self.tool_timeout.as_millis() as u64,
                    }),
                }
            }
            None => Err(ToolError::Execution {
                tool: call.tool_type,
                message: "no handler registered".to_string(),
            }),
        };

        let transition = match outcome {
            Ok(result) => call.mark_success(result),
            Err(err) => {
                warn!(error = %err, latency_ms = timer.elapsed_ms(), "Tool failed");
                match err.into_partial() {
                    (message, Some(partial)) => call.mark_failed_with_partial(message, partial),
                    (message, None) => call.mark_failed(message),
                }
            }
        };
        if let Err(err) = transition {
            error!(error = %err, "Tool call lifecycle violated");
        }

        metrics::record_tool_execution(
            call.tool_type.as_str(),
            call.status().as_str(),
            timer.elapsed_secs(),
        );
        info!(
            status = %call.status(),
            latency_ms = call.execution_time_ms().unwrap_or_default(),
            "Tool finished"
        );
    }
}

/// Fill arguments the decision engine left out from run context
pub fn inject_context(arguments: &mut ToolArguments, context: &ExecutionContext) {
    arguments.inject_query(&context.query);

    match arguments {
        ToolArguments::UseRagContext(args) => {
            if args.chunk_contents.is_none() {
                args.chunk_contents = Some(context.vector_reference.chunk_contents.clone());
            }
        }
        ToolArguments::AnalyzeImage(args) => {
            if let Some(image) = &context.image {
                if args.image_bytes.is_none() {
                    args.image_bytes = Some(image.bytes.clone());
                }
                if args.image_format.is_none() {
                    args.image_format = Some(image.format.clone());
                }
                if args.question.is_none() {
                    args.question = image.question.clone();
                }
            }
        }
        _ => {}
    }
}
