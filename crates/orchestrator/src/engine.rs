//! Query Orchestrator - one decide, execute, synthesize cycle per query
//!
//! The orchestrator owns no per-run state: every call to `execute` builds its
//! own OrchestrationResult and hands it back completed. Failures in any phase
//! are downgraded and recorded on the result; a run always produces an answer.

use crate::assessment::assess;
use crate::context::{ConfidenceLevel, OrchestrationRequest};
use crate::decision::{Decision, DecisionEngine, DecisionOutcome, NO_TOOLS_REASONING};
use crate::errors::{Result, SessionError};
use crate::events::{EventSink, OrchestrationEvent, RunStatus};
use crate::executor::{ExecutionContext, ToolExecutor};
use crate::handlers::{
    ClarifyHandler, DirectAnswerHandler, FormFillHandler, ImageAnalysisHandler, RagHandler,
    SearchBackend, WebSearchHandler,
};
use crate::session::{OrchestrationMetrics, OrchestrationResult};
use crate::synthesis::Synthesizer;
use crate::tools::{ToolCall, ToolCatalog, ToolType};
use futures::future::join_all;
use futures::Stream;
use queryforge_common::metrics::{self, PhaseTimer};
use queryforge_common::{AppConfig, LlmClient};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn, Span};
use uuid::Uuid;

/// Capacity of the per-run event channel used by `stream`
const EVENT_BUFFER: usize = 64;

/// Source tag reported when the run could not produce an answer
const ERROR_SOURCE: &str = "error";

/// Run-level knobs
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Calls beyond this many are skipped
    pub max_tool_calls: usize,
    /// Run pending calls concurrently
    pub parallel: bool,
}

impl EngineOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            max_tool_calls: config.decision.max_tool_calls,
            parallel: config.executor.parallel,
        }
    }
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

struct Inner {
    decision: DecisionEngine,
    executor: ToolExecutor,
    synthesizer: Synthesizer,
    options: EngineOptions,
}

/// Entry point for orchestration runs; cheap to clone and share across tasks
#[derive(Clone)]
pub struct QueryOrchestrator {
    inner: Arc<Inner>,
}

impl QueryOrchestrator {
    pub fn new(
        decision: DecisionEngine,
        executor: ToolExecutor,
        synthesizer: Synthesizer,
        options: EngineOptions,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                decision,
                executor,
                synthesizer,
                options,
            }),
        }
    }

    /// Wire the standard catalog and all built-in handlers from configuration
    pub fn from_config(
        config: &AppConfig,
        llm: Arc<dyn LlmClient>,
        search_backend: Arc<dyn SearchBackend>,
    ) -> Result<Self> {
        let catalog = Arc::new(ToolCatalog::standard());

        let executor = ToolExecutor::builder(config.tool_timeout())
            .register(Arc::new(RagHandler::new(llm.clone(), config.rag.clone())))
            .register(Arc::new(WebSearchHandler::new(
                search_backend,
                config.web_search.max_results,
            )))
            .register(Arc::new(DirectAnswerHandler::new(
                llm.clone(),
                config.synthesis.max_tokens,
            )))
            .register(Arc::new(FormFillHandler::default()))
            .register(Arc::new(ClarifyHandler::new(llm.clone())))
            .register(Arc::new(ImageAnalysisHandler::new(llm.clone())))
            .build(&catalog)?;

        let decision = DecisionEngine::new(llm.clone(), catalog, config.decision.clone());
        let synthesizer = Synthesizer::new(llm, config.synthesis.clone());

        info!(
            model = %config.llm.model,
            provider = %config.llm.provider,
            parallel = config.executor.parallel,
            "Query orchestrator ready"
        );

        Ok(Self::new(
            decision,
            executor,
            synthesizer,
            EngineOptions::from_config(config),
        ))
    }

    /// Run one query with blocking synthesis
    pub async fn execute(&self, request: OrchestrationRequest) -> OrchestrationResult {
        self.run(request, EventSink::disabled()).await
    }

    /// Run one query, emitting events to `tx` and streaming the answer
    pub async fn execute_with_events(
        &self,
        request: OrchestrationRequest,
        tx: mpsc::Sender<OrchestrationEvent>,
    ) -> OrchestrationResult {
        self.run(request, EventSink::new(tx)).await
    }

    /// Run one query on a background task.
    ///
    /// The stream ends once the run has emitted its last event; the handle
    /// yields the completed result. Dropping the stream does not stop the run.
    pub fn stream(
        &self,
        request: OrchestrationRequest,
    ) -> (
        impl Stream<Item = OrchestrationEvent> + Send + 'static,
        JoinHandle<OrchestrationResult>,
    ) {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let orchestrator = self.clone();
        let handle = tokio::spawn(async move { orchestrator.execute_with_events(request, tx).await });

        let events = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        });
        (events, handle)
    }

    #[instrument(
        skip_all,
        fields(
            session_id = %request.session_id,
            message_id = %request.message_id,
            orchestration_id = tracing::field::Empty,
        )
    )]
    async fn run(&self, request: OrchestrationRequest, sink: EventSink) -> OrchestrationResult {
        let total = PhaseTimer::start();
        let mut result = OrchestrationResult::new(&request);
        let orchestration_id = result.id();
        Span::current().record("orchestration_id", tracing::field::display(orchestration_id));
        info!(%orchestration_id, streaming = sink.is_enabled(), "Orchestration started");

        // Decide
        sink.emit(OrchestrationEvent::status(RunStatus::DecidingTools)).await;
        let timer = PhaseTimer::start();
        let Decision {
            mut tool_calls,
            outcome,
        } = self
            .inner
            .decision
            .decide(
                &request.query,
                &request.vector_reference,
                &request.user_context,
                &request.history,
                request.image.as_ref(),
            )
            .await;
        record_phase(&mut result, |m| m.record_decision(timer.elapsed_ms()));

        let decision_failed = matches!(outcome, DecisionOutcome::FailedOver { .. });
        match outcome {
            DecisionOutcome::Selected => {}
            DecisionOutcome::DefaultedToDirect => {
                check(result.set_decision_fallback(NO_TOOLS_REASONING));
            }
            DecisionOutcome::FailedOver { cause } => {
                check(result.set_decision_fallback(cause));
            }
        }

        // Execute
        apply_planning_guards(&mut tool_calls, self.inner.options.max_tool_calls);
        sink.emit(OrchestrationEvent::tools_decided(&tool_calls)).await;
        sink.emit(OrchestrationEvent::status(RunStatus::ExecutingTools)).await;

        let timer = PhaseTimer::start();
        check(result.append_tool_calls(tool_calls));
        let context = self.execution_context(&request);
        match result.tool_calls_mut() {
            Ok(calls) => self.execute_calls(calls, &context, &sink).await,
            Err(err) => error!(error = %err, "Cannot execute tool calls"),
        }
        record_phase(&mut result, |m| m.record_tools_execution(timer.elapsed_ms()));

        let assessment = assess(result.tool_calls(), decision_failed);

        // Synthesize
        sink.emit(OrchestrationEvent::status(RunStatus::Synthesizing)).await;
        let timer = PhaseTimer::start();
        let synthesizer = &self.inner.synthesizer;
        let output = if sink.is_enabled() {
            synthesizer
                .synthesize_stream(&request.query, result.tool_calls(), &request.user_context, &sink)
                .await
        } else {
            synthesizer
                .synthesize(&request.query, result.tool_calls(), &request.user_context)
                .await
        };
        record_phase(&mut result, |m| m.record_synthesis(timer.elapsed_ms()));

        let (confidence, sources) = if output.is_apology() {
            let message = output
                .error
                .clone()
                .unwrap_or_else(|| "orchestration produced no answer".to_string());
            sink.emit(OrchestrationEvent::Error { message }).await;
            (ConfidenceLevel::Low, vec![ERROR_SOURCE.to_string()])
        } else {
            sink.emit(OrchestrationEvent::completed(
                assessment.confidence,
                assessment.sources.clone(),
            ))
            .await;
            (assessment.confidence, assessment.sources)
        };

        let total_ms = total.elapsed_ms();
        check(result.complete(output.answer, confidence, sources, total_ms));
        metrics::record_orchestration(total.elapsed_secs(), confidence.as_str());

        info!(
            %orchestration_id,
            tools = result.tool_calls().len(),
            confidence = %confidence,
            sources = ?result.sources_used(),
            latency_ms = total_ms,
            "Orchestration completed"
        );
        result
    }

    fn execution_context(&self, request: &OrchestrationRequest) -> ExecutionContext {
        ExecutionContext {
            query: request.query.clone(),
            vector_reference: request.vector_reference.clone(),
            image: request.image.clone(),
            user_context: request.user_context.clone(),
            language: self.inner.synthesizer.language_for(&request.user_context),
        }
    }

    async fn execute_calls(&self, calls: &mut [ToolCall], context: &ExecutionContext, sink: &EventSink) {
        if self.inner.options.parallel {
            join_all(calls.iter_mut().map(|call| self.execute_one(call, context, sink))).await;
        } else {
            for call in calls.iter_mut() {
                self.execute_one(call, context, sink).await;
            }
        }
    }

    async fn execute_one(&self, call: &mut ToolCall, context: &ExecutionContext, sink: &EventSink) {
        if !call.is_skipped() {
            sink.emit(OrchestrationEvent::tool_start(call)).await;
            self.inner.executor.execute(call, context).await;
        }
        sink.emit(OrchestrationEvent::tool_end(call)).await;
    }
}

/// Skip repeated tool types and calls over budget, in decision order
fn apply_planning_guards(calls: &mut [ToolCall], max_tool_calls: usize) {
    let budget = max_tool_calls.max(1);
    let mut planned: HashMap<ToolType, Uuid> = HashMap::new();

    for call in calls.iter_mut() {
        let reason = if let Some(first) = planned.get(&call.tool_type) {
            format!("duplicate of {}", first)
        } else if planned.len() >= budget {
            "tool budget exhausted".to_string()
        } else {
            planned.insert(call.tool_type, call.id);
            continue;
        };

        info!(tool_id = %call.id, tool_type = %call.tool_type, %reason, "Tool call skipped");
        if let Err(err) = call.mark_skipped(reason) {
            error!(error = %err, "Tool call lifecycle violated");
        }
    }
}

fn record_phase(result: &mut OrchestrationResult, record: impl FnOnce(&mut OrchestrationMetrics) -> bool) {
    match result.metrics_mut() {
        Ok(metrics) => {
            if !record(metrics) {
                warn!("Phase timing already recorded");
            }
        }
        Err(err) => error!(error = %err, "Cannot record phase timing"),
    }
}

fn check(outcome: std::result::Result<(), SessionError>) {
    if let Err(err) = outcome {
        error!(error = %err, "Orchestration result update rejected");
    }
}
