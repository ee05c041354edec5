//! ToolCall - the unit of work and its lifecycle
//!
//! Status only moves forward: pending -> running -> {success | failed},
//! with skipped and failed also reachable straight from pending.
//! `execution_time_ms` stays unset until a terminal state is reached.

use super::{ToolArguments, ToolExecutionStatus, ToolResult, ToolType};
use crate::errors::TransitionError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One planned invocation of a tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Call identifier
    pub id: Uuid,

    /// Tool to invoke
    pub tool_type: ToolType,

    /// Typed arguments, read-only after the decision phase except for context injection
    pub arguments: ToolArguments,

    /// Why the decision engine chose this tool
    pub reasoning: String,

    execution_status: ToolExecutionStatus,

    execution_result: Option<ToolResult>,

    execution_time_ms: Option<u64>,

    error_message: Option<String>,

    created_at: DateTime<Utc>,

    started_at: Option<DateTime<Utc>>,

    completed_at: Option<DateTime<Utc>>,
}

impl ToolCall {
    /// Create a pending call; the tool type follows from the arguments
    pub fn new(arguments: ToolArguments, reasoning: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tool_type: arguments.tool_type(),
            arguments,
            reasoning: reasoning.into(),
            execution_status: ToolExecutionStatus::Pending,
            execution_result: None,
            execution_time_ms: None,
            error_message: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    pub fn status(&self) -> ToolExecutionStatus {
        self.execution_status
    }

    pub fn result(&self) -> Option<&ToolResult> {
        self.execution_result.as_ref()
    }

    pub fn execution_time_ms(&self) -> Option<u64> {
        self.execution_time_ms
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn is_success(&self) -> bool {
        self.execution_status == ToolExecutionStatus::Success
    }

    pub fn is_failed(&self) -> bool {
        self.execution_status == ToolExecutionStatus::Failed
    }

    pub fn is_skipped(&self) -> bool {
        self.execution_status == ToolExecutionStatus::Skipped
    }

    /// pending -> running
    pub fn start_execution(&mut self) -> Result<(), TransitionError> {
        self.transition(ToolExecutionStatus::Running)?;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    /// running -> success
    pub fn mark_success(&mut self, result: ToolResult) -> Result<(), TransitionError> {
        self.transition(ToolExecutionStatus::Success)?;
        self.execution_result = Some(result);
        self.finish();
        Ok(())
    }

    /// Any non-terminal status -> failed
    pub fn mark_failed(&mut self, error: impl Into<String>) -> Result<(), TransitionError> {
        self.transition(ToolExecutionStatus::Failed)?;
        self.error_message = Some(error.into());
        self.finish();
        Ok(())
    }

    /// Fail but keep whatever the handler produced before it gave up
    pub fn mark_failed_with_partial(
        &mut self,
        error: impl Into<String>,
        partial: ToolResult,
    ) -> Result<(), TransitionError> {
        self.transition(ToolExecutionStatus::Failed)?;
        self.error_message = Some(error.into());
        self.execution_result = Some(partial);
        self.finish();
        Ok(())
    }

    /// Planned but deliberately not run
    pub fn mark_skipped(&mut self, reason: impl Into<String>) -> Result<(), TransitionError> {
        self.transition(ToolExecutionStatus::Skipped)?;
        let reason = reason.into();
        self.error_message = Some(reason.clone());
        self.execution_result = Some(ToolResult::Skipped { reason });
        self.finish();
        Ok(())
    }

    fn transition(&mut self, next: ToolExecutionStatus) -> Result<(), TransitionError> {
        if !self.execution_status.can_transition_to(next) {
            return Err(TransitionError {
                from: self.execution_status,
                to: next,
            });
        }
        self.execution_status = next;
        Ok(())
    }

    fn finish(&mut self) {
        let completed = Utc::now();
        // A call that never started is timed from the moment it was settled
        let started = *self.started_at.get_or_insert(completed);
        self.completed_at = Some(completed);
        self.execution_time_ms = Some(
            completed
                .signed_duration_since(started)
                .num_milliseconds()
                .max(0) as u64,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{DirectAnswerOutput, ToolArguments, ToolType};
    use proptest::prelude::*;

    fn call() -> ToolCall {
        ToolCall::new(ToolArguments::empty(ToolType::AnswerDirectly), "simple arithmetic")
    }

    fn answer() -> ToolResult {
        ToolResult::DirectAnswer(DirectAnswerOutput { answer: "4".into() })
    }

    #[test]
    fn test_happy_path() {
        let mut call = call();
        assert_eq!(call.status(), ToolExecutionStatus::Pending);
        assert!(call.execution_time_ms().is_none());

        call.start_execution().unwrap();
        assert_eq!(call.status(), ToolExecutionStatus::Running);
        assert!(call.started_at().is_some());
        assert!(call.execution_time_ms().is_none());

        call.mark_success(answer()).unwrap();
        assert!(call.is_success());
        assert!(call.completed_at().is_some());
        assert_eq!(call.result(), Some(&answer()));

        let expected = (call.completed_at().unwrap() - call.started_at().unwrap()).num_milliseconds();
        assert_eq!(call.execution_time_ms(), Some(expected as u64));
    }

    #[test]
    fn test_start_twice_rejected() {
        let mut call = call();
        call.start_execution().unwrap();
        let err = call.start_execution().unwrap_err();
        assert_eq!(
            err,
            TransitionError {
                from: ToolExecutionStatus::Running,
                to: ToolExecutionStatus::Running,
            }
        );
    }

    #[test]
    fn test_success_requires_running() {
        let mut call = call();
        assert!(call.mark_success(answer()).is_err());
        assert_eq!(call.status(), ToolExecutionStatus::Pending);
    }

    #[test]
    fn test_terminal_state_is_final() {
        let mut call = call();
        call.start_execution().unwrap();
        call.mark_failed("boom").unwrap();
        assert!(call.mark_success(answer()).is_err());
        assert!(call.mark_skipped("late").is_err());
        assert!(call.mark_failed("again").is_err());
        assert_eq!(call.error_message(), Some("boom"));
    }

    #[test]
    fn test_skip_from_pending_sets_timestamps() {
        let mut call = call();
        call.mark_skipped("duplicate of another call").unwrap();
        assert!(call.is_skipped());
        assert!(call.started_at().is_some());
        assert!(call.completed_at().is_some());
        assert_eq!(call.execution_time_ms(), Some(0));
        assert!(matches!(call.result(), Some(ToolResult::Skipped { .. })));
    }

    #[test]
    fn test_running_call_cannot_be_skipped() {
        let mut call = call();
        call.start_execution().unwrap();
        let err = call.mark_skipped("changed my mind").unwrap_err();
        assert_eq!(err.from, ToolExecutionStatus::Running);
        assert_eq!(err.to, ToolExecutionStatus::Skipped);
        assert_eq!(call.status(), ToolExecutionStatus::Running);
        assert!(call.result().is_none());
    }

    #[test]
    fn test_failed_with_partial_keeps_result() {
        let mut call = call();
        call.start_execution().unwrap();
        call.mark_failed_with_partial("cut short", answer()).unwrap();
        assert!(call.is_failed());
        assert_eq!(call.result(), Some(&answer()));
    }

    #[test]
    fn test_wire_round_trip_preserves_audit_fields() {
        let mut call = call();
        call.start_execution().unwrap();
        call.mark_success(answer()).unwrap();

        let json = serde_json::to_string(&call).unwrap();
        let back: ToolCall = serde_json::from_str(&json).unwrap();

        assert_eq!(back.tool_type, call.tool_type);
        assert_eq!(back.status(), call.status());
        assert_eq!(back.reasoning, call.reasoning);
        assert_eq!(back.created_at(), call.created_at());
        assert_eq!(back.started_at(), call.started_at());
        assert_eq!(back.completed_at(), call.completed_at());
    }

    #[derive(Debug, Clone)]
    enum Op {
        Start,
        Succeed,
        Fail,
        Skip,
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![Just(Op::Start), Just(Op::Succeed), Just(Op::Fail), Just(Op::Skip)]
    }

    proptest! {
        #[test]
        fn prop_status_never_moves_backwards(ops in proptest::collection::vec(op(), 0..12)) {
            let mut call = call();
            let mut terminal_seen = None;
            let mut started = false;

            for op in ops {
                let before = call.status();
                started |= before == ToolExecutionStatus::Running;
                let _ = match op {
                    Op::Start => call.start_execution(),
                    Op::Succeed => call.mark_success(answer()),
                    Op::Fail => call.mark_failed("x"),
                    Op::Skip => call.mark_skipped("x"),
                };
                let after = call.status();
                prop_assert!(before.is_forward(after));
                if started {
                    prop_assert_ne!(after, ToolExecutionStatus::Skipped);
                }

                if let Some(terminal) = terminal_seen {
                    prop_assert_eq!(after, terminal);
                } else if after.is_terminal() {
                    terminal_seen = Some(after);
                }
                prop_assert_eq!(call.execution_time_ms().is_some(), after.is_terminal());
            }
        }
    }
}
