//! Post-execution confidence and provenance assessment

use crate::context::ConfidenceLevel;
use crate::tools::{ToolCall, ToolType};
use serde::Serialize;

/// Outcome of assessing a run's ToolCalls
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Assessment {
    pub confidence: ConfidenceLevel,
    pub sources: Vec<String>,
}

/// Confidence from terminal ToolCalls.
///
/// Any failure gives low. Otherwise a successful RAG call's own high or low
/// passes through. Otherwise the success rate over executed (non-skipped)
/// calls decides: >= 0.9 high, >= 0.5 medium, else low.
pub fn assess_confidence(calls: &[ToolCall]) -> ConfidenceLevel {
    if calls.iter().any(ToolCall::is_failed) {
        return ConfidenceLevel::Low;
    }

    let rag_confidence = calls
        .iter()
        .filter(|c| c.is_success() && c.tool_type == ToolType::UseRagContext)
        .find_map(|c| c.result().and_then(|r| r.confidence()));
    if let Some(level @ (ConfidenceLevel::High | ConfidenceLevel::Low)) = rag_confidence {
        return level;
    }

    let executed = calls.iter().filter(|c| !c.is_skipped()).count();
    let successful = calls.iter().filter(|c| c.is_success()).count();
    let success_rate = if executed == 0 {
        0.0
    } else {
        successful as f64 / executed as f64
    };

    if success_rate >= 0.9 {
        ConfidenceLevel::High
    } else if success_rate >= 0.5 {
        ConfidenceLevel::Medium
    } else {
        ConfidenceLevel::Low
    }
}

/// Source tags of successful calls, first-seen order, no duplicates
pub fn extract_sources(calls: &[ToolCall]) -> Vec<String> {
    let mut sources: Vec<String> = Vec::new();
    for call in calls.iter().filter(|c| c.is_success()) {
        let tag = call.tool_type.source_tag();
        if !sources.iter().any(|s| s == tag) {
            sources.push(tag.to_string());
        }
    }
    sources
}

/// Assess a run; a failed decision forces low confidence
pub fn assess(calls: &[ToolCall], decision_failed: bool) -> Assessment {
    let confidence = if decision_failed {
        ConfidenceLevel::Low
    } else {
        assess_confidence(calls)
    };
    Assessment {
        confidence,
        sources: extract_sources(calls),
    }
}
