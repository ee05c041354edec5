//! Tool model: types, typed arguments and results, the ToolCall
//! lifecycle and the static tool catalog.

mod arguments;
mod call;
mod catalog;
mod results;

pub use arguments::{
    ClarifyArgs, DirectAnswerArgs, FormFillArgs, ImageAnalysisArgs, RagArgs, ToolArguments,
    WebSearchArgs,
};
pub use call::ToolCall;
pub use catalog::{ToolCatalog, ToolDefinition, CATALOG_VERSION};
pub use results::{
    ClarificationOutput, DirectAnswerOutput, FormOutput, ImageAnalysisOutput, RagOutput,
    ToolResult, WebResult, WebSearchOutput,
};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The closed set of capabilities the orchestrator can invoke
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolType {
    UseRagContext,
    SearchWeb,
    AnswerDirectly,
    FillForm,
    ClarifyQuestion,
    AnalyzeImage,
}

impl ToolType {
    /// Every tool type, in catalog order
    pub const ALL: [ToolType; 6] = [
        ToolType::UseRagContext,
        ToolType::SearchWeb,
        ToolType::AnswerDirectly,
        ToolType::FillForm,
        ToolType::ClarifyQuestion,
        ToolType::AnalyzeImage,
    ];

    /// Wire name, as used in the catalog and by the decision model
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolType::UseRagContext => "use_rag_context",
            ToolType::SearchWeb => "search_web",
            ToolType::AnswerDirectly => "answer_directly",
            ToolType::FillForm => "fill_form",
            ToolType::ClarifyQuestion => "clarify_question",
            ToolType::AnalyzeImage => "analyze_image",
        }
    }

    /// Provenance tag reported in `sources_used`
    pub fn source_tag(&self) -> &'static str {
        match self {
            ToolType::UseRagContext => "rag",
            ToolType::SearchWeb => "web",
            ToolType::AnswerDirectly => "direct",
            ToolType::FillForm => "form",
            ToolType::ClarifyQuestion => "clarification",
            ToolType::AnalyzeImage => "image",
        }
    }
}

impl fmt::Display for ToolType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a tool name is not in the closed set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownToolName(pub String);

impl fmt::Display for UnknownToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown tool name '{}'", self.0)
    }
}

impl std::error::Error for UnknownToolName {}

impl FromStr for ToolType {
    type Err = UnknownToolName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ToolType::ALL
            .into_iter()
            .find(|t| t.as_str() == s.trim())
            .ok_or_else(|| UnknownToolName(s.to_string()))
    }
}

/// ToolCall lifecycle status; only ever moves forward
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolExecutionStatus {
    Pending,
    Running,
    Success,
    Failed,
    Skipped,
}

impl ToolExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolExecutionStatus::Pending => "pending",
            ToolExecutionStatus::Running => "running",
            ToolExecutionStatus::Success => "success",
            ToolExecutionStatus::Failed => "failed",
            ToolExecutionStatus::Skipped => "skipped",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ToolExecutionStatus::Success | ToolExecutionStatus::Failed | ToolExecutionStatus::Skipped
        )
    }

    /// Position in the lifecycle; terminal states share the last rank
    fn rank(&self) -> u8 {
        match self {
            ToolExecutionStatus::Pending => 0,
            ToolExecutionStatus::Running => 1,
            _ => 2,
        }
    }

    /// Whether `next` is a legal forward move from this status
    pub fn can_transition_to(&self, next: ToolExecutionStatus) -> bool {
        match (self, next) {
            (ToolExecutionStatus::Pending, ToolExecutionStatus::Running) => true,
            (ToolExecutionStatus::Running, ToolExecutionStatus::Success) => true,
            // A started call can only end in success or failure
            (ToolExecutionStatus::Pending, ToolExecutionStatus::Skipped) => true,
            (from, ToolExecutionStatus::Failed) => !from.is_terminal(),
            _ => false,
        }
    }

    /// Whether `next` is not earlier in the lifecycle than this status
    pub fn is_forward(&self, next: ToolExecutionStatus) -> bool {
        next.rank() >= self.rank()
    }
}

impl fmt::Display for ToolExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
