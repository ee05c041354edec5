//! Built-in tool handlers, one per ToolType

mod clarify;
mod direct;
mod form;
mod image;
mod rag;
mod web_search;

pub use clarify::ClarifyHandler;
pub use direct::DirectAnswerHandler;
pub use form::{FormField, FormFillHandler, FormTemplate, FormTemplateRegistry};
pub use image::ImageAnalysisHandler;
pub use rag::RagHandler;
pub use web_search::{DisabledSearchBackend, HttpSearchBackend, SearchBackend, WebSearchHandler};

use crate::errors::ToolError;
use crate::tools::{ToolArguments, ToolType};

/// Reject arguments built for a different tool
fn mismatch(tool: ToolType, arguments: &ToolArguments) -> ToolError {
    ToolError::ArgumentMismatch {
        tool,
        received: arguments.tool_type(),
    }
}

/// The query, which context injection guarantees for dispatched calls
fn required_query(tool: ToolType, query: Option<&str>) -> Result<&str, ToolError> {
    query
        .filter(|q| !q.trim().is_empty())
        .ok_or_else(|| ToolError::MissingInput {
            tool,
            field: "query".to_string(),
        })
}
