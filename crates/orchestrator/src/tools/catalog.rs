//! Static, versioned tool catalog consumed by the decision engine
//!
//! Descriptions are decision rules for the model: each says when the tool
//! fits and when it does not. Code never branches on them.

use super::ToolType;
use crate::errors::{OrchestratorError, Result};
use serde::Serialize;
use serde_json::{json, Value};

/// Bumped whenever a description or parameter schema changes
pub const CATALOG_VERSION: &str = "2024.3";

/// One catalog entry
#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    pub name: ToolType,
    pub description: String,
    /// JSON-schema-like parameter schema
    pub parameters: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolCatalog {
    pub version: String,
    tools: Vec<ToolDefinition>,
}

impl ToolCatalog {
    pub fn new(version: impl Into<String>, tools: Vec<ToolDefinition>) -> Self {
        Self {
            version: version.into(),
            tools,
        }
    }

    /// The built-in catalog covering every ToolType
    pub fn standard() -> Self {
        let query = json!({
            "type": "string",
            "description": "The question to work on. Defaults to the user's query."
        });

        let tools = vec![
            ToolDefinition {
                name: ToolType::UseRagContext,
                description: "Answer from the institution's internal knowledge base (regulations, \
                    procedures, tuition, schedules, announcements). Use when the retrieved \
                    reference chunks look relevant to the question. Do NOT use for general \
                    knowledge, small talk, or when the user wants a form document."
                    .to_string(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "query": query,
                        "top_k": {"type": "integer", "minimum": 1, "maximum": 10}
                    }
                }),
            },
            ToolDefinition {
                name: ToolType::SearchWeb,
                description: "Search the public web for current or external information \
                    (news, recent events, facts outside the institution). Use together with \
                    use_rag_context when internal information may be outdated. Do NOT use \
                    for questions the internal knowledge base clearly covers."
                    .to_string(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "query": query,
                        "max_results": {"type": "integer", "minimum": 1, "maximum": 10}
                    }
                }),
            },
            ToolDefinition {
                name: ToolType::AnswerDirectly,
                description: "Answer from general knowledge without any lookup: greetings, \
                    arithmetic, definitions, writing help. Use even when the reference score \
                    is low. Do NOT use for institution-specific facts."
                    .to_string(),
                parameters: json!({
                    "type": "object",
                    "properties": { "query": query }
                }),
            },
            ToolDefinition {
                name: ToolType::FillForm,
                description: "Produce a pre-filled administrative form (leave of absence, \
                    transcript request, student certificate). Use when the user asks for a \
                    form, template or application document, even if reference chunks about \
                    that form score highly. Do NOT use to explain a procedure."
                    .to_string(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "query": query,
                        "form_type": {
                            "type": "string",
                            "enum": ["leave_of_absence", "transcript_request", "student_certificate"]
                        },
                        "known_fields": {
                            "type": "object",
                            "additionalProperties": {"type": "string"}
                        }
                    }
                }),
            },
            ToolDefinition {
                name: ToolType::ClarifyQuestion,
                description: "Ask the user to clarify an ambiguous or incomplete question. \
                    Use when several readings are plausible and guessing would mislead. Do \
                    NOT use when one reading is clearly the most likely."
                    .to_string(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "query": query,
                        "ambiguity": {"type": "string", "maxLength": 500},
                        "suggestions": {
                            "type": "array",
                            "items": {"type": "string"},
                            "maxItems": 5
                        }
                    }
                }),
            },
            ToolDefinition {
                name: ToolType::AnalyzeImage,
                description: "Describe or read an image the user attached (screenshots, \
                    photos of notices, documents). Use only when an image is attached. Do \
                    NOT use otherwise."
                    .to_string(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "query": query,
                        "question": {"type": "string", "maxLength": 1000}
                    }
                }),
            },
        ];

        Self::new(CATALOG_VERSION, tools)
    }

    pub fn tools(&self) -> &[ToolDefinition] {
        &self.tools
    }

    pub fn definition(&self, tool: ToolType) -> Option<&ToolDefinition> {
        self.tools.iter().find(|d| d.name == tool)
    }

    /// Every ToolType must have an entry
    pub fn ensure_complete(&self) -> Result<()> {
        for tool in ToolType::ALL {
            if self.definition(tool).is_none() {
                return Err(OrchestratorError::MissingCatalogEntry(tool));
            }
        }
        Ok(())
    }

    /// Render the catalog as the tool section of the decision prompt
    pub fn render_for_prompt(&self) -> String {
        let mut out = format!("Available tools (catalog v{}):\n", self.version);
        for def in &self.tools {
            out.push_str(&format!(
                "\n- {}: {}\n  parameters: {}\n",
                def.name, def.description, def.parameters
            ));
        }
        out
    }
}

impl Default for ToolCatalog {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_catalog_complete() {
        let catalog = ToolCatalog::standard();
        assert!(catalog.ensure_complete().is_ok());
        assert_eq!(catalog.tools().len(), ToolType::ALL.len());
    }

    #[test]
    fn test_missing_entry_detected() {
        let mut tools = ToolCatalog::standard().tools().to_vec();
        tools.retain(|d| d.name != ToolType::AnalyzeImage);
        let catalog = ToolCatalog::new("test", tools);

        let err = catalog.ensure_complete().unwrap_err();
        assert!(matches!(err, OrchestratorError::MissingCatalogEntry(ToolType::AnalyzeImage)));
    }

    #[test]
    fn test_descriptions_carry_negative_guidance() {
        for def in ToolCatalog::standard().tools() {
            assert!(def.description.contains("Do NOT"), "{} lacks a negative rule", def.name);
        }
    }

    #[test]
    fn test_prompt_lists_every_tool() {
        let prompt = ToolCatalog::standard().render_for_prompt();
        assert!(prompt.contains(CATALOG_VERSION));
        for tool in ToolType::ALL {
            assert!(prompt.contains(tool.as_str()));
        }
    }
}
