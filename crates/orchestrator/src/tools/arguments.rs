//! Typed per-tool arguments
//!
//! Arguments arrive from the decision model as loose JSON; they are parsed
//! into one typed struct per tool and validated before any dispatch. Fields
//! that the executor injects from run context are optional here.

use super::ToolType;
use crate::context::{ChunkContent, ConfidenceLevel};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use validator::{Validate, ValidationErrors};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct RagArgs {
    #[validate(length(min = 1, max = 2000))]
    pub query: Option<String>,

    /// Retrieved chunks to ground the answer in
    pub chunk_contents: Option<Vec<ChunkContent>>,

    #[validate(range(min = 1, max = 10))]
    pub top_k: Option<usize>,

    /// Upper bound on the confidence the handler may report
    pub confidence_cap: Option<ConfidenceLevel>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct WebSearchArgs {
    #[validate(length(min = 1, max = 2000))]
    pub query: Option<String>,

    #[validate(range(min = 1, max = 10))]
    pub max_results: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct DirectAnswerArgs {
    #[validate(length(min = 1, max = 2000))]
    pub query: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct FormFillArgs {
    #[validate(length(min = 1, max = 2000))]
    pub query: Option<String>,

    /// Template identifier, when the decision model recognised one
    #[validate(length(min = 1, max = 100))]
    pub form_type: Option<String>,

    /// Field values already known from the conversation
    #[serde(default)]
    pub known_fields: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct ClarifyArgs {
    #[validate(length(min = 1, max = 2000))]
    pub query: Option<String>,

    /// What is ambiguous about the query
    #[validate(length(max = 500))]
    pub ambiguity: Option<String>,

    #[serde(default)]
    #[validate(length(max = 5))]
    pub suggestions: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct ImageAnalysisArgs {
    #[validate(length(min = 1, max = 2000))]
    pub query: Option<String>,

    #[validate(length(min = 1, max = 1000))]
    pub question: Option<String>,

    /// Raw image bytes; injected from the run, never sent over the wire
    #[serde(skip)]
    pub image_bytes: Option<Vec<u8>>,

    pub image_format: Option<String>,
}

/// Arguments bound to one ToolCall, one variant per tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "tool", rename_all = "snake_case")]
pub enum ToolArguments {
    UseRagContext(RagArgs),
    SearchWeb(WebSearchArgs),
    AnswerDirectly(DirectAnswerArgs),
    FillForm(FormFillArgs),
    ClarifyQuestion(ClarifyArgs),
    AnalyzeImage(ImageAnalysisArgs),
}

impl ToolArguments {
    /// Parse the loose JSON object the decision model produced for `tool`
    pub fn from_json(tool: ToolType, value: serde_json::Value) -> Result<Self, serde_json::Error> {
        // Models sometimes emit `null` or omit arguments entirely
        let value = match value {
            serde_json::Value::Null => serde_json::Value::Object(Default::default()),
            other => other,
        };
        Ok(match tool {
            ToolType::UseRagContext => ToolArguments::UseRagContext(serde_json::from_value(value)?),
            ToolType::SearchWeb => ToolArguments::SearchWeb(serde_json::from_value(value)?),
            ToolType::AnswerDirectly => ToolArguments::AnswerDirectly(serde_json::from_value(value)?),
            ToolType::FillForm => ToolArguments::FillForm(serde_json::from_value(value)?),
            ToolType::ClarifyQuestion => ToolArguments::ClarifyQuestion(serde_json::from_value(value)?),
            ToolType::AnalyzeImage => ToolArguments::AnalyzeImage(serde_json::from_value(value)?),
        })
    }

    /// Empty arguments for `tool`; everything is filled by context injection
    pub fn empty(tool: ToolType) -> Self {
        match tool {
            ToolType::UseRagContext => ToolArguments::UseRagContext(RagArgs::default()),
            ToolType::SearchWeb => ToolArguments::SearchWeb(WebSearchArgs::default()),
            ToolType::AnswerDirectly => ToolArguments::AnswerDirectly(DirectAnswerArgs::default()),
            ToolType::FillForm => ToolArguments::FillForm(FormFillArgs::default()),
            ToolType::ClarifyQuestion => ToolArguments::ClarifyQuestion(ClarifyArgs::default()),
            ToolType::AnalyzeImage => ToolArguments::AnalyzeImage(ImageAnalysisArgs::default()),
        }
    }

    pub fn tool_type(&self) -> ToolType {
        match self {
            ToolArguments::UseRagContext(_) => ToolType::UseRagContext,
            ToolArguments::SearchWeb(_) => ToolType::SearchWeb,
            ToolArguments::AnswerDirectly(_) => ToolType::AnswerDirectly,
            ToolArguments::FillForm(_) => ToolType::FillForm,
            ToolArguments::ClarifyQuestion(_) => ToolType::ClarifyQuestion,
            ToolArguments::AnalyzeImage(_) => ToolType::AnalyzeImage,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationErrors> {
        match self {
            ToolArguments::UseRagContext(args) => args.validate(),
            ToolArguments::SearchWeb(args) => args.validate(),
            ToolArguments::AnswerDirectly(args) => args.validate(),
            ToolArguments::FillForm(args) => args.validate(),
            ToolArguments::ClarifyQuestion(args) => args.validate(),
            ToolArguments::AnalyzeImage(args) => args.validate(),
        }
    }

    pub fn query(&self) -> Option<&str> {
        match self {
            ToolArguments::UseRagContext(args) => args.query.as_deref(),
            ToolArguments::SearchWeb(args) => args.query.as_deref(),
            ToolArguments::AnswerDirectly(args) => args.query.as_deref(),
            ToolArguments::FillForm(args) => args.query.as_deref(),
            ToolArguments::ClarifyQuestion(args) => args.query.as_deref(),
            ToolArguments::AnalyzeImage(args) => args.query.as_deref(),
        }
    }

    fn query_slot(&mut self) -> &mut Option<String> {
        match self {
            ToolArguments::UseRagContext(args) => &mut args.query,
            ToolArguments::SearchWeb(args) => &mut args.query,
            ToolArguments::AnswerDirectly(args) => &mut args.query,
            ToolArguments::FillForm(args) => &mut args.query,
            ToolArguments::ClarifyQuestion(args) => &mut args.query,
            ToolArguments::AnalyzeImage(args) => &mut args.query,
        }
    }

    /// Set the query if the decision model left it out; returns whether it was injected
    pub fn inject_query(&mut self, query: &str) -> bool {
        let slot = self.query_slot();
        match slot {
            Some(existing) if !existing.trim().is_empty() => false,
            _ => {
                *slot = Some(query.to_string());
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_typed() {
        let args = ToolArguments::from_json(
            ToolType::SearchWeb,
            json!({"query": "lịch thi học kỳ 2", "max_results": 3}),
        )
        .unwrap();

        assert_eq!(args.tool_type(), ToolType::SearchWeb);
        assert_eq!(args.query(), Some("lịch thi học kỳ 2"));
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_null_arguments_accepted() {
        let args = ToolArguments::from_json(ToolType::AnswerDirectly, serde_json::Value::Null).unwrap();
        assert_eq!(args, ToolArguments::empty(ToolType::AnswerDirectly));
    }

    #[test]
    fn test_wrong_field_type_is_error() {
        let result = ToolArguments::from_json(ToolType::SearchWeb, json!({"max_results": "many"}));
        assert!(result.is_err());
    }

    #[test]
    fn test_validation_rejects_out_of_range() {
        let args = ToolArguments::SearchWeb(WebSearchArgs {
            query: Some("x".into()),
            max_results: Some(50),
        });
        assert!(args.validate().is_err());

        let args = ToolArguments::UseRagContext(RagArgs {
            query: Some(String::new()),
            ..RagArgs::default()
        });
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_inject_query_only_when_absent() {
        let mut args = ToolArguments::empty(ToolType::FillForm);
        assert!(args.inject_query("đơn xin nghỉ học"));
        assert_eq!(args.query(), Some("đơn xin nghỉ học"));

        assert!(!args.inject_query("something else"));
        assert_eq!(args.query(), Some("đơn xin nghỉ học"));
    }

    #[test]
    fn test_wire_form_is_tagged() {
        let args = ToolArguments::ClarifyQuestion(ClarifyArgs {
            query: Some("học phí".into()),
            ambiguity: None,
            suggestions: vec!["Học phí học kỳ này?".into()],
        });
        let value = serde_json::to_value(&args).unwrap();
        assert_eq!(value["tool"], "clarify_question");
        assert_eq!(value["query"], "học phí");

        let back: ToolArguments = serde_json::from_value(value).unwrap();
        assert_eq!(back, args);
    }

    #[test]
    fn test_image_bytes_not_serialized() {
        let args = ToolArguments::AnalyzeImage(ImageAnalysisArgs {
            image_bytes: Some(vec![1, 2, 3]),
            image_format: Some("png".into()),
            ..ImageAnalysisArgs::default()
        });
        let value = serde_json::to_value(&args).unwrap();
        assert!(value.get("image_bytes").is_none());
        assert_eq!(value["image_format"], "png");
    }
}
