//! Image analysis through a vision-capable model

use super::{mismatch, required_query};
use crate::errors::ToolError;
use crate::executor::{ExecutionContext, ToolHandler};
use crate::tools::{ImageAnalysisOutput, ToolArguments, ToolResult, ToolType};
use async_trait::async_trait;
use queryforge_common::llm::ImageData;
use queryforge_common::{GenerateRequest, LlmClient};
use std::sync::Arc;

pub struct ImageAnalysisHandler {
    llm: Arc<dyn LlmClient>,
}

impl ImageAnalysisHandler {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl ToolHandler for ImageAnalysisHandler {
    fn tool_type(&self) -> ToolType {
        ToolType::AnalyzeImage
    }

    async fn execute(
        &self,
        arguments: &ToolArguments,
        context: &ExecutionContext,
    ) -> Result<ToolResult, ToolError> {
        let ToolArguments::AnalyzeImage(args) = arguments else {
            return Err(mismatch(self.tool_type(), arguments));
        };
        let query = required_query(self.tool_type(), args.query.as_deref())?;

        let bytes = args
            .image_bytes
            .clone()
            .filter(|b| !b.is_empty())
            .ok_or_else(|| ToolError::MissingInput {
                tool: self.tool_type(),
                field: "image_bytes".to_string(),
            })?;
        let format = args.image_format.clone().unwrap_or_else(|| "png".to_string());
        let question = args.question.as_deref().unwrap_or(query);

        let request = GenerateRequest::new(question)
            .with_system_prompt(format!(
                "Describe what the image shows as it relates to the question. Transcribe any \
                 notice or document text that matters. Answer in {}.",
                context.language.name()
            ))
            .with_temperature(0.2)
            .with_max_tokens(800);
        let image = ImageData {
            bytes,
            format: format.clone(),
        };

        let analysis = self
            .llm
            .analyze_image(request, &image)
            .await
            .map_err(|e| ToolError::upstream(self.tool_type(), e))?;

        Ok(ToolResult::ImageAnalysis(ImageAnalysisOutput {
            analysis: analysis.trim().to_string(),
            image_format: format,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{Language, UserContext, VectorSearchReference};
    use crate::tools::ImageAnalysisArgs;
    use queryforge_common::llm::MockLlmClient;

    fn context() -> ExecutionContext {
        ExecutionContext {
            query: "Đây là gì?".into(),
            vector_reference: VectorSearchReference::empty(),
            image: None,
            user_context: UserContext::default(),
            language: Language::Vi,
        }
    }

    #[tokio::test]
    async fn test_missing_image_is_error() {
        let handler = ImageAnalysisHandler::new(Arc::new(MockLlmClient::new().with_vision()));
        let arguments = ToolArguments::AnalyzeImage(ImageAnalysisArgs {
            query: Some("Đây là gì?".into()),
            ..ImageAnalysisArgs::default()
        });

        let err = handler.execute(&arguments, &context()).await.unwrap_err();
        assert!(matches!(err, ToolError::MissingInput { ref field, .. } if field == "image_bytes"));
    }

    #[tokio::test]
    async fn test_forwards_image_to_model() {
        let llm = MockLlmClient::new().with_vision().with_reply("Thông báo lịch thi");
        let handler = ImageAnalysisHandler::new(Arc::new(llm.clone()));
        let arguments = ToolArguments::AnalyzeImage(ImageAnalysisArgs {
            query: Some("Đây là gì?".into()),
            question: Some("Thông báo này nói gì?".into()),
            image_bytes: Some(vec![0xff, 0xd8, 0xff]),
            image_format: Some("jpeg".into()),
        });

        let result = handler.execute(&arguments, &context()).await.unwrap();
        let ToolResult::ImageAnalysis(output) = result else {
            panic!("expected image analysis");
        };

        assert!(output.analysis.contains("Thông báo lịch thi"));
        assert!(output.analysis.contains("3 bytes"));
        assert_eq!(output.image_format, "jpeg");
        assert_eq!(llm.calls()[0].prompt, "Thông báo này nói gì?");
    }

    #[tokio::test]
    async fn test_model_without_vision_fails_tool() {
        let handler = ImageAnalysisHandler::new(Arc::new(MockLlmClient::new()));
        let arguments = ToolArguments::AnalyzeImage(ImageAnalysisArgs {
            query: Some("Đây là gì?".into()),
            image_bytes: Some(vec![1]),
            ..ImageAnalysisArgs::default()
        });

        let err = handler.execute(&arguments, &context()).await.unwrap_err();
        assert!(matches!(err, ToolError::Upstream { tool: ToolType::AnalyzeImage, .. }));
    }
}
