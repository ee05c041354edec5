//! General-knowledge answers without lookup

use super::{mismatch, required_query};
use crate::errors::ToolError;
use crate::executor::{ExecutionContext, ToolHandler};
use crate::tools::{DirectAnswerOutput, ToolArguments, ToolResult, ToolType};
use async_trait::async_trait;
use queryforge_common::{GenerateRequest, LlmClient};
use std::sync::Arc;

pub struct DirectAnswerHandler {
    llm: Arc<dyn LlmClient>,
    max_tokens: usize,
}

impl DirectAnswerHandler {
    pub fn new(llm: Arc<dyn LlmClient>, max_tokens: usize) -> Self {
        Self { llm, max_tokens }
    }
}

#[async_trait]
impl ToolHandler for DirectAnswerHandler {
    fn tool_type(&self) -> ToolType {
        ToolType::AnswerDirectly
    }

    async fn execute(
        &self,
        arguments: &ToolArguments,
        context: &ExecutionContext,
    ) -> Result<ToolResult, ToolError> {
        let ToolArguments::AnswerDirectly(args) = arguments else {
            return Err(mismatch(self.tool_type(), arguments));
        };
        let query = required_query(self.tool_type(), args.query.as_deref())?;

        let request = GenerateRequest::new(query)
            .with_system_prompt(format!(
                "You are a friendly university student assistant. Answer from general knowledge, \
                 briefly and accurately. Answer in {}.",
                context.language.name()
            ))
            .with_temperature(0.5)
            .with_max_tokens(self.max_tokens);

        let answer = self
            .llm
            .generate(request)
            .await
            .map_err(|e| ToolError::upstream(self.tool_type(), e))?;

        Ok(ToolResult::DirectAnswer(DirectAnswerOutput {
            answer: answer.trim().to_string(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{Language, UserContext, VectorSearchReference};
    use crate::tools::DirectAnswerArgs;
    use queryforge_common::llm::MockLlmClient;

    #[tokio::test]
    async fn test_answers_in_user_language() {
        let llm = MockLlmClient::new().with_reply(" 4 ");
        let handler = DirectAnswerHandler::new(Arc::new(llm.clone()), 500);
        let context = ExecutionContext {
            query: "2+2=?".into(),
            vector_reference: VectorSearchReference::empty(),
            image: None,
            user_context: UserContext::default(),
            language: Language::En,
        };
        let arguments = ToolArguments::AnswerDirectly(DirectAnswerArgs {
            query: Some("2+2=?".into()),
        });

        let result = handler.execute(&arguments, &context).await.unwrap();

        assert_eq!(result.raw_text().as_deref(), Some("4"));
        let request = &llm.calls()[0];
        assert_eq!(request.prompt, "2+2=?");
        assert!(request.system_prompt.as_deref().unwrap_or_default().contains("English"));
    }
}
