//! LLM client abstraction
//!
//! Provides a unified interface over text-generation providers:
//! - OpenAI-compatible chat completions (blocking and streaming)
//! - A scriptable mock for tests and offline runs

mod mock;
mod openai;
mod sse;

pub use mock::MockLlmClient;
pub use openai::OpenAiClient;

use crate::config::LlmSettings;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;

/// Stream of incremental text deltas
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// A single generation request
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateRequest {
    /// System prompt guiding model behavior
    pub system_prompt: Option<String>,

    /// User prompt
    pub prompt: String,

    /// Sampling temperature (0.0 = deterministic)
    pub temperature: f32,

    /// Maximum output tokens
    pub max_tokens: usize,

    /// Ask the provider for a JSON object response
    pub json_mode: bool,
}

impl GenerateRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: None,
            prompt: prompt.into(),
            temperature: 0.7,
            max_tokens: 1000,
            json_mode: false,
        }
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn json(mut self) -> Self {
        self.json_mode = true;
        self
    }
}

/// Raw image payload for vision-capable models
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData {
    pub bytes: Vec<u8>,
    /// Format such as "png" or "jpeg"
    pub format: String,
}

/// Trait for text generation
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Generate a complete response
    async fn generate(&self, request: GenerateRequest) -> Result<String>;

    /// Generate a response as a stream of text deltas
    async fn stream_generate(&self, request: GenerateRequest) -> Result<TextStream>;

    /// Answer a question about an image
    async fn analyze_image(&self, _request: GenerateRequest, _image: &ImageData) -> Result<String> {
        Err(AppError::Unsupported {
            capability: format!("image analysis with model {}", self.model_name()),
        })
    }

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// Create an LLM client based on configuration
pub fn create_llm_client(settings: &LlmSettings) -> Result<Arc<dyn LlmClient>> {
    match settings.provider.as_str() {
        "openai" => {
            let api_key = settings.api_key.clone().ok_or_else(|| AppError::MissingField {
                field: "llm.api_key".to_string(),
            })?;
            Ok(Arc::new(OpenAiClient::new(api_key, settings)?))
        }
        "mock" => Ok(Arc::new(MockLlmClient::new())),
        other => Err(AppError::Configuration {
            message: format!("unknown llm provider: {}", other),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builder() {
        let request = GenerateRequest::new("hello")
            .with_system_prompt("be brief")
            .with_temperature(0.0)
            .with_max_tokens(64)
            .json();

        assert_eq!(request.prompt, "hello");
        assert_eq!(request.system_prompt.as_deref(), Some("be brief"));
        assert_eq!(request.temperature, 0.0);
        assert_eq!(request.max_tokens, 64);
        assert!(request.json_mode);
    }

    #[test]
    fn test_openai_provider_requires_key() {
        let settings = LlmSettings {
            provider: "openai".to_string(),
            ..LlmSettings::default()
        };
        let err = create_llm_client(&settings).err().unwrap();
        assert!(matches!(err, AppError::MissingField { ref field } if field == "llm.api_key"));
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let settings = LlmSettings {
            provider: "carrier-pigeon".to_string(),
            ..LlmSettings::default()
        };
        assert!(create_llm_client(&settings).is_err());
    }

    #[tokio::test]
    async fn test_mock_provider_has_no_vision() {
        let client = create_llm_client(&LlmSettings::default()).unwrap();
        let image = ImageData {
            bytes: vec![0x89, 0x50],
            format: "png".to_string(),
        };
        let err = client
            .analyze_image(GenerateRequest::new("what is this?"), &image)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Unsupported { .. }));
    }
}
