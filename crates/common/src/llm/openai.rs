//! OpenAI-compatible chat completions client

use super::sse::text_deltas;
use super::{GenerateRequest, ImageData, LlmClient, TextStream};
use crate::config::LlmSettings;
use crate::errors::{AppError, Result};
use crate::metrics::{record_llm_request, PhaseTimer};
use async_trait::async_trait;
use backoff::ExponentialBackoffBuilder;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// OpenAI chat completions client
pub struct OpenAiClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    timeout: Duration,
    max_retries: u32,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: MessageContent,
}

/// Plain text, or a list of parts for multimodal messages
#[derive(Serialize)]
#[serde(untagged)]
enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Serialize)]
struct ImageUrl {
    url: String,
}

/// MIME type for an image format name
fn image_mime(format: &str) -> Result<&'static str> {
    match format.to_ascii_lowercase().as_str() {
        "png" => Ok("image/png"),
        "jpeg" | "jpg" => Ok("image/jpeg"),
        "gif" => Ok("image/gif"),
        "webp" => Ok("image/webp"),
        other => Err(AppError::InvalidFormat {
            message: format!("unsupported image format: {}", other),
        }),
    }
}

#[derive(Serialize)]
struct ResponseFormat {
    r#type: &'static str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    max_tokens: usize,
    temperature: f32,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Deserialize)]
struct ChatMessageResponse {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

impl OpenAiClient {
    /// Create a new OpenAI client
    pub fn new(api_key: String, settings: &LlmSettings) -> Result<Self> {
        let timeout = Duration::from_secs(settings.timeout_secs);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Configuration {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            api_key,
            model: settings.model.clone(),
            base_url: settings.api_base.trim_end_matches('/').to_string(),
            timeout,
            max_retries: settings.max_retries,
        })
    }

    fn build_body(&self, request: &GenerateRequest, stream: bool) -> serde_json::Value {
        self.body_with_content(request, MessageContent::Text(request.prompt.clone()), stream)
    }

    /// Body carrying the prompt and the image as a base64 `data:` URI
    fn build_vision_body(&self, request: &GenerateRequest, image: &ImageData) -> Result<serde_json::Value> {
        let url = format!("data:{};base64,{}", image_mime(&image.format)?, BASE64.encode(&image.bytes));
        let content = MessageContent::Parts(vec![
            ContentPart::Text {
                text: request.prompt.clone(),
            },
            ContentPart::ImageUrl {
                image_url: ImageUrl { url },
            },
        ]);
        Ok(self.body_with_content(request, content, false))
    }

    fn body_with_content(
        &self,
        request: &GenerateRequest,
        user_content: MessageContent,
        stream: bool,
    ) -> serde_json::Value {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &request.system_prompt {
            messages.push(ChatMessage {
                role: "system",
                content: MessageContent::Text(system.clone()),
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: user_content,
        });

        let body = ChatRequest {
            model: &self.model,
            messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            stream,
            response_format: request.json_mode.then_some(ResponseFormat { r#type: "json_object" }),
        };

        serde_json::to_value(body).unwrap_or(serde_json::Value::Null)
    }

    async fn send(&self, body: &serde_json::Value) -> Result<reqwest::Response> {
        let url = format!("{}/chat/completions", self.base_url);

        let response = self.client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AppError::LlmTimeout {
                        timeout_ms: self.timeout.as_millis() as u64,
                    }
                } else {
                    AppError::Llm {
                        message: format!("LLM API request failed: {}", e),
                        status: None,
                    }
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(AppError::Llm {
                message: format!("LLM API error {}: {}", status, text),
                status: Some(status.as_u16()),
            });
        }

        Ok(response)
    }

    /// Send with exponential backoff on transient failures
    async fn send_with_retry(&self, body: &serde_json::Value) -> Result<reqwest::Response> {
        let policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(200))
            .with_max_elapsed_time(Some(self.timeout * (self.max_retries + 1)))
            .build();

        let max_attempts = self.max_retries + 1;
        let mut attempt = 0u32;

        backoff::future::retry(policy, || {
            attempt += 1;
            let current = attempt;
            async move {
                match self.send(body).await {
                    Ok(response) => Ok(response),
                    Err(e) if e.is_retryable() && current < max_attempts => {
                        tracing::warn!(
                            attempt = current,
                            max_attempts = max_attempts,
                            error = %e,
                            "LLM request failed, retrying"
                        );
                        Err(backoff::Error::transient(e))
                    }
                    Err(e) => Err(backoff::Error::permanent(e)),
                }
            }
        })
        .await
    }

    async fn complete(&self, body: serde_json::Value) -> Result<String> {
        let timer = PhaseTimer::start();
        let result = self.complete_inner(&body).await;
        record_llm_request(timer.elapsed_secs(), &self.model, result.is_ok());
        result
    }

    async fn complete_inner(&self, body: &serde_json::Value) -> Result<String> {
        let response = self.send_with_retry(body).await?;

        let chat_response: ChatResponse = response.json().await.map_err(|e| AppError::Llm {
            message: format!("Failed to parse LLM response: {}", e),
            status: None,
        })?;

        chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| AppError::Llm {
                message: "Empty response from LLM".to_string(),
                status: None,
            })
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn generate(&self, request: GenerateRequest) -> Result<String> {
        let body = self.build_body(&request, false);
        self.complete(body).await
    }

    async fn stream_generate(&self, request: GenerateRequest) -> Result<TextStream> {
        let body = self.build_body(&request, true);
        let timer = PhaseTimer::start();
        let response = self.send_with_retry(&body).await;
        record_llm_request(timer.elapsed_secs(), &self.model, response.is_ok());

        let bytes = Box::pin(response?.bytes_stream());
        Ok(Box::pin(text_deltas(bytes)))
    }

    async fn analyze_image(&self, request: GenerateRequest, image: &ImageData) -> Result<String> {
        let body = self.build_vision_body(&request, image)?;
        self.complete(body).await
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
