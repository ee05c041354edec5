//! Mock LLM client for testing and offline runs.
//!
//! Supports:
//! - Pre-configured responses (consumed in order)
//! - A responder closure for prompt-dependent answers
//! - Error injection and simulated latency
//! - Call recording for verification

use super::{GenerateRequest, ImageData, LlmClient, TextStream};
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use futures::stream;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

type Responder = dyn Fn(&GenerateRequest) -> Result<String> + Send + Sync;

/// A configured mock response
#[derive(Debug, Clone)]
pub enum MockReply {
    Text(String),
    /// Fail with an upstream error carrying this message
    Error(String),
    /// Fail with a timeout
    Timeout,
}

/// Mock LLM client
#[derive(Clone)]
pub struct MockLlmClient {
    replies: Arc<Mutex<VecDeque<MockReply>>>,
    responder: Option<Arc<Responder>>,
    delay: Duration,
    vision: bool,
    /// Fail the stream after this many deltas
    stream_fail_after: Option<usize>,
    calls: Arc<Mutex<Vec<GenerateRequest>>>,
}

impl Default for MockLlmClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self {
            replies: Arc::new(Mutex::new(VecDeque::new())),
            responder: None,
            delay: Duration::ZERO,
            vision: false,
            stream_fail_after: None,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Queue a text reply
    pub fn with_reply(self, text: impl Into<String>) -> Self {
        self.push(MockReply::Text(text.into()));
        self
    }

    /// Queue an upstream failure
    pub fn with_error(self, message: impl Into<String>) -> Self {
        self.push(MockReply::Error(message.into()));
        self
    }

    /// Queue a timeout
    pub fn with_timeout(self) -> Self {
        self.push(MockReply::Timeout);
        self
    }

    /// Answer every request not covered by the queue with this closure
    pub fn with_responder<F>(mut self, responder: F) -> Self
    where
        F: Fn(&GenerateRequest) -> Result<String> + Send + Sync + 'static,
    {
        let responder: Arc<Responder> = Arc::new(responder);
        self.responder = Some(responder);
        self
    }

    /// Sleep before each reply
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Accept image analysis requests
    pub fn with_vision(mut self) -> Self {
        self.vision = true;
        self
    }

    /// Break streams after `deltas` chunks have been yielded
    pub fn with_stream_failure_after(mut self, deltas: usize) -> Self {
        self.stream_fail_after = Some(deltas);
        self
    }

    /// Requests received so far
    pub fn calls(&self) -> Vec<GenerateRequest> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Number of requests received so far
    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or_default()
    }

    fn push(&self, reply: MockReply) {
        if let Ok(mut replies) = self.replies.lock() {
            replies.push_back(reply);
        }
    }

    async fn reply(&self, request: &GenerateRequest) -> Result<String> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(request.clone());
        }

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let queued = self.replies.lock().ok().and_then(|mut r| r.pop_front());
        match queued {
            Some(MockReply::Text(text)) => Ok(text),
            Some(MockReply::Error(message)) => Err(AppError::Llm {
                message,
                status: Some(503),
            }),
            Some(MockReply::Timeout) => Err(AppError::LlmTimeout {
                timeout_ms: self.delay.as_millis() as u64,
            }),
            None => match &self.responder {
                Some(responder) => responder(request),
                None => Ok(format!("[mock] {}", first_line(&request.prompt))),
            },
        }
    }
}

fn first_line(text: &str) -> &str {
    text.lines().find(|l| !l.trim().is_empty()).unwrap_or("").trim()
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn generate(&self, request: GenerateRequest) -> Result<String> {
        self.reply(&request).await
    }

    async fn stream_generate(&self, request: GenerateRequest) -> Result<TextStream> {
        let text = self.reply(&request).await?;

        // Split on word boundaries, keeping the separators with each delta
        let mut deltas: Vec<Result<String>> = text
            .split_inclusive(' ')
            .map(|w| Ok(w.to_string()))
            .collect();

        if let Some(limit) = self.stream_fail_after {
            deltas.truncate(limit);
            deltas.push(Err(AppError::Llm {
                message: "mock stream interrupted".to_string(),
                status: None,
            }));
        }

        Ok(Box::pin(stream::iter(deltas)))
    }

    async fn analyze_image(&self, request: GenerateRequest, image: &ImageData) -> Result<String> {
        if !self.vision {
            return Err(AppError::Unsupported {
                capability: "image analysis with model mock-llm".to_string(),
            });
        }
        let answer = self.reply(&request).await?;
        Ok(format!("{} ({} bytes, {})", answer, image.bytes.len(), image.format))
    }

    fn model_name(&self) -> &str {
        "mock-llm"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_queue_then_responder() {
        let client = MockLlmClient::new()
            .with_reply("first")
            .with_error("boom")
            .with_responder(|req| Ok(format!("echo: {}", req.prompt)));

        assert_eq!(client.generate(GenerateRequest::new("a")).await.unwrap(), "first");
        assert!(client.generate(GenerateRequest::new("b")).await.is_err());
        assert_eq!(client.generate(GenerateRequest::new("c")).await.unwrap(), "echo: c");
        assert_eq!(client.call_count(), 3);
    }

    #[tokio::test]
    async fn test_stream_reassembles_text() {
        let client = MockLlmClient::new().with_reply("hai cộng hai bằng bốn");
        let stream = client.stream_generate(GenerateRequest::new("2+2")).await.unwrap();
        let text: String = stream.map(|d| d.unwrap()).collect::<Vec<_>>().await.concat();
        assert_eq!(text, "hai cộng hai bằng bốn");
    }

    #[tokio::test]
    async fn test_stream_failure_injection() {
        let client = MockLlmClient::new()
            .with_reply("one two three")
            .with_stream_failure_after(1);
        let items: Vec<Result<String>> = client
            .stream_generate(GenerateRequest::new("x"))
            .await
            .unwrap()
            .collect()
            .await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), "one ");
        assert!(items[1].is_err());
    }

    #[tokio::test]
    async fn test_default_reply_echoes_first_line() {
        let client = MockLlmClient::new();
        let reply = client.generate(GenerateRequest::new("\n  Question: hi\nmore")).await.unwrap();
        assert_eq!(reply, "[mock] Question: hi");
    }

    #[test]
    fn test_vision_and_timeout_replies() {
        let client = MockLlmClient::new().with_vision().with_reply("a notice").with_timeout();
        let image = ImageData {
            bytes: vec![1, 2, 3],
            format: "jpeg".to_string(),
        };

        let analysis = tokio_test::block_on(client.analyze_image(GenerateRequest::new("what?"), &image));
        assert_eq!(tokio_test::assert_ok!(analysis), "a notice (3 bytes, jpeg)");

        let err = tokio_test::assert_err!(tokio_test::block_on(client.generate(GenerateRequest::new("x"))));
        assert!(matches!(err, AppError::LlmTimeout { .. }));
    }
}
