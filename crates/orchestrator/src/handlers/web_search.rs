//! External web search

use super::{mismatch, required_query};
use crate::errors::ToolError;
use crate::executor::{ExecutionContext, ToolHandler};
use crate::tools::{ToolArguments, ToolResult, ToolType, WebResult, WebSearchOutput};
use async_trait::async_trait;
use queryforge_common::config::WebSearchSettings;
use queryforge_common::metrics::PhaseTimer;
use queryforge_common::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Characters of each snippet used in the summary
const SNIPPET_CHARS: usize = 300;

/// A web search provider
#[async_trait]
pub trait SearchBackend: Send + Sync {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<WebResult>>;
}

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    max_results: usize,
    search_depth: &'static str,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    #[serde(default)]
    title: String,
    url: String,
    #[serde(default)]
    content: String,
}

/// Tavily-compatible JSON search API
pub struct HttpSearchBackend {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
}

impl HttpSearchBackend {
    pub fn new(api_key: impl Into<String>, settings: &WebSearchSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| AppError::Internal {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            api_base: settings.api_base.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }
}

#[async_trait]
impl SearchBackend for HttpSearchBackend {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<WebResult>> {
        let timer = PhaseTimer::start();
        let response = self
            .client
            .post(format!("{}/search", self.api_base))
            .bearer_auth(&self.api_key)
            .json(&SearchRequest {
                query,
                max_results,
                search_depth: "basic",
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Search {
                message: format!("search API returned {}: {}", status, body),
            });
        }

        let body: SearchResponse = response.json().await?;
        debug!(hits = body.results.len(), latency_ms = timer.elapsed_ms(), "Web search completed");

        Ok(body
            .results
            .into_iter()
            .map(|hit| WebResult {
                title: hit.title,
                url: hit.url,
                snippet: hit.content,
            })
            .collect())
    }
}

/// Used when no search API key is configured
#[derive(Debug, Default)]
pub struct DisabledSearchBackend;

#[async_trait]
impl SearchBackend for DisabledSearchBackend {
    async fn search(&self, _query: &str, _max_results: usize) -> Result<Vec<WebResult>> {
        Err(AppError::Configuration {
            message: "web_search.api_key is not set".to_string(),
        })
    }
}

pub struct WebSearchHandler {
    backend: Arc<dyn SearchBackend>,
    default_max_results: usize,
}

impl WebSearchHandler {
    pub fn new(backend: Arc<dyn SearchBackend>, default_max_results: usize) -> Self {
        Self {
            backend,
            default_max_results,
        }
    }
}

/// One line per result: title, trimmed snippet and URL
fn summarize(results: &[WebResult]) -> String {
    results
        .iter()
        .map(|r| {
            let snippet: String = r.snippet.chars().take(SNIPPET_CHARS).collect();
            format!("- {}: {} ({})", r.title, snippet.trim(), r.url)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[async_trait]
impl ToolHandler for WebSearchHandler {
    fn tool_type(&self) -> ToolType {
        ToolType::SearchWeb
    }

    async fn execute(
        &self,
        arguments: &ToolArguments,
        _context: &ExecutionContext,
    ) -> std::result::Result<ToolResult, ToolError> {
        let ToolArguments::SearchWeb(args) = arguments else {
            return Err(mismatch(self.tool_type(), arguments));
        };
        let query = required_query(self.tool_type(), args.query.as_deref())?;
        let max_results = args.max_results.unwrap_or(self.default_max_results);

        let results = self
            .backend
            .search(query, max_results)
            .await
            .map_err(|e| ToolError::upstream(self.tool_type(), e))?;

        let mut source_urls: Vec<String> = Vec::new();
        for result in &results {
            if !source_urls.contains(&result.url) {
                source_urls.push(result.url.clone());
            }
        }

        Ok(ToolResult::WebSearch(WebSearchOutput {
            summary: summarize(&results),
            query_used: query.to_string(),
            source_urls,
            results,
        }))
    }
}
