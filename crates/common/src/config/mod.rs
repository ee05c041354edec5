//! Configuration management for QueryForge
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config.toml, config.yaml)
//! - Default values

use crate::errors::{AppError, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::Validate;

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate)]
pub struct AppConfig {
    /// LLM provider configuration
    #[serde(default)]
    pub llm: LlmSettings,

    /// Decision engine configuration
    #[serde(default)]
    #[validate(nested)]
    pub decision: DecisionSettings,

    /// Tool executor configuration
    #[serde(default)]
    pub executor: ExecutorSettings,

    /// Synthesis configuration
    #[serde(default)]
    pub synthesis: SynthesisSettings,

    /// RAG handler configuration
    #[serde(default)]
    #[validate(nested)]
    pub rag: RagSettings,

    /// Web search configuration
    #[serde(default)]
    #[validate(nested)]
    pub web_search: WebSearchSettings,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmSettings {
    /// LLM provider: openai, mock
    #[serde(default = "default_llm_provider")]
    pub provider: String,

    /// API key for the provider
    pub api_key: Option<String>,

    /// API base URL (for OpenAI-compatible endpoints)
    #[serde(default = "default_llm_api_base")]
    pub api_base: String,

    /// Model to use
    #[serde(default = "default_llm_model")]
    pub model: String,

    /// Request timeout in seconds
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,

    /// Maximum retries for transient failures
    #[serde(default = "default_llm_retries")]
    pub max_retries: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct DecisionSettings {
    /// Sampling temperature for tool selection (0.0 = deterministic)
    #[serde(default = "default_decision_temperature")]
    #[validate(range(min = 0.0, max = 2.0))]
    pub temperature: f32,

    /// Maximum output tokens for the decision call
    #[serde(default = "default_decision_max_tokens")]
    pub max_tokens: usize,

    /// Decision call timeout in seconds
    #[serde(default = "default_decision_timeout")]
    pub timeout_secs: u64,

    /// Conversation turns included in the decision prompt
    #[serde(default = "default_history_turns")]
    pub history_turns: usize,

    /// Maximum tool calls executed per run
    #[serde(default = "default_max_tool_calls")]
    #[validate(range(min = 1))]
    pub max_tool_calls: usize,

    /// Vector chunks seeded into the failure fallback
    #[serde(default = "default_fallback_chunk_count")]
    pub fallback_chunk_count: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExecutorSettings {
    /// Run independent tool calls concurrently
    #[serde(default)]
    pub parallel: bool,

    /// Per-tool timeout in seconds
    #[serde(default = "default_tool_timeout")]
    pub tool_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SynthesisSettings {
    /// Sampling temperature for the final answer
    #[serde(default = "default_synthesis_temperature")]
    pub temperature: f32,

    /// Maximum output tokens for the final answer
    #[serde(default = "default_synthesis_max_tokens")]
    pub max_tokens: usize,

    /// Language used when the user context has none (vi, en)
    #[serde(default = "default_language")]
    pub default_language: String,

    /// Return form/clarification output verbatim when it is the only result
    #[serde(default = "default_enabled")]
    pub passthrough_single_tool: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct RagSettings {
    /// Best chunk score at which a grounded answer is reported as high confidence
    #[serde(default = "default_high_confidence_score")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub high_confidence_score: f32,

    /// Maximum characters of chunk context placed in the prompt
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,

    /// Maximum output tokens for the RAG answer
    #[serde(default = "default_rag_max_tokens")]
    pub max_tokens: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct WebSearchSettings {
    /// Search API base URL (Tavily-compatible)
    #[serde(default = "default_search_api_base")]
    pub api_base: String,

    /// Search API key
    pub api_key: Option<String>,

    /// Default number of results
    #[serde(default = "default_search_max_results")]
    #[validate(range(min = 1, max = 10))]
    pub max_results: usize,

    /// Request timeout in seconds
    #[serde(default = "default_search_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Metrics port (0 to disable)
    #[serde(default)]
    pub metrics_port: u16,

    /// Service name, attached to every exported metric
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

// Default value functions
fn default_llm_provider() -> String { "mock".to_string() }
fn default_llm_api_base() -> String { "https://api.openai.com/v1".to_string() }
fn default_llm_model() -> String { "gpt-4o-mini".to_string() }
fn default_llm_timeout() -> u64 { 60 }
fn default_llm_retries() -> u32 { 2 }
fn default_decision_temperature() -> f32 { 0.0 }
fn default_decision_max_tokens() -> usize { 800 }
fn default_decision_timeout() -> u64 { 20 }
fn default_history_turns() -> usize { 6 }
fn default_max_tool_calls() -> usize { 4 }
fn default_fallback_chunk_count() -> usize { 3 }
fn default_tool_timeout() -> u64 { 30 }
fn default_synthesis_temperature() -> f32 { 0.3 }
fn default_synthesis_max_tokens() -> usize { 1500 }
fn default_language() -> String { "vi".to_string() }
fn default_enabled() -> bool { true }
fn default_high_confidence_score() -> f32 { 0.75 }
fn default_max_context_chars() -> usize { 6000 }
fn default_rag_max_tokens() -> usize { 1000 }
fn default_search_api_base() -> String { "https://api.tavily.com".to_string() }
fn default_search_max_results() -> usize { 5 }
fn default_search_timeout() -> u64 { 15 }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { false }
fn default_service_name() -> String { "queryforge".to_string() }

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            api_key: None,
            api_base: default_llm_api_base(),
            model: default_llm_model(),
            timeout_secs: default_llm_timeout(),
            max_retries: default_llm_retries(),
        }
    }
}

impl Default for DecisionSettings {
    fn default() -> Self {
        Self {
            temperature: default_decision_temperature(),
            max_tokens: default_decision_max_tokens(),
            timeout_secs: default_decision_timeout(),
            history_turns: default_history_turns(),
            max_tool_calls: default_max_tool_calls(),
            fallback_chunk_count: default_fallback_chunk_count(),
        }
    }
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            parallel: false,
            tool_timeout_secs: default_tool_timeout(),
        }
    }
}

impl Default for SynthesisSettings {
    fn default() -> Self {
        Self {
            temperature: default_synthesis_temperature(),
            max_tokens: default_synthesis_max_tokens(),
            default_language: default_language(),
            passthrough_single_tool: default_enabled(),
        }
    }
}

impl Default for RagSettings {
    fn default() -> Self {
        Self {
            high_confidence_score: default_high_confidence_score(),
            max_context_chars: default_max_context_chars(),
            max_tokens: default_rag_max_tokens(),
        }
    }
}

impl Default for WebSearchSettings {
    fn default() -> Self {
        Self {
            api_base: default_search_api_base(),
            api_key: None,
            max_results: default_search_max_results(),
            timeout_secs: default_search_timeout(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            metrics_port: 0,
            service_name: default_service_name(),
        }
    }
}

impl DecisionSettings {
    /// Get the decision call timeout as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))

            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))

            // Load local overrides
            .add_source(File::with_name("config/local").required(false))

            // Load from environment variables with APP__ prefix
            // e.g., APP__LLM__MODEL=gpt-4o
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
            )

            .build()?;

        config.try_deserialize::<Self>()?.validated()
    }

    /// Load from a specific TOML file
    pub fn from_file(path: &str) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
            )
            .build()?;

        config.try_deserialize::<Self>()?.validated()
    }

    /// Reject out-of-range settings at load time
    pub fn validated(self) -> Result<Self> {
        self.validate().map_err(|e| AppError::Validation {
            field: e.errors().keys().next().map(|k| k.to_string()),
            message: e.to_string(),
        })?;
        Ok(self)
    }

    /// Get the per-tool timeout as Duration
    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.executor.tool_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.llm.provider, "mock");
        assert_eq!(config.decision.temperature, 0.0);
        assert_eq!(config.decision.fallback_chunk_count, 3);
        assert!(!config.executor.parallel);
        assert_eq!(config.synthesis.default_language, "vi");
    }

    #[test]
    fn test_partial_source_uses_defaults() {
        let config: AppConfig = Config::builder()
            .add_source(File::from_str(
                "[executor]\nparallel = true\n\n[llm]\nmodel = \"gpt-4o\"\n",
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert!(config.executor.parallel);
        assert_eq!(config.executor.tool_timeout_secs, 30);
        assert_eq!(config.llm.model, "gpt-4o");
        assert_eq!(config.llm.provider, "mock");
        assert_eq!(config.decision.max_tool_calls, 4);
    }

    #[test]
    fn test_timeouts() {
        let config = AppConfig::default();
        assert_eq!(config.decision.timeout(), Duration::from_secs(20));
        assert_eq!(config.tool_timeout(), Duration::from_secs(30));
    }

    fn parse(toml: &str) -> AppConfig {
        Config::builder()
            .add_source(File::from_str(toml, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_defaults_pass_validation() {
        assert!(AppConfig::default().validated().is_ok());
    }

    #[test]
    fn test_search_result_count_out_of_range_rejected() {
        let err = parse("[web_search]\nmax_results = 25\n").validated().unwrap_err();
        match err {
            AppError::Validation { field, .. } => assert_eq!(field.as_deref(), Some("web_search")),
            other => panic!("unexpected error {:?}", other),
        }

        assert!(parse("[web_search]\nmax_results = 0\n").validated().is_err());
        assert!(parse("[web_search]\nmax_results = 10\n").validated().is_ok());
    }

    #[test]
    fn test_zero_tool_budget_rejected() {
        assert!(parse("[decision]\nmax_tool_calls = 0\n").validated().is_err());
    }
}
