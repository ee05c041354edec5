//! Error types for QueryForge
//!
//! Provides a shared error handling system with:
//! - Distinct error types for infrastructure failure modes
//! - Stable machine-readable error codes
//! - Retry classification for upstream calls

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors (1xxx)
    ValidationError,
    MissingField,
    InvalidFormat,

    // Upstream errors (8xxx)
    UpstreamError,
    LlmError,
    LlmTimeout,
    Unsupported,
    SearchError,

    // Internal errors (9xxx)
    InternalError,
    ConfigurationError,
    SerializationError,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn as_code(&self) -> u16 {
        match self {
            // Validation (1xxx)
            ErrorCode::ValidationError => 1001,
            ErrorCode::MissingField => 1002,
            ErrorCode::InvalidFormat => 1003,

            // Upstream (8xxx)
            ErrorCode::UpstreamError => 8001,
            ErrorCode::LlmError => 8002,
            ErrorCode::LlmTimeout => 8003,
            ErrorCode::Unsupported => 8004,
            ErrorCode::SearchError => 8005,

            // Internal (9xxx)
            ErrorCode::InternalError => 9001,
            ErrorCode::ConfigurationError => 9002,
            ErrorCode::SerializationError => 9003,
        }
    }
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Validation errors
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    #[error("Required field missing: {field}")]
    MissingField { field: String },

    #[error("Invalid format: {message}")]
    InvalidFormat { message: String },

    // Upstream errors
    #[error("LLM error: {message}")]
    Llm {
        message: String,
        /// HTTP status from the provider, when there was one
        status: Option<u16>,
    },

    #[error("LLM timeout after {timeout_ms}ms")]
    LlmTimeout { timeout_ms: u64 },

    #[error("Unsupported capability: {capability}")]
    Unsupported { capability: String },

    #[error("Web search error: {message}")]
    Search { message: String },

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    // Internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Validation { .. } => ErrorCode::ValidationError,
            AppError::MissingField { .. } => ErrorCode::MissingField,
            AppError::InvalidFormat { .. } => ErrorCode::InvalidFormat,
            AppError::Llm { .. } => ErrorCode::LlmError,
            AppError::LlmTimeout { .. } => ErrorCode::LlmTimeout,
            AppError::Unsupported { .. } => ErrorCode::Unsupported,
            AppError::Search { .. } => ErrorCode::SearchError,
            AppError::HttpClient(_) => ErrorCode::UpstreamError,
            AppError::Internal { .. } => ErrorCode::InternalError,
            AppError::Configuration { .. } => ErrorCode::ConfigurationError,
            AppError::Serialization(_) => ErrorCode::SerializationError,
            AppError::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Whether retrying the same upstream call may succeed.
    ///
    /// Rate limits and 5xx responses are transient; 4xx responses and
    /// local failures are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::Llm { status: Some(status), .. } => *status == 429 || *status >= 500,
            AppError::Llm { status: None, .. } => true,
            AppError::LlmTimeout { .. } => true,
            AppError::HttpClient(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Configuration {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_mapping() {
        let err = AppError::LlmTimeout { timeout_ms: 5000 };
        assert_eq!(err.code(), ErrorCode::LlmTimeout);
        assert_eq!(err.code().as_code(), 8003);
    }

    #[test]
    fn test_retry_classification() {
        let rate_limited = AppError::Llm {
            message: "slow down".into(),
            status: Some(429),
        };
        assert!(rate_limited.is_retryable());

        let bad_request = AppError::Llm {
            message: "bad prompt".into(),
            status: Some(400),
        };
        assert!(!bad_request.is_retryable());

        let config = AppError::Configuration {
            message: "missing key".into(),
        };
        assert!(!config.is_retryable());
    }

    #[test]
    fn test_validation_error_display() {
        let err = AppError::Validation {
            message: "query too long".into(),
            field: Some("query".into()),
        };
        assert_eq!(err.to_string(), "Validation failed: query too long");
        assert_eq!(err.code(), ErrorCode::ValidationError);
    }
}
