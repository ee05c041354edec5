//! QueryForge Common Library
//!
//! Shared code for the QueryForge orchestration engine including:
//! - Error types and handling
//! - Configuration management
//! - Metrics and observability
//! - LLM client abstraction

pub mod config;
pub mod errors;
pub mod llm;
pub mod metrics;

// Re-export commonly used types
pub use config::AppConfig;
pub use errors::{AppError, Result};
pub use llm::{GenerateRequest, LlmClient};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
