//! Configuration Types
//!
//! All configuration structures with sensible defaults.
//! Every value the pipeline needs (credentials, models, retry policy, pool
//! sizes, column names) lives here and is passed in at construction time.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::constants::{batch, columns, generation, network, pipeline, retry};
use crate::types::{PcfError, Result};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Configuration version
    pub version: String,

    /// LLM provider settings
    pub llm: LlmConfig,

    /// Outbound call retry policy
    pub retry: RetryConfig,

    /// Orchestrator settings
    pub pipeline: PipelineConfig,

    /// Worker pool and checkpoint settings
    pub batch: BatchConfig,

    /// Input/output table column names
    pub columns: ColumnConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            llm: LlmConfig::default(),
            retry: RetryConfig::default(),
            pipeline: PipelineConfig::default(),
            batch: BatchConfig::default(),
            columns: ColumnConfig::default(),
        }
    }
}

impl Config {
    /// Validate configuration values are within acceptable ranges.
    /// Returns `PcfError::Config` on validation failure.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(PcfError::Config(format!(
                "LLM temperature must be between 0.0 and 2.0, got {}",
                self.llm.temperature
            )));
        }

        if self.llm.timeout_secs == 0 {
            return Err(PcfError::Config(
                "LLM timeout_secs must be greater than 0".to_string(),
            ));
        }

        if let Some(base) = &self.llm.api_base {
            url::Url::parse(base)
                .map_err(|e| PcfError::Config(format!("Invalid llm.api_base '{}': {}", base, e)))?;
        }

        if self.retry.max_attempts == 0 {
            return Err(PcfError::Config(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }

        if self.batch.workers == 0 || self.batch.batch_size == 0 {
            return Err(PcfError::Config(
                "batch.workers and batch.batch_size must be greater than 0".to_string(),
            ));
        }

        let cols = &self.columns;
        let names = [
            &cols.subject_name,
            &cols.subject_description,
            &cols.extracted_value,
            &cols.transcript,
        ];
        if names.iter().any(|n| n.trim().is_empty()) {
            return Err(PcfError::Config("column names must not be empty".to_string()));
        }
        if cols.extracted_value == cols.transcript {
            return Err(PcfError::Config(
                "columns.extracted_value and columns.transcript must differ".to_string(),
            ));
        }

        Ok(())
    }
}

// =============================================================================
// LLM Configuration
// =============================================================================

/// Reasoning intensity requested from models that support thinking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ThinkingLevel {
    Minimal,
    Low,
    Medium,
    #[default]
    High,
}

impl ThinkingLevel {
    /// Uppercase form the Gemini API expects
    pub fn to_api_string(self) -> &'static str {
        match self {
            Self::Minimal => "MINIMAL",
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
        }
    }
}

impl std::fmt::Display for ThinkingLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Minimal => write!(f, "minimal"),
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

impl std::str::FromStr for ThinkingLevel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "minimal" => Ok(Self::Minimal),
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            _ => Err(format!(
                "Unknown thinking level: {}. Valid values: minimal, low, medium, high",
                s
            )),
        }
    }
}

/// LLM provider settings
///
/// The API key is never serialized and is redacted in debug output.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider name: "gemini" or "openai"
    pub provider: String,

    /// API key (falls back to the provider's environment variable)
    #[serde(skip_serializing)]
    pub api_key: Option<String>,

    /// API base URL (for custom endpoints)
    pub api_base: Option<String>,

    /// Model used for the guidance step
    pub guidance_model: String,

    /// Model used for analyst and auditor steps
    pub main_model: String,

    /// Sampling temperature
    pub temperature: f32,

    /// Maximum output tokens per call
    pub max_output_tokens: u32,

    /// Reasoning intensity (omitted from requests when unset)
    pub thinking_level: Option<ThinkingLevel>,

    /// Give the model web search
    pub web_search: bool,

    /// Give the model URL fetching
    pub url_context: bool,

    /// Per-attempt request timeout in seconds
    pub timeout_secs: u64,
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("provider", &self.provider)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("api_base", &self.api_base)
            .field("guidance_model", &self.guidance_model)
            .field("main_model", &self.main_model)
            .field("temperature", &self.temperature)
            .field("max_output_tokens", &self.max_output_tokens)
            .field("thinking_level", &self.thinking_level)
            .field("web_search", &self.web_search)
            .field("url_context", &self.url_context)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "gemini".to_string(),
            api_key: None,
            api_base: None,
            guidance_model: "gemini-3-pro-preview".to_string(),
            main_model: "gemini-3-pro-preview".to_string(),
            temperature: generation::DEFAULT_TEMPERATURE,
            max_output_tokens: generation::DEFAULT_MAX_OUTPUT_TOKENS,
            thinking_level: Some(ThinkingLevel::High),
            web_search: true,
            url_context: true,
            timeout_secs: network::DEFAULT_TIMEOUT_SECS,
        }
    }
}

// =============================================================================
// Retry Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts per outbound call, first try included
    pub max_attempts: u32,

    /// Fixed delay between attempts in milliseconds
    pub delay_ms: u64,
}

impl RetryConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: retry::DEFAULT_MAX_ATTEMPTS,
            delay_ms: retry::DEFAULT_DELAY_MS,
        }
    }
}

// =============================================================================
// Pipeline Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Maximum auditor iterations per subject
    pub max_audit_loops: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_audit_loops: pipeline::MAX_AUDIT_LOOPS,
        }
    }
}

// =============================================================================
// Batch Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Subjects processed concurrently
    pub workers: usize,

    /// Completed subjects between checkpoints of the output table
    pub batch_size: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            workers: batch::DEFAULT_WORKERS,
            batch_size: batch::DEFAULT_BATCH_SIZE,
        }
    }
}

// =============================================================================
// Column Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnConfig {
    pub subject_name: String,
    pub subject_description: String,
    pub extracted_value: String,
    pub transcript: String,
}

impl Default for ColumnConfig {
    fn default() -> Self {
        Self {
            subject_name: columns::SUBJECT_NAME.to_string(),
            subject_description: columns::SUBJECT_DESCRIPTION.to_string(),
            extracted_value: columns::EXTRACTED_VALUE.to_string(),
            transcript: columns::TRANSCRIPT.to_string(),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.version, "1.0");
        assert_eq!(config.llm.provider, "gemini");
        assert_eq!(config.pipeline.max_audit_loops, 2);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.delay(), Duration::from_secs(2));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_thinking_level() {
        assert_eq!(ThinkingLevel::High.to_api_string(), "HIGH");
        assert_eq!(ThinkingLevel::Low.to_string(), "low");
        assert_eq!(
            "Medium".parse::<ThinkingLevel>().unwrap(),
            ThinkingLevel::Medium
        );
        assert!("extreme".parse::<ThinkingLevel>().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.llm.temperature = 3.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.retry.max_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.batch.workers = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.llm.api_base = Some("not a url".to_string());
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.columns.transcript = config.columns.extracted_value.clone();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_api_key_redacted_and_not_serialized() {
        let mut config = LlmConfig::default();
        config.api_key = Some("secret-key".to_string());

        let debug = format!("{:?}", config);
        assert!(!debug.contains("secret-key"));
        assert!(debug.contains("[REDACTED]"));

        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("secret-key"));
    }
}
