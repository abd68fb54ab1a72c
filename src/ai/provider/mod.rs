//! Text Generation Provider Abstraction
//!
//! Defines the [`TextGenerator`] trait for free-text completions over a
//! role-specific system instruction and an ordered conversation.
//! All providers return [`LlmResponse`] with token usage metrics.
//!
//! ## Modules
//!
//! - `gemini`: Google Generative Language API (`generateContent`)
//! - `openai`: OpenAI-compatible Chat Completions API

mod gemini;
mod openai;

pub use gemini::GeminiProvider;
pub use openai::OpenAiProvider;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::{LlmConfig, ThinkingLevel};
use crate::types::{PcfError, Result};

// =============================================================================
// Conversation
// =============================================================================

/// Speaker of a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Model => "model",
        }
    }
}

/// One message in a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            text: text.into(),
        }
    }
}

// =============================================================================
// Request
// =============================================================================

/// Server-side tools the model may use while answering
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolAccess {
    pub web_search: bool,
    pub url_context: bool,
}

impl ToolAccess {
    pub fn any(&self) -> bool {
        self.web_search || self.url_context
    }
}

/// Per-request generation options; unset fields use the provider defaults
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationOptions {
    /// Model override for this request
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
    pub thinking_level: Option<ThinkingLevel>,
    pub tools: ToolAccess,
}

impl GenerationOptions {
    /// Options for `model` using the generation settings in `config`
    pub fn from_config(config: &LlmConfig, model: &str) -> Self {
        Self {
            model: Some(model.to_string()),
            temperature: Some(config.temperature),
            max_output_tokens: Some(config.max_output_tokens),
            thinking_level: config.thinking_level,
            tools: ToolAccess {
                web_search: config.web_search,
                url_context: config.url_context,
            },
        }
    }
}

/// A complete text-generation request
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// Role-specific system instruction
    pub system_instruction: String,
    /// Conversation so far, oldest first; the last turn is the user's
    pub turns: Vec<Turn>,
    pub options: GenerationOptions,
}

impl GenerationRequest {
    pub fn new(system_instruction: impl Into<String>, turns: Vec<Turn>) -> Self {
        Self {
            system_instruction: system_instruction.into(),
            turns,
            options: GenerationOptions::default(),
        }
    }

    pub fn with_options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }
}

// =============================================================================
// Response with Usage Metrics
// =============================================================================

/// Complete LLM response including text and usage metrics
#[derive(Debug, Clone)]
pub struct LlmResponse {
    /// Generated text
    pub text: String,
    /// Token usage metrics
    pub usage: TokenUsage,
    /// Response timing
    pub timing: ResponseTiming,
    /// Provider and model info
    pub metadata: ResponseMetadata,
}

impl LlmResponse {
    /// Create response with text only (usage unknown)
    pub fn text_only(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            usage: TokenUsage::default(),
            timing: ResponseTiming::default(),
            metadata: ResponseMetadata::default(),
        }
    }
}

/// Token usage metrics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    /// Reasoning tokens (if the provider reports them)
    pub thinking_tokens: u32,
}

impl TokenUsage {
    pub fn total(&self) -> u32 {
        self.input_tokens + self.output_tokens + self.thinking_tokens
    }

    /// Accumulate another call's usage
    pub fn add(&mut self, other: &TokenUsage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.thinking_tokens += other.thinking_tokens;
    }
}

/// Response timing metrics
#[derive(Debug, Clone, Default)]
pub struct ResponseTiming {
    /// Wall-clock time in milliseconds
    pub total_ms: u64,
}

impl ResponseTiming {
    pub fn from_duration(duration: std::time::Duration) -> Self {
        Self {
            total_ms: duration.as_millis() as u64,
        }
    }
}

/// Response metadata
#[derive(Debug, Clone, Default)]
pub struct ResponseMetadata {
    pub model: String,
    pub provider: String,
}

// =============================================================================
// Provider Trait
// =============================================================================

/// Free-text generation backend
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Run one request/response exchange
    async fn generate(&self, request: &GenerationRequest) -> Result<LlmResponse>;

    /// Provider name for logging
    fn name(&self) -> &str;

    /// Default model
    fn model(&self) -> &str;
}

/// Shared generator for concurrent access across workers
pub type SharedGenerator = Arc<dyn TextGenerator>;

#[async_trait]
impl<T: TextGenerator + ?Sized> TextGenerator for Arc<T> {
    async fn generate(&self, request: &GenerationRequest) -> Result<LlmResponse> {
        (**self).generate(request).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }

    fn model(&self) -> &str {
        (**self).model()
    }
}

/// Create a shared provider from configuration
pub fn create_provider(config: &LlmConfig) -> Result<SharedGenerator> {
    match config.provider.as_str() {
        "gemini" => Ok(Arc::new(GeminiProvider::new(config)?)),
        "openai" => Ok(Arc::new(OpenAiProvider::new(config)?)),
        other => Err(PcfError::Config(format!(
            "Unknown provider: {}. Supported: gemini, openai",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_from_config() {
        let config = LlmConfig::default();
        let options = GenerationOptions::from_config(&config, "guide-model");
        assert_eq!(options.model.as_deref(), Some("guide-model"));
        assert_eq!(options.temperature, Some(1.0));
        assert_eq!(options.thinking_level, Some(ThinkingLevel::High));
        assert!(options.tools.web_search && options.tools.url_context);
    }

    #[test]
    fn test_unknown_provider() {
        let config = LlmConfig {
            provider: "carrier-pigeon".to_string(),
            ..LlmConfig::default()
        };
        assert!(matches!(create_provider(&config), Err(PcfError::Config(_))));
    }

    #[test]
    fn test_turn_constructors() {
        assert_eq!(Turn::user("hi").role, Role::User);
        assert_eq!(Turn::model("hello").role.as_str(), "model");
    }
}
