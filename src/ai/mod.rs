//! AI Integration Layer
//!
//! Text-generation providers and the retry decorator every outbound call
//! goes through.

pub mod provider;
pub mod retry;

pub use provider::{
    GeminiProvider, GenerationOptions, GenerationRequest, LlmResponse, OpenAiProvider, Role,
    SharedGenerator, TextGenerator, TokenUsage, ToolAccess, Turn, create_provider,
};
pub use retry::{RetryPolicy, RetryingGenerator, with_timeout};

use std::sync::Arc;

use crate::config::Config;
use crate::types::Result;

/// Build the configured provider wrapped in the configured retry policy
pub fn create_generator(config: &Config) -> Result<SharedGenerator> {
    let provider = create_provider(&config.llm)?;
    Ok(Arc::new(RetryingGenerator::new(
        provider,
        RetryPolicy::from_config(config),
    )))
}
