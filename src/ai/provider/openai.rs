//! OpenAI API Provider
//!
//! Text generation using OpenAI's Chat Completions API, or any endpoint
//! speaking the same protocol (set `llm.api_base`). Server-side tools and
//! thinking levels have no equivalent here and are ignored.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::{
    GenerationRequest, LlmResponse, ResponseMetadata, ResponseTiming, Role, TextGenerator,
    TokenUsage,
};
use crate::config::LlmConfig;
use crate::constants::network;
use crate::types::{ErrorCategory, ErrorClassifier, LlmError, PcfError, Result};

const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
const API_KEY_ENV: &str = "OPENAI_API_KEY";
const PROVIDER_NAME: &str = "openai";

/// OpenAI API Provider with secure API key handling
pub struct OpenAiProvider {
    /// API key stored securely - never exposed in logs or debug output
    api_key: SecretString,
    api_base: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    client: reqwest::Client,
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("api_key", &"[REDACTED]")
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

impl OpenAiProvider {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key_str = config
            .api_key
            .clone()
            .or_else(|| std::env::var(API_KEY_ENV).ok())
            .ok_or_else(|| {
                PcfError::Config(
                    "OpenAI API key not found. Set OPENAI_API_KEY env var or provide in config"
                        .to_string(),
                )
            })?;

        let api_base = config
            .api_base
            .clone()
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string())
            .trim_end_matches('/')
            .to_string();

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(network::CONNECTION_TIMEOUT_SECS))
            .build()
            .map_err(|e| PcfError::LlmApi(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            api_key: SecretString::from(api_key_str),
            api_base,
            model: config.main_model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_output_tokens,
            client,
        })
    }

    fn build_request(&self, request: &GenerationRequest) -> ChatCompletionRequest {
        let options = &request.options;
        if options.tools.any() {
            debug!("OpenAI provider ignores server-side tool access");
        }

        let mut messages = Vec::with_capacity(request.turns.len() + 1);
        if !request.system_instruction.is_empty() {
            messages.push(ChatMessage {
                role: "system".to_string(),
                content: request.system_instruction.clone(),
            });
        }
        messages.extend(request.turns.iter().map(|turn| ChatMessage {
            role: match turn.role {
                Role::User => "user",
                Role::Model => "assistant",
            }
            .to_string(),
            content: turn.text.clone(),
        }));

        ChatCompletionRequest {
            model: options.model.clone().unwrap_or_else(|| self.model.clone()),
            messages,
            temperature: options.temperature.unwrap_or(self.temperature),
            max_tokens: Some(options.max_output_tokens.unwrap_or(self.max_tokens)),
        }
    }
}

#[async_trait]
impl TextGenerator for OpenAiProvider {
    async fn generate(&self, request: &GenerationRequest) -> Result<LlmResponse> {
        let start_time = Instant::now();
        let body = self.build_request(request);
        let url = format!("{}/chat/completions", self.api_base);

        debug!(model = %body.model, messages = body.messages.len(), "Sending request to OpenAI API");

        let response = self
            .client
            .post(&url)
            .header(
                "Authorization",
                format!("Bearer {}", self.api_key.expose_secret()),
            )
            .json(&body)
            .send()
            .await
            .map_err(|e| ErrorClassifier::classify_transport(&e, PROVIDER_NAME))?;

        let elapsed = start_time.elapsed();

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(ErrorClassifier::classify_http_status(
                status.as_u16(),
                &format!("OpenAI API error ({}): {}", status, text),
                PROVIDER_NAME,
            )
            .into());
        }

        let response_body: ChatCompletionResponse = response.json().await.map_err(|e| {
            LlmError::with_provider(
                ErrorCategory::ParseError,
                format!("Failed to parse OpenAI response: {}", e),
                PROVIDER_NAME,
            )
        })?;

        let usage = response_body
            .usage
            .map(|u| TokenUsage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
                thinking_tokens: 0,
            })
            .unwrap_or_default();

        let text = response_body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| {
                warn!("OpenAI returned no content");
                LlmError::with_provider(
                    ErrorCategory::Transient,
                    "No content in OpenAI response",
                    PROVIDER_NAME,
                )
            })?;

        Ok(LlmResponse {
            text,
            usage,
            timing: ResponseTiming::from_duration(elapsed),
            metadata: ResponseMetadata {
                model: body.model,
                provider: PROVIDER_NAME.to_string(),
            },
        })
    }

    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn model(&self) -> &str {
        &self.model
    }
}

// Request/Response types

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    usage: Option<UsageInfo>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UsageInfo {
    prompt_tokens: u32,
    completion_tokens: u32,
}
