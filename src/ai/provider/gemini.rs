//! Gemini API Provider
//!
//! Text generation using the Generative Language API (`generateContent`).
//! Server-side tools (Google Search, URL context) and thinking levels are
//! passed through from [`GenerationOptions`].

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::debug;

use super::{
    GenerationRequest, LlmResponse, ResponseMetadata, ResponseTiming, TextGenerator, TokenUsage,
};
use crate::config::LlmConfig;
use crate::constants::network;
use crate::types::{ErrorCategory, ErrorClassifier, LlmError, PcfError, Result};

const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const API_KEY_ENV: &str = "GEMINI_API_KEY";
const PROVIDER_NAME: &str = "gemini";

/// Gemini API Provider with secure API key handling
pub struct GeminiProvider {
    /// API key stored securely - never exposed in logs or debug output
    api_key: SecretString,
    api_base: String,
    model: String,
    temperature: f32,
    max_output_tokens: u32,
    client: reqwest::Client,
}

impl std::fmt::Debug for GeminiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiProvider")
            .field("api_key", &"[REDACTED]")
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .finish()
    }
}

impl GeminiProvider {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .or_else(|| std::env::var(API_KEY_ENV).ok())
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                PcfError::Config(format!(
                    "Gemini API key not found. Set {} or PCFPIPE_LLM__API_KEY",
                    API_KEY_ENV
                ))
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
            api_key: SecretString::from(api_key),
            api_base,
            model: config.main_model.clone(),
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
            client,
        })
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/models/{}:generateContent", self.api_base, model)
    }

    fn build_request(&self, request: &GenerationRequest) -> GenerateContentRequest {
        let options = &request.options;

        let contents = request
            .turns
            .iter()
            .map(|turn| Content {
                role: turn.role.as_str().to_string(),
                parts: vec![TextPart {
                    text: turn.text.clone(),
                }],
            })
            .collect();

        let system_instruction = (!request.system_instruction.is_empty()).then(|| {
            SystemInstruction {
                parts: vec![TextPart {
                    text: request.system_instruction.clone(),
                }],
            }
        });

        let mut tools = Vec::new();
        if options.tools.url_context {
            tools.push(Tool {
                url_context: Some(EmptyObject {}),
                google_search: None,
            });
        }
        if options.tools.web_search {
            tools.push(Tool {
                url_context: None,
                google_search: Some(EmptyObject {}),
            });
        }

        GenerateContentRequest {
            contents,
            system_instruction,
            generation_config: GenerationConfig {
                temperature: Some(options.temperature.unwrap_or(self.temperature)),
                max_output_tokens: Some(options.max_output_tokens.unwrap_or(self.max_output_tokens)),
                thinking_config: options.thinking_level.map(|level| ThinkingConfig {
                    thinking_level: level.to_api_string().to_string(),
                }),
            },
            tools: (!tools.is_empty()).then_some(tools),
        }
    }
}

/// Concatenate the answer text of the first candidate, skipping thought parts
fn response_text(body: &GenerateContentResponse) -> Option<String> {
    let candidate = body.candidates.first()?;
    let content = candidate.content.as_ref()?;
    let text: String = content
        .parts
        .iter()
        .filter(|p| !p.thought.unwrap_or(false))
        .filter_map(|p| p.text.as_deref())
        .collect();
    (!text.trim().is_empty()).then_some(text)
}

#[async_trait]
impl TextGenerator for GeminiProvider {
    async fn generate(&self, request: &GenerationRequest) -> Result<LlmResponse> {
        let model = request.options.model.as_deref().unwrap_or(&self.model);
        debug!(model, turns = request.turns.len(), "Sending request to Gemini API");

        let start_time = Instant::now();
        let body = self.build_request(request);

        let response = self
            .client
            .post(self.endpoint(model))
            .header("x-goog-api-key", self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| ErrorClassifier::classify_transport(&e, PROVIDER_NAME))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorEnvelope>(&text)
                .map(|env| env.error.message)
                .unwrap_or(text);
            return Err(ErrorClassifier::classify_http_status(
                status.as_u16(),
                &format!("Gemini API error ({}): {}", status, message),
                PROVIDER_NAME,
            )
            .into());
        }

        let body: GenerateContentResponse = response.json().await.map_err(|e| {
            LlmError::with_provider(
                ErrorCategory::ParseError,
                format!("Failed to decode Gemini response: {}", e),
                PROVIDER_NAME,
            )
        })?;

        if let Some(reason) = body
            .prompt_feedback
            .as_ref()
            .and_then(|f| f.block_reason.as_deref())
        {
            return Err(LlmError::with_provider(
                ErrorCategory::BadRequest,
                format!("Prompt blocked: {}", reason),
                PROVIDER_NAME,
            )
            .into());
        }

        let text = response_text(&body).ok_or_else(|| {
            let finish = body
                .candidates
                .first()
                .and_then(|c| c.finish_reason.clone())
                .unwrap_or_else(|| "none".to_string());
            LlmError::with_provider(
                ErrorCategory::Transient,
                format!("Empty response from Gemini (finish reason: {})", finish),
                PROVIDER_NAME,
            )
        })?;

        let usage = body
            .usage_metadata
            .map(|u| TokenUsage {
                input_tokens: u.prompt_token_count,
                output_tokens: u.candidates_token_count,
                thinking_tokens: u.thoughts_token_count,
            })
            .unwrap_or_default();

        Ok(LlmResponse {
            text,
            usage,
            timing: ResponseTiming::from_duration(start_time.elapsed()),
            metadata: ResponseMetadata {
                model: model.to_string(),
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
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<SystemInstruction>,
    generation_config: GenerationConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<Tool>>,
}

#[derive(Debug, Serialize)]
struct Content {
    role: String,
    parts: Vec<TextPart>,
}

#[derive(Debug, Serialize)]
struct TextPart {
    text: String,
}

#[derive(Debug, Serialize)]
struct SystemInstruction {
    parts: Vec<TextPart>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    thinking_config: Option<ThinkingConfig>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ThinkingConfig {
    thinking_level: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Tool {
    #[serde(skip_serializing_if = "Option::is_none")]
    url_context: Option<EmptyObject>,
    #[serde(skip_serializing_if = "Option::is_none")]
    google_search: Option<EmptyObject>,
}

#[derive(Debug, Serialize)]
struct EmptyObject {}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
    thought: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
    #[serde(default)]
    thoughts_token_count: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}
