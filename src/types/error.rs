//! Unified Error Type System
//!
//! Centralized error types for the entire application.
//! Provides error classification for retry decisions on outbound LLM calls.
//!
//! ## Error Categories
//!
//! - **Transient**: Temporary server issues (retry)
//! - **RateLimit**: API rate limiting (retry after a wait)
//! - **Network**: Connectivity issues and timeouts (retry)
//! - **Auth**: Authentication failures (fail fast)
//! - **BadRequest**: Malformed request (fail fast)

use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Error Categories
// =============================================================================

/// Error categories used to decide whether an outbound call is retried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Rate limited - wait then retry
    RateLimit,
    /// Authentication failed - fail fast, don't retry
    Auth,
    /// Network/connectivity issues - retry
    Network,
    /// Endpoint or model unavailable
    Unavailable,
    /// Invalid request - don't retry, fix request
    BadRequest,
    /// Response body could not be decoded
    ParseError,
    /// Temporary server issues - retry
    Transient,
    /// Unknown error - conservative retry
    Unknown,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RateLimit => write!(f, "RATE_LIMIT"),
            Self::Auth => write!(f, "AUTH"),
            Self::Network => write!(f, "NETWORK"),
            Self::Unavailable => write!(f, "UNAVAILABLE"),
            Self::BadRequest => write!(f, "BAD_REQUEST"),
            Self::ParseError => write!(f, "PARSE_ERROR"),
            Self::Transient => write!(f, "TRANSIENT"),
            Self::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

impl ErrorCategory {
    /// Whether another attempt with the same request can succeed
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Auth | Self::BadRequest)
    }
}

// =============================================================================
// LLM Error
// =============================================================================

/// LLM error with category, context, and retry hints
#[derive(Debug, Clone)]
pub struct LlmError {
    /// Error category for retry decisions
    pub category: ErrorCategory,
    /// Detailed error message
    pub message: String,
    /// Provider that produced the error
    pub provider: Option<String>,
    /// Suggested wait time before retry (if applicable)
    pub retry_after: Option<Duration>,
}

impl std::fmt::Display for LlmError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(provider) = &self.provider {
            write!(f, "[{}:{}] {}", provider, self.category, self.message)
        } else {
            write!(f, "[{}] {}", self.category, self.message)
        }
    }
}

impl std::error::Error for LlmError {}

impl LlmError {
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
            provider: None,
            retry_after: None,
        }
    }

    pub fn with_provider(
        category: ErrorCategory,
        message: impl Into<String>,
        provider: impl Into<String>,
    ) -> Self {
        Self {
            category,
            message: message.into(),
            provider: Some(provider.into()),
            retry_after: None,
        }
    }

    /// Add suggested retry delay
    pub fn retry_after(mut self, duration: Duration) -> Self {
        self.retry_after = Some(duration);
        self
    }

    pub fn is_retryable(&self) -> bool {
        self.category.is_retryable()
    }
}

// =============================================================================
// Error Classifier
// =============================================================================

/// Maps provider failures onto [`ErrorCategory`]
pub struct ErrorClassifier;

impl ErrorClassifier {
    /// Classify a failure to get any HTTP response at all
    pub fn classify_transport(error: &reqwest::Error, provider: &str) -> LlmError {
        let category = if error.is_timeout() || error.is_connect() || error.is_request() {
            ErrorCategory::Network
        } else if error.is_decode() || error.is_body() {
            ErrorCategory::ParseError
        } else {
            ErrorCategory::Unknown
        };
        LlmError::with_provider(category, format!("request failed: {}", error), provider)
    }

    /// Classify HTTP status code directly (more accurate than string matching)
    pub fn classify_http_status(status: u16, message: &str, provider: &str) -> LlmError {
        match status {
            429 => LlmError::with_provider(ErrorCategory::RateLimit, message, provider)
                .retry_after(Duration::from_secs(30)),
            401 | 403 => LlmError::with_provider(ErrorCategory::Auth, message, provider),
            400 => LlmError::with_provider(ErrorCategory::BadRequest, message, provider),
            408 => LlmError::with_provider(ErrorCategory::Network, message, provider),
            500 | 502 | 503 | 504 => {
                LlmError::with_provider(ErrorCategory::Transient, message, provider)
            }
            404 => LlmError::with_provider(ErrorCategory::Unavailable, message, provider),
            _ => LlmError::with_provider(ErrorCategory::Unknown, message, provider),
        }
    }
}

// =============================================================================
// Application Error
// =============================================================================

#[derive(Debug, Error)]
pub enum PcfError {
    // -------------------------------------------------------------------------
    // System Errors (auto From impl)
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    // -------------------------------------------------------------------------
    // LLM Errors
    // -------------------------------------------------------------------------
    /// Structured LLM error with category and retry hints
    #[error("LLM error: {0}")]
    Llm(LlmError),

    /// Simple LLM API error (use Llm variant for structured errors)
    #[error("LLM API error: {0}")]
    LlmApi(String),

    #[error("Timeout after {duration:?}: {operation}")]
    Timeout {
        operation: String,
        duration: Duration,
    },

    // -------------------------------------------------------------------------
    // Pipeline Errors
    // -------------------------------------------------------------------------
    /// A step whose failure aborts the subject's pipeline
    #[error("Pipeline failed at {step}: {message}")]
    Pipeline { step: String, message: String },

    #[error("Invalid subject: {0}")]
    InvalidSubject(String),

    // -------------------------------------------------------------------------
    // Domain Errors
    // -------------------------------------------------------------------------
    #[error("Config error: {0}")]
    Config(String),

    #[error("Table error: {0}")]
    Table(String),

    #[error("Output sink error: {0}")]
    Sink(String),
}

impl From<LlmError> for PcfError {
    fn from(err: LlmError) -> Self {
        PcfError::Llm(err)
    }
}

pub type Result<T> = std::result::Result<T, PcfError>;

impl PcfError {
    /// Create a timeout error
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Create a fatal pipeline step error
    pub fn pipeline(step: impl std::fmt::Display, message: impl Into<String>) -> Self {
        Self::Pipeline {
            step: step.to_string(),
            message: message.into(),
        }
    }

    /// Whether an outbound call that failed with this error may be retried
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Llm(e) => e.is_retryable(),
            Self::Timeout { .. } | Self::Io(_) => true,
            _ => false,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
