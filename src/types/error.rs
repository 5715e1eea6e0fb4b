//! Unified Error Type System
//!
//! Centralized error types for the orchestration layer.
//! Provides error classification for retry decisions.
//!
//! ## Error Categories
//!
//! - **RateLimit**: Provider quota window exhausted (wait and retry)
//! - **Overloaded**: Provider capacity exhausted (wait longer and retry)
//! - **TokenLimit**: Context too large (never retried)
//! - **Auth**: Authentication failures (fail fast)
//! - **Network**: Connectivity issues
//! - **ParseError**: Response could not be interpreted
//!
//! Per-attempt transport failures are `LlmError`s. Once the adapter has spent
//! its retry budget they are folded into a single `QuizloomError` variant that
//! names the likely cause.

use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Error Categories
// =============================================================================

/// Error categories for retry routing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Rate limited - wait then retry
    RateLimit,
    /// Provider overloaded - back off harder then retry
    Overloaded,
    /// Context/token limit exceeded - never retried
    TokenLimit,
    /// Authentication failed
    Auth,
    /// Network/connectivity issues
    Network,
    /// Invalid request
    BadRequest,
    /// Provider response could not be parsed
    ParseError,
    /// Provider endpoint or model unavailable
    Unavailable,
    /// Unknown error
    Unknown,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RateLimit => write!(f, "RATE_LIMIT"),
            Self::Overloaded => write!(f, "OVERLOADED"),
            Self::TokenLimit => write!(f, "TOKEN_LIMIT"),
            Self::Auth => write!(f, "AUTH"),
            Self::Network => write!(f, "NETWORK"),
            Self::BadRequest => write!(f, "BAD_REQUEST"),
            Self::ParseError => write!(f, "PARSE_ERROR"),
            Self::Unavailable => write!(f, "UNAVAILABLE"),
            Self::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

impl ErrorCategory {
    /// Only throttling and overload are retried by the adapter
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimit | Self::Overloaded)
    }
}

// =============================================================================
// LLM Error
// =============================================================================

/// Classified error from a single transport attempt
#[derive(Debug, Clone)]
pub struct LlmError {
    /// Error category for routing decisions
    pub category: ErrorCategory,
    /// Detailed error message
    pub message: String,
    /// Provider that produced the error
    pub provider: Option<String>,
    /// Provider-supplied wait before retry
    pub retry_after: Option<Duration>,
    /// HTTP status, when the failure came from a response
    pub status: Option<u16>,
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
            status: None,
        }
    }

    pub fn with_provider(
        category: ErrorCategory,
        message: impl Into<String>,
        provider: impl Into<String>,
    ) -> Self {
        Self::new(category, message).provider(provider)
    }

    /// Add provider context to existing error
    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Add provider-supplied retry delay
    pub fn retry_after(mut self, duration: Duration) -> Self {
        self.retry_after = Some(duration);
        self
    }

    pub fn status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn is_retryable(&self) -> bool {
        self.category.is_retryable()
    }
}

// =============================================================================
// Error Classifier
// =============================================================================

/// Maps provider failures onto `ErrorCategory`
pub struct ErrorClassifier;

impl ErrorClassifier {
    /// Classify an error message from any provider
    pub fn classify(message: &str, provider: &str) -> LlmError {
        let lower = message.to_lowercase();

        if lower.contains("rate limit")
            || lower.contains("too many requests")
            || lower.contains("resource_exhausted")
            || lower.contains("quota")
        {
            return LlmError::with_provider(ErrorCategory::RateLimit, message, provider);
        }

        if lower.contains("overloaded")
            || lower.contains("service unavailable")
            || lower.contains("capacity")
            || lower.contains("try again later")
        {
            return LlmError::with_provider(ErrorCategory::Overloaded, message, provider);
        }

        if lower.contains("context length")
            || lower.contains("context_length_exceeded")
            || lower.contains("maximum context")
            || lower.contains("too many tokens")
            || lower.contains("too large")
        {
            return LlmError::with_provider(ErrorCategory::TokenLimit, message, provider);
        }

        if lower.contains("api key")
            || lower.contains("unauthorized")
            || lower.contains("permission denied")
            || lower.contains("invalid_api_key")
        {
            return LlmError::with_provider(ErrorCategory::Auth, message, provider);
        }

        if lower.contains("connection")
            || lower.contains("dns")
            || lower.contains("timed out")
            || lower.contains("timeout")
        {
            return LlmError::with_provider(ErrorCategory::Network, message, provider);
        }

        if lower.contains("parse") || lower.contains("json") || lower.contains("decode") {
            return LlmError::with_provider(ErrorCategory::ParseError, message, provider);
        }

        LlmError::with_provider(ErrorCategory::Unknown, message, provider)
    }

    /// Classify HTTP status code directly (more accurate than string matching)
    pub fn classify_http_status(status: u16, message: &str, provider: &str) -> LlmError {
        let error = match status {
            429 => {
                // Some providers report overload with a 429 status
                let classified = Self::classify(message, provider);
                if classified.category == ErrorCategory::Overloaded {
                    classified
                } else {
                    LlmError::with_provider(ErrorCategory::RateLimit, message, provider)
                }
            }
            503 | 529 => LlmError::with_provider(ErrorCategory::Overloaded, message, provider),
            413 => LlmError::with_provider(ErrorCategory::TokenLimit, message, provider),
            401 | 403 => LlmError::with_provider(ErrorCategory::Auth, message, provider),
            400 => {
                let classified = Self::classify(message, provider);
                if classified.category == ErrorCategory::TokenLimit {
                    classified
                } else {
                    LlmError::with_provider(ErrorCategory::BadRequest, message, provider)
                }
            }
            404 => LlmError::with_provider(ErrorCategory::Unavailable, message, provider),
            _ => Self::classify(message, provider),
        };
        error.status(status)
    }

    /// Parse a `Retry-After` header value given in seconds
    pub fn parse_retry_after(value: &str) -> Option<Duration> {
        let secs = value.trim().parse::<f64>().ok()?;
        if !secs.is_finite() || secs < 0.0 {
            return None;
        }
        Some(Duration::from_secs_f64(secs))
    }
}

// =============================================================================
// Application Error
// =============================================================================

#[derive(Debug, Error)]
pub enum QuizloomError {
    // -------------------------------------------------------------------------
    // System Errors (auto From impl)
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    // -------------------------------------------------------------------------
    // Provider Errors
    // -------------------------------------------------------------------------
    #[error(
        "Rate limit exceeded for {provider} after {attempts} attempt(s); the API quota or billing plan may be exhausted"
    )]
    RateLimited {
        provider: String,
        attempts: u32,
        retry_after: Option<Duration>,
    },

    #[error("{provider} stayed overloaded after {attempts} attempt(s)")]
    Overloaded { provider: String, attempts: u32 },

    #[error(
        "Prompt of ~{prompt_tokens} tokens is too large for {model} (context window {context_tokens})"
    )]
    ContextTooLarge {
        model: String,
        prompt_tokens: usize,
        context_tokens: usize,
    },

    #[error("{provider} error{}: {message}", status_suffix(.code))]
    Provider {
        provider: String,
        code: Option<u16>,
        message: String,
    },

    // -------------------------------------------------------------------------
    // Domain Errors
    // -------------------------------------------------------------------------
    #[error("Failed to parse model output: {0}")]
    Parse(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Operation cancelled: {operation}")]
    Cancelled { operation: String },
}

pub type Result<T> = std::result::Result<T, QuizloomError>;

fn status_suffix(code: &Option<u16>) -> String {
    code.map(|c| format!(" ({c})")).unwrap_or_default()
}

impl From<LlmError> for QuizloomError {
    /// Single-attempt mapping used when retries are disabled or not applicable
    fn from(err: LlmError) -> Self {
        let provider = err.provider.clone().unwrap_or_else(|| "provider".to_string());
        match err.category {
            ErrorCategory::RateLimit => QuizloomError::RateLimited {
                provider,
                attempts: 1,
                retry_after: err.retry_after,
            },
            ErrorCategory::Overloaded => QuizloomError::Overloaded {
                provider,
                attempts: 1,
            },
            _ => QuizloomError::Provider {
                provider,
                code: err.status,
                message: err.message,
            },
        }
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

impl QuizloomError {
    pub fn cancelled(operation: impl Into<String>) -> Self {
        Self::Cancelled {
            operation: operation.into(),
        }
    }

    /// Whether a caller may reasonably try the same request again later
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::Overloaded { .. })
    }

    /// Actionable message suitable for end users
    pub fn user_message(&self) -> String {
        match self {
            Self::RateLimited { provider, .. } => format!(
                "The {provider} service is rejecting requests because its usage limit was reached. \
                 Wait a few minutes, or check the API quota and billing settings."
            ),
            Self::Overloaded { provider, .. } => format!(
                "The {provider} service is temporarily overloaded. Please try again shortly."
            ),
            Self::ContextTooLarge { model, .. } => format!(
                "The document is too long for {model}. Split it into smaller parts or choose a model with a larger context window."
            ),
            Self::Provider { provider, .. } => format!(
                "The {provider} service returned an error. Please try again; if it persists, check the provider configuration."
            ),
            Self::Parse(_) => {
                "The AI response could not be understood. Please try again.".to_string()
            }
            Self::Config(msg) => format!("Configuration problem: {msg}"),
            Self::Cancelled { .. } => "The request was cancelled.".to_string(),
            Self::Io(_) | Self::Json(_) | Self::Yaml(_) => {
                "An internal error occurred while processing the request.".to_string()
            }
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
    fn test_error_category_display() {
        assert_eq!(ErrorCategory::RateLimit.to_string(), "RATE_LIMIT");
        assert_eq!(ErrorCategory::Overloaded.to_string(), "OVERLOADED");
        assert_eq!(ErrorCategory::TokenLimit.to_string(), "TOKEN_LIMIT");
    }

    #[test]
    fn test_only_throttling_is_retryable() {
        assert!(ErrorCategory::RateLimit.is_retryable());
        assert!(ErrorCategory::Overloaded.is_retryable());
        assert!(!ErrorCategory::TokenLimit.is_retryable());
        assert!(!ErrorCategory::Auth.is_retryable());
        assert!(!ErrorCategory::Network.is_retryable());
    }

    #[test]
    fn test_classify_http_status() {
        let rate = ErrorClassifier::classify_http_status(429, "slow down", "openai");
        assert_eq!(rate.category, ErrorCategory::RateLimit);
        assert_eq!(rate.status, Some(429));

        let overloaded = ErrorClassifier::classify_http_status(529, "busy", "gemini");
        assert_eq!(overloaded.category, ErrorCategory::Overloaded);

        let unavailable = ErrorClassifier::classify_http_status(503, "", "gemini");
        assert_eq!(unavailable.category, ErrorCategory::Overloaded);

        let context = ErrorClassifier::classify_http_status(
            400,
            "This model's maximum context length is 128000 tokens",
            "openai",
        );
        assert_eq!(context.category, ErrorCategory::TokenLimit);

        let bad = ErrorClassifier::classify_http_status(400, "missing field", "openai");
        assert_eq!(bad.category, ErrorCategory::BadRequest);

        let auth = ErrorClassifier::classify_http_status(401, "Unauthorized", "openai");
        assert_eq!(auth.category, ErrorCategory::Auth);
    }

    #[test]
    fn test_classify_messages() {
        let err = ErrorClassifier::classify("RESOURCE_EXHAUSTED: quota exceeded", "gemini");
        assert_eq!(err.category, ErrorCategory::RateLimit);

        let err = ErrorClassifier::classify("The model is overloaded", "gemini");
        assert_eq!(err.category, ErrorCategory::Overloaded);

        let err = ErrorClassifier::classify("Something weird happened", "test");
        assert_eq!(err.category, ErrorCategory::Unknown);
    }

    #[test]
    fn test_parse_retry_after() {
        assert_eq!(
            ErrorClassifier::parse_retry_after("30"),
            Some(Duration::from_secs(30))
        );
        assert_eq!(
            ErrorClassifier::parse_retry_after(" 1.5 "),
            Some(Duration::from_millis(1500))
        );
        assert_eq!(ErrorClassifier::parse_retry_after("soon"), None);
        assert_eq!(ErrorClassifier::parse_retry_after("-3"), None);
    }

    #[test]
    fn test_llm_error_conversion() {
        let err: QuizloomError = LlmError::with_provider(ErrorCategory::RateLimit, "429", "openai")
            .retry_after(Duration::from_secs(2))
            .into();
        assert!(matches!(
            err,
            QuizloomError::RateLimited {
                attempts: 1,
                retry_after: Some(_),
                ..
            }
        ));

        let err: QuizloomError =
            LlmError::with_provider(ErrorCategory::Auth, "bad key", "openai").status(401).into();
        assert!(matches!(
            err,
            QuizloomError::Provider {
                code: Some(401),
                ..
            }
        ));
    }

    #[test]
    fn test_provider_error_display() {
        let err = QuizloomError::Provider {
            provider: "openai".into(),
            code: Some(500),
            message: "boom".into(),
        };
        assert_eq!(err.to_string(), "openai error (500): boom");

        let err = QuizloomError::Provider {
            provider: "gemini".into(),
            code: None,
            message: "boom".into(),
        };
        assert_eq!(err.to_string(), "gemini error: boom");
    }

    #[test]
    fn test_user_message_distinguishes_causes() {
        let rate = QuizloomError::RateLimited {
            provider: "openai".into(),
            attempts: 3,
            retry_after: None,
        };
        assert!(rate.user_message().contains("billing"));
        assert!(rate.is_retryable());

        let overloaded = QuizloomError::Overloaded {
            provider: "gemini".into(),
            attempts: 3,
        };
        assert!(overloaded.user_message().contains("overloaded"));

        let llm_display = LlmError::with_provider(ErrorCategory::Network, "down", "gemini");
        assert_eq!(llm_display.to_string(), "[gemini:NETWORK] down");
    }
}
