//! LLM Provider Abstraction
//!
//! Defines the `Transport` trait (the only network boundary) and the shared
//! request/response types used by `ProviderAdapter`.
//!
//! ## Modules
//!
//! - `adapter`: Generation contract with budget capping, caching and retry
//! - `retry`: Backoff arithmetic and cancellable delays
//! - `registry`: Adapter construction per provider, with fallback
//! - `openai` / `gemini`: HTTP transports

mod adapter;
mod gemini;
mod openai;
mod registry;
mod retry;

pub use adapter::{AdapterContext, ProviderAdapter, fit_max_tokens};
pub use gemini::GeminiTransport;
pub use openai::OpenAiTransport;
pub use registry::ProviderRegistry;
pub use retry::{Delay, TokioDelay, backoff_delay, retry_delay};

// Re-export error types from centralized location
pub use crate::types::{ErrorCategory, ErrorClassifier, LlmError};

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

// =============================================================================
// Provider Kind
// =============================================================================

/// Supported LLM providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAi,
    Gemini,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 2] = [ProviderKind::OpenAi, ProviderKind::Gemini];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Gemini => "gemini",
        }
    }

    /// Model used when a request names none or names an unsupported one
    pub fn default_model(&self) -> &'static str {
        match self {
            Self::OpenAi => "gpt-4o-mini",
            Self::Gemini => "gemini-2.0-flash",
        }
    }

    /// Environment variable consulted when no API key is configured
    pub fn api_key_env(&self) -> &'static str {
        match self {
            Self::OpenAi => "OPENAI_API_KEY",
            Self::Gemini => "GEMINI_API_KEY",
        }
    }

    pub fn default_api_base(&self) -> &'static str {
        match self {
            Self::OpenAi => "https://api.openai.com/v1",
            Self::Gemini => "https://generativelanguage.googleapis.com/v1beta",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "gemini" | "google" => Ok(Self::Gemini),
            _ => Err(format!(
                "Unknown provider: {}. Supported: openai, gemini",
                s
            )),
        }
    }
}

// =============================================================================
// Transport
// =============================================================================

/// Token usage reported by the provider
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Input tokens (prompt)
    pub input_tokens: u32,
    /// Output tokens (response)
    pub output_tokens: u32,
}

impl TokenUsage {
    pub fn new(input_tokens: u32, output_tokens: u32) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    pub fn total(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}

/// One provider call with fully resolved parameters
#[derive(Debug, Clone, Copy)]
pub struct TransportRequest<'a> {
    pub prompt: &'a str,
    pub model: &'a str,
    pub temperature: f32,
    pub max_tokens: usize,
    pub credential: &'a SecretString,
}

/// Successful provider reply
#[derive(Debug, Clone, PartialEq)]
pub struct TransportReply {
    pub content: String,
    /// Model id echoed by the provider
    pub model_id: String,
    pub usage: Option<TokenUsage>,
}

/// Network boundary to a provider API
///
/// Implementations classify every failure into an `LlmError`, attaching
/// `retry_after` when the provider supplies one.
#[async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    fn kind(&self) -> ProviderKind;

    async fn send(&self, request: TransportRequest<'_>) -> Result<TransportReply, LlmError>;
}

pub type SharedTransport = Arc<dyn Transport>;

// =============================================================================
// Generation Request / Response
// =============================================================================

/// Per-call options for `ProviderAdapter::generate_text`
#[derive(Debug, Clone, Default)]
pub struct GenerationOptions {
    /// Model override; unsupported ids fall back to the adapter default
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<usize>,
    /// Credential override for this call only
    pub credential: Option<SecretString>,
    /// Output language hint, recorded in response metadata
    pub language: Option<String>,
    /// Names already known to the caller, used by extraction prompts
    pub existing_items: Vec<String>,
    /// Aborts backoff sleeps and in-flight calls
    pub cancel: Option<CancellationToken>,
    /// Make exactly one attempt; rate limits surface immediately
    pub disable_retries: bool,
}

impl GenerationOptions {
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_credential(mut self, credential: SecretString) -> Self {
        self.credential = Some(credential);
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn without_retries(mut self) -> Self {
        self.disable_retries = true;
        self
    }
}

/// Generated text plus bookkeeping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResponse {
    pub content: String,
    pub model_used: String,
    /// Provider-reported total tokens; absent for merged batch responses
    pub token_count: Option<u32>,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_kind_roundtrip() {
        for kind in ProviderKind::ALL {
            assert_eq!(kind.as_str().parse::<ProviderKind>().unwrap(), kind);
        }
        assert_eq!("Google".parse::<ProviderKind>().unwrap(), ProviderKind::Gemini);
        assert!("anthropic".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn test_provider_kind_serde() {
        let json = serde_json::to_string(&ProviderKind::OpenAi).unwrap();
        assert_eq!(json, "\"openai\"");
    }

    #[test]
    fn test_options_builder() {
        let options = GenerationOptions::default()
            .with_model("gpt-4o")
            .with_max_tokens(42)
            .without_retries();
        assert_eq!(options.model.as_deref(), Some("gpt-4o"));
        assert_eq!(options.max_tokens, Some(42));
        assert!(options.disable_retries);
        assert!(options.credential.is_none());
    }

    #[test]
    fn test_default_models_are_catalogued() {
        let catalog = crate::ai::catalog::ModelCatalog::builtin();
        for kind in ProviderKind::ALL {
            assert!(catalog.supports(kind, kind.default_model()));
        }
    }
}
