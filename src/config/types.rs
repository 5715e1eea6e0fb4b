//! Configuration Types
//!
//! All configuration structures with sensible defaults.
//! Supports global (~/.config/quizloom/) and project (.quizloom/) level configuration.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::ai::cache::ResponseCache;
use crate::ai::features::{Feature, FeatureOverride};
use crate::ai::provider::ProviderKind;
use crate::ai::tokenizer::{CharEstimator, TokenEstimator, WordEstimator};
use crate::constants::{cache as cache_constants, chunking, network, retry};
use crate::types::{QuizloomError, Result};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Configuration version
    pub version: String,

    /// Provider selection and retry settings
    pub llm: LlmConfig,

    /// Per-provider credentials and endpoints
    pub providers: ProvidersConfig,

    /// Response cache settings
    pub cache: CacheConfig,

    /// Chunked generation profiles
    pub chunking: ChunkingConfig,

    /// Per-feature overrides of the built-in settings
    pub features: BTreeMap<Feature, FeatureOverride>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            llm: LlmConfig::default(),
            providers: ProvidersConfig::default(),
            cache: CacheConfig::default(),
            chunking: ChunkingConfig::default(),
            features: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Validate configuration values are within acceptable ranges.
    /// Returns `QuizloomError::Config` on validation failure.
    pub fn validate(&self) -> Result<()> {
        if self.llm.timeout_secs == 0 {
            return Err(QuizloomError::Config(
                "llm.timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.llm.max_retries == 0 {
            return Err(QuizloomError::Config(
                "llm.max_retries must be greater than 0".to_string(),
            ));
        }

        for kind in ProviderKind::ALL {
            if let Some(base) = &self.providers.get(kind).api_base {
                let parsed = url::Url::parse(base).map_err(|e| {
                    QuizloomError::Config(format!(
                        "providers.{}.api_base is not a valid URL ({}): {}",
                        kind, e, base
                    ))
                })?;
                if !matches!(parsed.scheme(), "http" | "https") {
                    return Err(QuizloomError::Config(format!(
                        "providers.{}.api_base must use http or https, got {}",
                        kind,
                        parsed.scheme()
                    )));
                }
            }
        }

        for (name, profile) in [
            ("high_throughput", &self.chunking.high_throughput),
            ("standard", &self.chunking.standard),
        ] {
            if profile.chunk_char_limit == 0 {
                return Err(QuizloomError::Config(format!(
                    "chunking.{}.chunk_char_limit must be greater than 0",
                    name
                )));
            }
        }

        if self.chunking.max_chunk_attempts == 0 {
            return Err(QuizloomError::Config(
                "chunking.max_chunk_attempts must be greater than 0".to_string(),
            ));
        }

        for (feature, patch) in &self.features {
            if let Some(temperature) = patch.temperature
                && !(0.0..=2.0).contains(&temperature)
            {
                return Err(QuizloomError::Config(format!(
                    "features.{}.temperature must be between 0.0 and 2.0, got {}",
                    feature, temperature
                )));
            }
            if patch.max_tokens == Some(0) {
                return Err(QuizloomError::Config(format!(
                    "features.{}.max_tokens must be greater than 0",
                    feature
                )));
            }
        }

        Ok(())
    }
}

// =============================================================================
// LLM Configuration
// =============================================================================

/// Token estimator selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EstimatorKind {
    /// ceil(chars / 4)
    #[default]
    Chars,
    /// 0.75 tokens per whitespace-separated word
    Words,
}

impl EstimatorKind {
    pub fn build(&self) -> Arc<dyn TokenEstimator> {
        match self {
            Self::Chars => Arc::new(CharEstimator),
            Self::Words => Arc::new(WordEstimator),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider used when a caller asks for none
    pub default_provider: ProviderKind,

    /// Provider used when the requested one has no credential
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_provider: Option<ProviderKind>,

    /// Attempts per call for rate limits and overloads (at least 3 are made)
    pub max_retries: u32,

    /// HTTP request timeout in seconds
    pub timeout_secs: u64,

    /// Pre-call token estimator
    pub estimator: EstimatorKind,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            default_provider: ProviderKind::OpenAi,
            fallback_provider: Some(ProviderKind::Gemini),
            max_retries: retry::MIN_ATTEMPTS,
            timeout_secs: network::DEFAULT_TIMEOUT_SECS,
            estimator: EstimatorKind::Chars,
        }
    }
}

// =============================================================================
// Provider Configuration
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub openai: ProviderConfig,
    pub gemini: ProviderConfig,
}

impl ProvidersConfig {
    pub fn get(&self, kind: ProviderKind) -> &ProviderConfig {
        match kind {
            ProviderKind::OpenAi => &self.openai,
            ProviderKind::Gemini => &self.gemini,
        }
    }
}

/// Settings for one provider
///
/// API keys are never serialized to output and are redacted in debug output.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// API key; falls back to the provider's environment variable
    #[serde(skip_serializing)]
    pub api_key: Option<String>,

    /// API base URL (for proxies and compatible endpoints)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,

    /// Model used when a request names none or an unsupported one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("api_base", &self.api_base)
            .field("default_model", &self.default_model)
            .finish()
    }
}

impl ProviderConfig {
    /// Configured key, or the provider's environment variable
    pub fn resolve_api_key(&self, kind: ProviderKind) -> Option<SecretString> {
        self.api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| {
                std::env::var(kind.api_key_env())
                    .ok()
                    .filter(|k| !k.trim().is_empty())
            })
            .map(SecretString::from)
    }
}

// =============================================================================
// Cache Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    /// Entry time-to-live in seconds
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: cache_constants::DEFAULT_TTL_SECS,
        }
    }
}

impl CacheConfig {
    pub fn build(&self) -> ResponseCache {
        if self.enabled {
            ResponseCache::new(Duration::from_secs(self.ttl_secs))
        } else {
            ResponseCache::disabled()
        }
    }
}

// =============================================================================
// Chunking Configuration
// =============================================================================

/// Thresholds and pacing for one class of model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkingProfile {
    /// Estimated tokens below which content goes out in one call
    pub single_call_threshold_tokens: usize,
    /// Maximum characters per chunk
    pub chunk_char_limit: usize,
    /// Pause before every chunk after the first (milliseconds)
    pub inter_chunk_delay_ms: u64,
    /// Pause before retrying a rate-limited chunk (milliseconds)
    pub rate_limit_cooldown_ms: u64,
}

impl ChunkingProfile {
    pub fn high_throughput() -> Self {
        Self {
            single_call_threshold_tokens: chunking::high_throughput::SINGLE_CALL_THRESHOLD_TOKENS,
            chunk_char_limit: chunking::high_throughput::CHUNK_CHAR_LIMIT,
            inter_chunk_delay_ms: chunking::high_throughput::INTER_CHUNK_DELAY_MS,
            rate_limit_cooldown_ms: chunking::high_throughput::RATE_LIMIT_COOLDOWN_MS,
        }
    }

    pub fn standard() -> Self {
        Self {
            single_call_threshold_tokens: chunking::standard::SINGLE_CALL_THRESHOLD_TOKENS,
            chunk_char_limit: chunking::standard::CHUNK_CHAR_LIMIT,
            inter_chunk_delay_ms: chunking::standard::INTER_CHUNK_DELAY_MS,
            rate_limit_cooldown_ms: chunking::standard::RATE_LIMIT_COOLDOWN_MS,
        }
    }

    pub fn inter_chunk_delay(&self) -> Duration {
        Duration::from_millis(self.inter_chunk_delay_ms)
    }

    pub fn rate_limit_cooldown(&self) -> Duration {
        Duration::from_millis(self.rate_limit_cooldown_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Profile for models with a context window of at least
    /// `high_throughput_context_tokens`
    pub high_throughput: ChunkingProfile,
    pub standard: ChunkingProfile,
    pub high_throughput_context_tokens: usize,
    /// Output allowance per chunk call
    pub chunk_max_tokens: usize,
    /// Attempts per chunk before it is abandoned
    pub max_chunk_attempts: u32,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            high_throughput: ChunkingProfile::high_throughput(),
            standard: ChunkingProfile::standard(),
            high_throughput_context_tokens: chunking::HIGH_THROUGHPUT_CONTEXT_TOKENS,
            chunk_max_tokens: chunking::CHUNK_MAX_TOKENS,
            max_chunk_attempts: chunking::MAX_CHUNK_ATTEMPTS,
        }
    }
}

impl ChunkingConfig {
    /// Profile for a model with the given context window
    pub fn profile_for(&self, context_tokens: usize) -> ChunkingProfile {
        if context_tokens >= self.high_throughput_context_tokens {
            self.high_throughput
        } else {
            self.standard
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.version, "1.0");
        assert_eq!(config.llm.default_provider, ProviderKind::OpenAi);
        assert_eq!(config.llm.fallback_provider, Some(ProviderKind::Gemini));
        assert!(config.cache.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.llm.timeout_secs = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.providers.openai.api_base = Some("not a url".into());
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.providers.gemini.api_base = Some("ftp://example.com".into());
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.features.insert(
            Feature::QuizGeneration,
            FeatureOverride {
                temperature: Some(3.5),
                ..Default::default()
            },
        );
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.chunking.standard.chunk_char_limit = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_profile_selection() {
        let chunking = ChunkingConfig::default();
        assert_eq!(chunking.profile_for(1_048_576), ChunkingProfile::high_throughput());
        assert_eq!(chunking.profile_for(128_000), ChunkingProfile::standard());
        assert!(
            chunking.standard.rate_limit_cooldown() > chunking.standard.inter_chunk_delay()
        );
    }

    #[test]
    fn test_api_key_never_serialized() {
        let mut config = Config::default();
        config.providers.openai.api_key = Some("sk-secret".into());

        let toml = toml::to_string_pretty(&config).unwrap();
        assert!(!toml.contains("sk-secret"));
        assert!(!format!("{:?}", config).contains("sk-secret"));
    }

    #[test]
    fn test_resolve_api_key_prefers_config() {
        let provider = ProviderConfig {
            api_key: Some("from-config".into()),
            ..Default::default()
        };
        let key = provider.resolve_api_key(ProviderKind::OpenAi).unwrap();
        assert_eq!(secrecy::ExposeSecret::expose_secret(&key), "from-config");
    }

    #[test]
    fn test_estimator_kind() {
        assert_eq!(EstimatorKind::Chars.build().name(), "chars");
        assert_eq!(EstimatorKind::Words.build().name(), "words");
    }

    #[test]
    fn test_cache_config_build() {
        let disabled = CacheConfig {
            enabled: false,
            ttl_secs: 10,
        };
        assert!(!disabled.build().is_enabled());
        assert_eq!(CacheConfig::default().build().ttl(), Duration::from_secs(3_600));
    }
}
