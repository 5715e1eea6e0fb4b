//! Provider Adapter
//!
//! Common generation contract over any `Transport`.
//!
//! ## Strategy
//!
//! 1. Resolve the credential (per-call override or configured key)
//! 2. Resolve the model, falling back to the adapter default when unsupported
//! 3. Apply default temperature / max tokens
//! 4. Cap max tokens to the model output limit minus a safety reserve
//! 5. Reject prompts above 90% of the context window; otherwise shrink the
//!    output allowance until prompt + output fits
//! 6. Serve from cache when possible
//! 7. Call the transport, retrying rate limits (x2 backoff) and overloads
//!    (x3 backoff); every other failure aborts immediately

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::retry::{Delay, TokioDelay, retry_delay};
use super::{
    GenerationOptions, GenerationResponse, ProviderKind, SharedTransport, TransportReply,
    TransportRequest,
};
use crate::ai::cache::{ResponseCache, cache_key, credential_fingerprint};
use crate::ai::catalog::ModelCatalog;
use crate::ai::metrics::SharedMetrics;
use crate::ai::tokenizer::{CharEstimator, TokenEstimator};
use crate::constants::{budget, generation, retry as retry_constants};
use crate::types::{ErrorCategory, LlmError, QuizloomError, Result};

// =============================================================================
// Shared Context
// =============================================================================

/// Collaborators shared by every adapter of a registry
#[derive(Debug, Clone)]
pub struct AdapterContext {
    pub catalog: Arc<ModelCatalog>,
    pub cache: Arc<ResponseCache>,
    pub metrics: SharedMetrics,
    pub estimator: Arc<dyn TokenEstimator>,
    pub delay: Arc<dyn Delay>,
}

impl AdapterContext {
    /// Context with the character estimator and tokio-backed delays
    pub fn new(catalog: Arc<ModelCatalog>, cache: Arc<ResponseCache>, metrics: SharedMetrics) -> Self {
        Self {
            catalog,
            cache,
            metrics,
            estimator: Arc::new(CharEstimator),
            delay: Arc::new(TokioDelay),
        }
    }

    pub fn with_estimator(mut self, estimator: Arc<dyn TokenEstimator>) -> Self {
        self.estimator = estimator;
        self
    }

    pub fn with_delay(mut self, delay: Arc<dyn Delay>) -> Self {
        self.delay = delay;
        self
    }
}

// =============================================================================
// Budget Arithmetic
// =============================================================================

/// Output allowance that keeps a call inside the model limits
///
/// Returns `None` when the prompt alone exceeds 90% of the context window.
pub fn fit_max_tokens(
    prompt_tokens: usize,
    requested: usize,
    output_limit: usize,
    context_limit: usize,
) -> Option<usize> {
    let mut max_tokens = requested;
    if max_tokens > output_limit {
        max_tokens = output_limit
            .saturating_sub(budget::SAFETY_RESERVE_TOKENS)
            .max(1);
    }

    if prompt_tokens as f64 > budget::MAX_PROMPT_CONTEXT_RATIO * context_limit as f64 {
        return None;
    }

    if prompt_tokens + max_tokens > context_limit {
        max_tokens = context_limit
            .saturating_sub(prompt_tokens)
            .saturating_sub(budget::SAFETY_RESERVE_TOKENS)
            .max(budget::MIN_OUTPUT_TOKENS);
    }

    Some(max_tokens)
}

// =============================================================================
// Adapter
// =============================================================================

/// Generation contract for one provider
///
/// Built by `ProviderRegistry` from an explicit credential. A per-call
/// credential override is passed straight to the transport and scopes the
/// cache; the adapter itself is never rebuilt.
#[derive(Clone)]
pub struct ProviderAdapter {
    kind: ProviderKind,
    transport: SharedTransport,
    credential: Option<SecretString>,
    /// Cache partition for adapters bound to a caller's own credential
    cache_scope: Option<String>,
    default_model: String,
    max_retries: u32,
    ctx: AdapterContext,
}

impl std::fmt::Debug for ProviderAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderAdapter")
            .field("kind", &self.kind)
            .field("transport", &self.transport)
            .field("credential", &self.credential.as_ref().map(|_| "[REDACTED]"))
            .field("cache_scoped", &self.cache_scope.is_some())
            .field("default_model", &self.default_model)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

impl ProviderAdapter {
    pub fn new(
        kind: ProviderKind,
        transport: SharedTransport,
        credential: Option<SecretString>,
        ctx: AdapterContext,
    ) -> Self {
        Self {
            kind,
            transport,
            credential,
            cache_scope: None,
            default_model: kind.default_model().to_string(),
            max_retries: retry_constants::MIN_ATTEMPTS,
            ctx,
        }
    }

    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    /// Keep cached responses of this adapter apart from the shared ones
    ///
    /// Used for adapters built around a caller-supplied credential.
    pub fn with_isolated_cache(mut self) -> Self {
        self.cache_scope = self.credential.as_ref().map(credential_fingerprint);
        self
    }

    /// Configured attempt count; never fewer than three are made
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn kind(&self) -> ProviderKind {
        self.kind
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    pub fn has_credential(&self) -> bool {
        self.credential.is_some()
    }

    pub fn catalog(&self) -> &ModelCatalog {
        &self.ctx.catalog
    }

    pub fn estimator(&self) -> &dyn TokenEstimator {
        self.ctx.estimator.as_ref()
    }

    pub fn delay(&self) -> &dyn Delay {
        self.ctx.delay.as_ref()
    }

    /// Model that a request for `requested` will actually use
    pub fn resolve_model(&self, requested: Option<&str>) -> String {
        match requested {
            Some(model) if self.ctx.catalog.supports(self.kind, model) => model.to_string(),
            _ => self.default_model.clone(),
        }
    }

    /// Generate text for a finished prompt
    #[instrument(skip_all, fields(provider = %self.kind))]
    pub async fn generate_text(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<GenerationResponse> {
        let (credential, scope) = self.resolve_credential(options)?;

        // Model
        let mut metadata = BTreeMap::new();
        let model = match options.model.as_deref() {
            Some(requested) if !self.ctx.catalog.supports(self.kind, requested) => {
                warn!(
                    requested,
                    fallback = %self.default_model,
                    "Model not available for provider, using default"
                );
                metadata.insert("model_fallback_from".to_string(), json!(requested));
                self.default_model.clone()
            }
            requested => self.resolve_model(requested),
        };

        // Parameters and budget
        let temperature = options
            .temperature
            .unwrap_or(generation::DEFAULT_TEMPERATURE);
        let requested_tokens = options.max_tokens.unwrap_or(generation::DEFAULT_MAX_TOKENS);
        let prompt_tokens = self.ctx.estimator.estimate(prompt);
        let context_limit = self.ctx.catalog.context_limit(&model);
        let output_limit = self.ctx.catalog.output_limit(&model);

        let max_tokens = fit_max_tokens(prompt_tokens, requested_tokens, output_limit, context_limit)
            .ok_or_else(|| QuizloomError::ContextTooLarge {
                model: model.clone(),
                prompt_tokens,
                context_tokens: context_limit,
            })?;
        if max_tokens != requested_tokens {
            debug!(
                requested = requested_tokens,
                granted = max_tokens,
                prompt_tokens,
                "Adjusted max tokens to fit model limits"
            );
        }

        // Cache
        let key = cache_key(prompt, &model, temperature, max_tokens, scope.as_deref());
        if let Some(hit) = self.ctx.cache.get(&key) {
            debug!(model = %model, "Cache hit");
            self.ctx.metrics.record_cache_hit();
            return Ok(hit);
        }
        self.ctx.metrics.record_cache_miss();

        // Call
        let request = TransportRequest {
            prompt,
            model: &model,
            temperature,
            max_tokens,
            credential,
        };
        let cancel = options.cancel.clone().unwrap_or_default();
        let started = Instant::now();
        let (reply, attempts) = self
            .send_with_retry(request, &cancel, options.disable_retries)
            .await
            .map_err(|e| {
                self.ctx.metrics.record_failure();
                self.map_final_error(e, &model, prompt_tokens, context_limit)
            })?;
        let latency_ms = started.elapsed().as_millis() as u64;

        let cost = self
            .ctx
            .catalog
            .get(&model)
            .zip(reply.usage)
            .map(|(m, u)| m.estimate_cost(u.input_tokens as u64, u.output_tokens as u64))
            .unwrap_or(0.0);
        self.ctx
            .metrics
            .record_call(&model, prompt_tokens, reply.usage, cost, latency_ms);

        metadata.insert("provider".to_string(), json!(self.kind.as_str()));
        metadata.insert("max_tokens".to_string(), json!(max_tokens));
        metadata.insert("estimated_prompt_tokens".to_string(), json!(prompt_tokens));
        metadata.insert("attempts".to_string(), json!(attempts));
        metadata.insert("estimator".to_string(), json!(self.ctx.estimator.name()));
        if let Some(usage) = reply.usage {
            metadata.insert("input_tokens".to_string(), json!(usage.input_tokens));
            metadata.insert("output_tokens".to_string(), json!(usage.output_tokens));
        }
        if let Some(language) = &options.language {
            metadata.insert("language".to_string(), json!(language));
        }

        let response = GenerationResponse {
            content: reply.content,
            model_used: if reply.model_id.is_empty() {
                model
            } else {
                reply.model_id
            },
            token_count: reply.usage.map(|u| u.total()),
            metadata,
        };

        info!(
            model = %response.model_used,
            attempts,
            latency_ms,
            "Generation complete"
        );
        self.ctx.cache.set(key, response.clone());
        Ok(response)
    }

    /// Credential for this call, plus a cache scope when it is an override
    fn resolve_credential<'a>(
        &'a self,
        options: &'a GenerationOptions,
    ) -> Result<(&'a SecretString, Option<String>)> {
        match (&options.credential, &self.credential) {
            (Some(over), Some(own)) if over.expose_secret() == own.expose_secret() => {
                Ok((own, self.cache_scope.clone()))
            }
            (Some(over), _) => Ok((over, Some(credential_fingerprint(over)))),
            (None, Some(own)) => Ok((own, self.cache_scope.clone())),
            (None, None) => Err(QuizloomError::Config(format!(
                "No API key configured for {}. Set {} or add it to the config file",
                self.kind,
                self.kind.api_key_env()
            ))),
        }
    }

    /// Send with bounded retries; returns the reply and attempts made
    async fn send_with_retry(
        &self,
        request: TransportRequest<'_>,
        cancel: &CancellationToken,
        disable_retries: bool,
    ) -> std::result::Result<(TransportReply, u32), AttemptError> {
        let max_attempts = if disable_retries {
            1
        } else {
            self.max_retries.max(retry_constants::MIN_ATTEMPTS)
        };

        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(AttemptError::Cancelled),
                result = self.transport.send(request) => result,
            };

            let error = match result {
                Ok(reply) => return Ok((reply, attempt)),
                Err(error) => error,
            };

            if !error.is_retryable() || attempt >= max_attempts {
                return Err(AttemptError::Failed { error, attempt });
            }

            let delay = retry_delay(&error, attempt);
            warn!(
                category = %error.category,
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                "Provider call failed, backing off"
            );
            self.ctx.metrics.record_retry();
            self.ctx
                .delay
                .sleep(delay, cancel)
                .await
                .map_err(|_| AttemptError::Cancelled)?;
        }
    }

    fn map_final_error(
        &self,
        error: AttemptError,
        model: &str,
        prompt_tokens: usize,
        context_limit: usize,
    ) -> QuizloomError {
        let (error, attempts) = match error {
            AttemptError::Cancelled => return QuizloomError::cancelled("generation"),
            AttemptError::Failed { error, attempt } => (error, attempt),
        };
        let provider = error
            .provider
            .clone()
            .unwrap_or_else(|| self.kind.to_string());

        match error.category {
            ErrorCategory::RateLimit => QuizloomError::RateLimited {
                provider,
                attempts,
                retry_after: error.retry_after,
            },
            ErrorCategory::Overloaded => QuizloomError::Overloaded { provider, attempts },
            ErrorCategory::TokenLimit => QuizloomError::ContextTooLarge {
                model: model.to_string(),
                prompt_tokens,
                context_tokens: context_limit,
            },
            _ => QuizloomError::Provider {
                provider,
                code: error.status,
                message: error.message,
            },
        }
    }
}

/// Outcome of the retry loop before it is mapped to a crate error
enum AttemptError {
    Cancelled,
    Failed { error: LlmError, attempt: u32 },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::testing::{MockTransport, RecordingDelay, overloaded, rate_limited, reply};
    use proptest::prelude::*;
    use std::time::Duration;

    fn adapter_with(
        transport: Arc<MockTransport>,
        cache: Arc<ResponseCache>,
    ) -> (ProviderAdapter, Arc<RecordingDelay>) {
        let delay = Arc::new(RecordingDelay::default());
        let ctx = AdapterContext::new(
            Arc::new(ModelCatalog::builtin()),
            cache,
            crate::ai::metrics::create_shared_metrics("test"),
        )
        .with_delay(delay.clone());
        let adapter = ProviderAdapter::new(
            ProviderKind::OpenAi,
            transport,
            Some(SecretString::from("sk-configured")),
            ctx,
        );
        (adapter, delay)
    }

    fn adapter(transport: Arc<MockTransport>) -> (ProviderAdapter, Arc<RecordingDelay>) {
        adapter_with(transport, Arc::new(ResponseCache::default()))
    }

    #[test]
    fn test_fit_max_tokens() {
        // Fits: unchanged
        assert_eq!(fit_max_tokens(1_000, 1_000, 16_384, 128_000), Some(1_000));
        // Above output limit: capped with reserve
        assert_eq!(fit_max_tokens(10, 20_000, 16_384, 128_000), Some(16_284));
        // Prompt over 90% of context: rejected
        assert_eq!(fit_max_tokens(115_201, 100, 16_384, 128_000), None);
        // Prompt + output over context: shrunk
        assert_eq!(fit_max_tokens(115_000, 16_000, 16_384, 128_000), Some(12_900));
        assert_eq!(fit_max_tokens(7_300, 2_000, 2_048, 8_192), Some(792));
        // Shrink floor
        assert_eq!(fit_max_tokens(900, 500, 1_000, 1_000), Some(100));
    }

    /// (prompt, requested, output_limit, context) with prompt + requested
    /// inside 90% of the context and requested inside the output limit
    fn within_budget() -> impl Strategy<Value = (usize, usize, usize, usize)> {
        (1_000usize..2_000_000)
            .prop_flat_map(|context| (0..context * 9 / 10, Just(context)))
            .prop_flat_map(|(prompt, context)| {
                let room = context * 9 / 10 - prompt;
                (Just(prompt), 1..=room, Just(context))
            })
            .prop_flat_map(|(prompt, requested, context)| {
                (
                    Just(prompt),
                    Just(requested),
                    requested..=requested.saturating_mul(4),
                    Just(context),
                )
            })
    }

    proptest! {
        #[test]
        fn prop_requested_tokens_untouched_within_budget(
            (prompt, requested, output_limit, context) in within_budget()
        ) {
            prop_assert_eq!(
                fit_max_tokens(prompt, requested, output_limit, context),
                Some(requested)
            );
        }

        #[test]
        fn prop_oversized_prompt_rejected(
            context in 1_000usize..2_000_000,
            excess in 1usize..1_000_000,
            requested in 1usize..50_000,
        ) {
            let prompt = context * 9 / 10 + excess;
            prop_assert_eq!(fit_max_tokens(prompt, requested, 16_384, context), None);
        }

        #[test]
        fn prop_granted_tokens_never_exceed_output_limit(
            prompt in 0usize..200_000,
            requested in 1usize..100_000,
            output_limit in 200usize..65_536,
        ) {
            if let Some(granted) = fit_max_tokens(prompt, requested, output_limit, 1_000_000) {
                prop_assert!(granted >= 1);
                prop_assert!(granted <= output_limit);
            }
        }
    }

    #[tokio::test]
    async fn test_requested_tokens_pass_through_when_within_budget() {
        let transport = Arc::new(MockTransport::replying(ProviderKind::OpenAi, "ok"));
        let (adapter, _) = adapter(transport.clone());

        let options = GenerationOptions::default().with_max_tokens(1_234);
        let response = adapter.generate_text("short prompt", &options).await.unwrap();

        assert_eq!(response.content, "ok");
        let sent = transport.requests();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].max_tokens, 1_234);
        assert_eq!(sent[0].model, "gpt-4o-mini");
        assert_eq!(sent[0].temperature, 0.7);
        assert_eq!(sent[0].credential, "sk-configured");
    }

    #[tokio::test]
    async fn test_defaults_applied() {
        let transport = Arc::new(MockTransport::replying(ProviderKind::OpenAi, "ok"));
        let (adapter, _) = adapter(transport.clone());
        adapter
            .generate_text("hi", &GenerationOptions::default())
            .await
            .unwrap();
        assert_eq!(transport.requests()[0].max_tokens, 1_000);
    }

    #[tokio::test]
    async fn test_output_cap_applies_reserve() {
        let transport = Arc::new(MockTransport::replying(ProviderKind::OpenAi, "ok"));
        let (adapter, _) = adapter(transport.clone());
        let options = GenerationOptions::default()
            .with_model("gpt-3.5-turbo")
            .with_max_tokens(50_000);
        adapter.generate_text("hi", &options).await.unwrap();
        assert_eq!(transport.requests()[0].max_tokens, 4_096 - 100);
    }

    #[tokio::test]
    async fn test_context_too_large_makes_no_call() {
        let transport = Arc::new(MockTransport::replying(ProviderKind::OpenAi, "ok"));
        let (adapter, _) = adapter(transport.clone());

        // gpt-3.5-turbo: 16,385 context, 90% ≈ 14,746 tokens ≈ 58,986 chars
        let prompt = "a".repeat(60_000);
        let options = GenerationOptions::default().with_model("gpt-3.5-turbo");
        let err = adapter.generate_text(&prompt, &options).await.unwrap_err();

        assert!(matches!(err, QuizloomError::ContextTooLarge { .. }));
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_unsupported_model_falls_back() {
        let transport = Arc::new(MockTransport::replying(ProviderKind::OpenAi, "ok"));
        let (adapter, _) = adapter(transport.clone());

        let options = GenerationOptions::default().with_model("gemini-2.5-pro");
        let response = adapter.generate_text("hi", &options).await.unwrap();

        assert_eq!(transport.requests()[0].model, "gpt-4o-mini");
        assert_eq!(
            response.metadata.get("model_fallback_from"),
            Some(&json!("gemini-2.5-pro"))
        );
    }

    #[tokio::test]
    async fn test_identical_calls_hit_cache() {
        let transport = Arc::new(MockTransport::replying(ProviderKind::OpenAi, "cached"));
        let (adapter, _) = adapter(transport.clone());
        let options = GenerationOptions::default();

        let first = adapter.generate_text("same", &options).await.unwrap();
        let second = adapter.generate_text("same", &options).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(transport.calls(), 1);

        adapter
            .generate_text("same", &options.clone().with_temperature(0.1))
            .await
            .unwrap();
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn test_expired_cache_calls_again() {
        let transport = Arc::new(MockTransport::replying(ProviderKind::OpenAi, "fresh"));
        let (adapter, _) = adapter_with(transport.clone(), Arc::new(ResponseCache::new(Duration::ZERO)));
        let options = GenerationOptions::default();

        adapter.generate_text("same", &options).await.unwrap();
        adapter.generate_text("same", &options).await.unwrap();
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn test_credential_override_scopes_cache() {
        let transport = Arc::new(MockTransport::replying(ProviderKind::OpenAi, "ok"));
        let (adapter, _) = adapter(transport.clone());

        adapter
            .generate_text("p", &GenerationOptions::default())
            .await
            .unwrap();
        let options =
            GenerationOptions::default().with_credential(SecretString::from("sk-user"));
        adapter.generate_text("p", &options).await.unwrap();

        let sent = transport.requests();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].credential, "sk-user");

        // Override equal to the configured key shares the unscoped entry
        let same = GenerationOptions::default().with_credential(SecretString::from("sk-configured"));
        adapter.generate_text("p", &same).await.unwrap();
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn test_missing_credential_is_config_error() {
        let transport = Arc::new(MockTransport::replying(ProviderKind::Gemini, "ok"));
        let ctx = AdapterContext::new(
            Arc::new(ModelCatalog::builtin()),
            Arc::new(ResponseCache::default()),
            crate::ai::metrics::create_shared_metrics("test"),
        );
        let adapter = ProviderAdapter::new(ProviderKind::Gemini, transport.clone(), None, ctx);

        let err = adapter
            .generate_text("p", &GenerationOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, QuizloomError::Config(_)));
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_rate_limit_retried_then_succeeds() {
        let transport = Arc::new(MockTransport::scripted(
            ProviderKind::OpenAi,
            vec![Err(rate_limited()), Err(rate_limited()), Ok(reply("done"))],
        ));
        let (adapter, delay) = adapter(transport.clone());

        let response = adapter
            .generate_text("p", &GenerationOptions::default())
            .await
            .unwrap();

        assert_eq!(response.content, "done");
        assert_eq!(response.metadata["attempts"], json!(3));
        assert_eq!(transport.calls(), 3);

        let sleeps = delay.recorded();
        assert_eq!(sleeps.len(), 2);
        assert!(sleeps[0] >= Duration::from_millis(800) && sleeps[0] <= Duration::from_millis(1_200));
        assert!(sleeps[1] >= Duration::from_millis(1_600) && sleeps[1] <= Duration::from_millis(2_400));
    }

    #[tokio::test]
    async fn test_retry_after_is_honored() {
        let transport = Arc::new(MockTransport::scripted(
            ProviderKind::OpenAi,
            vec![
                Err(rate_limited().retry_after(Duration::from_secs(7))),
                Ok(reply("done")),
            ],
        ));
        let (adapter, delay) = adapter(transport);
        adapter
            .generate_text("p", &GenerationOptions::default())
            .await
            .unwrap();
        assert_eq!(delay.recorded(), vec![Duration::from_secs(7)]);
    }

    #[tokio::test]
    async fn test_rate_limit_exhaustion() {
        let transport = Arc::new(MockTransport::scripted(
            ProviderKind::OpenAi,
            vec![Err(rate_limited())],
        ));
        let (adapter, _) = adapter(transport.clone());

        let err = adapter
            .generate_text("p", &GenerationOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, QuizloomError::RateLimited { attempts: 3, .. }));
        assert_eq!(transport.calls(), 3);
    }

    #[tokio::test]
    async fn test_configured_retries_above_minimum() {
        let transport = Arc::new(MockTransport::scripted(
            ProviderKind::OpenAi,
            vec![Err(overloaded())],
        ));
        let (adapter, delay) = adapter(transport.clone());
        let adapter = adapter.with_max_retries(5);

        let err = adapter
            .generate_text("p", &GenerationOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, QuizloomError::Overloaded { attempts: 5, .. }));
        assert_eq!(transport.calls(), 5);
        // x3 backoff: third sleep is ~9s
        let third = delay.recorded()[2];
        assert!(third >= Duration::from_millis(7_200) && third <= Duration::from_millis(10_800));
    }

    #[tokio::test]
    async fn test_non_retryable_aborts_immediately() {
        let transport = Arc::new(MockTransport::scripted(
            ProviderKind::OpenAi,
            vec![Err(LlmError::with_provider(ErrorCategory::Auth, "bad key", "openai").status(401))],
        ));
        let (adapter, delay) = adapter(transport.clone());

        let err = adapter
            .generate_text("p", &GenerationOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, QuizloomError::Provider { code: Some(401), .. }));
        assert_eq!(transport.calls(), 1);
        assert!(delay.recorded().is_empty());
    }

    #[tokio::test]
    async fn test_provider_token_limit_maps_to_context_error() {
        let transport = Arc::new(MockTransport::scripted(
            ProviderKind::OpenAi,
            vec![Err(LlmError::with_provider(
                ErrorCategory::TokenLimit,
                "maximum context length",
                "openai",
            ))],
        ));
        let (adapter, _) = adapter(transport.clone());
        let err = adapter
            .generate_text("p", &GenerationOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, QuizloomError::ContextTooLarge { .. }));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_disabled_retries_single_attempt() {
        let transport = Arc::new(MockTransport::scripted(
            ProviderKind::OpenAi,
            vec![Err(rate_limited())],
        ));
        let (adapter, delay) = adapter(transport.clone());

        let err = adapter
            .generate_text("p", &GenerationOptions::default().without_retries())
            .await
            .unwrap_err();

        assert!(matches!(err, QuizloomError::RateLimited { attempts: 1, .. }));
        assert_eq!(transport.calls(), 1);
        assert!(delay.recorded().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_before_call() {
        let transport = Arc::new(MockTransport::replying(ProviderKind::OpenAi, "ok"));
        let (adapter, _) = adapter(transport.clone());
        let token = CancellationToken::new();
        token.cancel();

        let err = adapter
            .generate_text("p", &GenerationOptions::default().with_cancel(token))
            .await
            .unwrap_err();

        assert!(matches!(err, QuizloomError::Cancelled { .. }));
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_metrics_recorded() {
        let transport = Arc::new(MockTransport::replying(ProviderKind::OpenAi, "ok"));
        let (adapter, _) = adapter(transport);
        let options = GenerationOptions::default();
        adapter.generate_text("count me", &options).await.unwrap();
        adapter.generate_text("count me", &options).await.unwrap();

        let summary = adapter.ctx.metrics.summary();
        assert_eq!(summary.network_calls, 1);
        assert_eq!(summary.cache_hits, 1);
        assert_eq!(summary.cache_misses, 1);
        assert_eq!(summary.estimated_prompt_tokens, 2);
    }
}
