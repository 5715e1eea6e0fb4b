//! Generation Services
//!
//! `Orchestrator` wires the feature map, registry and chunk coordinator
//! together and exposes the feature-level operations applications call.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use super::cache::ResponseCache;
use super::catalog::ModelCatalog;
use super::chunked::{BatchOutcome, ChunkedGenerationCoordinator};
use super::features::{Feature, FeatureConfig, FeatureConfigMap, FeatureOverride};
use super::metrics::{MetricsSummary, create_shared_metrics};
use super::provider::{AdapterContext, GenerationOptions, GenerationResponse, ProviderAdapter, ProviderRegistry};
use crate::config::Config;
use crate::constants::{budget, quiz};
use crate::types::Result;

/// Output allowance for a quiz of `item_count` questions on a model with
/// `output_limit` output tokens
pub fn quiz_max_tokens(item_count: usize, output_limit: usize) -> usize {
    let wanted = quiz::BASE_TOKENS + quiz::TOKENS_PER_ITEM * item_count;
    wanted.min(
        output_limit
            .saturating_sub(budget::SAFETY_RESERVE_TOKENS)
            .max(budget::MIN_OUTPUT_TOKENS),
    )
}

/// Feature-level entry point over providers, cache and chunking
#[derive(Debug)]
pub struct Orchestrator {
    features: Arc<FeatureConfigMap>,
    overrides: BTreeMap<Feature, FeatureOverride>,
    registry: ProviderRegistry,
    coordinator: ChunkedGenerationCoordinator,
}

impl Orchestrator {
    /// Build every collaborator from `config`
    pub fn from_config(config: &Config) -> Self {
        let ctx = AdapterContext::new(
            Arc::new(ModelCatalog::builtin()),
            Arc::new(config.cache.build()),
            create_shared_metrics(Uuid::new_v4().to_string()),
        )
        .with_estimator(config.llm.estimator.build());

        Self::new(
            config,
            ProviderRegistry::from_config(config, ctx),
            ChunkedGenerationCoordinator::new(config.chunking.clone()),
        )
    }

    /// Assemble from an existing registry and coordinator
    pub fn new(
        config: &Config,
        registry: ProviderRegistry,
        coordinator: ChunkedGenerationCoordinator,
    ) -> Self {
        let features = Arc::new(FeatureConfigMap::new());
        features.initialize(&config.features);

        Self {
            features,
            overrides: config.features.clone(),
            registry,
            coordinator,
        }
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn catalog(&self) -> &ModelCatalog {
        &self.registry.context().catalog
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.registry.context().cache
    }

    pub fn features(&self) -> &FeatureConfigMap {
        &self.features
    }

    // =========================================================================
    // Feature Configuration
    // =========================================================================

    /// Adapter serving `feature`, falling back when its provider has no key
    pub fn service_for_feature(&self, feature: Feature) -> Result<Arc<ProviderAdapter>> {
        self.registry.resolve(self.features.get(feature).provider)
    }

    pub fn feature_config(&self, feature: Feature) -> FeatureConfig {
        self.features.get(feature)
    }

    /// Apply `patch` on top of the current settings of `feature`
    pub fn update_feature_config(&self, feature: Feature, patch: &FeatureOverride) -> FeatureConfig {
        let mut config = self.features.get(feature);
        config.apply(patch);
        self.features.update(feature, config.clone());
        config
    }

    /// Restore the configured settings of `feature`, as `reset` does for all
    pub fn reset_feature_config(&self, feature: Feature) {
        let mut config = FeatureConfig::builtin(feature);
        if let Some(patch) = self.overrides.get(&feature) {
            config.apply(patch);
        }
        self.features.update(feature, config);
    }

    /// Restore configured feature settings and drop cached responses
    pub fn reset(&self) {
        self.features.initialize(&self.overrides);
        self.registry.context().cache.clear();
        info!("Orchestrator state reset");
    }

    pub fn metrics(&self) -> MetricsSummary {
        self.registry.context().metrics.summary()
    }

    // =========================================================================
    // Generation
    // =========================================================================

    /// Adapter and effective options for a feature call
    ///
    /// Caller options win over feature settings. When the call has to go to a
    /// fallback provider, the feature's model is dropped so the fallback uses
    /// its own default.
    fn prepare(
        &self,
        feature: Feature,
        options: &GenerationOptions,
    ) -> Result<(Arc<ProviderAdapter>, GenerationOptions)> {
        let config = self.features.get(feature);
        let adapter = if options.credential.is_some() {
            self.registry.adapter(config.provider)?
        } else {
            self.registry.resolve(config.provider)?
        };

        let mut effective = options.clone();
        if effective.model.is_none() && adapter.kind() == config.provider {
            effective.model = Some(config.model.clone());
        }
        effective.temperature = effective.temperature.or(Some(config.temperature));
        effective.max_tokens = effective.max_tokens.or(config.max_tokens);

        debug!(
            feature = %feature,
            provider = %adapter.kind(),
            model = ?effective.model,
            "Prepared feature call"
        );
        Ok((adapter, effective))
    }

    /// Generate with the settings of `feature`
    pub async fn generate_for_feature(
        &self,
        feature: Feature,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<GenerationResponse> {
        let (adapter, effective) = self.prepare(feature, options)?;
        adapter.generate_text(prompt, &effective).await
    }

    /// Generate a quiz of `item_count` questions from a finished prompt
    ///
    /// The output allowance grows with the question count and is capped at
    /// the model's output limit.
    pub async fn generate_quiz(
        &self,
        prompt: &str,
        item_count: usize,
        options: &GenerationOptions,
    ) -> Result<GenerationResponse> {
        let (adapter, mut effective) = self.prepare(Feature::QuizGeneration, options)?;
        let model = adapter.resolve_model(effective.model.as_deref());
        let max_tokens = quiz_max_tokens(item_count, adapter.catalog().output_limit(&model));

        debug!(item_count, max_tokens, model = %model, "Quiz output allowance");
        effective.max_tokens = Some(max_tokens);
        adapter.generate_text(prompt, &effective).await
    }

    /// Extract study subjects from document text, chunking when needed
    pub async fn extract_subjects(
        &self,
        content: &str,
        options: &GenerationOptions,
    ) -> Result<BatchOutcome> {
        let (adapter, effective) = self.prepare(Feature::SubjectExtraction, options)?;
        self.coordinator.generate(&adapter, content, &effective).await
    }
}
