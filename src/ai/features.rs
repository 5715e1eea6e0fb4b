//! Feature Configuration Map
//!
//! Maps each application feature to the provider, model and sampling
//! parameters it generates with. The map is constructed explicitly, seeded
//! with built-in defaults, optionally overlaid with configured overrides, and
//! mutable at runtime. A lookup for a feature without an entry resolves to
//! the `default` entry, which is always present.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::ai::provider::ProviderKind;

/// Semantic feature names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    Default,
    QuizGeneration,
    QuizExplanation,
    SubjectExtraction,
    PatternDetection,
    PatternGeneration,
}

impl Feature {
    pub const ALL: [Feature; 6] = [
        Feature::Default,
        Feature::QuizGeneration,
        Feature::QuizExplanation,
        Feature::SubjectExtraction,
        Feature::PatternDetection,
        Feature::PatternGeneration,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::QuizGeneration => "quiz_generation",
            Self::QuizExplanation => "quiz_explanation",
            Self::SubjectExtraction => "subject_extraction",
            Self::PatternDetection => "pattern_detection",
            Self::PatternGeneration => "pattern_generation",
        }
    }
}

impl std::fmt::Display for Feature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Feature {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|f| f.as_str() == normalized)
            .ok_or_else(|| {
                let valid: Vec<&str> = Self::ALL.iter().map(|f| f.as_str()).collect();
                format!("Unknown feature: {}. Valid values: {}", s, valid.join(", "))
            })
    }
}

/// Generation settings for one feature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureConfig {
    pub feature: Feature,
    pub provider: ProviderKind,
    pub model: String,
    pub temperature: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<usize>,
}

impl FeatureConfig {
    fn new(
        feature: Feature,
        provider: ProviderKind,
        model: &str,
        temperature: f32,
        max_tokens: Option<usize>,
    ) -> Self {
        Self {
            feature,
            provider,
            model: model.to_string(),
            temperature,
            max_tokens,
        }
    }

    /// Built-in settings for `feature`
    pub fn builtin(feature: Feature) -> Self {
        use ProviderKind::{Gemini, OpenAi};

        match feature {
            Feature::Default => Self::new(feature, OpenAi, "gpt-4o-mini", 0.7, None),
            Feature::QuizGeneration => Self::new(feature, OpenAi, "gpt-4o-mini", 0.7, Some(4_000)),
            Feature::QuizExplanation => {
                Self::new(feature, OpenAi, "gpt-4o-mini", 0.5, Some(1_000))
            }
            Feature::SubjectExtraction => {
                Self::new(feature, Gemini, "gemini-2.0-flash", 0.3, Some(4_000))
            }
            Feature::PatternDetection => {
                Self::new(feature, Gemini, "gemini-2.0-flash", 0.3, Some(4_000))
            }
            Feature::PatternGeneration => Self::new(feature, OpenAi, "gpt-4o", 0.8, Some(2_000)),
        }
    }

    /// Apply the fields set in `patch`
    pub fn apply(&mut self, patch: &FeatureOverride) {
        if let Some(provider) = patch.provider {
            self.provider = provider;
        }
        if let Some(model) = &patch.model {
            self.model = model.clone();
        }
        if let Some(temperature) = patch.temperature {
            self.temperature = temperature;
        }
        if patch.max_tokens.is_some() {
            self.max_tokens = patch.max_tokens;
        }
    }
}

/// Partial feature settings from configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureOverride {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<ProviderKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<usize>,
}

// =============================================================================
// Feature Map
// =============================================================================

/// Shared feature-to-settings map
#[derive(Debug)]
pub struct FeatureConfigMap {
    entries: RwLock<HashMap<Feature, FeatureConfig>>,
}

impl Default for FeatureConfigMap {
    fn default() -> Self {
        Self::new()
    }
}

impl FeatureConfigMap {
    /// Map seeded with the built-in settings of every feature
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Self::builtin_entries()),
        }
    }

    fn builtin_entries() -> HashMap<Feature, FeatureConfig> {
        Feature::ALL
            .into_iter()
            .map(|f| (f, FeatureConfig::builtin(f)))
            .collect()
    }

    /// Reseed with built-ins, then overlay `overrides`
    pub fn initialize(&self, overrides: &BTreeMap<Feature, FeatureOverride>) {
        let mut entries = Self::builtin_entries();
        for (feature, patch) in overrides {
            if let Some(config) = entries.get_mut(feature) {
                config.apply(patch);
                debug!(feature = %feature, model = %config.model, "Applied feature override");
            }
        }

        *self.entries.write().unwrap_or_else(|e| e.into_inner()) = entries;
        info!(overrides = overrides.len(), "Feature configuration initialized");
    }

    /// Settings for `feature`, falling back to the default entry
    pub fn get(&self, feature: Feature) -> FeatureConfig {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries
            .get(&feature)
            .or_else(|| entries.get(&Feature::Default))
            .map(|config| FeatureConfig {
                feature,
                ..config.clone()
            })
            .unwrap_or_else(|| FeatureConfig {
                feature,
                ..FeatureConfig::builtin(Feature::Default)
            })
    }

    /// Settings stored for exactly `feature`, without fallback
    pub fn get_exact(&self, feature: Feature) -> Option<FeatureConfig> {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&feature)
            .cloned()
    }

    /// Replace the settings of `feature`
    pub fn update(&self, feature: Feature, mut config: FeatureConfig) {
        config.feature = feature;
        info!(
            feature = %feature,
            provider = %config.provider,
            model = %config.model,
            "Feature configuration updated"
        );
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(feature, config);
    }

    /// Restore the built-in settings of `feature`
    pub fn reset(&self, feature: Feature) {
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(feature, FeatureConfig::builtin(feature));
        debug!(feature = %feature, "Feature configuration reset");
    }

    /// Restore the built-in settings of every feature, dropping overrides
    pub fn reset_all(&self) {
        *self.entries.write().unwrap_or_else(|e| e.into_inner()) = Self::builtin_entries();
    }

    /// Snapshot of all entries in feature order
    pub fn all(&self) -> Vec<FeatureConfig> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        let mut configs: Vec<FeatureConfig> = entries.values().cloned().collect();
        configs.sort_by_key(|c| c.feature);
        configs
    }
}
