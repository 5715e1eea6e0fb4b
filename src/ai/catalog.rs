//! Model Capability Catalog
//!
//! Immutable registry of model descriptors: context window, output limit,
//! pricing and modality. Lookups for unrecognized models fall back to
//! conservative limits so budget arithmetic never fails open.
//!
//! ## Model Suggestion
//!
//! 1. Filter by provider (optional)
//! 2. Filter by budget tier on output price
//! 3. Keep models whose output limit covers the requirement
//! 4. Cheapest qualifying model wins; if none qualify, the largest output limit wins
//!
//! Ties keep catalog insertion order.

use std::collections::HashSet;
use std::sync::LazyLock;

use serde::{Deserialize, Serialize};

use crate::ai::provider::ProviderKind;
use crate::constants::budget as budget_constants;
use crate::types::{QuizloomError, Result};

/// Model type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ModelType {
    #[default]
    Chat,
    Embedding,
}

/// Capabilities and pricing of a single model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    /// Unique model identifier as sent to the provider
    pub id: String,
    pub provider: ProviderKind,
    /// Combined input + output tokens per call
    pub context_window_tokens: usize,
    pub max_output_tokens: usize,
    /// USD per million input tokens
    pub cost_per_million_input: f64,
    /// USD per million output tokens
    pub cost_per_million_output: f64,
    pub is_multimodal: bool,
    #[serde(default)]
    pub model_type: ModelType,
}

impl ModelDescriptor {
    fn chat(
        id: &str,
        provider: ProviderKind,
        context_window_tokens: usize,
        max_output_tokens: usize,
        cost_per_million_input: f64,
        cost_per_million_output: f64,
        is_multimodal: bool,
    ) -> Self {
        Self {
            id: id.to_string(),
            provider,
            context_window_tokens,
            max_output_tokens,
            cost_per_million_input,
            cost_per_million_output,
            is_multimodal,
            model_type: ModelType::Chat,
        }
    }

    /// Estimated USD cost for a call
    pub fn estimate_cost(&self, input_tokens: u64, output_tokens: u64) -> f64 {
        (input_tokens as f64 * self.cost_per_million_input
            + output_tokens as f64 * self.cost_per_million_output)
            / 1_000_000.0
    }

    pub fn is_chat(&self) -> bool {
        self.model_type == ModelType::Chat
    }
}

/// Spending tier used to bound output price during model suggestion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BudgetTier {
    Low,
    Medium,
    High,
}

impl BudgetTier {
    /// Maximum USD per million output tokens, `None` when unbounded
    pub fn max_output_cost(&self) -> Option<f64> {
        match self {
            Self::Low => Some(5.0),
            Self::Medium => Some(20.0),
            Self::High => None,
        }
    }

    fn admits(&self, model: &ModelDescriptor) -> bool {
        self.max_output_cost()
            .is_none_or(|max| model.cost_per_million_output <= max)
    }
}

impl std::fmt::Display for BudgetTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

impl std::str::FromStr for BudgetTier {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            _ => Err(format!(
                "Unknown budget tier: {}. Valid values: low, medium, high",
                s
            )),
        }
    }
}

static BUILTIN: LazyLock<ModelCatalog> = LazyLock::new(ModelCatalog::builtin);

/// Registry of known models in insertion order
#[derive(Debug, Clone)]
pub struct ModelCatalog {
    models: Vec<ModelDescriptor>,
}

impl Default for ModelCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ModelCatalog {
    /// Build a catalog from descriptors, rejecting duplicate ids
    pub fn new(models: Vec<ModelDescriptor>) -> Result<Self> {
        let mut seen = HashSet::new();
        for model in &models {
            if !seen.insert(model.id.as_str()) {
                return Err(QuizloomError::Config(format!(
                    "Duplicate model id in catalog: {}",
                    model.id
                )));
            }
        }
        Ok(Self { models })
    }

    /// Shared read-only instance of the built-in table
    pub fn shared_builtin() -> &'static ModelCatalog {
        &BUILTIN
    }

    /// Built-in model table
    pub fn builtin() -> Self {
        use ProviderKind::{Gemini, OpenAi};

        let mut models = vec![
            ModelDescriptor::chat("gpt-4o-mini", OpenAi, 128_000, 16_384, 0.15, 0.60, true),
            ModelDescriptor::chat("gpt-4o", OpenAi, 128_000, 16_384, 2.50, 10.00, true),
            ModelDescriptor::chat("gpt-4.1-mini", OpenAi, 1_047_576, 32_768, 0.40, 1.60, true),
            ModelDescriptor::chat("gpt-4.1", OpenAi, 1_047_576, 32_768, 2.00, 8.00, true),
            ModelDescriptor::chat("gpt-4-turbo", OpenAi, 128_000, 4_096, 10.00, 30.00, true),
            ModelDescriptor::chat("gpt-3.5-turbo", OpenAi, 16_385, 4_096, 0.50, 1.50, false),
            ModelDescriptor::chat("gemini-2.0-flash", Gemini, 1_048_576, 8_192, 0.10, 0.40, true),
            ModelDescriptor::chat("gemini-2.5-flash", Gemini, 1_048_576, 65_536, 0.30, 2.50, true),
            ModelDescriptor::chat("gemini-2.5-pro", Gemini, 1_048_576, 65_536, 1.25, 10.00, true),
            ModelDescriptor::chat("gemini-1.5-pro", Gemini, 2_097_152, 8_192, 1.25, 5.00, true),
        ];
        models.push(ModelDescriptor {
            model_type: ModelType::Embedding,
            ..ModelDescriptor::chat("text-embedding-3-small", OpenAi, 8_191, 0, 0.02, 0.0, false)
        });
        models.push(ModelDescriptor {
            model_type: ModelType::Embedding,
            ..ModelDescriptor::chat("text-embedding-004", Gemini, 2_048, 0, 0.0, 0.0, false)
        });

        Self { models }
    }

    pub fn get(&self, id: &str) -> Option<&ModelDescriptor> {
        self.models.iter().find(|m| m.id == id)
    }

    /// All models, optionally restricted to one provider
    pub fn all(&self, provider: Option<ProviderKind>) -> Vec<&ModelDescriptor> {
        self.models
            .iter()
            .filter(|m| provider.is_none_or(|p| m.provider == p))
            .collect()
    }

    /// Whether `id` is a chat model served by `provider`
    pub fn supports(&self, provider: ProviderKind, id: &str) -> bool {
        self.get(id)
            .is_some_and(|m| m.provider == provider && m.is_chat())
    }

    /// Context window for `id`, conservative default when unknown
    pub fn context_limit(&self, id: &str) -> usize {
        self.get(id)
            .map(|m| m.context_window_tokens)
            .unwrap_or(budget_constants::UNKNOWN_MODEL_CONTEXT_TOKENS)
    }

    /// Output limit for `id`, conservative default when unknown
    pub fn output_limit(&self, id: &str) -> usize {
        self.get(id)
            .map(|m| m.max_output_tokens)
            .unwrap_or(budget_constants::UNKNOWN_MODEL_OUTPUT_TOKENS)
    }

    /// Suggest a chat model able to produce `required_output_tokens`
    ///
    /// Returns `None` only when the provider/tier filters leave no chat model.
    pub fn suggest_model(
        &self,
        required_output_tokens: usize,
        provider: Option<ProviderKind>,
        tier: Option<BudgetTier>,
    ) -> Option<&ModelDescriptor> {
        let candidates: Vec<&ModelDescriptor> = self
            .models
            .iter()
            .filter(|m| m.is_chat())
            .filter(|m| provider.is_none_or(|p| m.provider == p))
            .filter(|m| tier.is_none_or(|t| t.admits(m)))
            .collect();

        // min_by keeps the first of equal elements
        let cheapest = candidates
            .iter()
            .filter(|m| m.max_output_tokens >= required_output_tokens)
            .min_by(|a, b| {
                a.cost_per_million_output
                    .total_cmp(&b.cost_per_million_output)
            })
            .copied();

        // max_by keeps the last of equal elements, so scan in reverse
        cheapest.or_else(|| {
            candidates
                .iter()
                .rev()
                .max_by_key(|m| m.max_output_tokens)
                .copied()
        })
    }
}
