//! AI Integration Layer
//!
//! Feature-aware LLM generation: model catalog, token budgets, response
//! caching, provider adapters with retry, and chunked document processing.

pub mod cache;
pub mod catalog;
pub mod chunked;
pub mod features;
pub mod metrics;
pub mod prompt;
pub mod provider;
pub mod services;
pub mod tokenizer;
pub mod validation;

#[cfg(test)]
pub mod testing;

pub use cache::{ResponseCache, cache_key};
pub use catalog::{BudgetTier, ModelCatalog, ModelDescriptor, ModelType};
pub use chunked::{BatchOutcome, BatchPhase, BatchReport, ChunkState, ChunkedGenerationCoordinator};
pub use features::{Feature, FeatureConfig, FeatureConfigMap, FeatureOverride};
pub use metrics::{MetricsSummary, SharedMetrics, UsageMetrics, create_shared_metrics};
pub use prompt::{ChunkPromptBuilder, PromptBuilder, SubjectExtractionPrompt};
pub use provider::{
    AdapterContext, Delay, GenerationOptions, GenerationResponse, ProviderAdapter, ProviderKind,
    ProviderRegistry, TokenUsage, Transport,
};
pub use services::{Orchestrator, quiz_max_tokens};
pub use tokenizer::{CharEstimator, TokenEstimator, WordEstimator, estimate_tokens, split_into_chunks};
pub use validation::{DiscoveredItem, parse_item_list};
