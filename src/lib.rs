//! Quizloom - Budget-Aware LLM Generation
//!
//! Orchestration layer between study-material features (quiz generation,
//! subject extraction, pattern detection) and hosted LLM providers.
//!
//! ## Core Features
//!
//! - **Model Catalog**: context/output limits, pricing and cheapest-fit suggestion
//! - **Token Budgets**: pluggable estimators and output-token fitting per model
//! - **Response Cache**: content-addressed, TTL-bound reuse of generations
//! - **Feature Routing**: per-feature provider, model and sampling settings
//! - **Provider Adapters**: retry with backoff, fallback, credential overrides
//! - **Chunked Generation**: paragraph-aligned splitting with rate-limit recovery
//!
//! ## Quick Start
//!
//! ```ignore
//! use quizloom::{ConfigLoader, Orchestrator};
//! use quizloom::ai::{Feature, GenerationOptions};
//!
//! let config = ConfigLoader::load()?;
//! let orchestrator = Orchestrator::from_config(&config);
//! let response = orchestrator
//!     .generate_for_feature(Feature::QuizExplanation, prompt, &GenerationOptions::default())
//!     .await?;
//! ```
//!
//! ## Modules
//!
//! - [`ai`]: catalog, budgets, cache, providers and chunked generation
//! - [`config`]: layered configuration loading
//! - [`cli`]: command implementations for the `quizloom` binary

pub mod ai;
pub mod cli;
pub mod config;
pub mod constants;
pub mod types;

// =============================================================================
// Core Re-exports
// =============================================================================

// Configuration
pub use config::{Config, ConfigLoader};

// Error Types
pub use types::error::{ErrorCategory, QuizloomError, Result};

// =============================================================================
// AI Re-exports
// =============================================================================

pub use ai::{
    // Chunking
    BatchOutcome,
    ChunkedGenerationCoordinator,
    // Features
    Feature,
    FeatureConfigMap,
    // Requests
    GenerationOptions,
    GenerationResponse,
    // Catalog
    ModelCatalog,
    // Services
    Orchestrator,
    ProviderAdapter,
    ProviderKind,
    ProviderRegistry,
    // Cache
    ResponseCache,
    // Budget
    TokenEstimator,
};
