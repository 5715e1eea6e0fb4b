//! CLI Common Utilities
//!
//! Shared initialization and context management for CLI commands.

use std::path::Path;

use tokio::runtime::Runtime;

use crate::ai::services::Orchestrator;
use crate::config::{Config, ConfigLoader};
use crate::types::{QuizloomError, Result};

/// Command execution context
///
/// Holds the resolved configuration and the orchestrator built from it.
pub struct CommandContext {
    pub config: Config,
    pub orchestrator: Orchestrator,
}

impl CommandContext {
    /// Load configuration (from `config_path` when given) and wire services
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let config = load_config(config_path)?;
        let orchestrator = Orchestrator::from_config(&config);
        Ok(Self {
            config,
            orchestrator,
        })
    }

    /// Run an async command body on a fresh runtime
    pub fn block_on<F: std::future::Future>(&self, future: F) -> Result<F::Output> {
        let rt = Runtime::new()?;
        Ok(rt.block_on(future))
    }
}

/// Full resolution chain, or a single explicit file
pub fn load_config(config_path: Option<&Path>) -> Result<Config> {
    match config_path {
        Some(path) => ConfigLoader::load_from_file(path),
        None => ConfigLoader::load(),
    }
}

/// Read a text input file
pub fn read_input(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| {
        QuizloomError::Config(format!("Cannot read {}: {}", path.display(), e))
    })
}
