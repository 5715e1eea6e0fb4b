//! Config Command
//!
//! Manage Quizloom configuration.
//!
//! Usage:
//!   quizloom config show [-f toml|json|yaml]
//!   quizloom config path
//!   quizloom config init [-g] [--force]

use std::path::Path;

use crate::cli::ui::Output;
use crate::cli::util::load_config;
use crate::config::{ConfigFormat, ConfigLoader};
use crate::types::{QuizloomError, Result};

/// Show the effective configuration (merged from all sources)
pub fn show(config_path: Option<&Path>, format: ConfigFormat) -> Result<()> {
    let config = load_config(config_path)?;
    println!("{}", ConfigLoader::render(&config, format)?);
    Ok(())
}

/// Show configuration paths
pub fn path() -> Result<()> {
    ConfigLoader::show_path();
    Ok(())
}

/// Write a starter config file
pub fn init(global: bool, force: bool) -> Result<()> {
    let path = if global {
        ConfigLoader::global_config_path().ok_or_else(|| {
            QuizloomError::Config("Cannot determine global config directory".to_string())
        })?
    } else {
        ConfigLoader::project_config_path()
    };

    let out = Output::new();
    if ConfigLoader::init_at(&path, force)? {
        out.success(&format!("Initialized configuration: {}", path.display()));
    } else {
        out.warning(&format!(
            "Config already exists: {} (use --force to overwrite)",
            path.display()
        ));
    }
    Ok(())
}
