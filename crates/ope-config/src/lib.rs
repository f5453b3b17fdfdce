//! Off-policy evaluation configuration loading and validation.
//!
//! This crate provides:
//! - The typed `EvaluatorConfig` (batching, discounting, j-step blending)
//! - Config resolution (CLI → env → XDG → defaults)
//! - Semantic validation with stable error codes

pub mod evaluator;
pub mod resolve;
pub mod validate;

pub use evaluator::EvaluatorConfig;
pub use resolve::{resolve_config_path, ConfigSource};
pub use validate::{validate_config, ValidationError, ValidationResult};

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Schema version for configuration files.
pub const CONFIG_SCHEMA_VERSION: &str = "1.0.0";

/// Errors that can occur during config loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file not found: {path}")]
    NotFound { path: PathBuf },

    #[error("Invalid JSON in config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("I/O error reading {path}: {source}")]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Semantic validation failed: {0}")]
    Invalid(#[from] ValidationError),
}

/// A validated configuration together with where it came from.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub config: EvaluatorConfig,
    /// File the config was read from (None for built-in defaults).
    pub path: Option<PathBuf>,
    pub source: ConfigSource,
}

/// Resolve, load and validate the evaluator configuration.
///
/// An explicit `cli_path` that does not exist is an error rather than a
/// silent fallback to defaults.
pub fn load_config(cli_path: Option<&Path>) -> Result<ResolvedConfig, ConfigError> {
    if let Some(path) = cli_path {
        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.to_path_buf(),
            });
        }
    }

    let (path, source) = resolve_config_path(cli_path);
    let config = match &path {
        Some(p) => EvaluatorConfig::from_file(p)?,
        None => EvaluatorConfig::default(),
    };
    validate_config(&config)?;

    Ok(ResolvedConfig {
        config,
        path,
        source,
    })
}
