//! Semantic validation of evaluator configuration.

use thiserror::Error;

use crate::evaluator::{EvaluatorConfig, MIN_HISTORY_CAPACITY};

/// Validation result type.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Configuration validation errors.
#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: String, actual: String },
}

impl ValidationError {
    /// Error code for structured error reporting.
    pub fn code(&self) -> u32 {
        match self {
            ValidationError::InvalidValue { .. } => 65,
            ValidationError::VersionMismatch { .. } => 66,
        }
    }

    fn invalid(field: &str, message: String) -> Self {
        ValidationError::InvalidValue {
            field: field.to_string(),
            message,
        }
    }
}

/// Validate an evaluator configuration.
pub fn validate_config(config: &EvaluatorConfig) -> ValidationResult<()> {
    if config.schema_version != crate::CONFIG_SCHEMA_VERSION {
        return Err(ValidationError::VersionMismatch {
            expected: crate::CONFIG_SCHEMA_VERSION.to_string(),
            actual: config.schema_version.clone(),
        });
    }

    if config.evaluator_batch_size == 0 {
        return Err(ValidationError::invalid(
            "evaluator_batch_size",
            "Must be at least 1".to_string(),
        ));
    }

    if !(0.0..=1.0).contains(&config.gamma) {
        return Err(ValidationError::invalid(
            "gamma",
            format!("Must be in [0, 1], got {}", config.gamma),
        ));
    }

    if config.num_j_steps == 0 {
        return Err(ValidationError::invalid(
            "num_j_steps",
            "Must be at least 1".to_string(),
        ));
    }

    if config.history_capacity < MIN_HISTORY_CAPACITY {
        return Err(ValidationError::invalid(
            "history_capacity",
            format!(
                "Must be at least {}, got {}",
                MIN_HISTORY_CAPACITY, config.history_capacity
            ),
        ));
    }

    if let Some(dup) = first_duplicate(&config.action_names) {
        return Err(ValidationError::invalid(
            "action_names",
            format!("Duplicate action name '{}'", dup),
        ));
    }

    let solver = &config.qp_solver;
    if solver.max_iterations == 0 {
        return Err(ValidationError::invalid(
            "qp_solver.max_iterations",
            "Must be at least 1".to_string(),
        ));
    }
    if !(solver.tolerance.is_finite() && solver.tolerance >= 0.0) {
        return Err(ValidationError::invalid(
            "qp_solver.tolerance",
            format!("Must be finite and non-negative, got {}", solver.tolerance),
        ));
    }

    Ok(())
}

fn first_duplicate(names: &[String]) -> Option<&str> {
    let mut seen = std::collections::HashSet::new();
    names
        .iter()
        .find(|name| !seen.insert(name.as_str()))
        .map(String::as_str)
}
