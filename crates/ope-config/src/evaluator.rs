//! Evaluator configuration.
//!
//! Mirrors the knobs an evaluation session needs: how many reports make a
//! batch, the discount factor, how many j-step horizons MAGIC blends, the
//! action names used in distribution summaries, and how much rolling history
//! to retain.

use std::path::Path;

use ope_math::ProjectedGradientSolver;
use serde::{Deserialize, Serialize};

use crate::{ConfigError, CONFIG_SCHEMA_VERSION};

/// Smallest history capacity that still covers the rolling-average window.
pub const MIN_HISTORY_CAPACITY: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluatorConfig {
    pub schema_version: String,
    /// Display names for discrete actions, indexed by action id.
    pub action_names: Vec<String>,
    /// Number of `report` calls accumulated before a batch is evaluated.
    pub evaluator_batch_size: usize,
    /// Discount factor applied per timestep.
    pub gamma: f64,
    /// Number of j-step horizons blended by MAGIC (1 = plain weighted DR).
    pub num_j_steps: usize,
    /// Maximum number of values retained per rolling history.
    pub history_capacity: usize,
    /// Settings for the simplex-constrained QP behind MAGIC blending.
    pub qp_solver: ProjectedGradientSolver,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            schema_version: CONFIG_SCHEMA_VERSION.to_string(),
            action_names: Vec::new(),
            evaluator_batch_size: 1024,
            gamma: 0.99,
            num_j_steps: 10,
            history_capacity: 1000,
            qp_solver: ProjectedGradientSolver::default(),
        }
    }
}

impl EvaluatorConfig {
    /// Read a config from a JSON file. Missing fields take their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::IoError {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::ParseError {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn with_action_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.action_names = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.evaluator_batch_size = batch_size;
        self
    }

    pub fn with_gamma(mut self, gamma: f64) -> Self {
        self.gamma = gamma;
        self
    }

    pub fn with_num_j_steps(mut self, num_j_steps: usize) -> Self {
        self.num_j_steps = num_j_steps;
        self
    }

    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity;
        self
    }
}
