//! JSON input for the `evaluate` command: a flat logged decision stream.
//!
//! ```json
//! {
//!   "actions": [0, 1, 1],
//!   "rewards": [1.0, 0.0, 2.0],
//!   "terminals": [false, true, true],
//!   "logged_propensities": [0.5, 0.5, 0.9],
//!   "target_propensities": [[0.6, 0.4], [0.2, 0.8], [0.1, 0.9]],
//!   "q_values": [[1.0, 0.5], [0.0, 0.3], [1.2, 2.0]]
//! }
//! ```
//!
//! `actions` holds either action indices or one-hot rows. Logged propensities
//! default to ones. Target propensities may be omitted when a softmax
//! temperature is supplied; they are then derived from the Q-values.

use std::path::{Path, PathBuf};

use ndarray::{Array1, Array2};
use ope_math::softmax;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::estimators::DecisionStream;
use crate::evaluator::EvaluatorReport;

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid batch JSON in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("{field} has {actual} rows, expected {expected}")]
    Length {
        field: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("{field} row {row} has {actual} columns, expected {expected}")]
    RaggedRow {
        field: &'static str,
        row: usize,
        expected: usize,
        actual: usize,
    },

    #[error("action {action} at row {row} is out of range for {num_actions} actions")]
    ActionOutOfRange {
        row: usize,
        action: usize,
        num_actions: usize,
    },

    #[error("target_propensities missing and no softmax temperature given")]
    MissingTargetPropensities,
}

/// Logged actions as indices or one-hot rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ActionColumn {
    Indices(Vec<usize>),
    OneHot(Vec<Vec<f64>>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggedBatch {
    pub actions: ActionColumn,
    pub rewards: Vec<f64>,
    pub terminals: Vec<bool>,
    #[serde(default)]
    pub logged_propensities: Option<Vec<f64>>,
    #[serde(default)]
    pub target_propensities: Option<Vec<Vec<f64>>>,
    /// Target-policy Q-values; their width fixes the action count.
    pub q_values: Vec<Vec<f64>>,
}

/// Dense arrays built from a [`LoggedBatch`].
#[derive(Debug, Clone, PartialEq)]
pub struct BatchArrays {
    pub logged_actions: Array2<f64>,
    pub logged_rewards: Array1<f64>,
    pub is_terminals: Vec<bool>,
    pub logged_propensities: Array1<f64>,
    pub target_propensities: Array2<f64>,
    pub q_values: Array2<f64>,
}

impl LoggedBatch {
    pub fn from_file(path: &Path) -> Result<Self, BatchError> {
        let content = std::fs::read_to_string(path).map_err(|source| BatchError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| BatchError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn num_decisions(&self) -> usize {
        self.terminals.len()
    }

    /// Validate and densify. `softmax_temperature` replaces missing target
    /// propensities with a row-wise softmax of the Q-values.
    pub fn to_arrays(&self, softmax_temperature: Option<f64>) -> Result<BatchArrays, BatchError> {
        let n = self.num_decisions();
        check_len("rewards", n, self.rewards.len())?;
        check_len("q_values", n, self.q_values.len())?;
        let num_actions = self.q_values.first().map_or(0, Vec::len);
        let q_values = to_matrix("q_values", &self.q_values, num_actions)?;

        let logged_actions = match &self.actions {
            ActionColumn::Indices(idxs) => {
                check_len("actions", n, idxs.len())?;
                let mut one_hot = Array2::zeros((n, num_actions));
                for (row, &action) in idxs.iter().enumerate() {
                    if action >= num_actions {
                        return Err(BatchError::ActionOutOfRange {
                            row,
                            action,
                            num_actions,
                        });
                    }
                    one_hot[[row, action]] = 1.0;
                }
                one_hot
            }
            ActionColumn::OneHot(rows) => {
                check_len("actions", n, rows.len())?;
                to_matrix("actions", rows, num_actions)?
            }
        };

        let logged_propensities = match &self.logged_propensities {
            Some(p) => {
                check_len("logged_propensities", n, p.len())?;
                Array1::from(p.clone())
            }
            None => Array1::ones(n),
        };

        let target_propensities = match (&self.target_propensities, softmax_temperature) {
            (Some(rows), _) => {
                check_len("target_propensities", n, rows.len())?;
                to_matrix("target_propensities", rows, num_actions)?
            }
            (None, Some(temperature)) => {
                let rows: Vec<Vec<f64>> = self
                    .q_values
                    .iter()
                    .map(|q| softmax(q, temperature))
                    .collect();
                to_matrix("target_propensities", &rows, num_actions)?
            }
            (None, None) => return Err(BatchError::MissingTargetPropensities),
        };

        Ok(BatchArrays {
            logged_actions,
            logged_rewards: Array1::from(self.rewards.clone()),
            is_terminals: self.terminals.clone(),
            logged_propensities,
            target_propensities,
            q_values,
        })
    }
}

impl BatchArrays {
    pub fn stream(&self) -> DecisionStream<'_> {
        DecisionStream {
            logged_actions: self.logged_actions.view(),
            logged_rewards: self.logged_rewards.view(),
            is_terminals: &self.is_terminals,
            logged_propensities: self.logged_propensities.view(),
            target_propensities: self.target_propensities.view(),
            estimated_q_values: self.q_values.view(),
        }
    }

    /// Evaluator report for this batch. Logged values are the discounted
    /// returns-to-go within each episode; the model's greedy action is the
    /// argmax of its Q-values.
    pub fn to_report(&self, gamma: f64) -> EvaluatorReport {
        let logged_values = returns_to_go(
            self.logged_rewards.as_slice().unwrap_or(&[]),
            &self.is_terminals,
            gamma,
        );
        let on_logged = (&self.q_values * &self.logged_actions).sum_axis(ndarray::Axis(1));
        let greedy: Vec<usize> = self
            .q_values
            .rows()
            .into_iter()
            .map(|row| {
                row.iter()
                    .enumerate()
                    .fold((0, f64::NEG_INFINITY), |best, (i, &v)| {
                        if v > best.1 {
                            (i, v)
                        } else {
                            best
                        }
                    })
                    .0
            })
            .collect();

        EvaluatorReport {
            td_loss: None,
            logged_actions: Some(self.logged_actions.clone()),
            logged_propensities: Some(self.logged_propensities.clone()),
            logged_rewards: Some(self.logged_rewards.clone()),
            logged_values: Some(logged_values),
            model_propensities: Some(self.target_propensities.clone()),
            model_values: Some(self.q_values.clone()),
            model_values_on_logged_actions: Some(on_logged),
            model_action_idxs: Some(greedy),
            logged_terminals: Some(self.is_terminals.clone()),
        }
    }
}

/// Discounted return from each decision to the end of its episode.
///
/// Decisions after the last terminal flag are treated as one unfinished
/// episode.
pub fn returns_to_go(rewards: &[f64], is_terminals: &[bool], gamma: f64) -> Array1<f64> {
    let mut out = Array1::zeros(rewards.len());
    let mut running = 0.0;
    for t in (0..rewards.len()).rev() {
        if is_terminals.get(t).copied().unwrap_or(false) {
            running = 0.0;
        }
        running = rewards[t] + gamma * running;
        out[t] = running;
    }
    out
}

fn check_len(field: &'static str, expected: usize, actual: usize) -> Result<(), BatchError> {
    if expected != actual {
        return Err(BatchError::Length {
            field,
            expected,
            actual,
        });
    }
    Ok(())
}

fn to_matrix(
    field: &'static str,
    rows: &[Vec<f64>],
    width: usize,
) -> Result<Array2<f64>, BatchError> {
    let mut out = Array2::zeros((rows.len(), width));
    for (i, row) in rows.iter().enumerate() {
        if row.len() != width {
            return Err(BatchError::RaggedRow {
                field,
                row: i,
                expected: width,
                actual: row.len(),
            });
        }
        for (j, &v) in row.iter().enumerate() {
            out[[i, j]] = v;
        }
    }
    Ok(out)
}
