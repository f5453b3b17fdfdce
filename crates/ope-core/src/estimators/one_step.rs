//! One-step (contextual bandit) estimators: IPS, direct method, doubly robust.
//!
//! Each decision is scored independently:
//!
//! ```text
//! w    = π(a_logged) / μ(a_logged)
//! DM   = Σ_a π(a)·Q̂(a)
//! IPS  = w·signal
//! DR   = w·(signal − Q̂(a_logged)) + DM
//! ```
//!
//! The three sums are reported relative to the summed logged signal, so 1.0
//! means "as good as the behavior policy". Neither the propensity nor the
//! signal total is guarded against zero.

use ndarray::{Array2, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

use super::{expected_values, logged_action_values};
use crate::error::{ensure_dim, ensure_len, Result};

/// Estimates relative to the logged signal total.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OneStepEstimate {
    pub inverse_propensity: f64,
    pub direct_method: f64,
    pub doubly_robust: f64,
}

/// Score the target policy on independent logged decisions.
///
/// `logged_actions`, `target_propensities` and `estimated_values` are N×A;
/// `logged_signal` (reward or value) and `logged_propensities` have N
/// entries. Without `estimated_values` the direct method is zero and the
/// doubly robust estimate equals IPS.
pub fn doubly_robust_one_step(
    logged_actions: ArrayView2<'_, f64>,
    logged_signal: ArrayView1<'_, f64>,
    logged_propensities: ArrayView1<'_, f64>,
    target_propensities: ArrayView2<'_, f64>,
    estimated_values: Option<ArrayView2<'_, f64>>,
) -> Result<OneStepEstimate> {
    let shape = logged_actions.dim();
    let n = shape.0;
    ensure_dim("target_propensities", shape, target_propensities.dim())?;
    ensure_len("logged_signal", n, logged_signal.len())?;
    ensure_len("logged_propensities", n, logged_propensities.len())?;
    if let Some(values) = &estimated_values {
        ensure_dim("estimated_values", shape, values.dim())?;
    }

    let estimated_values = match estimated_values {
        Some(values) => values.to_owned(),
        None => Array2::zeros(shape),
    };
    let estimated_values = estimated_values.view();

    let direct_method = expected_values(target_propensities, estimated_values);
    let importance_weight =
        &logged_action_values(target_propensities, logged_actions) / &logged_propensities;
    let ips = &importance_weight * &logged_signal;
    let residual = &logged_signal - &logged_action_values(estimated_values, logged_actions);
    let doubly_robust = &(&importance_weight * &residual) + &direct_method;

    let total = logged_signal.sum();
    Ok(OneStepEstimate {
        inverse_propensity: ips.sum() / total,
        direct_method: direct_method.sum() / total,
        doubly_robust: doubly_robust.sum() / total,
    })
}
