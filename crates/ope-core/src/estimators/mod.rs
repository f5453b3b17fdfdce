//! Off-policy value estimators.
//!
//! - [`one_step`]: IPS, direct method and doubly robust on independent
//!   decisions.
//! - [`sequential`]: per-episode backward doubly robust recursion.
//! - [`weighted`]: weighted doubly robust with MAGIC blending over
//!   truncation horizons.
//!
//! [`importance`] and [`step_return`] are the shared building blocks of the
//! weighted estimator.

pub mod importance;
pub mod one_step;
pub mod sequential;
pub mod step_return;
pub mod weighted;

pub use importance::{normalize_importance_weights, one_step_earlier};
pub use one_step::{doubly_robust_one_step, OneStepEstimate};
pub use sequential::doubly_robust_sequential;
pub use step_return::{step_return, JStep};
pub use weighted::{
    j_steps, magic_estimate, weighted_doubly_robust, MagicEstimate, NUM_SUBSETS_FOR_CB_ESTIMATE,
};

use ndarray::{Array1, ArrayView1, ArrayView2, Axis};

use crate::error::{ensure_dim, ensure_len, Result};

/// A flat stream of logged decisions with the target policy's view of them.
///
/// Matrices are N×A with one row per decision; vectors have N entries.
#[derive(Debug, Clone, Copy)]
pub struct DecisionStream<'a> {
    /// One-hot logged actions.
    pub logged_actions: ArrayView2<'a, f64>,
    pub logged_rewards: ArrayView1<'a, f64>,
    pub is_terminals: &'a [bool],
    /// Behavior-policy propensity of each logged action.
    pub logged_propensities: ArrayView1<'a, f64>,
    pub target_propensities: ArrayView2<'a, f64>,
    /// Target-policy Q-value estimates per action.
    pub estimated_q_values: ArrayView2<'a, f64>,
}

impl DecisionStream<'_> {
    pub fn num_decisions(&self) -> usize {
        self.is_terminals.len()
    }

    pub fn num_actions(&self) -> usize {
        self.target_propensities.ncols()
    }

    /// Check every field against the terminal flag count and action count.
    pub fn validate(&self) -> Result<()> {
        let n = self.num_decisions();
        let a = self.num_actions();
        ensure_dim("target_propensities", (n, a), self.target_propensities.dim())?;
        ensure_dim("logged_actions", (n, a), self.logged_actions.dim())?;
        ensure_dim("estimated_q_values", (n, a), self.estimated_q_values.dim())?;
        ensure_len("logged_rewards", n, self.logged_rewards.len())?;
        ensure_len("logged_propensities", n, self.logged_propensities.len())?;
        Ok(())
    }
}

/// Per-row value of the logged action: Σ_a values[a]·onehot[a].
pub(crate) fn logged_action_values(
    values: ArrayView2<'_, f64>,
    logged_actions: ArrayView2<'_, f64>,
) -> Array1<f64> {
    (&values * &logged_actions).sum_axis(Axis(1))
}

/// Per-row expectation under a distribution: Σ_a probs[a]·values[a].
pub(crate) fn expected_values(
    probs: ArrayView2<'_, f64>,
    values: ArrayView2<'_, f64>,
) -> Array1<f64> {
    (&probs * &values).sum_axis(Axis(1))
}
