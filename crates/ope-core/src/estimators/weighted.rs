//! Weighted doubly robust estimation with MAGIC horizon blending.
//!
//! The batch is reshaped into equal-length trajectories and scored with
//! step returns at several truncation horizons ("j-steps"). Short horizons
//! lean on the value model (low variance, possibly biased); the full horizon
//! is unbiased but noisy. MAGIC picks convex blending weights over the
//! horizons that minimize an estimate of the blended mean squared error:
//!
//! 1. A 90% Student-t confidence interval for the full-horizon return is
//!    built from up to [`NUM_SUBSETS_FOR_CB_ESTIMATE`] non-empty contiguous
//!    trajectory subsets.
//! 2. Each horizon's bias is its distance outside that interval.
//! 3. The error matrix is the covariance of the per-trajectory horizon
//!    returns plus the outer product of the biases.
//! 4. Weights come from `min xᵀ·E·x` over the simplex.
//!
//! The blended return is reported relative to the mean discounted return of
//! the logged trajectories.

use ndarray::{s, Array1, Array2, ArrayView2, Axis};
use ope_math::{covariance_matrix, t_confidence_interval, SimplexQpSolver};
use serde::Serialize;
use tracing::{debug, warn};

use super::importance::{normalize_importance_weights, one_step_earlier};
use super::step_return::{step_return, JStep};
use super::DecisionStream;
use crate::error::{OpeError, Result};
use crate::logging::event_names;
use crate::trajectory::{reshape_trajectories, Trajectories};

/// Number of contiguous trajectory subsets behind the confidence interval.
pub const NUM_SUBSETS_FOR_CB_ESTIMATE: usize = 25;

const CONFIDENCE_LEVEL: f64 = 0.9;

/// Diagnostic record of one MAGIC estimate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MagicEstimate {
    pub j_steps: Vec<JStep>,
    /// Summed step return per j-step.
    pub j_step_returns: Vec<f64>,
    /// Confidence interval of the full-horizon return. Absent with a single
    /// j-step, where no blending happens.
    pub confidence_bounds: Option<(f64, f64)>,
    pub bias: Vec<f64>,
    pub blending_weights: Vec<f64>,
    /// Blended return before normalization.
    pub estimate: f64,
    /// Mean discounted return of the logged trajectories.
    pub baseline: f64,
    /// `estimate / baseline`.
    pub normalized_value: f64,
}

/// Horizons blended for `num_j_steps` over trajectories of length L.
///
/// Always the full horizon, then the pure direct method, then evenly spaced
/// truncations `i·(L / (K−1))` for `i = 1..K−1`.
pub fn j_steps(num_j_steps: usize, trajectory_length: usize) -> Vec<JStep> {
    let mut steps = vec![JStep::Full];
    if num_j_steps > 1 {
        steps.push(JStep::DirectMethod);
    }
    if num_j_steps > 2 {
        let interval = trajectory_length / (num_j_steps - 1);
        steps.extend((1..num_j_steps - 1).map(|i| JStep::Steps(i * interval)));
    }
    steps
}

/// Normalized weighted doubly robust value of the target policy.
pub fn weighted_doubly_robust(
    stream: &DecisionStream<'_>,
    gamma: f64,
    num_j_steps: usize,
    solver: &dyn SimplexQpSolver,
) -> Result<f64> {
    Ok(magic_estimate(stream, gamma, num_j_steps, solver)?.normalized_value)
}

/// Full MAGIC estimate with its intermediate quantities.
///
/// Fails with [`OpeError::EmptyBatch`] when the stream holds no complete
/// episode, and with [`OpeError::Solver`] when the error matrix cannot be
/// minimized (for instance a single trajectory, whose covariance is
/// undefined).
pub fn magic_estimate(
    stream: &DecisionStream<'_>,
    gamma: f64,
    num_j_steps: usize,
    solver: &dyn SimplexQpSolver,
) -> Result<MagicEstimate> {
    let trajectories = reshape_trajectories(
        stream.is_terminals,
        stream.logged_actions,
        stream.logged_rewards,
        stream.logged_propensities,
        stream.target_propensities,
        stream.estimated_q_values,
    )?;
    if trajectories.num_trajectories() == 0 {
        warn!(
            event = event_names::ESTIMATE_NO_EPISODES,
            estimator = "magic",
            decisions = stream.num_decisions(),
            "no terminal decision in stream"
        );
        return Err(OpeError::EmptyBatch);
    }

    let horizon = HorizonInputs::new(&trajectories, gamma);
    let steps = j_steps(num_j_steps, trajectories.trajectory_length());

    let (weighted_discounts, weighted_discounts_one_earlier) =
        horizon.weighted_discounts(horizon.ratios.view());
    let mut per_trajectory = Array2::<f64>::zeros((steps.len(), trajectories.num_trajectories()));
    for (mut row, &j_step) in per_trajectory.rows_mut().into_iter().zip(&steps) {
        row.assign(&step_return(
            weighted_discounts.view(),
            weighted_discounts_one_earlier.view(),
            horizon.rewards.view(),
            horizon.state_values.view(),
            horizon.logged_q.view(),
            j_step,
        )?);
    }
    let j_step_returns = per_trajectory.sum_axis(Axis(1));

    let (confidence_bounds, bias, blending_weights) = if steps.len() == 1 {
        (None, vec![0.0], Array1::ones(1))
    } else {
        let (low, high) = horizon.full_return_interval()?;
        let bias: Array1<f64> = j_step_returns.mapv(|r| {
            if r < low {
                low - r
            } else if r > high {
                r - high
            } else {
                0.0
            }
        });
        let bias_column = bias.view().insert_axis(Axis(1));
        let error = covariance_matrix(per_trajectory.view())
            + bias_column.dot(&bias_column.t());
        let weights = solver.solve(error.view())?;
        (Some((low, high)), bias.to_vec(), weights)
    };

    let estimate = blending_weights.dot(&j_step_returns);
    let baseline = horizon.mean_discounted_return();
    let normalized_value = estimate / baseline;

    debug!(
        event = event_names::ESTIMATE_MAGIC,
        trajectories = trajectories.num_trajectories(),
        trajectory_length = trajectories.trajectory_length(),
        j_steps = ?steps.iter().map(ToString::to_string).collect::<Vec<_>>(),
        blending_weights = ?blending_weights.to_vec(),
        estimate,
        baseline,
        "magic estimate"
    );

    Ok(MagicEstimate {
        j_steps: steps,
        j_step_returns: j_step_returns.to_vec(),
        confidence_bounds,
        bias,
        blending_weights: blending_weights.to_vec(),
        estimate,
        baseline,
        normalized_value,
    })
}

/// T×L per-step quantities shared by every horizon.
struct HorizonInputs {
    /// Unnormalized importance ratios π(a_t)/μ(a_t).
    ratios: Array2<f64>,
    rewards: Array2<f64>,
    state_values: Array2<f64>,
    logged_q: Array2<f64>,
    discounts: Array1<f64>,
}

impl HorizonInputs {
    fn new(trajectories: &Trajectories, gamma: f64) -> Self {
        let actions = &trajectories.actions;
        let target_for_logged =
            (&trajectories.target_propensities * actions).sum_axis(Axis(2));
        let length = trajectories.trajectory_length();
        Self {
            ratios: &target_for_logged / &trajectories.logged_propensities,
            rewards: trajectories.rewards.clone(),
            state_values: (&trajectories.target_propensities * &trajectories.q_values)
                .sum_axis(Axis(2)),
            logged_q: (&trajectories.q_values * actions).sum_axis(Axis(2)),
            discounts: (0..length).map(|t| gamma.powi(t as i32)).collect(),
        }
    }

    /// Discount ⊙ normalized weights, for the current and previous step.
    fn weighted_discounts(
        &self,
        ratios: ArrayView2<'_, f64>,
    ) -> (Array2<f64>, Array2<f64>) {
        let mut weights = ratios.to_owned();
        normalize_importance_weights(&mut weights);
        let earlier = one_step_earlier(&weights);
        (&weights * &self.discounts, &earlier * &self.discounts)
    }

    /// Student-t interval of the full-horizon return across contiguous
    /// trajectory subsets, each re-normalized on its own.
    ///
    /// With fewer than [`NUM_SUBSETS_FOR_CB_ESTIMATE`] trajectories some
    /// subsets are empty; they are skipped, so the interval rests on one
    /// sample per trajectory. A single sample yields NaN bounds.
    fn full_return_interval(&self) -> Result<(f64, f64)> {
        let num_trajectories = self.ratios.nrows();
        let mut subset_returns = Vec::with_capacity(NUM_SUBSETS_FOR_CB_ESTIMATE);
        for i in 0..NUM_SUBSETS_FOR_CB_ESTIMATE {
            let start = i * num_trajectories / NUM_SUBSETS_FOR_CB_ESTIMATE;
            let end = (i + 1) * num_trajectories / NUM_SUBSETS_FOR_CB_ESTIMATE;
            if start == end {
                continue;
            }
            let (wd, wd_prev) = self.weighted_discounts(self.ratios.slice(s![start..end, ..]));
            let returns = step_return(
                wd.view(),
                wd_prev.view(),
                self.rewards.slice(s![start..end, ..]),
                self.state_values.slice(s![start..end, ..]),
                self.logged_q.slice(s![start..end, ..]),
                JStep::Full,
            )?;
            subset_returns.push(returns.sum());
        }
        Ok(t_confidence_interval(&subset_returns, CONFIDENCE_LEVEL))
    }

    fn mean_discounted_return(&self) -> f64 {
        let episode_values = (&self.rewards * &self.discounts).sum_axis(Axis(1));
        episode_values.mean().unwrap_or(f64::NAN)
    }
}
