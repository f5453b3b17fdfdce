//! Truncated-horizon doubly robust returns.
//!
//! For a horizon j the per-trajectory return is
//!
//! ```text
//!   Σ_{t≤j} wd[t]·r[t]                        importance-weighted reward
//! + wd_prev[j+1]·V[j+1]                       bootstrap (0 when j = L−1)
//! − Σ_{t≤j} (wd[t]·Q[t] − wd_prev[t]·V[t])    control variate
//! ```
//!
//! where `wd` is discount × normalized importance weight, `wd_prev` the same
//! with the weights of one step earlier, V the target-policy state value and
//! Q the target-policy value of the logged action.

use ndarray::{s, Array1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{ensure_dim, Result};

/// Truncation horizon of a step return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JStep {
    /// Use the whole trajectory.
    Full,
    /// No observed rewards: the bootstrap value at step 0 alone.
    DirectMethod,
    /// Truncate after step `j` (clamped to the last step).
    Steps(usize),
}

impl JStep {
    /// Number of leading steps whose rewards enter the return.
    fn prefix_len(self, trajectory_length: usize) -> usize {
        match self {
            JStep::Full => trajectory_length,
            JStep::DirectMethod => 0,
            JStep::Steps(j) => j.min(trajectory_length.saturating_sub(1)) + 1,
        }
    }
}

impl std::fmt::Display for JStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JStep::Full => write!(f, "inf"),
            JStep::DirectMethod => write!(f, "-1"),
            JStep::Steps(j) => write!(f, "{}", j),
        }
    }
}

/// Per-trajectory j-step return over T×L inputs.
///
/// All five matrices must share the shape of `rewards`. A batch of length
/// zero yields a zero vector.
pub fn step_return(
    weighted_discounts: ArrayView2<'_, f64>,
    weighted_discounts_one_earlier: ArrayView2<'_, f64>,
    rewards: ArrayView2<'_, f64>,
    state_values: ArrayView2<'_, f64>,
    q_values_for_logged_action: ArrayView2<'_, f64>,
    j_step: JStep,
) -> Result<Array1<f64>> {
    let shape = rewards.dim();
    ensure_dim("weighted_discounts", shape, weighted_discounts.dim())?;
    ensure_dim(
        "weighted_discounts_one_earlier",
        shape,
        weighted_discounts_one_earlier.dim(),
    )?;
    ensure_dim("state_values", shape, state_values.dim())?;
    ensure_dim(
        "q_values_for_logged_action",
        shape,
        q_values_for_logged_action.dim(),
    )?;

    let (num_trajectories, length) = shape;
    if length == 0 {
        return Ok(Array1::zeros(num_trajectories));
    }

    let prefix = j_step.prefix_len(length);
    let wd = weighted_discounts.slice(s![.., ..prefix]);
    let wd_prev = weighted_discounts_one_earlier.slice(s![.., ..prefix]);

    let weighted_reward = (&wd * &rewards.slice(s![.., ..prefix])).sum_axis(Axis(1));

    // The bootstrap column is the first step past the prefix.
    let bootstrap = if prefix < length {
        &weighted_discounts_one_earlier.column(prefix) * &state_values.column(prefix)
    } else {
        Array1::zeros(num_trajectories)
    };

    let control_variate = (&(&wd * &q_values_for_logged_action.slice(s![.., ..prefix]))
        - &(&wd_prev * &state_values.slice(s![.., ..prefix])))
        .sum_axis(Axis(1));

    Ok(&(&weighted_reward + &bootstrap) - &control_variate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};

    fn approx_eq(a: f64, b: f64) -> bool {
        (a - b).abs() <= 1e-12
    }

    struct Inputs {
        wd: Array2<f64>,
        wd_prev: Array2<f64>,
        rewards: Array2<f64>,
        values: Array2<f64>,
        q: Array2<f64>,
    }

    fn inputs() -> Inputs {
        Inputs {
            wd: array![[0.5, 0.4, 0.3], [0.5, 0.5, 0.6]],
            wd_prev: array![[0.5, 0.45, 0.36], [0.5, 0.45, 0.45]],
            rewards: array![[1.0, 2.0, 3.0], [0.0, 1.0, 1.0]],
            values: array![[4.0, 3.0, 2.0], [5.0, 4.0, 1.0]],
            q: array![[3.5, 2.5, 2.0], [4.0, 3.0, 1.5]],
        }
    }

    fn run(inputs: &Inputs, j: JStep) -> Array1<f64> {
        step_return(
            inputs.wd.view(),
            inputs.wd_prev.view(),
            inputs.rewards.view(),
            inputs.values.view(),
            inputs.q.view(),
            j,
        )
        .unwrap()
    }

    #[test]
    fn direct_method_is_bootstrap_at_step_zero() {
        let x = inputs();
        let out = run(&x, JStep::DirectMethod);
        assert!(approx_eq(out[0], 0.5 * 4.0));
        assert!(approx_eq(out[1], 0.5 * 5.0));
    }

    #[test]
    fn last_step_has_no_bootstrap() {
        let x = inputs();
        let full = run(&x, JStep::Full);
        for i in 0..2 {
            let weighted_reward: f64 = (0..3).map(|t| x.wd[[i, t]] * x.rewards[[i, t]]).sum();
            let control: f64 = (0..3)
                .map(|t| x.wd[[i, t]] * x.q[[i, t]] - x.wd_prev[[i, t]] * x.values[[i, t]])
                .sum();
            assert!(approx_eq(full[i], weighted_reward - control));
        }
    }

    #[test]
    fn horizon_is_clamped_to_last_step() {
        let x = inputs();
        assert_eq!(run(&x, JStep::Steps(2)), run(&x, JStep::Full));
        assert_eq!(run(&x, JStep::Steps(50)), run(&x, JStep::Full));
    }

    #[test]
    fn truncated_return_bootstraps_next_step() {
        let x = inputs();
        let out = run(&x, JStep::Steps(0));
        let expected = x.wd[[0, 0]] * x.rewards[[0, 0]] + x.wd_prev[[0, 1]] * x.values[[0, 1]]
            - (x.wd[[0, 0]] * x.q[[0, 0]] - x.wd_prev[[0, 0]] * x.values[[0, 0]]);
        assert!(approx_eq(out[0], expected));
    }

    #[test]
    fn zero_length_batch_returns_zeros() {
        let empty = Array2::<f64>::zeros((3, 0));
        let out = step_return(
            empty.view(),
            empty.view(),
            empty.view(),
            empty.view(),
            empty.view(),
            JStep::Full,
        )
        .unwrap();
        assert_eq!(out, Array1::<f64>::zeros(3));
    }

    #[test]
    fn mismatched_shapes_are_rejected() {
        let x = inputs();
        let short = Array2::<f64>::zeros((2, 2));
        let err = step_return(
            x.wd.view(),
            x.wd_prev.view(),
            x.rewards.view(),
            short.view(),
            x.q.view(),
            JStep::Full,
        )
        .unwrap_err();
        assert!(err.to_string().contains("state_values"));
    }

    #[test]
    fn display_matches_sentinels() {
        assert_eq!(JStep::Full.to_string(), "inf");
        assert_eq!(JStep::DirectMethod.to_string(), "-1");
        assert_eq!(JStep::Steps(4).to_string(), "4");
    }
}
