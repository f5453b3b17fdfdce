//! Flat decision streams to equal-length trajectory tensors.
//!
//! Episodes are delimited by terminal flags: each episode runs from the
//! decision after the previous terminal up to and including the next
//! terminal. Decisions after the last terminal belong to no episode and are
//! dropped. Shorter episodes are padded at the tail so every trajectory has
//! the batch's maximum length L:
//!
//! | field                | fill |
//! |----------------------|------|
//! | actions              | 0    |
//! | rewards              | 0    |
//! | logged propensities  | 1    |
//! | target propensities  | 0    |
//! | Q-values             | 0    |
//!
//! A logged propensity of one keeps the importance ratio finite on padded
//! steps, and the zero reward keeps them out of the return.

use std::ops::Range;

use ndarray::{s, Array2, Array3, ArrayView1, ArrayView2};

use crate::error::{ensure_dim, ensure_len, Result};

/// Fill value for padded logged propensities.
pub const LOGGED_PROPENSITY_FILL: f64 = 1.0;

/// Episodes of one batch, padded to a common length.
#[derive(Debug, Clone, PartialEq)]
pub struct Trajectories {
    /// One-hot logged actions, T×L×A.
    pub actions: Array3<f64>,
    /// Rewards, T×L.
    pub rewards: Array2<f64>,
    /// Behavior-policy propensity of the logged action, T×L.
    pub logged_propensities: Array2<f64>,
    /// Target-policy propensities over all actions, T×L×A.
    pub target_propensities: Array3<f64>,
    /// Target-policy Q-value estimates, T×L×A.
    pub q_values: Array3<f64>,
    /// Unpadded length of each episode.
    pub lengths: Vec<usize>,
}

impl Trajectories {
    pub fn num_trajectories(&self) -> usize {
        self.rewards.nrows()
    }

    pub fn trajectory_length(&self) -> usize {
        self.rewards.ncols()
    }

    pub fn num_actions(&self) -> usize {
        self.actions.dim().2
    }
}

/// Half-open index ranges of the episodes in a flat decision stream.
pub fn episode_bounds(is_terminals: &[bool]) -> Vec<Range<usize>> {
    let mut bounds = Vec::new();
    let mut start = 0;
    for (i, _) in is_terminals.iter().enumerate().filter(|(_, t)| **t) {
        bounds.push(start..i + 1);
        start = i + 1;
    }
    bounds
}

/// Split a flat decision stream into padded trajectory tensors.
///
/// `actions`, `target_propensities` and `q_values` are N×A; `rewards` and
/// `logged_propensities` have N entries, one per decision. The action count
/// is taken from `target_propensities`.
///
/// With no terminal flag set the result holds zero trajectories of length
/// zero; downstream estimators treat that as an empty batch.
pub fn reshape_trajectories(
    is_terminals: &[bool],
    actions: ArrayView2<'_, f64>,
    rewards: ArrayView1<'_, f64>,
    logged_propensities: ArrayView1<'_, f64>,
    target_propensities: ArrayView2<'_, f64>,
    q_values: ArrayView2<'_, f64>,
) -> Result<Trajectories> {
    let n = is_terminals.len();
    let num_actions = target_propensities.ncols();
    ensure_dim("target_propensities", (n, num_actions), target_propensities.dim())?;
    ensure_dim("actions", (n, num_actions), actions.dim())?;
    ensure_dim("q_values", (n, num_actions), q_values.dim())?;
    ensure_len("rewards", n, rewards.len())?;
    ensure_len("logged_propensities", n, logged_propensities.len())?;

    let episodes = episode_bounds(is_terminals);
    let num_trajectories = episodes.len();
    let max_len = episodes.iter().map(|r| r.len()).max().unwrap_or(0);

    let mut out = Trajectories {
        actions: Array3::zeros((num_trajectories, max_len, num_actions)),
        rewards: Array2::zeros((num_trajectories, max_len)),
        logged_propensities: Array2::from_elem(
            (num_trajectories, max_len),
            LOGGED_PROPENSITY_FILL,
        ),
        target_propensities: Array3::zeros((num_trajectories, max_len, num_actions)),
        q_values: Array3::zeros((num_trajectories, max_len, num_actions)),
        lengths: episodes.iter().map(|r| r.len()).collect(),
    };

    for (i, range) in episodes.into_iter().enumerate() {
        let len = range.len();
        out.actions
            .slice_mut(s![i, ..len, ..])
            .assign(&actions.slice(s![range.clone(), ..]));
        out.target_propensities
            .slice_mut(s![i, ..len, ..])
            .assign(&target_propensities.slice(s![range.clone(), ..]));
        out.q_values
            .slice_mut(s![i, ..len, ..])
            .assign(&q_values.slice(s![range.clone(), ..]));
        out.rewards
            .slice_mut(s![i, ..len])
            .assign(&rewards.slice(s![range.clone()]));
        out.logged_propensities
            .slice_mut(s![i, ..len])
            .assign(&logged_propensities.slice(s![range]));
    }

    Ok(out)
}
