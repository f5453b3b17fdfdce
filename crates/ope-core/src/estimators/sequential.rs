//! Sequential doubly robust estimation over episodes.

use ope_math::mean;
use tracing::warn;

use super::{expected_values, logged_action_values, DecisionStream};
use crate::error::Result;
use crate::logging::event_names;
use crate::trajectory::episode_bounds;

/// Mean over episodes of the backward doubly robust value, relative to the
/// episode's discounted return.
///
/// Each episode is walked from its terminal decision back to its first:
///
/// ```text
/// DR(t) = V̂(t) + w(t)·(r(t) + γ·DR(t+1) − Q̂(t, a_t)),   DR(end+1) = 0
/// G     = G·γ + r(t)
/// ```
///
/// and scores `DR(start) / G`. An episode with `G == 0` yields inf or NaN.
/// With no terminal flags there are no episodes and the result is NaN.
pub fn doubly_robust_sequential(stream: &DecisionStream<'_>, gamma: f64) -> Result<f64> {
    stream.validate()?;

    let state_values = expected_values(stream.target_propensities, stream.estimated_q_values);
    let importance_weight = &logged_action_values(stream.target_propensities, stream.logged_actions)
        / &stream.logged_propensities;
    let logged_q = logged_action_values(stream.estimated_q_values, stream.logged_actions);
    let rewards = stream.logged_rewards;

    let episodes = episode_bounds(stream.is_terminals);
    if episodes.is_empty() {
        warn!(
            event = event_names::ESTIMATE_NO_EPISODES,
            estimator = "sequential_dr",
            decisions = stream.num_decisions(),
            "no terminal decision in stream"
        );
    }

    let scores: Vec<f64> = episodes
        .into_iter()
        .map(|episode| {
            let mut doubly_robust = 0.0;
            let mut episode_value = 0.0;
            for t in episode.rev() {
                doubly_robust = state_values[t]
                    + importance_weight[t] * (rewards[t] + gamma * doubly_robust - logged_q[t]);
                episode_value *= gamma;
                episode_value += rewards[t];
            }
            doubly_robust / episode_value
        })
        .collect();

    Ok(mean(&scores))
}
