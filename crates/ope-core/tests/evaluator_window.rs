//! Evaluator accumulation across reports and rolling histories.

use ndarray::{array, Array1, Array2};
use ope_config::EvaluatorConfig;
use ope_core::{Evaluator, EvaluatorError, EvaluatorReport};

fn approx_eq(a: f64, b: f64, tol: f64) -> bool {
    (a - b).abs() <= tol
}

/// One complete on-policy episode with exact Q-values as a single report.
fn episode_report(rewards: &[f64], actions: &[usize], gamma: f64, td_loss: f64) -> EvaluatorReport {
    let n = rewards.len();
    let mut returns = vec![0.0; n];
    let mut running = 0.0;
    for t in (0..n).rev() {
        running = rewards[t] + gamma * running;
        returns[t] = running;
    }

    let mut one_hot = Array2::zeros((n, 2));
    let mut q_values = Array2::from_elem((n, 2), -1.0);
    for (t, &a) in actions.iter().enumerate() {
        one_hot[[t, a]] = 1.0;
        q_values[[t, a]] = returns[t];
    }
    let mut terminals = vec![false; n];
    terminals[n - 1] = true;

    EvaluatorReport {
        td_loss: Some(array![td_loss]),
        logged_actions: Some(one_hot.clone()),
        logged_propensities: Some(Array1::ones(n)),
        logged_rewards: Some(Array1::from(rewards.to_vec())),
        logged_values: Some(Array1::from(returns.clone())),
        model_propensities: Some(one_hot),
        model_values: Some(q_values),
        model_values_on_logged_actions: Some(Array1::from(returns)),
        model_action_idxs: Some(actions.to_vec()),
        logged_terminals: Some(terminals),
    }
}

fn evaluator(batch_size: usize) -> Evaluator {
    Evaluator::new(
        EvaluatorConfig::default()
            .with_batch_size(batch_size)
            .with_gamma(0.9)
            .with_num_j_steps(3)
            .with_action_names(["stay", "move"]),
    )
}

#[test]
fn episodes_reported_separately_are_evaluated_together() {
    let mut evaluator = evaluator(2);
    assert!(evaluator
        .report(episode_report(&[1.0, 2.0, 3.0], &[0, 1, 0], 0.9, 0.2))
        .unwrap()
        .is_none());
    let summary = evaluator
        .report(episode_report(&[0.0, 1.0, 0.0], &[1, 1, 0], 0.9, 0.4))
        .unwrap()
        .expect("second report fills the window");

    assert_eq!(summary.num_reports, 2);
    assert!(approx_eq(summary.td_loss.unwrap(), 0.3, 1e-12));
    assert!(approx_eq(summary.mc_loss.unwrap(), 0.0, 1e-12));

    let value = summary.value.unwrap();
    assert!(approx_eq(value.inverse_propensity, 1.0, 1e-12));
    assert!(approx_eq(value.direct_method, 1.0, 1e-12));
    assert!(approx_eq(value.doubly_robust, 1.0, 1e-12));

    // Without a value model the reward DM is zero and DR equals IPS.
    let reward = summary.reward.unwrap();
    assert_eq!(reward.direct_method, 0.0);
    assert!(approx_eq(reward.doubly_robust, reward.inverse_propensity, 1e-12));

    assert!(approx_eq(summary.sequential_doubly_robust.unwrap(), 1.0, 1e-12));
    assert!(approx_eq(summary.weighted_doubly_robust.unwrap(), 1.0, 1e-12));
    assert!(approx_eq(summary.magic_doubly_robust.unwrap(), 1.0, 1e-9));

    let logged = summary.logged_action_distribution.unwrap();
    assert_eq!(logged["stay"], 3);
    assert_eq!(logged["move"], 3);
    assert_eq!(summary.model_action_distribution.unwrap(), logged);

    assert_eq!(evaluator.pending_reports(), 0);
}

#[test]
fn rolling_means_cover_every_window() {
    let mut evaluator = evaluator(1);
    evaluator
        .report(episode_report(&[1.0, 1.0], &[0, 0], 0.9, 1.0))
        .unwrap();
    evaluator
        .report(episode_report(&[2.0, 0.0], &[1, 0], 0.9, 3.0))
        .unwrap();

    assert_eq!(evaluator.histories().td_loss.len(), 2);
    assert!(approx_eq(evaluator.recent_td_loss().unwrap(), 2.0, 1e-12));
    assert!(approx_eq(evaluator.recent_mc_loss().unwrap(), 0.0, 1e-12));
    assert!(approx_eq(
        evaluator.recent_sequential_doubly_robust().unwrap(),
        1.0,
        1e-12
    ));
    assert!(approx_eq(
        evaluator.recent_weighted_doubly_robust().unwrap(),
        1.0,
        1e-12
    ));
    assert!(approx_eq(
        evaluator.recent_inverse_propensity_score().unwrap(),
        1.0,
        1e-12
    ));
    assert_eq!(evaluator.recent_direct_method(), Some(0.0));
    assert!(evaluator.recent_doubly_robust().is_some());
    // One trajectory per window: the blending covariance is undefined.
    assert_eq!(evaluator.recent_magic_doubly_robust(), None);
}

#[test]
fn dropping_a_field_mid_window_is_a_contract_violation() {
    let mut evaluator = evaluator(3);
    evaluator
        .report(episode_report(&[1.0], &[0], 0.9, 0.1))
        .unwrap();

    let mut partial = episode_report(&[1.0], &[0], 0.9, 0.1);
    partial.logged_terminals = None;
    let err = evaluator.report(partial).unwrap_err();
    assert!(matches!(
        err,
        EvaluatorError::InconsistentField {
            field: "logged_terminals"
        }
    ));
    assert_eq!(evaluator.pending_reports(), 1);

    evaluator.clear();
    assert_eq!(evaluator.pending_reports(), 0);
    assert!(evaluator.histories().td_loss.is_empty());
}

#[test]
fn history_capacity_bounds_the_window() {
    let mut evaluator = Evaluator::new(
        EvaluatorConfig::default()
            .with_batch_size(1)
            .with_history_capacity(100),
    );
    for i in 0..150 {
        let report = EvaluatorReport {
            td_loss: Some(array![i as f64]),
            ..Default::default()
        };
        evaluator.report(report).unwrap();
    }
    let td = &evaluator.histories().td_loss;
    assert_eq!(td.len(), 100);
    assert_eq!(td.latest(), Some(149.0));
    // Mean of 50..150.
    assert!(approx_eq(evaluator.recent_td_loss().unwrap(), 99.5, 1e-9));
}
