//! Streaming evaluator: accumulates per-step reports and periodically scores
//! the current policy with the off-policy estimators.
//!
//! Every [`EvaluatorReport`] field is optional, but within one accumulation
//! window a field must be reported every time or never. Once
//! `evaluator_batch_size` reports carrying a TD loss have been collected the
//! window is stacked, evaluated and cleared. Per-batch results feed bounded
//! rolling histories whose recent means are exposed for monitoring.

use std::collections::BTreeMap;

use ndarray::{concatenate, Array, Array1, Array2, Axis, RemoveAxis};
use ope_config::EvaluatorConfig;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{ensure_len, EvaluatorError, OpeError};
use crate::estimators::{
    doubly_robust_one_step, doubly_robust_sequential, magic_estimate, DecisionStream,
    OneStepEstimate,
};
use crate::history::RollingHistory;
use crate::logging::event_names;
use crate::trajectory::episode_bounds;

/// One training step's worth of evaluation inputs.
///
/// Row counts of the per-decision fields must agree within a report.
#[derive(Debug, Clone, Default)]
pub struct EvaluatorReport {
    pub td_loss: Option<Array1<f64>>,
    /// One-hot logged actions, N×A.
    pub logged_actions: Option<Array2<f64>>,
    /// Behavior propensity of each logged action. Ones when absent.
    pub logged_propensities: Option<Array1<f64>>,
    pub logged_rewards: Option<Array1<f64>>,
    /// Logged discounted returns.
    pub logged_values: Option<Array1<f64>>,
    /// Target-policy action distribution, N×A.
    pub model_propensities: Option<Array2<f64>>,
    /// Target-policy Q-values, N×A.
    pub model_values: Option<Array2<f64>>,
    pub model_values_on_logged_actions: Option<Array1<f64>>,
    /// Greedy action chosen by the model per decision.
    pub model_action_idxs: Option<Vec<usize>>,
    /// Episode boundaries. Enables the sequential estimators.
    pub logged_terminals: Option<Vec<bool>>,
}

/// Results of one evaluated window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchSummary {
    pub num_reports: usize,
    pub td_loss: Option<f64>,
    pub mc_loss: Option<f64>,
    /// One-step estimates on logged values with the model's Q-values.
    pub value: Option<OneStepEstimate>,
    /// One-step estimates on logged rewards without a value model.
    pub reward: Option<OneStepEstimate>,
    pub logged_action_distribution: Option<BTreeMap<String, usize>>,
    pub model_action_distribution: Option<BTreeMap<String, usize>>,
    pub sequential_doubly_robust: Option<f64>,
    pub weighted_doubly_robust: Option<f64>,
    pub magic_doubly_robust: Option<f64>,
}

impl BatchSummary {
    /// Human-readable report, one line per metric.
    pub fn lines(&self) -> Vec<String> {
        let mut lines = vec!["Evaluator:".to_string()];
        if let Some(td) = self.td_loss {
            lines.push(format!("TD LOSS: {:.3}", td));
        }
        if let Some(mc) = self.mc_loss {
            lines.push(format!("MC LOSS: {:.3}", mc));
        }
        if let Some(v) = &self.value {
            lines.push(format!("Value Inverse Propensity Score : {:.3}", v.inverse_propensity));
            lines.push(format!("Value Direct Method            : {:.3}", v.direct_method));
            lines.push(format!("Value Doubly Robust P.E.       : {:.3}", v.doubly_robust));
        }
        if let Some(r) = &self.reward {
            lines.push(format!("Reward Inverse Propensity Score : {:.3}", r.inverse_propensity));
            lines.push(format!("Reward Direct Method            : {:.3}", r.direct_method));
            lines.push(format!("Reward Doubly Robust P.E.       : {:.3}", r.doubly_robust));
        }
        if let Some(v) = self.sequential_doubly_robust {
            lines.push(format!("Sequential Doubly Robust P.E.          : {:.3}", v));
        }
        if let Some(v) = self.weighted_doubly_robust {
            lines.push(format!("Weighted Sequential Doubly Robust P.E. : {:.3}", v));
        }
        if let Some(v) = self.magic_doubly_robust {
            lines.push(format!("MAGIC Doubly Robust P.E.               : {:.3}", v));
        }
        if let Some(d) = &self.logged_action_distribution {
            lines.push(format!("The distribution of logged actions : {:?}", d));
        }
        if let Some(d) = &self.model_action_distribution {
            lines.push(format!("The distribution of model actions : {:?}", d));
        }
        lines.push("Evaluator Finished".to_string());
        lines
    }
}

/// Per-batch metric histories.
#[derive(Debug, Clone)]
pub struct EvaluatorHistories {
    pub td_loss: RollingHistory,
    pub mc_loss: RollingHistory,
    pub value_inverse_propensity_score: RollingHistory,
    pub value_direct_method: RollingHistory,
    pub value_doubly_robust: RollingHistory,
    pub reward_inverse_propensity_score: RollingHistory,
    pub reward_direct_method: RollingHistory,
    pub reward_doubly_robust: RollingHistory,
    pub sequential_doubly_robust: RollingHistory,
    pub weighted_doubly_robust: RollingHistory,
    pub magic_doubly_robust: RollingHistory,
}

impl EvaluatorHistories {
    fn new(capacity: usize) -> Self {
        let h = || RollingHistory::new(capacity);
        Self {
            td_loss: h(),
            mc_loss: h(),
            value_inverse_propensity_score: h(),
            value_direct_method: h(),
            value_doubly_robust: h(),
            reward_inverse_propensity_score: h(),
            reward_direct_method: h(),
            reward_doubly_robust: h(),
            sequential_doubly_robust: h(),
            weighted_doubly_robust: h(),
            magic_doubly_robust: h(),
        }
    }

    fn record(&mut self, summary: &BatchSummary) {
        fn push(history: &mut RollingHistory, value: Option<f64>) {
            if let Some(v) = value {
                history.push(v);
            }
        }
        push(&mut self.td_loss, summary.td_loss);
        push(&mut self.mc_loss, summary.mc_loss);
        if let Some(v) = &summary.value {
            self.value_inverse_propensity_score.push(v.inverse_propensity);
            self.value_direct_method.push(v.direct_method);
            self.value_doubly_robust.push(v.doubly_robust);
        }
        if let Some(r) = &summary.reward {
            self.reward_inverse_propensity_score.push(r.inverse_propensity);
            self.reward_direct_method.push(r.direct_method);
            self.reward_doubly_robust.push(r.doubly_robust);
        }
        push(&mut self.sequential_doubly_robust, summary.sequential_doubly_robust);
        push(&mut self.weighted_doubly_robust, summary.weighted_doubly_robust);
        push(&mut self.magic_doubly_robust, summary.magic_doubly_robust);
    }
}

#[derive(Debug, Clone, Default)]
struct Buffers {
    td_loss: Vec<Array1<f64>>,
    logged_actions: Vec<Array2<f64>>,
    logged_propensities: Vec<Array1<f64>>,
    logged_rewards: Vec<Array1<f64>>,
    logged_values: Vec<Array1<f64>>,
    model_propensities: Vec<Array2<f64>>,
    model_values: Vec<Array2<f64>>,
    model_values_on_logged_actions: Vec<Array1<f64>>,
    model_action_idxs: Vec<Vec<usize>>,
    logged_terminals: Vec<Vec<bool>>,
}

/// Accumulates reports and evaluates them in windows.
#[derive(Debug, Clone)]
pub struct Evaluator {
    config: EvaluatorConfig,
    buffers: Buffers,
    pending: usize,
    histories: EvaluatorHistories,
}

impl Evaluator {
    pub fn new(config: EvaluatorConfig) -> Self {
        let histories = EvaluatorHistories::new(config.history_capacity);
        Self {
            config,
            buffers: Buffers::default(),
            pending: 0,
            histories,
        }
    }

    pub fn config(&self) -> &EvaluatorConfig {
        &self.config
    }

    /// Reports accepted since the last evaluation.
    pub fn pending_reports(&self) -> usize {
        self.pending
    }

    pub fn histories(&self) -> &EvaluatorHistories {
        &self.histories
    }

    /// Buffer one report and evaluate the window once it is full.
    ///
    /// A report that mixes present and absent fields relative to the current
    /// window is rejected before any buffer changes. After an evaluation,
    /// successful or not, the window is cleared.
    pub fn report(
        &mut self,
        report: EvaluatorReport,
    ) -> Result<Option<BatchSummary>, EvaluatorError> {
        self.check_presence(&report)?;

        let b = &mut self.buffers;
        push_some(&mut b.td_loss, report.td_loss);
        push_some(&mut b.logged_actions, report.logged_actions);
        push_some(&mut b.logged_propensities, report.logged_propensities);
        push_some(&mut b.logged_rewards, report.logged_rewards);
        push_some(&mut b.logged_values, report.logged_values);
        push_some(&mut b.model_propensities, report.model_propensities);
        push_some(&mut b.model_values, report.model_values);
        push_some(
            &mut b.model_values_on_logged_actions,
            report.model_values_on_logged_actions,
        );
        push_some(&mut b.model_action_idxs, report.model_action_idxs);
        push_some(&mut b.logged_terminals, report.logged_terminals);
        self.pending += 1;

        debug!(
            event = event_names::REPORT_ACCEPTED,
            pending = self.pending,
            td_loss_reports = self.buffers.td_loss.len(),
            "report buffered"
        );

        if self.buffers.td_loss.len() < self.config.evaluator_batch_size {
            return Ok(None);
        }
        let result = self.evaluate_batch();
        self.clear();
        result.map(Some)
    }

    fn check_presence(&self, report: &EvaluatorReport) -> Result<(), EvaluatorError> {
        let b = &self.buffers;
        let fields = [
            ("td_loss", report.td_loss.is_some(), b.td_loss.len()),
            ("logged_actions", report.logged_actions.is_some(), b.logged_actions.len()),
            (
                "logged_propensities",
                report.logged_propensities.is_some(),
                b.logged_propensities.len(),
            ),
            ("logged_rewards", report.logged_rewards.is_some(), b.logged_rewards.len()),
            ("logged_values", report.logged_values.is_some(), b.logged_values.len()),
            (
                "model_propensities",
                report.model_propensities.is_some(),
                b.model_propensities.len(),
            ),
            ("model_values", report.model_values.is_some(), b.model_values.len()),
            (
                "model_values_on_logged_actions",
                report.model_values_on_logged_actions.is_some(),
                b.model_values_on_logged_actions.len(),
            ),
            (
                "model_action_idxs",
                report.model_action_idxs.is_some(),
                b.model_action_idxs.len(),
            ),
            (
                "logged_terminals",
                report.logged_terminals.is_some(),
                b.logged_terminals.len(),
            ),
        ];
        for (field, present, buffered) in fields {
            let expected = if present { self.pending } else { 0 };
            if buffered != expected {
                return Err(EvaluatorError::InconsistentField { field });
            }
        }
        Ok(())
    }

    /// Drop all buffered reports. Histories are kept.
    pub fn clear(&mut self) {
        self.buffers = Buffers::default();
        self.pending = 0;
    }

    /// Stack the buffered reports and compute every metric whose inputs are
    /// present. Results are appended to the histories and the summary is
    /// logged line by line.
    pub fn evaluate_batch(&mut self) -> Result<BatchSummary, EvaluatorError> {
        let b = &self.buffers;
        info!(
            event = event_names::BATCH_EVALUATED,
            reports = self.pending,
            "Evaluating on {} batches",
            self.pending
        );

        let td_loss = stack("td_loss", &b.td_loss)?;
        let logged_actions = stack("logged_actions", &b.logged_actions)?;
        let logged_propensities = stack("logged_propensities", &b.logged_propensities)?;
        let logged_rewards = stack("logged_rewards", &b.logged_rewards)?;
        let logged_values = stack("logged_values", &b.logged_values)?;
        let model_propensities = stack("model_propensities", &b.model_propensities)?;
        let model_values = stack("model_values", &b.model_values)?;
        let model_values_on_logged_actions =
            stack("model_values_on_logged_actions", &b.model_values_on_logged_actions)?;
        let model_action_idxs: Option<Vec<usize>> =
            flatten(&b.model_action_idxs);
        let logged_terminals: Option<Vec<bool>> = flatten(&b.logged_terminals);

        let mut summary = BatchSummary {
            num_reports: self.pending,
            td_loss: td_loss.as_ref().and_then(|td| td.mean()),
            mc_loss: None,
            value: None,
            reward: None,
            logged_action_distribution: None,
            model_action_distribution: None,
            sequential_doubly_robust: None,
            weighted_doubly_robust: None,
            magic_doubly_robust: None,
        };

        if let (Some(values), Some(on_logged)) = (&logged_values, &model_values_on_logged_actions)
        {
            ensure_len("model_values_on_logged_actions", values.len(), on_logged.len())?;
            summary.mc_loss = (values - on_logged).mapv(f64::abs).mean();
        }

        if let (Some(actions), Some(target), Some(q)) =
            (&logged_actions, &model_propensities, &model_values)
        {
            // Without logged propensities the behavior policy is taken to be
            // deterministic.
            let propensities = logged_propensities
                .clone()
                .unwrap_or_else(|| Array1::ones(actions.nrows()));

            if let Some(values) = &logged_values {
                summary.value = Some(doubly_robust_one_step(
                    actions.view(),
                    values.view(),
                    propensities.view(),
                    target.view(),
                    Some(q.view()),
                )?);
            }
            if let Some(rewards) = &logged_rewards {
                summary.reward = Some(doubly_robust_one_step(
                    actions.view(),
                    rewards.view(),
                    propensities.view(),
                    target.view(),
                    None,
                )?);
            }

            if let (Some(terminals), Some(rewards)) = (&logged_terminals, &logged_rewards) {
                let stream = DecisionStream {
                    logged_actions: actions.view(),
                    logged_rewards: rewards.view(),
                    is_terminals: terminals,
                    logged_propensities: propensities.view(),
                    target_propensities: target.view(),
                    estimated_q_values: q.view(),
                };
                self.evaluate_sequential(&stream, &mut summary)?;
            }
        }

        if let Some(actions) = &logged_actions {
            if let Some(model_idxs) = &model_action_idxs {
                let logged_idxs: Vec<usize> = actions.rows().into_iter().map(argmax).collect();
                summary.logged_action_distribution = Some(self.distribution(&logged_idxs));
                summary.model_action_distribution = Some(self.distribution(model_idxs));
            }
        }

        for line in summary.lines() {
            info!(event = event_names::SUMMARY_LINE, "{}", line);
        }
        self.histories.record(&summary);
        Ok(summary)
    }

    fn evaluate_sequential(
        &self,
        stream: &DecisionStream<'_>,
        summary: &mut BatchSummary,
    ) -> Result<(), EvaluatorError> {
        if episode_bounds(stream.is_terminals).is_empty() {
            warn!(
                event = event_names::ESTIMATE_NO_EPISODES,
                decisions = stream.num_decisions(),
                "skipping sequential estimators: no terminal decision in batch"
            );
            return Ok(());
        }

        let gamma = self.config.gamma;
        let solver = &self.config.qp_solver;
        summary.sequential_doubly_robust = Some(doubly_robust_sequential(stream, gamma)?);
        summary.weighted_doubly_robust = Some(magic_estimate(stream, gamma, 1, solver)?.normalized_value);
        summary.magic_doubly_robust =
            match magic_estimate(stream, gamma, self.config.num_j_steps, solver) {
                Ok(magic) => Some(magic.normalized_value),
                Err(OpeError::Solver(err)) => {
                    warn!(
                        event = event_names::ESTIMATE_MAGIC,
                        error = %err,
                        "MAGIC blending failed; estimate omitted"
                    );
                    None
                }
                Err(err) => return Err(err.into()),
            };
        Ok(())
    }

    /// Count action indices, keyed by configured name or by index.
    fn distribution(&self, idxs: &[usize]) -> BTreeMap<String, usize> {
        let mut counts: BTreeMap<String, usize> = self
            .config
            .action_names
            .iter()
            .map(|name| (name.clone(), 0))
            .collect();
        for &idx in idxs {
            let key = self
                .config
                .action_names
                .get(idx)
                .cloned()
                .unwrap_or_else(|| idx.to_string());
            *counts.entry(key).or_insert(0) += 1;
        }
        counts
    }

    /// Mean TD loss over the last 100 batches.
    pub fn recent_td_loss(&self) -> Option<f64> {
        self.histories.td_loss.recent_mean()
    }

    /// Mean Monte Carlo loss over the last 100 batches.
    pub fn recent_mc_loss(&self) -> Option<f64> {
        self.histories.mc_loss.recent_mean()
    }

    /// Reward IPS, last 100 batches.
    pub fn recent_inverse_propensity_score(&self) -> Option<f64> {
        self.histories.reward_inverse_propensity_score.recent_mean()
    }

    /// Reward direct method, last 100 batches.
    pub fn recent_direct_method(&self) -> Option<f64> {
        self.histories.reward_direct_method.recent_mean()
    }

    /// Reward doubly robust, last 100 batches.
    pub fn recent_doubly_robust(&self) -> Option<f64> {
        self.histories.reward_doubly_robust.recent_mean()
    }

    pub fn recent_sequential_doubly_robust(&self) -> Option<f64> {
        self.histories.sequential_doubly_robust.recent_mean()
    }

    pub fn recent_weighted_doubly_robust(&self) -> Option<f64> {
        self.histories.weighted_doubly_robust.recent_mean()
    }

    pub fn recent_magic_doubly_robust(&self) -> Option<f64> {
        self.histories.magic_doubly_robust.recent_mean()
    }
}

fn push_some<T>(buffer: &mut Vec<T>, value: Option<T>) {
    if let Some(v) = value {
        buffer.push(v);
    }
}

/// Concatenate buffered arrays along the decision axis.
fn stack<D>(
    field: &'static str,
    parts: &[Array<f64, D>],
) -> Result<Option<Array<f64, D>>, EvaluatorError>
where
    D: RemoveAxis,
{
    if parts.is_empty() {
        return Ok(None);
    }
    let views: Vec<_> = parts.iter().map(|p| p.view()).collect();
    concatenate(Axis(0), &views)
        .map(Some)
        .map_err(|source| EvaluatorError::InconsistentShape { field, source })
}

fn flatten<T: Clone>(parts: &[Vec<T>]) -> Option<Vec<T>> {
    if parts.is_empty() {
        return None;
    }
    Some(parts.concat())
}

/// Index of the first maximum.
fn argmax(row: ndarray::ArrayView1<'_, f64>) -> usize {
    let mut best = 0;
    for (i, v) in row.iter().enumerate() {
        if *v > row[best] {
            best = i;
        }
    }
    best
}
