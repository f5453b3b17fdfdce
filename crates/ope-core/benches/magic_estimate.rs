//! Criterion benchmarks for the trajectory estimators.
//!
//! Synthetic batches of fixed-length episodes with random behavior and
//! target policies over four actions.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ndarray::{Array1, Array2};
use ope_core::estimators::{doubly_robust_sequential, magic_estimate, DecisionStream};
use ope_math::ProjectedGradientSolver;
use rand::Rng;

const NUM_ACTIONS: usize = 4;
const EPISODE_LENGTH: usize = 20;

// ── Helpers ──────────────────────────────────────────────────────────

struct SyntheticBatch {
    actions: Array2<f64>,
    rewards: Array1<f64>,
    terminals: Vec<bool>,
    logged_propensities: Array1<f64>,
    target_propensities: Array2<f64>,
    q_values: Array2<f64>,
}

impl SyntheticBatch {
    fn new(num_episodes: usize) -> Self {
        let mut rng = rand::rng();
        let n = num_episodes * EPISODE_LENGTH;

        let mut actions = Array2::zeros((n, NUM_ACTIONS));
        let mut logged_propensities = Array1::zeros(n);
        let mut target_propensities = Array2::zeros((n, NUM_ACTIONS));
        for i in 0..n {
            let raw: Vec<f64> = (0..NUM_ACTIONS).map(|_| rng.random_range(0.1..1.0)).collect();
            let total: f64 = raw.iter().sum();
            for (a, p) in raw.iter().enumerate() {
                target_propensities[[i, a]] = p / total;
            }
            let action = rng.random_range(0..NUM_ACTIONS);
            actions[[i, action]] = 1.0;
            logged_propensities[i] = 1.0 / NUM_ACTIONS as f64;
        }

        Self {
            actions,
            rewards: Array1::from_shape_fn(n, |_| rng.random_range(0.0..1.0)),
            terminals: (0..n).map(|i| (i + 1) % EPISODE_LENGTH == 0).collect(),
            logged_propensities,
            target_propensities,
            q_values: Array2::from_shape_fn((n, NUM_ACTIONS), |_| rng.random_range(0.0..5.0)),
        }
    }

    fn stream(&self) -> DecisionStream<'_> {
        DecisionStream {
            logged_actions: self.actions.view(),
            logged_rewards: self.rewards.view(),
            is_terminals: &self.terminals,
            logged_propensities: self.logged_propensities.view(),
            target_propensities: self.target_propensities.view(),
            estimated_q_values: self.q_values.view(),
        }
    }
}

// ── Benchmarks ───────────────────────────────────────────────────────

fn bench_magic(c: &mut Criterion) {
    let mut group = c.benchmark_group("magic_estimate");
    let solver = ProjectedGradientSolver::default();

    for episodes in [50usize, 500] {
        let batch = SyntheticBatch::new(episodes);
        group.bench_with_input(BenchmarkId::new("j_steps_10", episodes), &batch, |b, batch| {
            b.iter(|| black_box(magic_estimate(&batch.stream(), black_box(0.99), 10, &solver)));
        });
    }

    group.finish();
}

fn bench_sequential(c: &mut Criterion) {
    let batch = SyntheticBatch::new(500);
    c.bench_function("doubly_robust_sequential_500", |b| {
        b.iter(|| black_box(doubly_robust_sequential(&batch.stream(), black_box(0.99))));
    });
}

criterion_group!(benches, bench_magic, bench_sequential);
criterion_main!(benches);
