//! Quadratic minimization over the probability simplex.
//!
//! Solves
//!
//! ```text
//! minimize   xᵀ·E·x
//! subject to x ≥ 0,  Σx = 1
//! ```
//!
//! for a square error matrix `E`. This is the blending-weight problem of
//! MAGIC: `E` is the covariance of per-horizon returns plus the outer product
//! of their biases, so it is symmetric positive semi-definite in practice.
//!
//! The solver is a trait so callers can plug in any routine that honors the
//! constraints. [`ProjectedGradientSolver`] is the built-in implementation.

use ndarray::{Array1, ArrayView2};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum QpError {
    #[error("error matrix is empty")]
    Empty,

    #[error("error matrix must be square, got {rows}x{cols}")]
    NotSquare { rows: usize, cols: usize },

    #[error("error matrix contains non-finite entries")]
    NonFinite,
}

/// A solver for `min xᵀ·E·x` over the probability simplex.
pub trait SimplexQpSolver {
    /// Return blending weights `x` with `x ≥ 0` and `Σx = 1`.
    fn solve(&self, error: ArrayView2<'_, f64>) -> Result<Array1<f64>, QpError>;
}

/// Accelerated projected gradient descent with Euclidean projection onto the
/// simplex.
///
/// Starts from the projection of the all-zero point (the uniform vector) and
/// uses a fixed step of 1/L, where L bounds the largest eigenvalue of the
/// objective's Hessian through Gershgorin's theorem. Nesterov momentum is
/// reset whenever an accelerated step increases the objective, so the
/// accepted iterates never get worse.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProjectedGradientSolver {
    /// Iteration cap.
    pub max_iterations: usize,
    /// Stop once no coordinate moves by more than this.
    pub tolerance: f64,
}

impl Default for ProjectedGradientSolver {
    fn default() -> Self {
        Self {
            max_iterations: 20_000,
            tolerance: 1e-12,
        }
    }
}

impl ProjectedGradientSolver {
    pub fn new(max_iterations: usize, tolerance: f64) -> Self {
        Self {
            max_iterations,
            tolerance,
        }
    }
}

impl SimplexQpSolver for ProjectedGradientSolver {
    fn solve(&self, error: ArrayView2<'_, f64>) -> Result<Array1<f64>, QpError> {
        let (rows, cols) = error.dim();
        if rows == 0 || cols == 0 {
            return Err(QpError::Empty);
        }
        if rows != cols {
            return Err(QpError::NotSquare { rows, cols });
        }
        if error.iter().any(|v| !v.is_finite()) {
            return Err(QpError::NonFinite);
        }

        // xᵀEx only sees the symmetric part of E.
        let sym = (&error + &error.t()) * 0.5;
        let lipschitz = 2.0
            * sym
                .rows()
                .into_iter()
                .map(|row| row.iter().map(|v| v.abs()).sum::<f64>())
                .fold(0.0, f64::max);

        let mut x = project_onto_simplex(&Array1::zeros(rows));
        if lipschitz == 0.0 {
            return Ok(x);
        }

        let mut y = x.clone();
        let mut momentum = 1.0_f64;
        let mut objective = quadratic_form(&x, sym.view());
        for _ in 0..self.max_iterations {
            let gradient = sym.dot(&y) * 2.0;
            let next = project_onto_simplex(&(&y - &(gradient / lipschitz)));
            let next_objective = quadratic_form(&next, sym.view());

            // Adaptive restart: drop the momentum whenever it overshoots.
            if next_objective > objective && momentum > 1.0 {
                y = x.clone();
                momentum = 1.0;
                continue;
            }

            let next_momentum = (1.0 + (1.0 + 4.0 * momentum * momentum).sqrt()) / 2.0;
            let step = &next - &x;
            let moved = step.iter().fold(0.0, |acc: f64, d| acc.max(d.abs()));
            y = &next + &(step * ((momentum - 1.0) / next_momentum));
            x = next;
            objective = next_objective;
            momentum = next_momentum;
            if moved <= self.tolerance {
                break;
            }
        }
        Ok(x)
    }
}

/// Euclidean projection of `v` onto the probability simplex.
///
/// Sort-based algorithm: find the largest ρ with
/// `u_ρ − (Σ_{i≤ρ} u_i − 1)/ρ > 0` over the descending sort `u`, then shift
/// and clip at zero.
pub fn project_onto_simplex(v: &Array1<f64>) -> Array1<f64> {
    if v.is_empty() {
        return Array1::zeros(0);
    }
    let mut sorted: Vec<f64> = v.to_vec();
    sorted.sort_by(|a, b| b.total_cmp(a));

    let mut cumulative = 0.0;
    let mut theta = 0.0;
    for (i, u) in sorted.iter().enumerate() {
        cumulative += u;
        let candidate = (cumulative - 1.0) / (i as f64 + 1.0);
        if u - candidate > 0.0 {
            theta = candidate;
        }
    }
    v.mapv(|value| (value - theta).max(0.0))
}

/// Evaluate `xᵀ·E·x`.
pub fn quadratic_form(x: &Array1<f64>, error: ArrayView2<'_, f64>) -> f64 {
    x.dot(&error.dot(x))
}
