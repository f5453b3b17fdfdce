//! Regularized incomplete beta function I_x(a, b).
//!
//! Evaluated with the modified Lentz continued fraction (Numerical Recipes),
//! using the symmetry I_x(a, b) = 1 - I_{1-x}(b, a) on the side where the
//! fraction converges quickly. The tolerance is tight enough for inverting
//! the Student-t CDF by bisection.

use super::stable::log_beta;

const CF_MAX_ITERS: usize = 300;
const CF_EPS: f64 = 1.0e-15;
const CF_FPMIN: f64 = 1.0e-300;

/// I_x(a, b) for a, b > 0 and x in [0, 1].
///
/// Returns NaN for NaN input or non-positive shape parameters; x outside
/// [0, 1] is clamped to the nearest bound.
pub fn regularized_incomplete_beta(x: f64, a: f64, b: f64) -> f64 {
    if x.is_nan() || a.is_nan() || b.is_nan() {
        return f64::NAN;
    }
    if a <= 0.0 || b <= 0.0 {
        return f64::NAN;
    }
    if x <= 0.0 {
        return 0.0;
    }
    if x >= 1.0 {
        return 1.0;
    }

    let log_front = a * x.ln() + b * (-x).ln_1p() - log_beta(a, b);
    let front = log_front.exp();
    if x < (a + 1.0) / (a + b + 2.0) {
        front * continued_fraction(x, a, b) / a
    } else {
        1.0 - front * continued_fraction(1.0 - x, b, a) / b
    }
}

fn clamp_tiny(v: f64) -> f64 {
    if v.abs() < CF_FPMIN {
        CF_FPMIN
    } else {
        v
    }
}

fn continued_fraction(x: f64, a: f64, b: f64) -> f64 {
    let qab = a + b;
    let qap = a + 1.0;
    let qam = a - 1.0;

    let mut c = 1.0;
    let mut d = 1.0 / clamp_tiny(1.0 - qab * x / qap);
    let mut h = d;

    for m in 1..=CF_MAX_ITERS {
        let m = m as f64;
        let m2 = 2.0 * m;

        // Even step.
        let aa = m * (b - m) * x / ((qam + m2) * (a + m2));
        d = 1.0 / clamp_tiny(1.0 + aa * d);
        c = clamp_tiny(1.0 + aa / c);
        h *= d * c;

        // Odd step.
        let aa = -(a + m) * (qab + m) * x / ((a + m2) * (qap + m2));
        d = 1.0 / clamp_tiny(1.0 + aa * d);
        c = clamp_tiny(1.0 + aa / c);
        let delta = d * c;
        h *= delta;

        if (delta - 1.0).abs() < CF_EPS {
            break;
        }
    }

    h
}
