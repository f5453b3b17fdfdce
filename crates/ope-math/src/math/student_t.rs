//! Student's t distribution: CDF and quantile.
//!
//! The CDF is expressed through the regularized incomplete beta function:
//!
//! ```text
//! F(t; ν) = 1 - ½·I_{ν/(ν+t²)}(ν/2, ½)   for t ≥ 0
//! ```
//!
//! and the quantile inverts it by bracketing followed by bisection.

use super::incomplete_beta::regularized_incomplete_beta;

const QUANTILE_MAX_ITERS: usize = 200;
const QUANTILE_REL_TOL: f64 = 1e-13;
const BRACKET_LIMIT: f64 = 1e300;

/// CDF of Student's t with `df` degrees of freedom.
pub fn student_t_cdf(t: f64, df: f64) -> f64 {
    if t.is_nan() || df.is_nan() || df <= 0.0 {
        return f64::NAN;
    }
    if t.is_infinite() {
        return if t > 0.0 { 1.0 } else { 0.0 };
    }
    let x = df / (df + t * t);
    let tail = 0.5 * regularized_incomplete_beta(x, 0.5 * df, 0.5);
    if t >= 0.0 {
        1.0 - tail
    } else {
        tail
    }
}

/// Quantile (inverse CDF) of Student's t with `df` degrees of freedom.
///
/// `p <= 0` maps to -inf and `p >= 1` to +inf.
pub fn student_t_quantile(p: f64, df: f64) -> f64 {
    if p.is_nan() || df.is_nan() || df <= 0.0 {
        return f64::NAN;
    }
    if p <= 0.0 {
        return f64::NEG_INFINITY;
    }
    if p >= 1.0 {
        return f64::INFINITY;
    }
    if p == 0.5 {
        return 0.0;
    }
    if p < 0.5 {
        return -student_t_quantile(1.0 - p, df);
    }

    let mut low = 0.0;
    let mut high = 1.0;
    while student_t_cdf(high, df) < p {
        low = high;
        high *= 2.0;
        if high > BRACKET_LIMIT {
            return f64::INFINITY;
        }
    }

    let mut mid = 0.5 * (low + high);
    for _ in 0..QUANTILE_MAX_ITERS {
        mid = 0.5 * (low + high);
        if student_t_cdf(mid, df) < p {
            low = mid;
        } else {
            high = mid;
        }
        if high - low <= QUANTILE_REL_TOL * high.max(1.0) {
            break;
        }
    }
    mid
}
