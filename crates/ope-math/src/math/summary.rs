//! Sample statistics: mean, standard error, covariance, t-intervals.

use ndarray::{Array2, ArrayView2, Axis};

use super::student_t::student_t_quantile;

/// Arithmetic mean. NaN for empty input.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Unbiased sample variance (ddof = 1). NaN for fewer than two values.
pub fn sample_variance(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return f64::NAN;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (n as f64 - 1.0)
}

/// Standard error of the mean: sqrt(sample_variance / n).
pub fn standard_error(values: &[f64]) -> f64 {
    (sample_variance(values) / values.len() as f64).sqrt()
}

/// Two-sided Student-t confidence interval for the mean of `values`.
///
/// `mean ± t_{(1+confidence)/2, n-1} · sem`. Identical samples give a
/// zero-width interval at their common value.
pub fn t_confidence_interval(values: &[f64], confidence: f64) -> (f64, f64) {
    let m = mean(values);
    let se = standard_error(values);
    if se == 0.0 {
        return (m, m);
    }
    let df = values.len() as f64 - 1.0;
    let half_width = se * student_t_quantile((1.0 + confidence) / 2.0, df);
    (m - half_width, m + half_width)
}

/// Covariance matrix of the rows of `observations` (ddof = 1).
///
/// Each row is one variable and each column one observation, so a K×N input
/// yields a K×K matrix. Fewer than two observations produce NaN entries.
pub fn covariance_matrix(observations: ArrayView2<'_, f64>) -> Array2<f64> {
    let (num_vars, num_obs) = observations.dim();
    if num_obs < 2 {
        return Array2::from_elem((num_vars, num_vars), f64::NAN);
    }
    let means = observations.sum_axis(Axis(1)) / num_obs as f64;
    let centered = &observations - &means.insert_axis(Axis(1));
    centered.dot(&centered.t()) / (num_obs as f64 - 1.0)
}
