//! Per-timestep importance weight normalization.

use ndarray::Array2;

/// Normalize a T×L weight matrix so every column sums to one.
///
/// A column whose sum is exactly zero is overwritten with ones and divided by
/// T, so it becomes uniform 1/T. Empty matrices are left untouched.
pub fn normalize_importance_weights(weights: &mut Array2<f64>) {
    let num_trajectories = weights.nrows() as f64;
    for mut column in weights.columns_mut() {
        let mut total = column.sum();
        if total == 0.0 {
            column.fill(1.0);
            total = num_trajectories;
        }
        column /= total;
    }
}

/// Weights paired with the bootstrap term: column 0 is replaced by uniform
/// 1/T and the remaining columns are kept as they are.
pub fn one_step_earlier(normalized: &Array2<f64>) -> Array2<f64> {
    let mut earlier = normalized.clone();
    if earlier.ncols() > 0 {
        let num_trajectories = earlier.nrows() as f64;
        earlier.column_mut(0).fill(1.0 / num_trajectories);
    }
    earlier
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn columns_sum_to_one() {
        let mut w = array![[1.0, 0.5], [3.0, 1.5]];
        normalize_importance_weights(&mut w);
        assert_eq!(w, array![[0.25, 0.25], [0.75, 0.75]]);
    }

    #[test]
    fn zero_column_becomes_uniform() {
        let mut w = array![[2.0, 0.0], [2.0, 0.0], [4.0, 0.0], [0.0, 0.0]];
        normalize_importance_weights(&mut w);
        assert_eq!(w.column(0).to_vec(), vec![0.25, 0.25, 0.5, 0.0]);
        assert_eq!(w.column(1).to_vec(), vec![0.25; 4]);
    }

    #[test]
    fn empty_matrix_is_noop() {
        let mut w = Array2::<f64>::zeros((0, 3));
        normalize_importance_weights(&mut w);
        assert_eq!(w.dim(), (0, 3));
    }

    #[test]
    fn earlier_weights_replace_only_first_column() {
        let w = array![[0.2, 0.4, 0.7], [0.8, 0.6, 0.3]];
        let earlier = one_step_earlier(&w);
        assert_eq!(earlier, array![[0.5, 0.4, 0.7], [0.5, 0.6, 0.3]]);
    }

    #[test]
    fn earlier_weights_of_empty_horizon() {
        let w = Array2::<f64>::zeros((2, 0));
        assert_eq!(one_step_earlier(&w).dim(), (2, 0));
    }
}
