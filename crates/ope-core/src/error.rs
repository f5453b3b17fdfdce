//! Error types for the estimators.
//!
//! Only structural problems are errors. Numeric degeneracies (zero logged
//! propensity, zero total reward, zero episode value) are left
//! unguarded and surface as inf/NaN in the returned estimates, so callers are
//! expected to sanity-check their inputs upstream.

use ope_math::QpError;
use thiserror::Error;

/// Result type alias for estimator operations.
pub type Result<T> = std::result::Result<T, OpeError>;

#[derive(Debug, Error, PartialEq)]
pub enum OpeError {
    #[error("shape mismatch for {what}: expected {expected}, got {actual}")]
    ShapeMismatch {
        what: &'static str,
        expected: String,
        actual: String,
    },

    #[error("batch contains no complete episodes")]
    EmptyBatch,

    #[error("blending weight solve failed: {0}")]
    Solver(#[from] QpError),
}

/// Errors raised while accumulating and evaluating reports.
#[derive(Debug, Error)]
pub enum EvaluatorError {
    /// A field was present in some reports of the current window and absent
    /// from others.
    #[error("field `{field}` must be reported every time or never within a batch")]
    InconsistentField { field: &'static str },

    /// Reports of one window disagree on a field's trailing dimensions.
    #[error("cannot stack `{field}` across reports: {source}")]
    InconsistentShape {
        field: &'static str,
        #[source]
        source: ndarray::ShapeError,
    },

    #[error(transparent)]
    Estimation(#[from] OpeError),
}

/// Check that an input has `expected` rows.
pub(crate) fn ensure_len(what: &'static str, expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(OpeError::ShapeMismatch {
            what,
            expected: format!("{} rows", expected),
            actual: format!("{} rows", actual),
        });
    }
    Ok(())
}

/// Check that a matrix has the expected (rows, cols) shape.
pub(crate) fn ensure_dim(
    what: &'static str,
    expected: (usize, usize),
    actual: (usize, usize),
) -> Result<()> {
    if expected != actual {
        return Err(OpeError::ShapeMismatch {
            what,
            expected: format!("{}x{}", expected.0, expected.1),
            actual: format!("{}x{}", actual.0, actual.1),
        });
    }
    Ok(())
}
