//! Off-policy evaluation math utilities.

pub mod math;

pub use math::incomplete_beta::regularized_incomplete_beta;
pub use math::simplex_qp::{
    project_onto_simplex, quadratic_form, ProjectedGradientSolver, QpError, SimplexQpSolver,
};
pub use math::stable::*;
pub use math::student_t::{student_t_cdf, student_t_quantile};
pub use math::summary::*;
