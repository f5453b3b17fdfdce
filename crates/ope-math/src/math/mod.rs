//! Core math modules.

pub mod incomplete_beta;
pub mod simplex_qp;
pub mod stable;
pub mod student_t;
pub mod summary;
