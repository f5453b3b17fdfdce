//! Off-Policy Evaluation Core Library
//!
//! This library provides:
//! - Trajectory reshaping of flat logged decision streams
//! - One-step, sequential and weighted doubly robust estimators with MAGIC
//!   horizon blending
//! - A streaming evaluator with rolling metric histories
//! - Logging setup and exit codes for the CLI
//!
//! The binary entry point is in `main.rs`.

pub mod batch;
pub mod error;
pub mod estimators;
pub mod evaluator;
pub mod exit_codes;
pub mod history;
pub mod logging;
pub mod trajectory;

pub use error::{EvaluatorError, OpeError};
pub use estimators::{
    doubly_robust_one_step, doubly_robust_sequential, magic_estimate, normalize_importance_weights,
    step_return, weighted_doubly_robust, DecisionStream, JStep, MagicEstimate, OneStepEstimate,
};
pub use evaluator::{BatchSummary, Evaluator, EvaluatorReport};
pub use trajectory::{reshape_trajectories, Trajectories};
