//! Event names and pipeline stages attached to structured log records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stages of one evaluation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Startup and configuration.
    Init,
    /// Reading the logged batch.
    Load,
    /// Running estimators.
    Estimate,
    /// Accumulating reports and summarizing batches.
    Evaluate,
    /// Writing the result payload.
    Report,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Stage::Init => "init",
            Stage::Load => "load",
            Stage::Estimate => "estimate",
            Stage::Evaluate => "evaluate",
            Stage::Report => "report",
        };
        write!(f, "{}", s)
    }
}

/// Standard event names used in logging.
pub mod event_names {
    // Run lifecycle
    pub const RUN_STARTED: &str = "run.started";
    pub const RUN_FINISHED: &str = "run.finished";

    // Config
    pub const CONFIG_LOADED: &str = "config.loaded";
    pub const CONFIG_ERROR: &str = "config.error";

    // Input
    pub const BATCH_LOADED: &str = "batch.loaded";
    pub const BATCH_REJECTED: &str = "batch.rejected";

    // Estimators
    pub const ESTIMATE_MAGIC: &str = "estimate.magic";
    pub const ESTIMATE_NO_EPISODES: &str = "estimate.no_episodes";

    // Evaluator
    pub const REPORT_ACCEPTED: &str = "evaluator.report_accepted";
    pub const BATCH_EVALUATED: &str = "batch.evaluated";
    pub const SUMMARY_LINE: &str = "batch.summary_line";

    pub const INTERNAL_ERROR: &str = "internal_error";
}

/// Correlation data shared by every record of one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogContext {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
}

impl LogContext {
    pub fn new(run_id: impl Into<String>) -> Self {
        LogContext {
            run_id: run_id.into(),
            started_at: Utc::now(),
        }
    }

    /// Seconds elapsed since the run started.
    pub fn elapsed_secs(&self) -> f64 {
        (Utc::now() - self.started_at).num_milliseconds() as f64 / 1000.0
    }
}
