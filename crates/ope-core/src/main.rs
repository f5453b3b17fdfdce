//! Off-Policy Evaluation Core - command-line front end
//!
//! - `evaluate`: score a target policy on a logged batch file
//! - `config show | validate`: inspect the resolved evaluator configuration
//!
//! stdout carries JSON payloads only; logs and error records go to stderr.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use ope_config::{load_config, validate_config, ConfigError, ResolvedConfig, CONFIG_SCHEMA_VERSION};
use ope_core::batch::{BatchError, LoggedBatch};
use ope_core::estimators::magic_estimate;
use ope_core::exit_codes::ExitCode;
use ope_core::logging::{
    event_names, generate_run_id, init_logging, LogConfig, LogContext, LogFormat, LogLevel, Stage,
};
use ope_core::trajectory::episode_bounds;
use ope_core::{Evaluator, EvaluatorError, OpeError};
use tracing::{error, info, warn};

/// Off-policy evaluation of RL policies from logged trajectories
#[derive(Parser)]
#[command(name = "ope-core")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalOpts,
}

/// Global options available to all commands
#[derive(Args, Debug)]
struct GlobalOpts {
    /// Evaluator config file (overrides env and XDG discovery)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Log format on stderr (human | jsonl)
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,
}

#[derive(Subcommand)]
enum Commands {
    /// Estimate the target policy's value on a logged batch
    Evaluate(EvaluateArgs),

    /// Inspect the evaluator configuration
    Config(ConfigArgs),
}

#[derive(Args, Debug)]
struct EvaluateArgs {
    /// Logged batch (JSON)
    #[arg(long, short = 'i')]
    input: PathBuf,

    /// Number of j-step horizons blended by MAGIC
    #[arg(long)]
    num_j_steps: Option<usize>,

    /// Discount factor
    #[arg(long)]
    gamma: Option<f64>,

    /// Derive missing target propensities as softmax(Q / temperature)
    #[arg(long)]
    softmax_temperature: Option<f64>,
}

#[derive(Args, Debug)]
struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Print the resolved configuration
    Show,
    /// Validate the resolved configuration
    Validate,
}

// ============================================================================
// Main entry point
// ============================================================================

fn main() {
    let cli = Cli::parse();

    let cli_level = if cli.global.quiet {
        Some(LogLevel::Error)
    } else {
        match cli.global.verbose {
            0 => None,
            1 => Some(LogLevel::Info.louder()),
            _ => Some(LogLevel::Trace),
        }
    };
    init_logging(&LogConfig::from_env(cli_level, cli.global.log_format));

    let ctx = LogContext::new(generate_run_id());
    info!(
        event = event_names::RUN_STARTED,
        run_id = %ctx.run_id,
        stage = %Stage::Init,
        "ope-core starting"
    );

    let exit_code = match &cli.command {
        Commands::Evaluate(args) => run_evaluate(&cli.global, args, &ctx),
        Commands::Config(args) => match args.command {
            ConfigCommands::Show => run_config_show(&cli.global),
            ConfigCommands::Validate => run_config_validate(&cli.global),
        },
    };

    info!(
        event = event_names::RUN_FINISHED,
        run_id = %ctx.run_id,
        exit_code = exit_code.as_i32(),
        success = exit_code.is_success(),
        elapsed_secs = ctx.elapsed_secs(),
        "ope-core finished"
    );
    std::process::exit(exit_code.as_i32());
}

// ============================================================================
// Commands
// ============================================================================

fn run_evaluate(global: &GlobalOpts, args: &EvaluateArgs, ctx: &LogContext) -> ExitCode {
    if let Some(t) = args.softmax_temperature {
        if !(t.is_finite() && t > 0.0) {
            return emit_error(
                "args",
                None,
                format!("--softmax-temperature must be positive and finite, got {}", t),
                ExitCode::ArgsError,
            );
        }
    }

    let resolved = match load_config(global.config.as_deref()) {
        Ok(resolved) => resolved,
        Err(e) => return output_config_error(&e),
    };
    let source = resolved.source;
    let mut config = resolved.config;
    if let Some(gamma) = args.gamma {
        config.gamma = gamma;
    }
    if let Some(k) = args.num_j_steps {
        config.num_j_steps = k;
    }
    if let Err(e) = validate_config(&config) {
        return output_config_error(&ConfigError::Invalid(e));
    }
    info!(
        event = event_names::CONFIG_LOADED,
        stage = %Stage::Init,
        source = %source,
        gamma = config.gamma,
        num_j_steps = config.num_j_steps,
        "configuration resolved"
    );

    let batch = match LoggedBatch::from_file(&args.input) {
        Ok(batch) => batch,
        Err(e) => return output_batch_error(&e),
    };
    let arrays = match batch.to_arrays(args.softmax_temperature) {
        Ok(arrays) => arrays,
        Err(e) => return output_batch_error(&e),
    };
    let num_episodes = episode_bounds(&arrays.is_terminals).len();
    info!(
        event = event_names::BATCH_LOADED,
        stage = %Stage::Load,
        decisions = batch.num_decisions(),
        episodes = num_episodes,
        "logged batch loaded"
    );

    let mut evaluator = Evaluator::new(config.clone());
    let summary = evaluator
        .report(arrays.to_report(config.gamma))
        .and_then(|_| evaluator.evaluate_batch());
    let summary = match summary {
        Ok(summary) => summary,
        Err(e) => return output_evaluator_error(&e),
    };

    let magic = match magic_estimate(
        &arrays.stream(),
        config.gamma,
        config.num_j_steps,
        &config.qp_solver,
    ) {
        Ok(magic) => Some(magic),
        Err(e) => {
            warn!(
                event = event_names::ESTIMATE_MAGIC,
                stage = %Stage::Estimate,
                error = %e,
                "MAGIC diagnostics unavailable"
            );
            None
        }
    };

    let response = serde_json::json!({
        "schema_version": CONFIG_SCHEMA_VERSION,
        "run_id": ctx.run_id,
        "generated_at": chrono::Utc::now().to_rfc3339(),
        "input": args.input.display().to_string(),
        "config_source": source.to_string(),
        "gamma": config.gamma,
        "num_j_steps": config.num_j_steps,
        "num_decisions": batch.num_decisions(),
        "num_episodes": num_episodes,
        "summary": summary,
        "magic": magic,
    });
    print_json(&response);
    ExitCode::Clean
}

fn run_config_show(global: &GlobalOpts) -> ExitCode {
    match load_config(global.config.as_deref()) {
        Ok(resolved) => {
            print_json(&config_payload(&resolved, "ok"));
            ExitCode::Clean
        }
        Err(e) => output_config_error(&e),
    }
}

fn run_config_validate(global: &GlobalOpts) -> ExitCode {
    match load_config(global.config.as_deref()) {
        Ok(resolved) => {
            let mut payload = config_payload(&resolved, "valid");
            if let Some(map) = payload.as_object_mut() {
                map.remove("config");
            }
            print_json(&payload);
            ExitCode::Clean
        }
        Err(e) => output_config_error(&e),
    }
}

fn config_payload(resolved: &ResolvedConfig, status: &str) -> serde_json::Value {
    serde_json::json!({
        "schema_version": CONFIG_SCHEMA_VERSION,
        "generated_at": chrono::Utc::now().to_rfc3339(),
        "status": status,
        "source": resolved.source.to_string(),
        "path": resolved.path.as_ref().map(|p| p.display().to_string()),
        "config": resolved.config,
    })
}

// ============================================================================
// Output helpers
// ============================================================================

fn print_json(value: &serde_json::Value) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{}", text),
        Err(e) => error!(event = event_names::INTERNAL_ERROR, error = %e, "failed to render output"),
    }
}

fn emit_error(kind: &str, code: Option<u32>, message: String, exit_code: ExitCode) -> ExitCode {
    let response = serde_json::json!({
        "schema_version": CONFIG_SCHEMA_VERSION,
        "generated_at": chrono::Utc::now().to_rfc3339(),
        "status": "error",
        "error": {
            "kind": kind,
            "code": code,
            "exit_code": exit_code.as_i32(),
            "exit_code_name": exit_code.code_name(),
            "internal": exit_code.is_internal_error(),
            "user_fixable": exit_code.is_user_error(),
            "message": message,
        }
    });
    match serde_json::to_string_pretty(&response) {
        Ok(text) => eprintln!("{}", text),
        Err(_) => eprintln!("error: {}", message),
    }
    exit_code
}

fn output_config_error(e: &ConfigError) -> ExitCode {
    error!(event = event_names::CONFIG_ERROR, error = %e, "config error");
    let (code, exit_code) = match e {
        ConfigError::IoError { .. } => (None, ExitCode::IoError),
        ConfigError::Invalid(v) => (Some(v.code()), ExitCode::ConfigError),
        ConfigError::NotFound { .. } | ConfigError::ParseError { .. } => {
            (None, ExitCode::ConfigError)
        }
    };
    emit_error("config", code, e.to_string(), exit_code)
}

fn output_batch_error(e: &BatchError) -> ExitCode {
    error!(event = event_names::BATCH_REJECTED, stage = %Stage::Load, error = %e, "batch rejected");
    let exit_code = match e {
        BatchError::Io { .. } => ExitCode::IoError,
        _ => ExitCode::InputError,
    };
    emit_error("input", None, e.to_string(), exit_code)
}

fn output_evaluator_error(e: &EvaluatorError) -> ExitCode {
    error!(event = event_names::INTERNAL_ERROR, stage = %Stage::Evaluate, error = %e, "evaluation failed");
    let exit_code = match e {
        EvaluatorError::Estimation(OpeError::ShapeMismatch { .. })
        | EvaluatorError::InconsistentShape { .. } => ExitCode::InputError,
        _ => ExitCode::InternalError,
    };
    emit_error("estimation", None, e.to_string(), exit_code)
}
