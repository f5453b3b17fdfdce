//! End-to-end tests for the `ope-core` binary.
//!
//! Each test runs against an isolated config environment so a user config on
//! the host cannot leak in.

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Get a Command for the ope-core binary with config discovery isolated.
fn ope_core(home: &Path) -> Command {
    let mut cmd = Command::cargo_bin("ope-core").expect("ope-core binary should exist");
    cmd.env("HOME", home)
        .env("XDG_CONFIG_HOME", home.join(".config"))
        .env_remove("OPE_EVALUATOR_CONFIG")
        .env_remove("OPE_CONFIG_DIR")
        .env_remove("OPE_LOG")
        .env_remove("OPE_LOG_FORMAT")
        .env_remove("RUST_LOG");
    cmd
}

/// Two on-policy episodes of length three with exact Q-values.
const ON_POLICY_BATCH: &str = r#"{
    "actions": [0, 1, 0, 1, 1, 0],
    "rewards": [1.0, 2.0, 3.0, 0.0, 1.0, 0.0],
    "terminals": [false, false, true, false, false, true],
    "target_propensities": [[1, 0], [0, 1], [1, 0], [0, 1], [0, 1], [1, 0]],
    "q_values": [[5.23, -5], [-5, 4.7], [3, -5], [-5, 0.9], [-5, 1], [0, -5]]
}"#;

fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).expect("write fixture");
    path
}

fn stdout_json(output: &std::process::Output) -> Value {
    serde_json::from_slice(&output.stdout).expect("stdout should be JSON")
}

// ============================================================================
// evaluate
// ============================================================================

mod evaluate {
    use super::*;

    #[test]
    fn on_policy_batch_scores_one() {
        let dir = TempDir::new().unwrap();
        let input = write_file(dir.path(), "batch.json", ON_POLICY_BATCH);

        let output = ope_core(dir.path())
            .args(["evaluate", "--input"])
            .arg(&input)
            .args(["--gamma", "0.9", "--num-j-steps", "3"])
            .output()
            .unwrap();
        assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

        let json = stdout_json(&output);
        assert_eq!(json["num_decisions"], 6);
        assert_eq!(json["num_episodes"], 2);
        assert_eq!(json["num_j_steps"], 3);
        assert_eq!(json["config_source"], "builtin default");
        assert!(json["run_id"].as_str().unwrap().starts_with("run-"));

        let summary = &json["summary"];
        for key in [
            "sequential_doubly_robust",
            "weighted_doubly_robust",
            "magic_doubly_robust",
        ] {
            let v = summary[key].as_f64().unwrap();
            assert!((v - 1.0).abs() < 1e-6, "{key} = {v}");
        }
        let value = &summary["value"];
        assert!((value["doubly_robust"].as_f64().unwrap() - 1.0).abs() < 1e-6);

        let magic = &json["magic"];
        assert_eq!(magic["j_steps"].as_array().unwrap().len(), 3);
        assert_eq!(magic["j_steps"][0], "full");
        assert_eq!(magic["j_steps"][1], "direct_method");
    }

    #[test]
    fn softmax_temperature_fills_target_propensities() {
        let dir = TempDir::new().unwrap();
        let input = write_file(
            dir.path(),
            "batch.json",
            r#"{
                "actions": [0, 1],
                "rewards": [1.0, 1.0],
                "terminals": [false, true],
                "logged_propensities": [0.5, 0.5],
                "q_values": [[1.0, 0.0], [0.0, 1.0]]
            }"#,
        );

        ope_core(dir.path())
            .args(["evaluate", "--input"])
            .arg(&input)
            .assert()
            .code(12)
            .stderr(predicate::str::contains("target_propensities"));

        ope_core(dir.path())
            .args(["evaluate", "--softmax-temperature", "1.0", "--input"])
            .arg(&input)
            .assert()
            .success()
            .stdout(predicate::str::contains("\"summary\""));
    }

    #[test]
    fn ragged_q_values_are_input_errors() {
        let dir = TempDir::new().unwrap();
        let input = write_file(
            dir.path(),
            "batch.json",
            r#"{
                "actions": [0, 1],
                "rewards": [1.0, 1.0],
                "terminals": [false, true],
                "target_propensities": [[0.5, 0.5], [0.5, 0.5]],
                "q_values": [[1.0, 0.0], [0.0]]
            }"#,
        );

        let output = ope_core(dir.path())
            .args(["evaluate", "--input"])
            .arg(&input)
            .output()
            .unwrap();
        assert_eq!(output.status.code(), Some(12));
        assert!(output.stdout.is_empty());
        let stderr = String::from_utf8_lossy(&output.stderr);
        assert!(stderr.contains("\"kind\": \"input\""));
        assert!(stderr.contains("q_values"));
    }

    #[test]
    fn malformed_json_is_an_input_error() {
        let dir = TempDir::new().unwrap();
        let input = write_file(dir.path(), "batch.json", "{ not json");
        ope_core(dir.path())
            .args(["evaluate", "--input"])
            .arg(&input)
            .assert()
            .code(12)
            .stderr(predicate::str::contains("invalid batch JSON"));
    }

    #[test]
    fn missing_input_is_an_io_error() {
        let dir = TempDir::new().unwrap();
        ope_core(dir.path())
            .args(["evaluate", "--input"])
            .arg(dir.path().join("absent.json"))
            .assert()
            .code(21);
    }

    #[test]
    fn gamma_override_is_validated() {
        let dir = TempDir::new().unwrap();
        let input = write_file(dir.path(), "batch.json", ON_POLICY_BATCH);
        ope_core(dir.path())
            .args(["evaluate", "--gamma", "1.5", "--input"])
            .arg(&input)
            .assert()
            .code(11)
            .stderr(predicate::str::contains("gamma"));
    }
}

// ============================================================================
// config
// ============================================================================

mod config {
    use super::*;

    #[test]
    fn show_prints_builtin_defaults() {
        let dir = TempDir::new().unwrap();
        let output = ope_core(dir.path())
            .args(["config", "show"])
            .output()
            .unwrap();
        assert!(output.status.success());

        let json = stdout_json(&output);
        assert_eq!(json["status"], "ok");
        assert_eq!(json["source"], "builtin default");
        assert!(json["path"].is_null());
        assert_eq!(json["config"]["evaluator_batch_size"], 1024);
        assert_eq!(json["config"]["num_j_steps"], 10);
    }

    #[test]
    fn show_reads_explicit_file() {
        let dir = TempDir::new().unwrap();
        let path = write_file(
            dir.path(),
            "evaluator.json",
            r#"{ "gamma": 0.5, "action_names": ["up", "down"] }"#,
        );
        let output = ope_core(dir.path())
            .args(["config", "show", "--config"])
            .arg(&path)
            .output()
            .unwrap();
        assert!(output.status.success());

        let json = stdout_json(&output);
        assert_eq!(json["source"], "CLI argument");
        assert_eq!(json["config"]["gamma"], 0.5);
        assert_eq!(json["config"]["action_names"][1], "down");
    }

    #[test]
    fn validate_rejects_bad_values() {
        let dir = TempDir::new().unwrap();
        let path = write_file(dir.path(), "evaluator.json", r#"{ "num_j_steps": 0 }"#);
        ope_core(dir.path())
            .args(["config", "validate", "--config"])
            .arg(&path)
            .assert()
            .code(11)
            .stderr(predicate::str::contains("num_j_steps"))
            .stderr(predicate::str::contains("\"code\": 65"));
    }

    #[test]
    fn validate_accepts_defaults() {
        let dir = TempDir::new().unwrap();
        ope_core(dir.path())
            .args(["config", "validate"])
            .assert()
            .success()
            .stdout(predicate::str::contains("\"valid\""));
    }

    #[test]
    fn missing_config_file_is_a_config_error() {
        let dir = TempDir::new().unwrap();
        ope_core(dir.path())
            .args(["config", "show", "--config"])
            .arg(dir.path().join("nope.json"))
            .assert()
            .code(11);
    }
}

// ============================================================================
// Argument errors
// ============================================================================

mod arguments {
    use super::*;

    #[test]
    fn unknown_command_fails() {
        let dir = TempDir::new().unwrap();
        ope_core(dir.path())
            .arg("nonexistent-command")
            .assert()
            .failure()
            .stderr(predicate::str::contains("error"));
    }

    #[test]
    fn non_positive_temperature_is_rejected() {
        let dir = TempDir::new().unwrap();
        let input = write_file(dir.path(), "batch.json", ON_POLICY_BATCH);
        ope_core(dir.path())
            .args(["evaluate", "--softmax-temperature", "0", "--input"])
            .arg(&input)
            .assert()
            .code(10)
            .stderr(predicate::str::contains("softmax-temperature"));
    }

    #[test]
    fn evaluate_requires_input() {
        let dir = TempDir::new().unwrap();
        ope_core(dir.path())
            .arg("evaluate")
            .assert()
            .failure()
            .stderr(predicate::str::contains("--input"));
    }
}
