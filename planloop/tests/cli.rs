//! CLI tests for the `planloop` binary.
//!
//! Spawns the binary and verifies output and exit codes for the catalog,
//! init, and run commands. No test reaches a real model provider.

use std::process::Command;

use planloop::exit_codes;
use planloop::io::config::{AgentConfig, CommandTaskConfig, LlmConfig, load_config, write_config};
use planloop::record::RunRecord;

fn planloop() -> Command {
    Command::new(env!("CARGO_BIN_EXE_planloop"))
}

#[test]
fn tasks_lists_builtins_then_config_tasks() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config_path = temp.path().join("planloop.toml");
    let config = AgentConfig {
        tasks: vec![CommandTaskConfig {
            name: "lookup".to_string(),
            description: "Look something up.".to_string(),
            command: vec!["cat".to_string()],
            timeout_secs: 5,
            output_limit_bytes: 1024,
        }],
        ..AgentConfig::default()
    };
    write_config(&config_path, &config).expect("write config");

    let output = planloop()
        .arg("tasks")
        .arg("--config")
        .arg(&config_path)
        .output()
        .expect("planloop tasks");

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let stdout = String::from_utf8_lossy(&output.stdout);
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(
        lines,
        vec![
            "fetch_data: Fetch data from a specified source.",
            "process_data: Process previously fetched data.",
            "lookup: Look something up.",
        ]
    );
}

#[test]
fn init_writes_default_config_once() {
    let temp = tempfile::tempdir().expect("tempdir");

    let status = planloop()
        .current_dir(temp.path())
        .arg("init")
        .status()
        .expect("planloop init");
    assert_eq!(status.code(), Some(exit_codes::OK));

    let config = load_config(&temp.path().join("planloop.toml")).expect("load");
    assert_eq!(config, AgentConfig::default());

    let status = planloop()
        .current_dir(temp.path())
        .arg("init")
        .status()
        .expect("planloop init again");
    assert_eq!(status.code(), Some(exit_codes::FAILED));
}

#[test]
fn run_rejects_invalid_context_json() {
    let temp = tempfile::tempdir().expect("tempdir");
    let output = planloop()
        .current_dir(temp.path())
        .args(["run", "fetch weather", "--context", "{oops"])
        .output()
        .expect("planloop run");

    assert_eq!(output.status.code(), Some(exit_codes::FAILED));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("parse --context as JSON"), "{stderr}");
}

#[test]
fn run_with_unreachable_model_records_error() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config_path = temp.path().join("planloop.toml");
    let config = AgentConfig {
        llm: LlmConfig {
            endpoint: "http://127.0.0.1:9/v1/chat/completions".to_string(),
            api_key_env: "PLANLOOP_TEST_UNSET_KEY".to_string(),
            ..LlmConfig::default()
        },
        ..AgentConfig::default()
    };
    write_config(&config_path, &config).expect("write config");

    let output = planloop()
        .args(["run", "fetch weather", "--json", "--config"])
        .arg(&config_path)
        .env_remove("PLANLOOP_TEST_UNSET_KEY")
        .output()
        .expect("planloop run");

    assert_eq!(output.status.code(), Some(exit_codes::FAILED));
    let record: RunRecord = serde_json::from_slice(&output.stdout).expect("run record json");
    assert_eq!(record.input, "fetch weather");
    assert_eq!(record.output, "");
    assert!(record.error.is_some());
    let messages: Vec<&str> = record.logs.iter().map(|e| e.message.as_str()).collect();
    assert_eq!(
        &messages[..4],
        &[
            "Agent run started",
            "Initializing agent...",
            "Available tasks: fetch_data, process_data",
            "Calling LLM...",
        ]
    );
    assert!(
        messages
            .last()
            .is_some_and(|m| m.starts_with("Error encountered: "))
    );
}
