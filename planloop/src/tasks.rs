//! Task registry: the fixed catalog of tasks offered to the model.
//!
//! Building a catalog is pure; registering it with a [`JobSubstrate`] is a
//! separate, explicit step. This keeps prompt construction testable without a
//! live substrate.

use std::process::Command;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::core::types::TaskDescription;
use crate::io::config::{AgentConfig, CommandTaskConfig};
use crate::io::process::run_command_with_timeout;
use crate::io::substrate::{JobSubstrate, SubstrateError, TaskHandler, task_handler};

/// A named unit of work: what the model sees plus the code that runs it.
#[derive(Clone)]
pub struct TaskDescriptor {
    name: String,
    description: String,
    handler: TaskHandler,
}

impl TaskDescriptor {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        handler: TaskHandler,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            handler,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn describe(&self) -> TaskDescription {
        TaskDescription::new(&self.name, &self.description)
    }
}

impl std::fmt::Debug for TaskDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskDescriptor")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("duplicate task name '{0}'")]
    DuplicateTask(String),
}

/// Ordered, immutable set of task descriptors with unique names.
#[derive(Debug, Clone)]
pub struct TaskCatalog {
    tasks: Vec<TaskDescriptor>,
}

impl TaskCatalog {
    pub fn new(tasks: Vec<TaskDescriptor>) -> Result<Self, CatalogError> {
        for (idx, task) in tasks.iter().enumerate() {
            if tasks[..idx].iter().any(|prev| prev.name == task.name) {
                return Err(CatalogError::DuplicateTask(task.name.clone()));
            }
        }
        Ok(Self { tasks })
    }

    /// Built-in tasks followed by the command tasks declared in `config`.
    pub fn from_config(config: &AgentConfig) -> Result<Self, CatalogError> {
        let mut tasks = builtin_tasks();
        tasks.extend(config.tasks.iter().cloned().map(command_task));
        Self::new(tasks)
    }

    /// Prompt-facing `{name, description}` pairs, in catalog order.
    pub fn descriptions(&self) -> Vec<TaskDescription> {
        self.tasks.iter().map(TaskDescriptor::describe).collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tasks.iter().map(TaskDescriptor::name).collect()
    }

    /// Register every handler with `substrate`.
    ///
    /// Stops at the first failure; a partially registered catalog is never
    /// handed back.
    #[instrument(skip_all, fields(tasks = self.tasks.len()))]
    pub async fn register<S>(&self, substrate: &S) -> Result<Vec<TaskDescription>, SubstrateError>
    where
        S: JobSubstrate + ?Sized,
    {
        for task in &self.tasks {
            substrate
                .register(&task.name, Arc::clone(&task.handler))
                .await?;
        }
        info!(tasks = ?self.names(), "task catalog registered");
        Ok(self.descriptions())
    }
}

/// Tasks available in every run.
pub fn builtin_tasks() -> Vec<TaskDescriptor> {
    vec![
        TaskDescriptor::new(
            "fetch_data",
            "Fetch data from a specified source.",
            task_handler(|payload| async move {
                debug!(%payload, "fetch_data");
                Ok(payload)
            }),
        ),
        TaskDescriptor::new(
            "process_data",
            "Process previously fetched data.",
            task_handler(|payload| async move {
                debug!(%payload, "process_data");
                Ok(payload)
            }),
        ),
    ]
}

/// Task whose handler pipes the payload through an external command.
///
/// The payload is written to stdin as JSON. Stdout is parsed as JSON, or
/// returned as a JSON string when it is not valid JSON.
pub fn command_task(config: CommandTaskConfig) -> TaskDescriptor {
    let name = config.name.clone();
    let description = config.description.clone();
    let config = Arc::new(config);
    let handler = task_handler(move |payload| {
        let config = Arc::clone(&config);
        async move {
            tokio::task::spawn_blocking(move || run_command_task(&config, &payload))
                .await
                .context("join command task")
                .and_then(|result| result)
        }
    });
    TaskDescriptor::new(name, description, handler)
}

fn run_command_task(config: &CommandTaskConfig, payload: &Value) -> Result<Value> {
    let (program, args) = config
        .command
        .split_first()
        .context("command task has an empty command")?;
    let input = serde_json::to_vec(payload).context("serialize payload")?;

    let mut cmd = Command::new(program);
    cmd.args(args);
    let output = run_command_with_timeout(
        cmd,
        Some(&input),
        Duration::from_secs(config.timeout_secs),
        config.output_limit_bytes,
    )
    .with_context(|| format!("run {program}"))?;

    if output.timed_out {
        bail!("{program} timed out after {}s", config.timeout_secs);
    }
    if !output.status.success() {
        bail!(
            "{program} exited with status {:?}: {}",
            output.status.code(),
            output.stderr_lossy()
        );
    }
    Ok(parse_command_stdout(&output.stdout))
}

fn parse_command_stdout(stdout: &[u8]) -> Value {
    let text = String::from_utf8_lossy(stdout);
    let trimmed = text.trim();
    serde_json::from_str(trimmed).unwrap_or_else(|_| Value::String(trimmed.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::substrate::LocalSubstrate;
    use serde_json::json;

    #[test]
    fn builtin_catalog_lists_fetch_and_process() {
        let catalog = TaskCatalog::from_config(&AgentConfig::default()).expect("catalog");
        assert_eq!(catalog.names(), vec!["fetch_data", "process_data"]);
        assert_eq!(
            catalog.descriptions()[0],
            TaskDescription::new("fetch_data", "Fetch data from a specified source.")
        );
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut tasks = builtin_tasks();
        tasks.extend(builtin_tasks());
        let err = TaskCatalog::new(tasks).unwrap_err();
        assert_eq!(err, CatalogError::DuplicateTask("fetch_data".to_string()));
    }

    #[test]
    fn config_tasks_follow_builtins() {
        let config = AgentConfig {
            tasks: vec![CommandTaskConfig {
                name: "lookup".to_string(),
                description: "Look it up.".to_string(),
                command: vec!["cat".to_string()],
                timeout_secs: 5,
                output_limit_bytes: 1024,
            }],
            ..AgentConfig::default()
        };
        let catalog = TaskCatalog::from_config(&config).expect("catalog");
        assert_eq!(catalog.names(), vec!["fetch_data", "process_data", "lookup"]);
    }

    #[tokio::test]
    async fn register_makes_builtins_dispatchable() {
        let catalog = TaskCatalog::new(builtin_tasks()).expect("catalog");
        let substrate = LocalSubstrate::new();
        let described = catalog.register(&substrate).await.expect("register");
        assert_eq!(described.len(), 2);

        // Registering again within the same run is harmless.
        catalog.register(&substrate).await.expect("register twice");

        let result = substrate
            .dispatch("fetch_data", json!({"source": "search", "searchTerm": "weather"}))
            .await
            .expect("dispatch");
        assert_eq!(result, json!({"source": "search", "searchTerm": "weather"}));
    }

    #[test]
    fn command_stdout_parses_json_or_falls_back_to_string() {
        assert_eq!(parse_command_stdout(b" {\"ok\":true}\n"), json!({"ok": true}));
        assert_eq!(parse_command_stdout(b"plain text\n"), json!("plain text"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn command_task_pipes_payload_through_command() {
        let task = command_task(CommandTaskConfig {
            name: "cat".to_string(),
            description: "Echo stdin.".to_string(),
            command: vec!["cat".to_string()],
            timeout_secs: 5,
            output_limit_bytes: 1024,
        });
        let substrate = LocalSubstrate::new();
        TaskCatalog::new(vec![task])
            .expect("catalog")
            .register(&substrate)
            .await
            .expect("register");

        let result = substrate
            .dispatch("cat", json!({"a": [1, 2]}))
            .await
            .expect("dispatch");
        assert_eq!(result, json!({"a": [1, 2]}));
    }

    /// Verifies `timeout_secs` holds for a command that never reads a payload
    /// larger than the pipe buffer.
    #[cfg(unix)]
    #[tokio::test]
    async fn command_timeout_holds_with_unread_large_payload() {
        let task = command_task(CommandTaskConfig {
            name: "stall".to_string(),
            description: "Never reads stdin.".to_string(),
            command: vec!["sleep".to_string(), "30".to_string()],
            timeout_secs: 1,
            output_limit_bytes: 1024,
        });
        let substrate = LocalSubstrate::new();
        TaskCatalog::new(vec![task])
            .expect("catalog")
            .register(&substrate)
            .await
            .expect("register");

        let payload = json!({ "blob": "x".repeat(1024 * 1024) });
        let started = std::time::Instant::now();
        let err = substrate.dispatch("stall", payload).await.unwrap_err();

        assert!(started.elapsed() < std::time::Duration::from_secs(10));
        assert!(err.to_string().contains("timed out after 1s"), "{err}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_command_surfaces_as_handler_error() {
        let task = command_task(CommandTaskConfig {
            name: "fail".to_string(),
            description: "Always fails.".to_string(),
            command: vec!["sh".to_string(), "-c".to_string(), "echo nope >&2; exit 3".to_string()],
            timeout_secs: 5,
            output_limit_bytes: 1024,
        });
        let substrate = LocalSubstrate::new();
        TaskCatalog::new(vec![task])
            .expect("catalog")
            .register(&substrate)
            .await
            .expect("register");

        let err = substrate.dispatch("fail", json!({})).await.unwrap_err();
        let message = err.to_string();
        assert!(message.contains("exited with status Some(3)"), "{message}");
        assert!(message.contains("nope"), "{message}");
    }
}
