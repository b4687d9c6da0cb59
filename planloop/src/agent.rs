//! Orchestration loop for a single agent run.
//!
//! One run turns a goal into a sequence of task dispatches:
//!
//! 1. Register the task catalog and seed the history with the system and goal
//!    messages.
//! 2. Ask the model for exactly one action.
//! 3. Malformed output is echoed back with a corrective system message and
//!    the model is asked again.
//! 4. `run_task` is forwarded to the substrate unchecked; the assistant text
//!    and a result message are appended.
//! 5. `finish` ends the run with its result.
//!
//! The loop is either awaiting an action or done once a finish action is
//! accepted. Model calls and dispatches never overlap, so identical model
//! responses and task outcomes always yield the same history and log sequence.

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::core::action::{AgentAction, parse_action};
use crate::core::history::{History, Message};
use crate::core::log::{LogEntry, LogKind, LogSink};
use crate::io::llm::{LlmClient, LlmError};
use crate::io::substrate::{JobSubstrate, SubstrateError};
use crate::prompt::PromptEngine;
use crate::tasks::TaskCatalog;

/// System message appended after every malformed model response.
pub const CORRECTIVE_MESSAGE: &str = "Your previous response was invalid JSON. Fix it.";

/// Tunables for the orchestration loop.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgentOptions {
    /// Abort once the run has seen more than this many malformed responses.
    /// `None` retries forever.
    pub max_malformed_responses: Option<u32>,
}

/// Reasons a run ends without a result.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("task registration failed: {0}")]
    Registration(#[source] SubstrateError),
    #[error("model call failed: {0}")]
    Llm(#[from] LlmError),
    #[error("dispatch failed: {source}")]
    Dispatch {
        task: String,
        source: SubstrateError,
    },
    #[error("model produced {count} malformed responses (limit {limit})")]
    RetryLimitExceeded { count: u32, limit: u32 },
    #[error("prompt rendering failed: {0:#}")]
    Prompt(anyhow::Error),
    #[error("log sink failed: {0:#}")]
    Sink(anyhow::Error),
}

/// Everything a finished run produced.
#[derive(Debug, Clone)]
pub struct AgentOutcome {
    /// The `result` carried by the finish action.
    pub result: String,
    /// Full conversation at the time of the finish action.
    pub history: History,
    pub model_calls: u32,
    pub dispatches: u32,
    pub malformed_responses: u32,
}

/// Drives the model/task loop against a fixed task catalog.
pub struct Agent<L, S> {
    llm: L,
    substrate: S,
    catalog: TaskCatalog,
    options: AgentOptions,
}

impl<L: LlmClient, S: JobSubstrate> Agent<L, S> {
    pub fn new(llm: L, substrate: S, catalog: TaskCatalog) -> Self {
        Self {
            llm,
            substrate,
            catalog,
            options: AgentOptions::default(),
        }
    }

    pub fn with_options(mut self, options: AgentOptions) -> Self {
        self.options = options;
        self
    }

    pub fn llm(&self) -> &L {
        &self.llm
    }

    pub fn substrate(&self) -> &S {
        &self.substrate
    }

    /// Run the agent until the model finishes or a failure propagates.
    ///
    /// `context` is embedded verbatim (as JSON) in the opening user message.
    /// Suspends without timeout on every model call and dispatch.
    #[instrument(skip_all, fields(goal = %goal))]
    pub async fn run<K>(
        &self,
        goal: &str,
        context: &Value,
        sink: &mut K,
    ) -> Result<AgentOutcome, RunError>
    where
        K: LogSink + ?Sized,
    {
        let mut log = RunLog { sink };
        log.emit(LogKind::Info, "Initializing agent...")?;

        let tasks = self
            .catalog
            .register(&self.substrate)
            .await
            .map_err(RunError::Registration)?;
        let names: Vec<&str> = tasks.iter().map(|t| t.name.as_str()).collect();
        log.emit(LogKind::Info, format!("Available tasks: {}", names.join(", ")))?;

        let prompts = PromptEngine::new().map_err(RunError::Prompt)?;
        let mut history = History::new();
        history.append(Message::system(
            prompts.render_system(&tasks).map_err(RunError::Prompt)?,
        ));
        history.append(Message::user(
            prompts.render_goal(goal, context).map_err(RunError::Prompt)?,
        ));

        let mut model_calls = 0u32;
        let mut dispatches = 0u32;
        let mut malformed = 0u32;

        let result = loop {
            log.emit(LogKind::Info, "Calling LLM...")?;
            model_calls += 1;
            let raw = self.llm.complete(history.snapshot()).await?;
            debug!(call = model_calls, bytes = raw.len(), "model responded");

            let action = match parse_action(&raw) {
                Ok(action) => action,
                Err(err) => {
                    malformed += 1;
                    warn!(reason = %err.reason, malformed, "malformed model response");
                    history.append(Message::assistant(raw));
                    history.append(Message::system(CORRECTIVE_MESSAGE));
                    log.emit(LogKind::Error, format!("Invalid JSON response: {}", err.reason))?;
                    if let Some(limit) = self.options.max_malformed_responses
                        && malformed > limit
                    {
                        return Err(RunError::RetryLimitExceeded {
                            count: malformed,
                            limit,
                        });
                    }
                    continue;
                }
            };

            match action {
                AgentAction::RunTask { task, payload } => {
                    log.emit(LogKind::Action, format!("Executing task: {task}"))?;
                    log.emit(LogKind::Info, format!("Payload: {payload}"))?;

                    dispatches += 1;
                    let result = self
                        .substrate
                        .dispatch(&task, payload)
                        .await
                        .map_err(|source| RunError::Dispatch {
                            task: task.clone(),
                            source,
                        })?;
                    log.emit(LogKind::Result, format!("Task result: {result}"))?;

                    history.append(Message::assistant(raw));
                    history.append(Message::user(task_feedback(&task, &result)));
                }
                AgentAction::Finish { result } => {
                    log.emit(LogKind::Info, "Agent finished")?;
                    log.emit(LogKind::Result, format!("Final result: {result}"))?;
                    break result;
                }
            }
        };

        info!(model_calls, dispatches, malformed, "agent run finished");
        Ok(AgentOutcome {
            result,
            history,
            model_calls,
            dispatches,
            malformed_responses: malformed,
        })
    }
}

/// User-role message reporting a task result back to the model.
fn task_feedback(task: &str, result: &Value) -> String {
    let task_json = Value::from(task);
    format!("Task {task_json} completed. Result: {{\"task\":{task_json},\"result\":{result}}}")
}

/// Forwards run log entries to the caller's sink and to tracing.
struct RunLog<'a, K: ?Sized> {
    sink: &'a mut K,
}

impl<K: LogSink + ?Sized> RunLog<'_, K> {
    fn emit(&mut self, kind: LogKind, message: impl Into<String>) -> Result<(), RunError> {
        let entry = LogEntry::now(kind, message);
        debug!(kind = kind.as_str(), message = %entry.message, "run log");
        self.sink.log(&entry).map_err(RunError::Sink)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::log::CollectingSink;
    use crate::io::substrate::LocalSubstrate;
    use crate::tasks::builtin_tasks;
    use crate::test_support::ScriptedLlm;
    use serde_json::json;

    fn agent(responses: &[&str]) -> Agent<ScriptedLlm, LocalSubstrate> {
        Agent::new(
            ScriptedLlm::new(responses.iter().map(|r| r.to_string())),
            LocalSubstrate::new(),
            TaskCatalog::new(builtin_tasks()).expect("catalog"),
        )
    }

    #[test]
    fn feedback_embeds_task_and_result_in_order() {
        let feedback = task_feedback("fetch_data", &json!({"a": 1}));
        assert_eq!(
            feedback,
            r#"Task "fetch_data" completed. Result: {"task":"fetch_data","result":{"a":1}}"#
        );
    }

    #[tokio::test]
    async fn finish_returns_result_without_further_calls() {
        let agent = agent(&[r#"{"action":"finish","params":{"result":"R"}}"#]);
        let mut sink = CollectingSink::new();
        let outcome = agent.run("g", &json!({}), &mut sink).await.expect("run");

        assert_eq!(outcome.result, "R");
        assert_eq!(outcome.model_calls, 1);
        assert_eq!(outcome.history.len(), 2, "finish appends nothing");
        assert_eq!(agent.llm.calls().len(), 1);
    }

    #[tokio::test]
    async fn malformed_response_appends_two_messages_and_retries() {
        let agent = agent(&["not json", r#"{"action":"finish","params":{"result":"ok"}}"#]);
        let mut sink = CollectingSink::new();
        let outcome = agent.run("g", &json!({}), &mut sink).await.expect("run");

        let calls = agent.llm.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].len(), 2);
        assert_eq!(calls[1].len(), 4);
        assert_eq!(calls[1][2], Message::assistant("not json"));
        assert_eq!(calls[1][3], Message::system(CORRECTIVE_MESSAGE));
        assert_eq!(outcome.malformed_responses, 1);
        assert_eq!(
            sink.entries()
                .iter()
                .filter(|e| e.kind == LogKind::Error)
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn retry_cap_aborts_run() {
        let agent = agent(&["nope", "still nope", "never reached"]).with_options(AgentOptions {
            max_malformed_responses: Some(1),
        });
        let mut sink = CollectingSink::new();
        let err = agent.run("g", &json!({}), &mut sink).await.unwrap_err();

        assert!(matches!(err, RunError::RetryLimitExceeded { count: 2, limit: 1 }));
        assert_eq!(agent.llm.calls().len(), 2);
    }

    #[tokio::test]
    async fn unknown_task_aborts_run() {
        let agent = agent(&[r#"{"action":"run_task","params":{"task":"missing","payload":{}}}"#]);
        let mut sink = CollectingSink::new();
        let err = agent.run("g", &json!({}), &mut sink).await.unwrap_err();

        assert!(matches!(
            err,
            RunError::Dispatch { ref task, source: SubstrateError::UnknownTask(_) } if task == "missing"
        ));
    }

    #[tokio::test]
    async fn failing_sink_aborts_run() {
        let agent = agent(&[r#"{"action":"finish","params":{"result":"R"}}"#]);
        let mut sink = |_: &LogEntry| -> anyhow::Result<()> { Err(anyhow::anyhow!("sink down")) };
        let err = agent.run("g", &json!({}), &mut sink).await.unwrap_err();

        assert!(matches!(err, RunError::Sink(_)));
        assert!(agent.llm.calls().is_empty(), "no model call after sink failure");
    }
}
