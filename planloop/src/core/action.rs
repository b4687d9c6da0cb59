//! Action protocol parser.
//!
//! Every model turn must be exactly one JSON object in one of two shapes:
//!
//! ```text
//! {"action":"run_task","params":{"task":"<name>","payload":{...}}}
//! {"action":"finish","params":{"result":"<string>"}}
//! ```
//!
//! Only the envelope is checked. Payloads are forwarded untouched and are never
//! validated against a per-task schema.

use serde_json::{Map, Value};
use thiserror::Error;

/// The single next step requested by the model.
///
/// Variants are `non_exhaustive` so that only [`parse_action`] can build them
/// outside this crate.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentAction {
    /// Dispatch `payload` to the task named `task`.
    #[non_exhaustive]
    RunTask { task: String, payload: Value },
    /// Stop the run and return `result`.
    #[non_exhaustive]
    Finish { result: String },
}

impl AgentAction {
    /// Wire name of the action (`run_task` / `finish`).
    pub fn name(&self) -> &'static str {
        match self {
            AgentAction::RunTask { .. } => RUN_TASK,
            AgentAction::Finish { .. } => FINISH,
        }
    }
}

/// Model output that does not satisfy the action protocol.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed action: {reason}")]
pub struct MalformedAction {
    /// The offending model output, verbatim.
    pub raw: String,
    pub reason: String,
}

const RUN_TASK: &str = "run_task";
const FINISH: &str = "finish";

/// Parse raw model text into an [`AgentAction`].
///
/// Absent `payload` becomes an empty object; any present payload (including an
/// empty object) is passed through as-is.
pub fn parse_action(raw: &str) -> Result<AgentAction, MalformedAction> {
    let malformed = |reason: String| MalformedAction {
        raw: raw.to_string(),
        reason,
    };

    let value: Value =
        serde_json::from_str(raw).map_err(|err| malformed(format!("invalid JSON: {err}")))?;
    let Value::Object(mut envelope) = value else {
        return Err(malformed("expected a JSON object".to_string()));
    };

    let action = match envelope.remove("action") {
        None | Some(Value::Null) => return Err(malformed("missing `action`".to_string())),
        Some(Value::String(action)) => action,
        Some(other) => {
            return Err(malformed(format!("`action` must be a string, got {other}")));
        }
    };
    let params = match envelope.remove("params") {
        None | Some(Value::Null) => return Err(malformed("missing `params`".to_string())),
        Some(Value::Object(params)) => params,
        Some(other) => {
            return Err(malformed(format!("`params` must be an object, got {other}")));
        }
    };

    match action.as_str() {
        RUN_TASK => parse_run_task(params).map_err(malformed),
        FINISH => parse_finish(params).map_err(malformed),
        other => Err(malformed(format!(
            "unrecognized action '{other}' (expected '{RUN_TASK}' or '{FINISH}')"
        ))),
    }
}

fn parse_run_task(mut params: Map<String, Value>) -> Result<AgentAction, String> {
    let task = match params.remove("task") {
        Some(Value::String(task)) => task,
        Some(other) => return Err(format!("`params.task` must be a string, got {other}")),
        None => return Err("run_task requires `params.task`".to_string()),
    };
    let payload = params
        .remove("payload")
        .unwrap_or_else(|| Value::Object(Map::new()));
    Ok(AgentAction::RunTask { task, payload })
}

fn parse_finish(mut params: Map<String, Value>) -> Result<AgentAction, String> {
    match params.remove("result") {
        Some(Value::String(result)) => Ok(AgentAction::Finish { result }),
        Some(other) => Err(format!("`params.result` must be a string, got {other}")),
        None => Err("finish requires `params.result`".to_string()),
    }
}
