//! Run records: the user-facing summary of one agent run.
//!
//! A record is all-or-nothing. A completed run carries its output and no
//! error; an aborted run carries the error and an empty output. Either way
//! the full log sequence is kept.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::agent::{Agent, AgentOutcome, RunError};
use crate::core::log::{LogEntry, LogKind, LogSink};
use crate::io::llm::LlmClient;
use crate::io::substrate::JobSubstrate;

/// Outcome of a single run, suitable for display or JSON output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: Uuid,
    /// The goal the run was started with.
    pub input: String,
    /// Final result; empty when the run aborted.
    pub output: String,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub logs: Vec<LogEntry>,
}

impl RunRecord {
    /// Open a record for `input` with no output, error, or logs yet.
    pub fn start(input: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            input: input.into(),
            output: String::new(),
            error: None,
            started_at: Utc::now(),
            finished_at: None,
            logs: Vec::new(),
        }
    }

    /// Mark the run finished with `output`, clearing any earlier error.
    pub fn complete(&mut self, output: impl Into<String>) {
        self.output = output.into();
        self.error = None;
        self.finished_at = Some(Utc::now());
    }

    /// Mark the run aborted with `error`, discarding any output.
    pub fn abort(&mut self, error: impl Into<String>) {
        self.output.clear();
        self.error = Some(error.into());
        self.finished_at = Some(Utc::now());
    }

    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Sink that keeps entries for the record and forwards them to an observer.
struct RecordingSink<'a, K: ?Sized> {
    logs: &'a mut Vec<LogEntry>,
    observer: &'a mut K,
}

impl<K: LogSink + ?Sized> LogSink for RecordingSink<'_, K> {
    fn log(&mut self, entry: &LogEntry) -> Result<()> {
        self.logs.push(entry.clone());
        self.observer.log(entry)
    }
}

/// Run `agent` and capture the outcome as a [`RunRecord`].
///
/// Adds a leading "Agent run started" entry and, on failure, a trailing
/// "Error encountered: ..." entry. Every entry is passed to `observer` as it
/// is produced; an observer failure aborts the run like any other error.
pub async fn run_recorded<L, S, K>(
    agent: &Agent<L, S>,
    goal: &str,
    context: &Value,
    observer: &mut K,
) -> RunRecord
where
    L: LlmClient,
    S: JobSubstrate,
    K: LogSink + ?Sized,
{
    let mut record = RunRecord::start(goal);
    let mut logs = Vec::new();

    let outcome = {
        let mut sink = RecordingSink {
            logs: &mut logs,
            observer: &mut *observer,
        };
        match sink.log(&LogEntry::now(LogKind::Info, "Agent run started")) {
            Ok(()) => agent.run(goal, context, &mut sink).await,
            Err(err) => Err(RunError::Sink(err)),
        }
    };

    match outcome {
        Ok(AgentOutcome { result, .. }) => {
            info!(run_id = %record.id, "run completed");
            record.complete(result);
        }
        Err(err) => {
            let message = err.to_string();
            warn!(run_id = %record.id, error = %message, "run aborted");
            let entry = LogEntry::now(LogKind::Error, format!("Error encountered: {message}"));
            // The observer already failed once if the sink is what broke.
            if !matches!(err, RunError::Sink(_))
                && let Err(sink_err) = observer.log(&entry)
            {
                warn!(
                    run_id = %record.id,
                    error = %format!("{sink_err:#}"),
                    "observer rejected abort entry"
                );
            }
            logs.push(entry);
            record.abort(message);
        }
    }
    record.logs = logs;
    record
}
