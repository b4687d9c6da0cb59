//! Run log entries and the observer that receives them.
//!
//! # Separation of Concerns
//!
//! - **Run log (this module)**: product output describing what the agent did.
//!   Delivered to a [`LogSink`] and shown to the user.
//! - **Tracing (`logging`)**: developer diagnostics controlled by `RUST_LOG`.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Category of a run log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogKind {
    Info,
    Action,
    Result,
    Error,
}

impl LogKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogKind::Info => "info",
            LogKind::Action => "action",
            LogKind::Result => "result",
            LogKind::Error => "error",
        }
    }
}

/// A single observational record emitted during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub message: String,
    #[serde(rename = "type")]
    pub kind: LogKind,
    pub timestamp: DateTime<Utc>,
}

impl LogEntry {
    /// Create an entry stamped with the current time.
    pub fn now(kind: LogKind, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind,
            timestamp: Utc::now(),
        }
    }
}

/// Observer invoked synchronously at each logging point of a run.
///
/// Returning an error aborts the run; implementations should stay cheap.
pub trait LogSink {
    fn log(&mut self, entry: &LogEntry) -> Result<()>;
}

impl<F> LogSink for F
where
    F: FnMut(&LogEntry) -> Result<()>,
{
    fn log(&mut self, entry: &LogEntry) -> Result<()> {
        self(entry)
    }
}

/// Sink that keeps every entry in memory.
#[derive(Debug, Clone, Default)]
pub struct CollectingSink {
    entries: Vec<LogEntry>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<LogEntry> {
        self.entries
    }
}

impl LogSink for CollectingSink {
    fn log(&mut self, entry: &LogEntry) -> Result<()> {
        self.entries.push(entry.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_serializes_kind_as_type() {
        let entry = LogEntry::now(LogKind::Action, "Executing task: t");
        let value = serde_json::to_value(&entry).expect("serialize");
        assert_eq!(value["type"], "action");
        assert_eq!(value["message"], "Executing task: t");
        assert!(value["timestamp"].is_string());
    }

    #[test]
    fn closures_act_as_sinks() {
        let mut seen = Vec::new();
        {
            let mut sink = |entry: &LogEntry| -> Result<()> {
                seen.push(entry.kind);
                Ok(())
            };
            sink.log(&LogEntry::now(LogKind::Info, "a")).expect("log");
            sink.log(&LogEntry::now(LogKind::Error, "b")).expect("log");
        }
        assert_eq!(seen, vec![LogKind::Info, LogKind::Error]);
    }

    #[test]
    fn collecting_sink_keeps_order() {
        let mut sink = CollectingSink::new();
        sink.log(&LogEntry::now(LogKind::Info, "one")).expect("log");
        sink.log(&LogEntry::now(LogKind::Result, "two")).expect("log");
        let messages: Vec<&str> = sink.entries().iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["one", "two"]);
    }
}
