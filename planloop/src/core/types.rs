//! Shared deterministic types for the agent core.
//!
//! These types define stable contracts between core components. They should not
//! depend on external state or I/O.

use serde::{Deserialize, Serialize};

/// Prompt-facing view of a registered task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDescription {
    pub name: String,
    pub description: String,
}

impl TaskDescription {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }
}
