//! Test doubles for the model and substrate seams.
//!
//! Both doubles record what the agent loop sent them so tests can assert on
//! the exact history and dispatch sequence.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::Value;

use crate::core::history::Message;
use crate::io::llm::{LlmClient, LlmError};
use crate::io::substrate::{JobSubstrate, LocalSubstrate, SubstrateError, TaskHandler};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Model client that replays a fixed list of responses.
///
/// Each call records a snapshot of the history it was given. Once the script
/// runs out, calls fail with [`LlmError::Response`].
#[derive(Debug, Default)]
pub struct ScriptedLlm {
    responses: Mutex<VecDeque<Result<String, LlmError>>>,
    calls: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedLlm {
    pub fn new(responses: impl IntoIterator<Item = String>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().map(Ok).collect()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Queue a provider failure after the responses scripted so far.
    pub fn then_fail(self, error: LlmError) -> Self {
        lock(&self.responses).push_back(Err(error));
        self
    }

    /// History snapshots, one per model call, in call order.
    pub fn calls(&self) -> Vec<Vec<Message>> {
        lock(&self.calls).clone()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        lock(&self.calls).push(messages.to_vec());
        lock(&self.responses)
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::Response("script exhausted".to_string())))
    }
}

/// Substrate that delegates to [`LocalSubstrate`] and records traffic.
#[derive(Default)]
pub struct RecordingSubstrate {
    inner: LocalSubstrate,
    registrations: Mutex<Vec<String>>,
    dispatches: Mutex<Vec<(String, Value)>>,
    reject_registration: Option<String>,
}

impl RecordingSubstrate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail registration of `task` with [`SubstrateError::Registration`].
    pub fn rejecting(task: impl Into<String>) -> Self {
        Self {
            reject_registration: Some(task.into()),
            ..Self::default()
        }
    }

    /// Every registration call, including repeats.
    pub fn registrations(&self) -> Vec<String> {
        lock(&self.registrations).clone()
    }

    /// Every dispatch as `(task, payload)`, in order.
    pub fn dispatches(&self) -> Vec<(String, Value)> {
        lock(&self.dispatches).clone()
    }
}

#[async_trait]
impl JobSubstrate for RecordingSubstrate {
    async fn register(&self, name: &str, handler: TaskHandler) -> Result<(), SubstrateError> {
        lock(&self.registrations).push(name.to_string());
        if self.reject_registration.as_deref() == Some(name) {
            return Err(SubstrateError::Registration {
                task: name.to_string(),
                reason: "rejected by test".to_string(),
            });
        }
        self.inner.register(name, handler).await
    }

    async fn dispatch(&self, name: &str, payload: Value) -> Result<Value, SubstrateError> {
        lock(&self.dispatches).push((name.to_string(), payload.clone()));
        self.inner.dispatch(name, payload).await
    }
}
