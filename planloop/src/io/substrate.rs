//! Job-execution substrate abstraction.
//!
//! The [`JobSubstrate`] trait is the boundary between the agent loop and
//! whatever actually runs tasks. It owns routing and unknown-task semantics;
//! the loop forwards every dispatch unchecked. [`LocalSubstrate`] runs
//! handlers in-process on the current tokio runtime.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, instrument, warn};

/// Async task body: JSON payload in, JSON result out.
pub type TaskHandler =
    Arc<dyn Fn(Value) -> BoxFuture<'static, anyhow::Result<Value>> + Send + Sync>;

/// Wrap an async function as a [`TaskHandler`].
pub fn task_handler<F, Fut>(f: F) -> TaskHandler
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    Arc::new(move |payload| f(payload).boxed())
}

#[derive(Debug, Error)]
pub enum SubstrateError {
    #[error("unknown task '{0}'")]
    UnknownTask(String),
    #[error("task '{task}' failed: {message}")]
    Handler { task: String, message: String },
    #[error("failed to register task '{task}': {reason}")]
    Registration { task: String, reason: String },
}

/// External system that executes named tasks.
#[async_trait]
pub trait JobSubstrate: Send + Sync {
    /// Make `handler` available under `name`.
    ///
    /// Registering a name that is already known must succeed without effect.
    async fn register(&self, name: &str, handler: TaskHandler) -> Result<(), SubstrateError>;

    /// Run the task named `name` with `payload` and return its result.
    async fn dispatch(&self, name: &str, payload: Value) -> Result<Value, SubstrateError>;
}

#[async_trait]
impl JobSubstrate for Arc<dyn JobSubstrate> {
    async fn register(&self, name: &str, handler: TaskHandler) -> Result<(), SubstrateError> {
        (**self).register(name, handler).await
    }

    async fn dispatch(&self, name: &str, payload: Value) -> Result<Value, SubstrateError> {
        (**self).dispatch(name, payload).await
    }
}

/// In-process substrate backed by a handler map.
///
/// Safe to share between concurrent runs: registration keeps the first
/// handler seen for a name, so repeated catalog registration is a no-op.
#[derive(Default)]
pub struct LocalSubstrate {
    handlers: RwLock<HashMap<String, TaskHandler>>,
}

impl LocalSubstrate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names registered so far, sorted.
    pub async fn registered(&self) -> Vec<String> {
        let handlers = self.handlers.read().await;
        let mut names: Vec<String> = handlers.keys().cloned().collect();
        names.sort();
        names
    }
}

#[async_trait]
impl JobSubstrate for LocalSubstrate {
    async fn register(&self, name: &str, handler: TaskHandler) -> Result<(), SubstrateError> {
        if name.trim().is_empty() {
            return Err(SubstrateError::Registration {
                task: name.to_string(),
                reason: "task name must be non-empty".to_string(),
            });
        }
        let mut handlers = self.handlers.write().await;
        if handlers.contains_key(name) {
            debug!(task = name, "task already registered");
            return Ok(());
        }
        handlers.insert(name.to_string(), handler);
        debug!(task = name, "task registered");
        Ok(())
    }

    #[instrument(skip(self, payload))]
    async fn dispatch(&self, name: &str, payload: Value) -> Result<Value, SubstrateError> {
        let handler = {
            let handlers = self.handlers.read().await;
            handlers.get(name).cloned()
        };
        let Some(handler) = handler else {
            warn!("dispatch to unknown task");
            return Err(SubstrateError::UnknownTask(name.to_string()));
        };
        handler(payload)
            .await
            .map_err(|err| SubstrateError::Handler {
                task: name.to_string(),
                message: format!("{err:#}"),
            })
    }
}
