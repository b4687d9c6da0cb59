//! Language-model call adapter.
//!
//! The [`LlmClient`] trait decouples the orchestration loop from the model
//! provider. Tests use scripted clients that replay predetermined responses
//! without touching the network.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::core::history::Message;
use crate::io::config::LlmConfig;

/// Provider failures. Never retried by the adapter.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("http error: {0}")]
    Http(String),
    #[error("response error: {0}")]
    Response(String),
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// One request/response exchange with the model provider.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Send the full ordered history and return the complete response text.
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError>;
}

#[async_trait]
impl LlmClient for Arc<dyn LlmClient> {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        (**self).complete(messages).await
    }
}

/// Client for OpenAI-compatible chat completion endpoints.
///
/// Requests `response_format: json_object` so the model answers with a single
/// JSON object. No request timeout is configured.
pub struct HttpLlmClient {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

impl HttpLlmClient {
    pub fn new(config: &LlmConfig, api_key: Option<String>) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| LlmError::Http(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            api_key,
        })
    }

    fn headers(&self) -> Result<HeaderMap, LlmError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = &self.api_key {
            let value = format!("Bearer {key}");
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&value).map_err(|e| LlmError::Http(e.to_string()))?,
            );
        }
        Ok(headers)
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Debug, Deserialize)]
struct ChatMessageResponse {
    content: Option<String>,
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    #[instrument(skip_all, fields(model = %self.model, messages = messages.len()))]
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        let body = ChatRequest {
            model: &self.model,
            messages,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        let response = self
            .client
            .post(&self.endpoint)
            .headers(self.headers()?)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Http(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            warn!(%status, "model provider returned an error");
            return Err(LlmError::Response(format!("HTTP {status}: {text}")));
        }

        let text = response
            .text()
            .await
            .map_err(|e| LlmError::Http(e.to_string()))?;
        let content = extract_content(&text)?;
        debug!(bytes = content.len(), "model response received");
        Ok(content)
    }
}

/// Pull the first choice's message content out of a chat completion body.
fn extract_content(body: &str) -> Result<String, LlmError> {
    let parsed: ChatResponse =
        serde_json::from_str(body).map_err(|e| LlmError::Serialization(e.to_string()))?;
    parsed
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| LlmError::Response("missing choices".to_string()))?
        .message
        .content
        .ok_or_else(|| LlmError::Response("missing message content".to_string()))
}
