//! Anthropic-shaped chat-completion client (`/v1/messages`, SSE).

use std::sync::Arc;

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures_util::StreamExt;
use promisegraph::{PieceStream, SharedError};

use crate::agent::Agent;
use crate::message::{Message, MessageToken};

use super::{ChatCompletionClient, LlmAgent};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// A `ChatCompletionClient` backed by a real HTTP call to Anthropic's
/// Messages API.
pub struct AnthropicClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    max_tokens: u32,
}

impl AnthropicClient {
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

#[async_trait]
impl ChatCompletionClient for AnthropicClient {
    async fn stream_tokens(
        &self,
        model: &str,
        history: &[Message],
    ) -> Result<PieceStream<MessageToken>, SharedError> {
        // The Messages API takes `system` out of band; fold any leading
        // system-role messages into the top-level field and send the rest.
        let mut system = None;
        let mut messages = Vec::new();
        for message in history {
            if message.role == "system" && system.is_none() && messages.is_empty() {
                system = Some(message.content.clone());
            } else {
                messages.push(serde_json::json!({
                    "role": message.role,
                    "content": message.content,
                }));
            }
        }

        let mut body = serde_json::json!({
            "model": model,
            "max_tokens": self.max_tokens,
            "stream": true,
            "messages": messages,
        });
        if let Some(system) = system {
            body["system"] = serde_json::Value::String(system);
        }

        let response = self
            .http
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(SharedError::new)?
            .error_for_status()
            .map_err(SharedError::new)?;

        let tokens = response.bytes_stream().eventsource().filter_map(|frame| async move {
            let frame = match frame {
                Ok(frame) => frame,
                Err(err) => return Some(Err(SharedError::new(err))),
            };
            if frame.event != "content_block_delta" {
                return None;
            }
            let chunk: serde_json::Value = match serde_json::from_str(&frame.data) {
                Ok(v) => v,
                Err(err) => return Some(Err(SharedError::new(err))),
            };
            let token = chunk["delta"]["text"].as_str().unwrap_or("");
            if token.is_empty() {
                None
            } else {
                Some(Ok(token.to_string()))
            }
        });

        Ok(Box::pin(tokens) as PieceStream<MessageToken>)
    }
}

/// Builds an `Agent` that replies using a real Anthropic Messages API call.
#[must_use]
pub fn anthropic_agent(model: impl Into<String>, api_key: impl Into<String>) -> Arc<dyn Agent> {
    Arc::new(LlmAgent::new(model, Arc::new(AnthropicClient::new(api_key))))
}
