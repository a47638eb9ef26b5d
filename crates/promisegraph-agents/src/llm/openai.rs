//! OpenAI-shaped chat-completion client (`/v1/chat/completions`, SSE).

use std::sync::Arc;

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures_util::StreamExt;
use promisegraph::{PieceStream, SharedError};

use crate::agent::Agent;
use crate::message::{message_to_llm_dict, Message, MessageToken};

use super::{ChatCompletionClient, LlmAgent};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// A `ChatCompletionClient` backed by a real HTTP call to an OpenAI-shaped
/// endpoint. The base URL is overridable so API-compatible providers (or a
/// local mock server in tests) can be targeted.
pub struct OpenAiClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl OpenAiClient {
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl ChatCompletionClient for OpenAiClient {
    async fn stream_tokens(
        &self,
        model: &str,
        history: &[Message],
    ) -> Result<PieceStream<MessageToken>, SharedError> {
        let body = serde_json::json!({
            "model": model,
            "stream": true,
            "messages": history.iter().map(message_to_llm_dict).collect::<Vec<_>>(),
        });

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
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
            if frame.data == "[DONE]" {
                return None;
            }
            let chunk: serde_json::Value = match serde_json::from_str(&frame.data) {
                Ok(v) => v,
                Err(err) => return Some(Err(SharedError::new(err))),
            };
            let token = chunk["choices"][0]["delta"]["content"].as_str().unwrap_or("");
            if token.is_empty() {
                None
            } else {
                Some(Ok(token.to_string()))
            }
        });

        Ok(Box::pin(tokens) as PieceStream<MessageToken>)
    }
}

/// Builds an `Agent` that replies using a real OpenAI chat-completion call.
#[must_use]
pub fn openai_agent(model: impl Into<String>, api_key: impl Into<String>) -> Arc<dyn Agent> {
    Arc::new(LlmAgent::new(model, Arc::new(OpenAiClient::new(api_key))))
}
