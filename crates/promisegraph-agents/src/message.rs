//! The agent-level piece: a role-tagged chunk of conversation content.

use std::fmt;
use std::sync::Arc;

use futures_util::StreamExt;
use promisegraph::{BoxFuture, Packager, SharedError, StreamedPromise};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One chunk of an LLM token stream, at the granularity agents consume.
pub type MessageToken = String;

/// A role-tagged message, built by a packager from one or more tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl Message {
    #[must_use]
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
            metadata: None,
        }
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new("user", content)
    }

    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new("assistant", content)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.content)
    }
}

/// Renders a message the way an OpenAI/Anthropic-shaped chat-completion
/// request expects: `{"role": ..., "content": ...}`. Falls back to `"user"`
/// when no role is set, matching the defensive default of the reference
/// implementation this was ported from.
#[must_use]
pub fn message_to_llm_dict(message: &Message) -> Value {
    serde_json::json!({
        "role": if message.role.is_empty() { "user" } else { message.role.as_str() },
        "content": message.content,
    })
}

/// A packager that concatenates every token into a single `Message` with the
/// given `role`. Used by every agent in this crate that produces replies via
/// a token-level `StreamedPromise`.
#[must_use]
pub fn concat_packager(role: impl Into<String>) -> Packager<MessageToken, Message> {
    let role = role.into();
    Arc::new(move |promise: Arc<StreamedPromise<MessageToken, Message>>| {
        let role = role.clone();
        Box::pin(async move {
            let mut content = String::new();
            let mut cursor = promise.iterate();
            while let Some(piece) = cursor.next().await {
                let token = piece.map_err(SharedError::new)?;
                content.push_str(&token);
            }
            Ok(Message::new(role, content))
        }) as BoxFuture<Result<Message, SharedError>>
    })
}
