//! Pluggable sink that `dialog_loop` appends every exchanged message to.

use async_trait::async_trait;

use crate::errors::AgentError;
use crate::message::Message;

/// A sink that records each turn of a conversation as it happens.
#[async_trait]
pub trait ChatHistory: Send + Sync {
    async fn append(&self, message: &Message) -> Result<(), AgentError>;
}

/// A `ChatHistory` that discards everything; useful when no persistence is
/// wanted and in tests that only care about the in-memory `Vec<Message>`
/// `dialog_loop` already threads.
pub struct NullChatHistory;

#[async_trait]
impl ChatHistory for NullChatHistory {
    async fn append(&self, _message: &Message) -> Result<(), AgentError> {
        Ok(())
    }
}
