//! Error types for the agent/LLM wiring layer.

use promisegraph::{PromiseError, SharedError};

/// Errors raised while driving an agent turn or an LLM chat-completion call.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AgentError {
    /// The agent's reply promise failed (producer error, packager error, or
    /// reentry) before a `Message` could be assembled.
    #[error("agent reply failed: {0}")]
    Reply(#[from] PromiseError),

    /// Reading the next user turn from stdin failed (EOF, I/O error).
    #[error("failed to read user input: {0}")]
    Input(SharedError),

    /// Appending a message to the chat history sink failed.
    #[error("chat history append failed: {0}")]
    History(SharedError),

    /// The chat-completion transport failed (HTTP error, bad status,
    /// malformed SSE frame, JSON deserialization error).
    #[error("chat completion request failed: {0}")]
    Llm(SharedError),

    /// Stdin hit end-of-file; the conversation ends gracefully rather than
    /// propagating as a failure. `dialog_loop` stops the turn loop when it
    /// sees this.
    #[error("end of input")]
    EndOfInput,
}

impl AgentError {
    /// `true` for errors that originated inside the promise graph itself
    /// (producer/packager), as opposed to I/O at the agent boundary.
    #[must_use]
    pub fn is_reply_error(&self) -> bool {
        matches!(self, Self::Reply(_))
    }
}
