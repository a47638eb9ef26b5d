//! Agent composition and LLM adapters built on top of `promisegraph`.
//!
//! [`Agent`] is the unit of composition: given the conversation so far, it
//! produces the next reply as a `StreamedPromise` of tokens. [`dialog_loop`]
//! alternates a user agent and an assistant agent, threading messages
//! between them and recording each one to a [`ChatHistory`] sink. The
//! `llm` module adapts OpenAI- and Anthropic-shaped streaming chat
//! completions to the same [`Agent`] contract.

mod agent;
mod chat_history;
mod errors;
mod message;

pub mod chat_history_md;
pub mod llm;

pub use agent::{dialog_loop, Agent, ConsoleUserAgent, TokenStream};
pub use chat_history::{ChatHistory, NullChatHistory};
pub use chat_history_md::ChatHistoryMd;
pub use errors::AgentError;
pub use message::{concat_packager, message_to_llm_dict, Message, MessageToken};
