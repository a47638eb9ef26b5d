//! Command-line / environment configuration for the chat REPL.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

const ENV_OPENAI_API_KEY: &str = "OPENAI_API_KEY";
const ENV_ANTHROPIC_API_KEY: &str = "ANTHROPIC_API_KEY";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Provider {
    Openai,
    Anthropic,
}

#[derive(Parser, Debug)]
#[command(name = "promisegraph-cli")]
#[command(version, about = "Interactive console chat over a replayable streaming promise graph")]
pub struct Cli {
    /// Which provider's chat-completion API to talk to.
    #[arg(long, value_enum, default_value = "openai")]
    pub provider: Provider,

    /// Model name to request.
    #[arg(long, default_value = "gpt-4o")]
    pub model: String,

    /// OpenAI API key. Falls back to the `OPENAI_API_KEY` environment
    /// variable (loaded from `.env` via dotenvy if present).
    #[arg(long, env = ENV_OPENAI_API_KEY, hide_env_values = true)]
    pub openai_api_key: Option<String>,

    /// Anthropic API key. Falls back to the `ANTHROPIC_API_KEY` environment
    /// variable (loaded from `.env` via dotenvy if present).
    #[arg(long, env = ENV_ANTHROPIC_API_KEY, hide_env_values = true)]
    pub anthropic_api_key: Option<String>,

    /// Path to the markdown chat history file.
    #[arg(long, default_value = "CHAT.md")]
    pub history_file: PathBuf,

    /// Number of user/assistant round trips before exiting (the REPL also
    /// exits early on end-of-input).
    #[arg(long, default_value_t = 1_000_000)]
    pub max_turns: usize,

    /// Disable live token-by-token echoing of the assistant's reply.
    #[arg(long)]
    pub no_echo: bool,
}
