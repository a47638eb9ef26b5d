//! The agent abstraction and the dialog loop that drives two of them.

use std::io::Write as _;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::StreamExt;
use promisegraph::StreamedPromise;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::chat_history::ChatHistory;
use crate::errors::AgentError;
use crate::message::{concat_packager, Message, MessageToken};

/// A token-level promise whose whole is the assembled `Message`. This is the
/// type every agent replies with: callers may `collect_whole()` it for the
/// final message, or `iterate()` it to observe tokens as they stream in.
pub type TokenStream = StreamedPromise<MessageToken, Message>;

/// Composes over `StreamedPromise`s of messages: given the conversation so
/// far, produces the next reply as a (possibly still-streaming) token
/// promise.
#[async_trait]
pub trait Agent: Send + Sync {
    async fn reply(&self, history: &[Message]) -> Result<Arc<TokenStream>, AgentError>;

    /// Called by [`dialog_loop`] with the *other* agent's freshly created
    /// reply promise, before that promise's whole is awaited. The default
    /// does nothing; [`ConsoleUserAgent`] overrides it to echo tokens live.
    async fn observe(&self, _reply: &Arc<TokenStream>) -> Result<(), AgentError> {
        Ok(())
    }
}

/// Alternates `user_agent` and `assistant_agent` for `turns` round trips,
/// appending every exchanged message to `history` (in chronological order)
/// and to `chat_history`.
pub async fn dialog_loop(
    user_agent: &dyn Agent,
    assistant_agent: &dyn Agent,
    chat_history: &dyn ChatHistory,
    turns: usize,
) -> Result<Vec<Message>, AgentError> {
    let mut history = Vec::new();

    for _ in 0..turns {
        let user_promise = match user_agent.reply(&history).await {
            Ok(promise) => promise,
            Err(AgentError::EndOfInput) => break,
            Err(err) => return Err(err),
        };
        assistant_agent.observe(&user_promise).await?;
        let user_message = (*user_promise.collect_whole().await?).clone();
        chat_history.append(&user_message).await?;
        history.push(user_message);

        let assistant_promise = assistant_agent.reply(&history).await?;
        user_agent.observe(&assistant_promise).await?;
        let assistant_message = (*assistant_promise.collect_whole().await?).clone();
        chat_history.append(&assistant_message).await?;
        history.push(assistant_message);
    }

    Ok(history)
}

/// A human sitting at a terminal: each `reply()` call blocks on one line of
/// stdin, and `observe()` prints the other agent's reply token-by-token as
/// it streams in, demonstrating live consumption of an in-progress promise.
pub struct ConsoleUserAgent {
    echo: bool,
    stdin: tokio::sync::Mutex<tokio::io::Lines<BufReader<tokio::io::Stdin>>>,
}

impl ConsoleUserAgent {
    #[must_use]
    pub fn new(echo: bool) -> Self {
        Self {
            echo,
            stdin: tokio::sync::Mutex::new(BufReader::new(tokio::io::stdin()).lines()),
        }
    }
}

impl Default for ConsoleUserAgent {
    fn default() -> Self {
        Self::new(true)
    }
}

#[async_trait]
impl Agent for ConsoleUserAgent {
    async fn reply(&self, _history: &[Message]) -> Result<Arc<TokenStream>, AgentError> {
        let line = self
            .stdin
            .lock()
            .await
            .next_line()
            .await
            .map_err(|e| AgentError::Input(promisegraph::SharedError::new(e)))?
            .ok_or(AgentError::EndOfInput)?;

        let feeder = Arc::new(promisegraph::AppendFeeder::<MessageToken>::new(false));
        feeder.open().map_err(|e| AgentError::Input(promisegraph::SharedError::new(e)))?;
        feeder
            .append(line)
            .map_err(|e| AgentError::Input(promisegraph::SharedError::new(e)))?;
        feeder.close();

        Ok(StreamedPromise::new(feeder.as_producer(), concat_packager("user"), false))
    }

    async fn observe(&self, reply: &Arc<TokenStream>) -> Result<(), AgentError> {
        if !self.echo {
            return Ok(());
        }
        let mut cursor = reply.iterate();
        let stdout = std::io::stdout();
        while let Some(token) = cursor.next().await {
            let token = token?;
            let mut handle = stdout.lock();
            let _ = write!(handle, "{token}");
            let _ = handle.flush();
        }
        println!();
        Ok(())
    }
}
