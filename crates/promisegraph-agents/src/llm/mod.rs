//! Chat-completion adapters: turn a provider's token stream into an
//! `AppendFeeder`-backed `TokenStream`, behind a trait so the promise-graph
//! wiring can be exercised without a live HTTP call.

pub mod anthropic;
pub mod openai;

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::StreamExt;
use promisegraph::{AppendFeeder, PieceStream, SharedError, StreamedPromise};

use crate::agent::{Agent, TokenStream};
use crate::errors::AgentError;
use crate::message::{concat_packager, Message, MessageToken};

/// The transport behind an LLM agent: given a model name and the message
/// history so far, returns a stream of tokens (or an error demoted to a
/// single piece, same as any other producer error).
#[async_trait]
pub trait ChatCompletionClient: Send + Sync {
    async fn stream_tokens(
        &self,
        model: &str,
        history: &[Message],
    ) -> Result<PieceStream<MessageToken>, SharedError>;
}

/// An `Agent` whose reply is driven by a `ChatCompletionClient`: opens a
/// feeder, spawns a task that drives the client and appends tokens as they
/// arrive, and returns the (eager) promise immediately so callers can
/// observe tokens as they stream in.
pub struct LlmAgent<C> {
    model: String,
    client: Arc<C>,
}

impl<C> LlmAgent<C>
where
    C: ChatCompletionClient + 'static,
{
    pub fn new(model: impl Into<String>, client: Arc<C>) -> Self {
        Self {
            model: model.into(),
            client,
        }
    }
}

#[async_trait]
impl<C> Agent for LlmAgent<C>
where
    C: ChatCompletionClient + 'static,
{
    async fn reply(&self, history: &[Message]) -> Result<Arc<TokenStream>, AgentError> {
        let feeder = Arc::new(AppendFeeder::<MessageToken>::new(true));
        feeder
            .open()
            .map_err(|e| AgentError::Llm(SharedError::new(e)))?;

        let promise = StreamedPromise::new(feeder.as_producer(), concat_packager("assistant"), true);

        let client = Arc::clone(&self.client);
        let model = self.model.clone();
        let history = history.to_vec();
        let bg_feeder = Arc::clone(&feeder);
        tokio::spawn(async move {
            match client.stream_tokens(&model, &history).await {
                Ok(mut tokens) => {
                    while let Some(item) = tokens.next().await {
                        match item {
                            Ok(token) => {
                                let _ = bg_feeder.append(token);
                            }
                            Err(err) => {
                                let _ = bg_feeder.append_error(err);
                                break;
                            }
                        }
                    }
                }
                Err(err) => {
                    let _ = bg_feeder.append_error(err);
                }
            }
            bg_feeder.close();
        });

        Ok(promise)
    }
}
