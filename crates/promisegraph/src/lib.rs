//! A replayable streaming promise graph.
//!
//! [`StreamedPromise`] lets many independent consumers iterate a lazily
//! produced, piece-by-piece stream (typically an LLM token stream) while
//! preserving append order, demoting producer errors to ordinary replayable
//! data, and memoizing a single "whole" value computed from the pieces.
//!
//! [`AppendFeeder`] adapts imperative push-style code (e.g. an HTTP
//! streaming client callback) to the pull-side producer contract a
//! [`StreamedPromise`] expects.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use futures_util::StreamExt;
//! use promisegraph::{AppendFeeder, StreamedPromise};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let feeder = Arc::new(AppendFeeder::<String>::new(false));
//! feeder.open().unwrap();
//! feeder.append("he".into()).unwrap();
//! feeder.append("l".into()).unwrap();
//! feeder.append("lo".into()).unwrap();
//! feeder.close();
//!
//! let promise = StreamedPromise::new(
//!     feeder.as_producer(),
//!     Arc::new(|promise: Arc<StreamedPromise<String, String>>| {
//!         Box::pin(async move {
//!             let mut whole = String::new();
//!             let mut pieces = promise.iterate();
//!             while let Some(piece) = pieces.next().await {
//!                 whole.push_str(piece.expect("producer never errors").as_str());
//!             }
//!             Ok(whole)
//!         }) as promisegraph::BoxFuture<_>
//!     }),
//!     false,
//! );
//!
//! let whole = promise.collect_whole().await.unwrap();
//! assert_eq!(&**whole, "hello");
//! # }
//! ```

mod errors;
mod feeder;
mod history;
mod promise;

pub use errors::{FeederError, PromiseError, SharedError};
pub use feeder::{scoped, AppendFeeder};
pub use promise::{BoxFuture, Packager, PieceStream, Producer, ReplayCursor, StreamedPromise};
