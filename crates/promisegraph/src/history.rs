//! The append-only history log and the producer state machine that feeds it.

use std::sync::Arc;

use futures_core::Stream;
use futures_util::StreamExt;

use crate::errors::{PromiseError, SharedError};
use crate::promise::{Producer, StreamedPromise};

/// One entry of the shared history buffer.
///
/// Pieces are never rewritten once appended (invariant: monotone append). An
/// error produced by the underlying producer is stored as ordinary data so
/// that it can be replayed at its true position to every consumer; only
/// [`HistoryEntry::End`] is terminal, and it is always the last entry.
pub(crate) enum HistoryEntry<P> {
    /// A successfully produced piece.
    Piece(Arc<P>),
    /// An error raised by the producer at this position in the stream.
    Error(PromiseError),
    /// The end-of-stream marker. Always the final entry, appears at most once.
    End,
}

impl<P> Clone for HistoryEntry<P> {
    fn clone(&self) -> Self {
        match self {
            Self::Piece(p) => Self::Piece(Arc::clone(p)),
            Self::Error(e) => Self::Error(e.clone()),
            Self::End => Self::End,
        }
    }
}

impl<P> HistoryEntry<P> {
    /// Translates a history entry into the `Result` a replay cursor yields.
    /// Returns `None` once the entry is the end marker (the stream is done).
    pub(crate) fn into_item(self) -> Option<Result<Arc<P>, PromiseError>> {
        match self {
            Self::Piece(p) => Some(Ok(p)),
            Self::Error(e) => Some(Err(e)),
            Self::End => None,
        }
    }
}

type PieceStream<P> = std::pin::Pin<Box<dyn Stream<Item = Result<P, SharedError>> + Send>>;

/// The three-state producer driver described by the spec: a producer stream
/// is either not yet constructed, constructed and yielding pieces, or failed
/// to construct at all (in which case every further advance just terminates
/// the stream).
pub(crate) enum ProducerState<P> {
    Uninitialized,
    Live(PieceStream<P>),
    FailedToStart,
}

impl<P> ProducerState<P> {
    pub(crate) fn new() -> Self {
        Self::Uninitialized
    }
}

/// Advances the producer state machine by exactly one logical step,
/// returning the [`HistoryEntry`] it produced. Called with the producer
/// mutex held, so at most one advance is ever in flight for a given
/// [`StreamedPromise`].
pub(crate) async fn advance<P, W>(
    state: &mut ProducerState<P>,
    producer: &Producer<P, W>,
    promise: &Arc<StreamedPromise<P, W>>,
) -> HistoryEntry<P>
where
    P: Send + Sync + 'static,
    W: Send + Sync + 'static,
{
    loop {
        match state {
            ProducerState::Uninitialized => match producer(Arc::clone(promise)) {
                Ok(stream) => {
                    *state = ProducerState::Live(stream);
                    continue;
                }
                Err(err) => {
                    *state = ProducerState::FailedToStart;
                    return HistoryEntry::Error(PromiseError::ProducerFailedToStart(err));
                }
            },
            ProducerState::FailedToStart => return HistoryEntry::End,
            ProducerState::Live(stream) => {
                return match stream.next().await {
                    Some(Ok(piece)) => HistoryEntry::Piece(Arc::new(piece)),
                    Some(Err(err)) => HistoryEntry::Error(PromiseError::ProducerStep(err)),
                    None => HistoryEntry::End,
                };
            }
        }
    }
}
