//! [`AppendFeeder`], the push-side adapter that turns `append` calls into a
//! producer a [`crate::StreamedPromise`] can consume.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::errors::{FeederError, SharedError};
use crate::promise::{PieceStream, Producer};

/// One item pushed through a feeder's internal queue: a piece (or a
/// captured error, which is just a piece as far as the queue is concerned),
/// or the close marker.
enum FeederEntry<P> {
    Piece(Result<P, SharedError>),
    Close,
}

/// Push-side producer: open it, append pieces (or capture an error), close
/// it. Closing enqueues the end-of-stream marker exactly once; appends after
/// close always fail.
pub struct AppendFeeder<P> {
    tx: mpsc::UnboundedSender<FeederEntry<P>>,
    rx: std::sync::Mutex<Option<mpsc::UnboundedReceiver<FeederEntry<P>>>>,
    open: AtomicBool,
    closed: AtomicBool,
    capture_errors: bool,
}

impl<P: Send + 'static> AppendFeeder<P> {
    /// Creates a new, unopened feeder.
    ///
    /// When `capture_errors` is set, [`scoped`] appends the body's error (if
    /// any, and not a protocol violation) as the last piece before closing,
    /// rather than propagating it.
    #[must_use]
    pub fn new(capture_errors: bool) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: std::sync::Mutex::new(Some(rx)),
            open: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            capture_errors,
        }
    }

    /// `true` if this feeder was constructed with `capture_errors = true`.
    #[must_use]
    pub fn capture_errors(&self) -> bool {
        self.capture_errors
    }

    /// Opens the feeder for appending. Fails if the feeder was already
    /// closed; a feeder can never be reopened.
    pub fn open(&self) -> Result<(), FeederError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(FeederError::Closed);
        }
        self.open.store(true, Ordering::Release);
        Ok(())
    }

    /// Appends a piece. Fails with [`FeederError::NotOpen`] if `open()` has
    /// not been called yet, or [`FeederError::Closed`] if `close()` has.
    pub fn append(&self, piece: P) -> Result<(), FeederError> {
        self.append_entry(Ok(piece))
    }

    /// Appends a captured error as a piece (re-surfaced to consumers at this
    /// position, same as any other producer error). Subject to the same
    /// open/closed discipline as [`append`](Self::append).
    pub fn append_error(&self, error: SharedError) -> Result<(), FeederError> {
        self.append_entry(Err(error))
    }

    fn append_entry(&self, entry: Result<P, SharedError>) -> Result<(), FeederError> {
        if !self.open.load(Ordering::Acquire) {
            return Err(FeederError::NotOpen);
        }
        if self.closed.load(Ordering::Acquire) {
            return Err(FeederError::Closed);
        }
        // The receiver is only ever dropped by whoever owns the producer
        // stream after it observes `FeederEntry::Close`, which we haven't
        // sent yet, so a send failure here can't happen in practice.
        let _ = self.tx.send(FeederEntry::Piece(entry));
        Ok(())
    }

    /// Closes the feeder. Idempotent: subsequent calls are no-ops. Enqueues
    /// the end-of-stream marker exactly once.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let _ = self.tx.send(FeederEntry::Close);
    }

    /// Adapts this feeder to the [`Producer`] contract expected by
    /// [`crate::StreamedPromise::new`]: a stream that dequeues appended
    /// pieces and ends when it dequeues the close marker.
    ///
    /// May only be called once per feeder: the underlying receiver is moved
    /// out into the returned producer's stream.
    #[must_use]
    pub fn as_producer<W>(self: &Arc<Self>) -> Producer<P, W>
    where
        W: Send + Sync + 'static,
        P: Send + Sync + 'static,
    {
        let feeder = Arc::clone(self);
        Arc::new(move |_promise| -> Result<PieceStream<P>, SharedError> {
            let rx = feeder
                .rx
                .lock()
                .unwrap()
                .take()
                .expect("a feeder can only be turned into a producer once");
            let stream = UnboundedReceiverStream::new(rx).map_while(|entry| match entry {
                FeederEntry::Piece(p) => Some(p),
                FeederEntry::Close => None,
            });
            Ok(Box::pin(stream) as PieceStream<P>)
        })
    }
}

/// Runs `body` against a freshly opened feeder, closing it on every exit
/// path (success or a returned error).
///
/// If the feeder was built with `capture_errors = true` and `body` returns
/// an error that is not itself a feeder protocol violation
/// ([`FeederError::NotOpen`] / [`FeederError::Closed`]), the error is
/// appended as the final piece instead of being propagated. Protocol
/// violations are never swallowed, regardless of `capture_errors`.
pub async fn scoped<P, F, Fut>(capture_errors: bool, body: F) -> Result<(), SharedError>
where
    P: Send + 'static,
    F: FnOnce(Arc<AppendFeeder<P>>) -> Fut,
    Fut: std::future::Future<Output = Result<(), SharedError>>,
{
    let feeder = Arc::new(AppendFeeder::new(capture_errors));
    feeder.open().map_err(SharedError::new)?;

    let outcome = body(Arc::clone(&feeder)).await;

    let propagate = match outcome {
        Ok(()) => None,
        Err(err) => {
            let is_protocol_violation = err.downcast_ref::<FeederError>().is_some();
            if feeder.capture_errors() && !is_protocol_violation {
                let _ = feeder.append_error(err);
                None
            } else {
                Some(err)
            }
        }
    };

    feeder.close();

    match propagate {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
