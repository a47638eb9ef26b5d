//! [`StreamedPromise`], the central abstraction of this crate.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::task::{Context, Poll};

use futures_core::Stream;
use pin_project_lite::pin_project;
use tokio::sync::{mpsc, Mutex as AsyncMutex};

use crate::errors::{PromiseError, SharedError};
use crate::history::{advance, HistoryEntry, ProducerState};

/// A stream of pieces, handed to a producer or packager as `Arc<StreamedPromise<P, W>>`.
pub type PieceStream<P> = Pin<Box<dyn Stream<Item = Result<P, SharedError>> + Send>>;

/// A boxed, `'static` future, used for the packager's return value.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// A factory that, given a handle to the promise it is feeding, returns a
/// lazy, finite stream of pieces. Each item is either a successfully
/// produced piece or an error (demoted to data, not a stream fault); the
/// stream ending terminates the promise. Returning `Err` here means the
/// producer failed to start at all.
pub type Producer<P, W> =
    Arc<dyn Fn(Arc<StreamedPromise<P, W>>) -> Result<PieceStream<P>, SharedError> + Send + Sync>;

/// A function that consumes the piece stream (via the promise handle) and
/// returns the single "whole" value. May fully iterate, partially iterate,
/// or never iterate the promise.
pub type Packager<P, W> =
    Arc<dyn Fn(Arc<StreamedPromise<P, W>>) -> BoxFuture<Result<W, SharedError>> + Send + Sync>;

/// How a given [`StreamedPromise`] advances its underlying producer.
enum Driver<P> {
    /// Production happens on demand: the first cursor that needs an
    /// uncached piece advances the producer state machine directly.
    Lazy(ProducerState<P>),
    /// A background task is already draining the producer into this queue;
    /// cursors just dequeue from it.
    Eager(mpsc::UnboundedReceiver<HistoryEntry<P>>),
}

/// A replayable streaming promise: a single lazily-produced stream of `P`
/// pieces with a memoized `W` "whole" value, computed at most once by the
/// packager.
///
/// Any number of independent [`ReplayCursor`]s may call [`iterate`] and each
/// will observe every piece from the beginning, in the same order, including
/// errors raised by the producer at their true position. [`collect_whole`]
/// may be called any number of times; the packager runs at most once.
///
/// [`iterate`]: StreamedPromise::iterate
/// [`collect_whole`]: StreamedPromise::collect_whole
pub struct StreamedPromise<P, W> {
    producer: Producer<P, W>,
    packager: Packager<P, W>,
    history: StdMutex<Vec<HistoryEntry<P>>>,
    terminal: AtomicBool,
    driver: AsyncMutex<Driver<P>>,
    whole: AsyncMutex<Option<Result<Arc<W>, PromiseError>>>,
}

tokio::task_local! {
    /// Addresses (`Arc::as_ptr` cast to `usize`) of the promises whose
    /// packager is currently running somewhere on this call's async stack.
    ///
    /// Scoped per `collect_whole` call via `scope`, so it tracks reentry
    /// correctly whether the call is driven by `#[tokio::main]`/`block_on`
    /// (which never assigns a `tokio::task::Id`) or by a spawned task.
    static PACKAGING_STACK: Vec<usize>;
}

impl<P, W> StreamedPromise<P, W>
where
    P: Send + Sync + 'static,
    W: Send + Sync + 'static,
{
    /// Constructs a new streamed promise.
    ///
    /// When `eager` is `true`, a background task starts draining `producer`
    /// at the next scheduling opportunity, buffering pieces for whichever
    /// consumer asks for them first. When `false`, production only advances
    /// when a [`ReplayCursor`] demands a piece that isn't in the history yet.
    #[must_use]
    pub fn new(producer: Producer<P, W>, packager: Packager<P, W>, eager: bool) -> Arc<Self> {
        Arc::new_cyclic(|weak| {
            let driver = if eager {
                let (tx, rx) = mpsc::unbounded_channel();
                let weak_promise = weak.clone();
                let producer_for_task = Arc::clone(&producer);
                tokio::spawn(async move {
                    run_eager_driver(weak_promise, producer_for_task, tx).await;
                });
                Driver::Eager(rx)
            } else {
                Driver::Lazy(ProducerState::new())
            };

            Self {
                producer,
                packager,
                history: StdMutex::new(Vec::new()),
                terminal: AtomicBool::new(false),
                driver: AsyncMutex::new(driver),
                whole: AsyncMutex::new(None),
            }
        })
    }

    /// Returns a fresh [`ReplayCursor`] that yields the full piece sequence
    /// from the beginning. Independent cursors may be created and driven
    /// concurrently; each observes the same pieces in the same order.
    pub fn iterate(self: &Arc<Self>) -> ReplayCursor<P, W> {
        ReplayCursor {
            promise: Arc::clone(self),
            index: 0,
            pending: None,
        }
    }

    /// Returns the memoized "whole" value, computed at most once by the
    /// packager. Must not be called (directly or transitively) from within
    /// the packager's own execution; doing so returns
    /// [`PromiseError::PackagerReentry`] instead of deadlocking.
    pub async fn collect_whole(self: &Arc<Self>) -> Result<Arc<W>, PromiseError> {
        if let Ok(guard) = self.whole.try_lock() {
            if let Some(result) = guard.clone() {
                return result;
            }
        }

        let promise_ptr = Arc::as_ptr(self).cast::<()>() as usize;
        let already_packaging = PACKAGING_STACK
            .try_with(|stack| stack.contains(&promise_ptr))
            .unwrap_or(false);
        if already_packaging {
            return Err(PromiseError::PackagerReentry);
        }

        let mut guard = self.whole.lock().await;
        if let Some(result) = guard.clone() {
            return result;
        }

        let mut stack = PACKAGING_STACK.try_with(Clone::clone).unwrap_or_default();
        stack.push(promise_ptr);

        let result = PACKAGING_STACK
            .scope(stack, (self.packager)(Arc::clone(self)))
            .await
            .map(Arc::new)
            .map_err(PromiseError::Packager);

        *guard = Some(result.clone());
        result
    }

    /// Ensures the history buffer has an entry at `index`, producing one if
    /// necessary, and returns it.
    async fn ensure_entry(self: &Arc<Self>, index: usize) -> HistoryEntry<P> {
        let mut driver = self.driver.lock().await;

        // Re-check: another cursor may have appended this index while we
        // were waiting for the lock.
        if let Some(entry) = self.history.lock().unwrap().get(index).cloned() {
            return entry;
        }

        let entry = match &mut *driver {
            Driver::Lazy(state) => advance(state, &self.producer, self).await,
            Driver::Eager(rx) => rx
                .recv()
                .await
                .expect("eager driver task ended without sending an end marker"),
        };

        self.history.lock().unwrap().push(entry.clone());
        if matches!(entry, HistoryEntry::End) {
            self.terminal.store(true, Ordering::Release);
        }
        entry
    }
}

async fn run_eager_driver<P, W>(
    promise: std::sync::Weak<StreamedPromise<P, W>>,
    producer: Producer<P, W>,
    tx: mpsc::UnboundedSender<HistoryEntry<P>>,
) where
    P: Send + Sync + 'static,
    W: Send + Sync + 'static,
{
    let Some(strong) = promise.upgrade() else {
        return;
    };
    let mut state = ProducerState::new();
    loop {
        let entry = advance(&mut state, &producer, &strong).await;
        let is_end = matches!(entry, HistoryEntry::End);
        if tx.send(entry).is_err() || is_end {
            break;
        }
    }
}

pin_project! {
    /// One consumer's independent position in a [`StreamedPromise`]'s
    /// history. Implements [`Stream`]; yields `Ok(piece)` for data,
    /// `Err(error)` where the producer raised an error at that position, and
    /// ends (`None`) after the end-of-stream marker.
    pub struct ReplayCursor<P, W> {
        promise: Arc<StreamedPromise<P, W>>,
        index: usize,
        // `Pin<Box<F>>` is already `Unpin` regardless of `F` (the pinned
        // data lives on the heap), so this field needs no `#[pin]`.
        pending: Option<Pin<Box<dyn Future<Output = HistoryEntry<P>> + Send>>>,
    }
}

impl<P, W> Stream for ReplayCursor<P, W>
where
    P: Send + Sync + 'static,
    W: Send + Sync + 'static,
{
    type Item = Result<Arc<P>, PromiseError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();

        loop {
            if let Some(fut) = this.pending.as_mut() {
                match fut.as_mut().poll(cx) {
                    Poll::Ready(entry) => {
                        *this.pending = None;
                        *this.index += 1;
                        return Poll::Ready(entry.into_item());
                    }
                    Poll::Pending => return Poll::Pending,
                }
            }

            let cached = this.promise.history.lock().unwrap().get(*this.index).cloned();
            if let Some(entry) = cached {
                *this.index += 1;
                return Poll::Ready(entry.into_item());
            }

            if this.promise.terminal.load(Ordering::Acquire) {
                // The end marker is already in the history but this cursor's
                // index raced past it somehow is impossible (monotone
                // append); reaching here means the stream is simply done.
                return Poll::Ready(None);
            }

            let promise = Arc::clone(this.promise);
            let index = *this.index;
            *this.pending = Some(Box::pin(async move { promise.ensure_entry(index).await }));
        }
    }
}
