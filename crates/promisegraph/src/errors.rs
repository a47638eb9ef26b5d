//! Error types shared by the streamed-promise core.

use std::fmt;
use std::sync::Arc;

/// A cloneable, type-erased error.
///
/// Producer and packager errors are stored in the history buffer and must be
/// replayable to arbitrarily many independent consumers, so they are wrapped
/// in an `Arc` rather than moved.
#[derive(Clone)]
pub struct SharedError(Arc<dyn std::error::Error + Send + Sync + 'static>);

impl SharedError {
    /// Wraps any error in a `SharedError`.
    pub fn new<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self(Arc::new(err))
    }

    /// Returns the wrapped error downcast to `T`, if it is one.
    pub fn downcast_ref<E: std::error::Error + 'static>(&self) -> Option<&E> {
        (*self.0).downcast_ref::<E>()
    }
}

impl<E> From<E> for SharedError
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn from(err: E) -> Self {
        Self::new(err)
    }
}

impl fmt::Debug for SharedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

impl fmt::Display for SharedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl std::error::Error for SharedError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}

/// Errors surfaced by a [`crate::StreamedPromise`].
#[derive(Debug, Clone, thiserror::Error)]
pub enum PromiseError {
    /// The producer factory itself returned an error before yielding a stream.
    #[error("producer failed to start: {0}")]
    ProducerFailedToStart(#[source] SharedError),

    /// The producer's stream yielded an error item at some position.
    #[error("producer step failed: {0}")]
    ProducerStep(#[source] SharedError),

    /// The packager returned an error.
    #[error("packager failed: {0}")]
    Packager(#[source] SharedError),

    /// `collect_whole` was (re-)entered from within the packager's own
    /// execution. Returned instead of deadlocking on the packager mutex.
    #[error("collect_whole() was called re-entrantly from within the packager")]
    PackagerReentry,
}

impl PromiseError {
    /// `true` for errors that originated on the producer side and were
    /// captured as ordinary stream data rather than raised as a fault.
    #[must_use]
    pub fn is_producer_error(&self) -> bool {
        matches!(self, Self::ProducerFailedToStart(_) | Self::ProducerStep(_))
    }
}

/// Errors surfaced by [`crate::AppendFeeder`]'s synchronous protocol methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FeederError {
    /// `append()` was called before `open()`.
    #[error("append() called before open()")]
    NotOpen,

    /// `append()` or `open()` was called after `close()`.
    #[error("feeder has already been closed")]
    Closed,
}

impl FeederError {
    /// Protocol-violation errors are never swallowed by `capture_errors`.
    #[must_use]
    pub fn is_protocol_violation(self) -> bool {
        true
    }
}
