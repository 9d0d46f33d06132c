//! Async completion contract.
//!
//! Every asynchronous request resolves exactly once, through one of
//! [`AsyncCompletion::completed`], [`AsyncCompletion::failed`] or
//! [`AsyncCompletion::cancelled`]. The callback runs on a backend I/O
//! thread, or on the thread that called [`Handle::cancel`]; callers must not
//! assume the submitting thread.

use crate::error::HttpError;
use crate::response::Response;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

/// Receiver of the single outcome of an asynchronous request.
///
/// Methods take `Box<Self>` so the implementation is consumed by the one
/// call it receives and may release resources freely.
pub trait AsyncCompletion: Send + 'static {
    /// The response was fully received.
    fn completed(self: Box<Self>, response: Response);

    /// The request failed with a connection, timeout or transport fault.
    fn failed(self: Box<Self>, error: HttpError);

    /// The request was cancelled before it resolved.
    fn cancelled(self: Box<Self>);
}

/// One resolved outcome, for callers that prefer a single match.
#[derive(Debug)]
pub enum Outcome {
    Completed(Response),
    Failed(HttpError),
    Cancelled,
}

impl Outcome {
    /// Collapse into a `Result`, mapping cancellation to `HttpError::Cancelled`.
    ///
    /// # Errors
    /// Returns the failure, or `HttpError::Cancelled`.
    pub fn into_result(self) -> Result<Response, HttpError> {
        match self {
            Self::Completed(response) => Ok(response),
            Self::Failed(error) => Err(error),
            Self::Cancelled => Err(HttpError::Cancelled),
        }
    }

    pub(crate) fn deliver(self, completion: Box<dyn AsyncCompletion>) {
        match self {
            Self::Completed(response) => completion.completed(response),
            Self::Failed(error) => completion.failed(error),
            Self::Cancelled => completion.cancelled(),
        }
    }
}

impl From<Result<Response, HttpError>> for Outcome {
    fn from(result: Result<Response, HttpError>) -> Self {
        match result {
            Ok(response) => Self::Completed(response),
            Err(HttpError::Cancelled) => Self::Cancelled,
            Err(error) => Self::Failed(error),
        }
    }
}

/// Completion backed by a single closure receiving the [`Outcome`].
pub struct FnCompletion<F>(F);

impl<F> AsyncCompletion for FnCompletion<F>
where
    F: FnOnce(Outcome) + Send + 'static,
{
    fn completed(self: Box<Self>, response: Response) {
        (self.0)(Outcome::Completed(response));
    }

    fn failed(self: Box<Self>, error: HttpError) {
        (self.0)(Outcome::Failed(error));
    }

    fn cancelled(self: Box<Self>) {
        (self.0)(Outcome::Cancelled);
    }
}

/// Adapt a closure to [`AsyncCompletion`].
///
/// ```ignore
/// let handle = client.send_async(request, completion::from_fn(|outcome| {
///     tracing::info!(?outcome, "request resolved");
/// }))?;
/// ```
pub fn from_fn<F>(f: F) -> FnCompletion<F>
where
    F: FnOnce(Outcome) + Send + 'static,
{
    FnCompletion(f)
}

/// Completion that forwards the outcome into a oneshot channel.
pub(crate) fn channel() -> (
    FnCompletion<impl FnOnce(Outcome) + Send + 'static>,
    oneshot::Receiver<Outcome>,
) {
    let (tx, rx) = oneshot::channel();
    let completion = from_fn(move |outcome| {
        // Receiver gone means the caller stopped waiting.
        let _ = tx.send(outcome);
    });
    (completion, rx)
}

/// Exactly-once latch around a pending completion.
///
/// The first `resolve` takes the completion out of the slot and delivers
/// outside the lock; later calls find the slot empty and do nothing.
pub(crate) struct CompletionLatch {
    slot: Mutex<Option<Box<dyn AsyncCompletion>>>,
}

impl CompletionLatch {
    pub(crate) fn new(completion: Box<dyn AsyncCompletion>) -> Self {
        Self {
            slot: Mutex::new(Some(completion)),
        }
    }

    /// Deliver `outcome` if nothing was delivered yet.
    ///
    /// Returns whether this call delivered.
    pub(crate) fn resolve(&self, outcome: Outcome) -> bool {
        let pending = self.slot.lock().take();
        match pending {
            Some(completion) => {
                outcome.deliver(completion);
                true
            }
            None => false,
        }
    }

    pub(crate) fn is_resolved(&self) -> bool {
        self.slot.lock().is_none()
    }
}

/// Cancellation handle of an asynchronous request.
///
/// Cloning yields another handle to the same request.
#[derive(Clone)]
pub struct Handle {
    latch: Arc<CompletionLatch>,
    token: CancellationToken,
}

impl Handle {
    pub(crate) fn new(latch: Arc<CompletionLatch>, token: CancellationToken) -> Self {
        Self { latch, token }
    }

    /// Cancel the request.
    ///
    /// If the request has not resolved yet, `cancelled()` is invoked on the
    /// calling thread and the in-flight work is aborted. Returns `true` if
    /// this call resolved the request; cancelling a resolved request is a
    /// no-op returning `false`.
    pub fn cancel(&self) -> bool {
        let resolved = self.latch.resolve(Outcome::Cancelled);
        self.token.cancel();
        resolved
    }

    /// Whether one of the three callbacks has been invoked.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.latch.is_resolved()
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("resolved", &self.is_resolved())
            .field("cancelled", &self.token.is_cancelled())
            .finish()
    }
}
