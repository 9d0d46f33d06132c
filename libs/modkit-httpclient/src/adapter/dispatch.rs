use crate::completion::{AsyncCompletion, CompletionLatch, Handle, Outcome};
use crate::error::HttpError;
use parking_lot::Mutex;
use std::cell::Cell;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

static NEXT_DISPATCHER_ID: AtomicUsize = AtomicUsize::new(1);

thread_local! {
    /// Id of the dispatcher owning the current worker thread, 0 elsewhere.
    static WORKER_OF: Cell<usize> = const { Cell::new(0) };
}

/// Adapter-owned I/O runtime.
///
/// Runs request futures on dedicated worker threads, bridges them to
/// blocking callers and to completion callbacks, and drains them on
/// shutdown. Each backend adapter owns exactly one.
pub(crate) struct Dispatcher {
    id: usize,
    runtime: Mutex<Option<Runtime>>,
    handle: tokio::runtime::Handle,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

impl Dispatcher {
    pub(crate) fn new(worker_threads: usize, thread_name: &str) -> Result<Self, HttpError> {
        let id = NEXT_DISPATCHER_ID.fetch_add(1, Ordering::Relaxed);
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(worker_threads)
            .thread_name(thread_name)
            .on_thread_start(move || WORKER_OF.with(|w| w.set(id)))
            .enable_all()
            .build()
            .map_err(|e| HttpError::Connection(Box::new(e)))?;

        Ok(Self {
            id,
            handle: runtime.handle().clone(),
            runtime: Mutex::new(Some(runtime)),
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
        })
    }

    /// Enter the runtime context, for engines that need it while being built.
    pub(crate) fn enter(&self) -> tokio::runtime::EnterGuard<'_> {
        self.handle.enter()
    }

    pub(crate) fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Run `fut` on the I/O runtime and block the calling thread on its result.
    ///
    /// Shutdown aborts the future and yields `HttpError::Closed`.
    pub(crate) fn run_blocking<F, T>(&self, fut: F) -> Result<T, HttpError>
    where
        F: Future<Output = Result<T, HttpError>> + Send + 'static,
        T: Send + 'static,
    {
        if self.is_shut_down() {
            return Err(HttpError::Closed);
        }

        let (tx, rx) = mpsc::sync_channel(1);
        let token = self.shutdown.child_token();
        self.tracker.spawn_on(
            async move {
                let result = tokio::select! {
                    biased;
                    () = token.cancelled() => Err(HttpError::Closed),
                    result = fut => result,
                };
                // Receiver gone means the caller unwound.
                let _ = tx.send(result);
            },
            &self.handle,
        );

        let wait = || rx.recv();
        let received = if WORKER_OF.with(Cell::get) == 0 {
            wait()
        } else {
            // Called from a worker thread, e.g. inside a completion callback.
            tokio::task::block_in_place(wait)
        };

        received.unwrap_or_else(|_| {
            if self.is_shut_down() {
                Err(HttpError::Closed)
            } else {
                tracing::error!("request task ended without a result");
                Err(HttpError::Transport("request task aborted".into()))
            }
        })
    }

    /// Run `fut` on the I/O runtime and deliver its outcome to `completion`.
    ///
    /// Never blocks. The returned handle resolves the request as cancelled
    /// and aborts the future; shutdown does the same for every pending one.
    pub(crate) fn spawn<F>(&self, fut: F, completion: Box<dyn AsyncCompletion>) -> Handle
    where
        F: Future<Output = Result<crate::Response, HttpError>> + Send + 'static,
    {
        let latch = Arc::new(CompletionLatch::new(completion));
        let token = self.shutdown.child_token();
        let handle = Handle::new(latch.clone(), token.clone());

        if self.is_shut_down() {
            latch.resolve(Outcome::Failed(HttpError::Closed));
            return handle;
        }

        let guard = ResolveOnDrop(Some(latch));
        self.tracker.spawn_on(
            async move {
                let outcome = tokio::select! {
                    biased;
                    () = token.cancelled() => Outcome::Cancelled,
                    result = fut => Outcome::from(result),
                };
                guard.resolve(outcome);
            },
            &self.handle,
        );
        handle
    }

    /// Cancel all tasks, wait for them to finish and stop the runtime.
    ///
    /// Idempotent. When called from one of this dispatcher's own workers the
    /// wait is skipped, since that worker is one of the tasks being awaited.
    pub(crate) fn shutdown(&self) {
        let Some(runtime) = self.runtime.lock().take() else {
            return;
        };

        self.shutdown.cancel();
        self.tracker.close();

        if WORKER_OF.with(Cell::get) == self.id {
            tracing::warn!(
                pending = self.tracker.len(),
                "client closed from its own I/O thread; not waiting for in-flight requests"
            );
        } else {
            futures::executor::block_on(self.tracker.wait());
        }

        runtime.shutdown_background();
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.get_mut().take() {
            self.shutdown.cancel();
            runtime.shutdown_background();
        }
    }
}

/// Resolves the latch with `Closed` if the task is dropped before it ran to
/// completion (runtime shut down, or the future panicked).
struct ResolveOnDrop(Option<Arc<CompletionLatch>>);

impl ResolveOnDrop {
    fn resolve(mut self, outcome: Outcome) {
        if let Some(latch) = self.0.take() {
            latch.resolve(outcome);
        }
    }
}

impl Drop for ResolveOnDrop {
    fn drop(&mut self) {
        let Some(latch) = self.0.take() else {
            return;
        };
        let error = if std::thread::panicking() {
            tracing::error!("request task panicked");
            HttpError::Transport("request task panicked".into())
        } else {
            HttpError::Closed
        };
        latch.resolve(Outcome::Failed(error));
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::Response;
    use crate::completion::from_fn;
    use http::StatusCode;
    use std::time::Duration;

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(1, "dispatch-test").unwrap()
    }

    fn recorder() -> (Box<dyn AsyncCompletion>, mpsc::Receiver<Outcome>) {
        let (tx, rx) = mpsc::channel();
        let completion = from_fn(move |outcome| {
            tx.send(outcome).unwrap();
        });
        (Box::new(completion), rx)
    }

    #[test]
    fn test_run_blocking_returns_value() {
        let dispatcher = dispatcher();
        let value = dispatcher.run_blocking(async { Ok(42) }).unwrap();
        assert_eq!(value, 42);
        dispatcher.shutdown();
    }

    #[test]
    fn test_run_blocking_after_shutdown() {
        let dispatcher = dispatcher();
        dispatcher.shutdown();
        let err = dispatcher.run_blocking(async { Ok(()) }).unwrap_err();
        assert!(matches!(err, HttpError::Closed));
    }

    #[test]
    fn test_spawn_delivers_completion() {
        let dispatcher = dispatcher();
        let (completion, rx) = recorder();
        let handle = dispatcher.spawn(async { Ok(Response::new(StatusCode::CREATED)) }, completion);

        let outcome = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(matches!(outcome, Outcome::Completed(r) if r.status() == StatusCode::CREATED));
        assert!(handle.is_resolved());
        assert!(!handle.cancel());
        dispatcher.shutdown();
    }

    #[test]
    fn test_shutdown_cancels_pending_and_waits() {
        let dispatcher = dispatcher();
        let (completion, rx) = recorder();
        let handle = dispatcher.spawn(std::future::pending(), completion);

        dispatcher.shutdown();

        // Resolution happened before shutdown returned.
        assert!(handle.is_resolved());
        assert!(matches!(rx.try_recv().unwrap(), Outcome::Cancelled));
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let dispatcher = dispatcher();
        dispatcher.shutdown();
        dispatcher.shutdown();
        assert!(dispatcher.is_shut_down());
    }

    #[test]
    fn test_spawn_after_shutdown_fails_closed() {
        let dispatcher = dispatcher();
        dispatcher.shutdown();
        let (completion, rx) = recorder();
        let handle = dispatcher.spawn(std::future::pending(), completion);
        assert!(handle.is_resolved());
        assert!(matches!(
            rx.try_recv().unwrap(),
            Outcome::Failed(HttpError::Closed)
        ));
    }

    #[test]
    fn test_sync_call_aborted_by_shutdown() {
        let dispatcher = Arc::new(dispatcher());
        let worker = {
            let dispatcher = dispatcher.clone();
            std::thread::spawn(move || dispatcher.run_blocking(std::future::pending::<Result<(), _>>()))
        };

        std::thread::sleep(Duration::from_millis(50));
        dispatcher.shutdown();

        let result = worker.join().unwrap();
        assert!(matches!(result, Err(HttpError::Closed)));
    }
}
