use super::dispatch::Dispatcher;
use super::pool::PoolGate;
use super::{Backend, BackendAdapter};
use crate::completion::{AsyncCompletion, Handle};
use crate::config::{HttpClientConfig, PoolConfig};
use crate::error::{HttpError, TimeoutPhase};
use crate::request::Request;
use crate::response::Response;
use http::StatusCode;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

const IO_THREAD_NAME: &str = "modkit-httpclient-mock";

/// Scripted reaction of the mock engine to one request.
#[derive(Debug)]
pub enum MockReply {
    /// Answer with this response.
    Respond(Response),
    /// Fail with this error.
    ///
    /// Cancellation belongs to the caller, so a scripted
    /// `HttpError::Cancelled` surfaces as `HttpError::Transport`.
    Fail(HttpError),
    /// Wait, then play the inner reply.
    Delay(Duration, Box<MockReply>),
    /// Never answer; only timeouts, cancellation or close end the request.
    Hang,
}

impl MockReply {
    /// `200 OK` with an empty body.
    #[must_use]
    pub fn ok() -> Self {
        Self::Respond(Response::new(StatusCode::OK))
    }

    /// Play `self` after `delay`.
    #[must_use]
    pub fn after(self, delay: Duration) -> Self {
        Self::Delay(delay, Box::new(self))
    }
}

type Responder = dyn Fn(&Request) -> MockReply + Send + Sync;

/// Shared record of every request the mock engine received, in arrival order.
#[derive(Clone, Default)]
pub struct MockJournal {
    requests: Arc<Mutex<Vec<Request>>>,
}

impl MockJournal {
    fn record(&self, request: &Request) {
        self.requests.lock().push(request.clone());
    }

    #[must_use]
    pub fn requests(&self) -> Vec<Request> {
        self.requests.lock().clone()
    }

    /// Method tokens exactly as the engine observed them.
    #[must_use]
    pub fn methods(&self) -> Vec<String> {
        self.requests
            .lock()
            .iter()
            .map(|r| r.method().as_str().to_owned())
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.requests.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.requests.lock().is_empty()
    }
}

impl fmt::Debug for MockJournal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockJournal")
            .field("len", &self.len())
            .finish()
    }
}

/// In-process transport engine for tests.
///
/// A responder closure decides the [`MockReply`] for each request. The engine
/// runs on its own I/O runtime and applies the same pool gate, read timeout,
/// body limit and cancellation rules as the real backends.
///
/// ```ignore
/// let backend = MockBackend::new(|request| {
///     if request.uri().path() == "/slow" {
///         MockReply::Hang
///     } else {
///         MockReply::ok()
///     }
/// });
/// let journal = backend.journal();
/// let client = HttpClient::builder().build_with(backend)?;
/// ```
#[derive(Clone)]
pub struct MockBackend {
    responder: Arc<Responder>,
    journal: MockJournal,
}

impl MockBackend {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&Request) -> MockReply + Send + Sync + 'static,
    {
        Self {
            responder: Arc::new(responder),
            journal: MockJournal::default(),
        }
    }

    /// Engine answering `200` with reason phrase `"<METHOD> <path>"` and the
    /// request body echoed back.
    #[must_use]
    pub fn echo() -> Self {
        Self::new(|request| {
            let target = request
                .uri()
                .path_and_query()
                .map_or("/", http::uri::PathAndQuery::as_str);
            let mut response = Response::new(StatusCode::OK)
                .with_reason(format!("{} {target}", request.method()));
            if let Some(body) = request.body() {
                if let Some(content_type) = body.content_type() {
                    response = response.with_header(http::header::CONTENT_TYPE, content_type.clone());
                }
                response = response.with_body(body.data().clone());
            }
            MockReply::Respond(response)
        })
    }

    /// Journal shared with every adapter opened from this backend.
    #[must_use]
    pub fn journal(&self) -> MockJournal {
        self.journal.clone()
    }
}

impl fmt::Debug for MockBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockBackend")
            .field("journal", &self.journal)
            .finish_non_exhaustive()
    }
}

impl Backend for MockBackend {
    type Adapter = MockAdapter;

    fn open_validated(self, config: &HttpClientConfig) -> Result<MockAdapter, HttpError> {
        let dispatcher = Dispatcher::new(config.worker_threads, IO_THREAD_NAME)?;
        Ok(MockAdapter {
            engine: Arc::new(MockEngine {
                responder: self.responder,
                journal: self.journal,
                gate: PoolGate::new(&config.pool),
                pool: config.pool.clone(),
                max_body_size: config.max_body_size,
            }),
            dispatcher,
        })
    }
}

/// Opened [`MockBackend`].
pub struct MockAdapter {
    engine: Arc<MockEngine>,
    dispatcher: Dispatcher,
}

impl fmt::Debug for MockAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockAdapter")
            .field("journal", &self.engine.journal)
            .finish_non_exhaustive()
    }
}

impl BackendAdapter for MockAdapter {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn execute(&self, request: Request) -> Result<Response, HttpError> {
        self.dispatcher
            .run_blocking(self.engine.clone().perform(request))
    }

    fn execute_async(&self, request: Request, completion: Box<dyn AsyncCompletion>) -> Handle {
        self.dispatcher
            .spawn(self.engine.clone().perform(request), completion)
    }

    fn close(&self) {
        self.dispatcher.shutdown();
        self.engine.gate.close();
    }
}

struct MockEngine {
    responder: Arc<Responder>,
    journal: MockJournal,
    gate: PoolGate,
    pool: PoolConfig,
    max_body_size: usize,
}

impl MockEngine {
    async fn perform(self: Arc<Self>, request: Request) -> Result<Response, HttpError> {
        let read_timeout = request.read_timeout().unwrap_or(self.pool.read_timeout);
        let _permit = self.gate.checkout(&request.route()).await?;

        self.journal.record(&request);
        let reply = (self.responder)(&request);
        tracing::debug!(
            backend = "mock",
            method = %request.method(),
            uri = %request.uri(),
            "mock request received"
        );

        let response = tokio::time::timeout(read_timeout, play(reply))
            .await
            .map_err(|_| HttpError::Timeout {
                phase: TimeoutPhase::Read,
            })??;

        if response.content_length() > self.max_body_size {
            return Err(HttpError::BodyTooLarge {
                limit: self.max_body_size,
                actual: response.content_length(),
            });
        }
        Ok(response)
    }
}

async fn play(mut reply: MockReply) -> Result<Response, HttpError> {
    loop {
        match reply {
            MockReply::Respond(response) => return Ok(response),
            MockReply::Fail(HttpError::Cancelled) => {
                return Err(HttpError::Transport(
                    "mock engine cannot script cancellation; use Handle::cancel".into(),
                ));
            }
            MockReply::Fail(error) => return Err(error),
            MockReply::Delay(delay, next) => {
                tokio::time::sleep(delay).await;
                reply = *next;
            }
            MockReply::Hang => return std::future::pending().await,
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::method::Method;
    use std::time::Instant;

    fn open(backend: MockBackend) -> MockAdapter {
        backend.open(&HttpClientConfig::for_testing()).unwrap()
    }

    fn get(url: &str) -> Request {
        Request::builder(Method::GET, url).build().unwrap()
    }

    #[test]
    fn test_scripted_cancellation_is_a_transport_fault() {
        let adapter = open(MockBackend::new(|_| MockReply::Fail(HttpError::Cancelled)));
        let err = adapter.execute(get("http://example.com/")).unwrap_err();
        assert!(matches!(err, HttpError::Transport(_)), "got {err:?}");
        adapter.close();
    }

    #[test]
    fn test_echo_reports_method_and_path() {
        let backend = MockBackend::echo();
        let journal = backend.journal();
        let adapter = open(backend);

        let response = adapter
            .execute(get("http://api.example.com/res/1?v=2"))
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.reason(), Some("GET /res/1?v=2"));
        assert_eq!(journal.methods(), vec!["GET"]);
        adapter.close();
    }

    #[test]
    fn test_delay_then_respond() {
        let adapter = open(MockBackend::new(|_| {
            MockReply::ok().after(Duration::from_millis(20))
        }));
        let started = Instant::now();
        let response = adapter.execute(get("http://example.com/")).unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(started.elapsed() >= Duration::from_millis(20));
        adapter.close();
    }

    #[test]
    fn test_fail_passes_error_through() {
        let adapter = open(MockBackend::new(|_| {
            MockReply::Fail(HttpError::Connection("refused".into()))
        }));
        let err = adapter.execute(get("http://example.com/")).unwrap_err();
        assert!(matches!(err, HttpError::Connection(_)));
        adapter.close();
    }

    #[test]
    fn test_hang_hits_read_timeout() {
        let adapter = open(MockBackend::new(|_| MockReply::Hang));
        let request = Request::builder(Method::GET, "http://example.com/")
            .read_timeout(Duration::from_millis(30))
            .build()
            .unwrap();
        let err = adapter.execute(request).unwrap_err();
        assert_eq!(err.timeout_phase(), Some(TimeoutPhase::Read));
        adapter.close();
    }

    #[test]
    fn test_body_limit_enforced() {
        let config = HttpClientConfig {
            max_body_size: 4,
            ..HttpClientConfig::for_testing()
        };
        let adapter = MockBackend::new(|_| {
            MockReply::Respond(Response::new(StatusCode::OK).with_body("too long"))
        })
        .open(&config)
        .unwrap();

        let err = adapter.execute(get("http://example.com/")).unwrap_err();
        assert!(matches!(err, HttpError::BodyTooLarge { limit: 4, actual: 8 }));
        adapter.close();
    }
}
