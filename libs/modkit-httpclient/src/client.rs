use crate::adapter::BackendAdapter;
use crate::builder::HttpClientBuilder;
use crate::completion::{self, AsyncCompletion, Handle};
use crate::config::{HttpClientConfig, TransportSecurity};
use crate::error::HttpError;
use crate::request::Request;
use crate::response::Response;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Backend-agnostic HTTP client.
///
/// Holds one opened backend adapter for its whole lifetime and hands every
/// request to it unchanged, whatever its method. Standard and registered
/// extension verbs go through the same path.
///
/// # Thread Safety
///
/// `HttpClient` is `Clone + Send + Sync`; clones share the adapter and its
/// connection pool. Dropping the last clone closes the client.
///
/// # Example
///
/// ```ignore
/// use modkit_httpclient::{HttpClient, Method, Request, completion};
///
/// let client = HttpClient::builder().build()?;
///
/// // Blocking
/// let request = Request::builder(Method::GET, "https://api.example.com/users").build()?;
/// let users: Vec<User> = client.send(request)?.json()?;
///
/// // Callback
/// let request = Request::builder(Method::DELETE, "https://api.example.com/users/7").build()?;
/// let handle = client.send_async(request, completion::from_fn(|outcome| {
///     tracing::info!(?outcome, "delete finished");
/// }))?;
///
/// // Future
/// let request = Request::builder(Method::GET, "https://api.example.com/health").build()?;
/// let status = client.fetch(request).await?.status();
///
/// client.close();
/// ```
#[derive(Clone)]
pub struct HttpClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    adapter: Box<dyn BackendAdapter>,
    transport: TransportSecurity,
    closed: AtomicBool,
}

impl ClientInner {
    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        tracing::debug!(backend = self.adapter.name(), "closing HTTP client");
        self.adapter.close();
    }
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        self.close();
    }
}

impl HttpClient {
    /// Create a client on the hyper backend with default configuration
    ///
    /// # Errors
    /// Returns an error if the backend cannot start
    pub fn new() -> Result<Self, HttpError> {
        HttpClientBuilder::new().build()
    }

    /// Create a builder for configuring the HTTP client
    #[must_use]
    pub fn builder() -> HttpClientBuilder {
        HttpClientBuilder::new()
    }

    pub(crate) fn from_adapter(adapter: Box<dyn BackendAdapter>, config: &HttpClientConfig) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                adapter,
                transport: config.transport,
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Name of the backend serving this client.
    #[must_use]
    pub fn backend_name(&self) -> &'static str {
        self.inner.adapter.name()
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Send `request` and block until the full response is read.
    ///
    /// Respects the pool's connect, write and read timeouts.
    ///
    /// # Errors
    /// - `HttpError::InvalidScheme` for `http://` under `TlsOnly`
    /// - `HttpError::Closed` if the client is (or gets) closed
    /// - `HttpError::Connection`, `HttpError::Timeout`, `HttpError::Transport`
    ///   for transport faults
    /// - `HttpError::BodyTooLarge` if the body exceeds `max_body_size`
    pub fn send(&self, request: Request) -> Result<Response, HttpError> {
        self.admit(&request)?;
        self.inner.adapter.execute(request)
    }

    /// Submit `request` without blocking.
    ///
    /// `completion` receives exactly one callback, on a backend thread or on
    /// the thread that cancels the returned handle.
    ///
    /// # Errors
    /// Only local admission failures are returned here (`Closed`, or
    /// `InvalidScheme` under `TlsOnly`); transport faults go to
    /// `completion.failed()`.
    pub fn send_async<C>(&self, request: Request, completion: C) -> Result<Handle, HttpError>
    where
        C: AsyncCompletion,
    {
        self.admit(&request)?;
        Ok(self
            .inner
            .adapter
            .execute_async(request, Box::new(completion)))
    }

    /// Send `request` and await the response.
    ///
    /// Dropping the returned future cancels the request.
    ///
    /// # Errors
    /// Same as [`send`](Self::send).
    pub async fn fetch(&self, request: Request) -> Result<Response, HttpError> {
        let (completion, outcome) = completion::channel();
        let handle = self.send_async(request, completion)?;
        let _cancel_on_drop = CancelOnDrop(handle);

        outcome
            .await
            .map_err(|_| HttpError::Closed)?
            .into_result()
    }

    /// Close the client.
    ///
    /// Pending asynchronous requests resolve through `cancelled()`, blocking
    /// calls in progress return `HttpError::Closed`, and this call returns
    /// once all of them have resolved and the pool is released. Idempotent;
    /// affects every clone.
    pub fn close(&self) {
        self.inner.close();
    }

    fn admit(&self, request: &Request) -> Result<(), HttpError> {
        if self.is_closed() {
            return Err(HttpError::Closed);
        }
        if self.inner.transport == TransportSecurity::TlsOnly
            && request.uri().scheme_str() == Some("http")
        {
            return Err(HttpError::InvalidScheme {
                scheme: "http".to_owned(),
                reason: "HTTPS required (transport security is TlsOnly)".to_owned(),
            });
        }
        Ok(())
    }
}

impl fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpClient")
            .field("backend", &self.backend_name())
            .field("transport", &self.inner.transport)
            .field("closed", &self.is_closed())
            .finish()
    }
}

struct CancelOnDrop(Handle);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}
