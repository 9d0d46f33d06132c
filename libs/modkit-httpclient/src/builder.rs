use crate::adapter::{Backend, HyperBackend};
use crate::client::HttpClient;
use crate::config::{
    HttpClientConfig, PoolConfig, RedirectConfig, TlsRootConfig, TransportSecurity,
};
use crate::error::HttpError;
use std::time::Duration;

/// Builder for constructing an [`HttpClient`] on a chosen backend.
///
/// [`Backend::open`] validates the configuration before the engine starts,
/// so an invalid pool never starts threads or sockets.
#[derive(Debug, Clone, Default)]
pub struct HttpClientBuilder {
    config: HttpClientConfig,
}

impl HttpClientBuilder {
    /// Create a new builder with default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a builder with a specific configuration
    #[must_use]
    pub fn with_config(config: HttpClientConfig) -> Self {
        Self { config }
    }

    /// Replace the whole connection pool configuration
    #[must_use]
    pub fn pool(mut self, pool: PoolConfig) -> Self {
        self.config.pool = pool;
        self
    }

    /// Maximum connections across all routes
    #[must_use]
    pub fn max_total(mut self, max: usize) -> Self {
        self.config.pool.max_total = max;
        self
    }

    /// Maximum connections per `scheme://host:port`
    #[must_use]
    pub fn max_per_route(mut self, max: usize) -> Self {
        self.config.pool.max_per_route = max;
        self
    }

    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.pool.connect_timeout = timeout;
        self
    }

    #[must_use]
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.config.pool.read_timeout = timeout;
        self
    }

    #[must_use]
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.config.pool.write_timeout = timeout;
        self
    }

    /// How long a request may wait for a free pooled connection
    #[must_use]
    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.config.pool.acquire_timeout = timeout;
        self
    }

    /// Idle connection eviction (`None` keeps the backend default)
    #[must_use]
    pub fn idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.pool.idle_timeout = timeout;
        self
    }

    #[must_use]
    pub fn keep_alive(mut self, enabled: bool) -> Self {
        self.config.pool.keep_alive = enabled;
        self
    }

    /// Set the User-Agent header value
    #[must_use]
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Set the maximum response body size in bytes
    #[must_use]
    pub fn max_body_size(mut self, size: usize) -> Self {
        self.config.max_body_size = size;
        self
    }

    /// Enable or disable transparent response decompression
    #[must_use]
    pub fn content_compression(mut self, enabled: bool) -> Self {
        self.config.content_compression = enabled;
        self
    }

    /// Set transport security mode
    ///
    /// Use `TransportSecurity::AllowInsecureHttp` only for testing with mock servers.
    #[must_use]
    pub fn transport(mut self, transport: TransportSecurity) -> Self {
        self.config.transport = transport;
        self
    }

    /// Allow insecure HTTP connections (for testing only)
    ///
    /// Equivalent to `.transport(TransportSecurity::AllowInsecureHttp)`.
    ///
    /// Only available in debug builds or with the `allow-insecure-http`
    /// feature, so release builds cannot enable it by accident.
    #[must_use]
    #[cfg(any(debug_assertions, feature = "allow-insecure-http"))]
    pub fn allow_insecure_http(mut self) -> Self {
        tracing::warn!(
            target: "modkit_httpclient::security",
            "allow_insecure_http() called - HTTP traffic will NOT be encrypted"
        );
        self.config.transport = TransportSecurity::AllowInsecureHttp;
        self
    }

    #[must_use]
    pub fn tls_roots(mut self, roots: TlsRootConfig) -> Self {
        self.config.tls_roots = roots;
        self
    }

    /// Follow 3xx responses inside the backend
    ///
    /// When disabled, redirect responses are returned to the caller as-is.
    #[must_use]
    pub fn follow_redirects(mut self, enabled: bool) -> Self {
        self.config.redirect.follow = enabled;
        self
    }

    /// Maximum redirects followed per request
    #[must_use]
    pub fn max_redirects(mut self, max_redirects: usize) -> Self {
        self.config.redirect.max_redirects = max_redirects;
        self
    }

    /// Replace the whole redirect policy
    ///
    /// ```rust,ignore
    /// let client = HttpClient::builder()
    ///     .redirect(RedirectConfig::permissive())
    ///     .build()?;
    /// ```
    #[must_use]
    pub fn redirect(mut self, config: RedirectConfig) -> Self {
        self.config.redirect = config;
        self
    }

    /// Number of backend I/O threads
    #[must_use]
    pub fn worker_threads(mut self, threads: usize) -> Self {
        self.config.worker_threads = threads;
        self
    }

    /// Current configuration
    #[must_use]
    pub fn config(&self) -> &HttpClientConfig {
        &self.config
    }

    /// Build a client on the [`HyperBackend`].
    ///
    /// # Errors
    /// Returns `HttpError::Config` for invalid configuration, or
    /// `HttpError::Connection` if the backend cannot start.
    pub fn build(self) -> Result<HttpClient, HttpError> {
        self.build_with(HyperBackend)
    }

    /// Build a client on `backend`.
    ///
    /// # Errors
    /// Returns `HttpError::Config` for invalid configuration (the backend is
    /// not opened), or the backend's open error.
    pub fn build_with<B: Backend>(self, backend: B) -> Result<HttpClient, HttpError> {
        if self.config.transport == TransportSecurity::AllowInsecureHttp {
            tracing::warn!(
                "insecure HTTP enabled (TransportSecurity::AllowInsecureHttp); \
                 use only for testing with mock servers"
            );
        }

        let adapter = backend.open(&self.config)?;
        Ok(HttpClient::from_adapter(Box::new(adapter), &self.config))
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::adapter::{BackendAdapter, MockBackend};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Backend that records whether its engine was started.
    struct OpenRecorder(Arc<AtomicBool>);

    impl Backend for OpenRecorder {
        type Adapter = <MockBackend as Backend>::Adapter;

        fn open_validated(self, config: &HttpClientConfig) -> Result<Self::Adapter, HttpError> {
            self.0.store(true, Ordering::SeqCst);
            MockBackend::echo().open_validated(config)
        }
    }

    #[test]
    fn test_builder_default() {
        let builder = HttpClientBuilder::new();
        assert_eq!(builder.config().pool, PoolConfig::default());
        assert_eq!(builder.config().transport, TransportSecurity::TlsOnly);
    }

    #[test]
    fn test_builder_setters() {
        let builder = HttpClientBuilder::new()
            .max_total(10)
            .max_per_route(5)
            .connect_timeout(Duration::from_secs(1))
            .read_timeout(Duration::from_secs(2))
            .write_timeout(Duration::from_secs(3))
            .acquire_timeout(Duration::from_secs(4))
            .idle_timeout(None)
            .keep_alive(false)
            .user_agent("test/1.0")
            .max_body_size(1024)
            .content_compression(false)
            .tls_roots(TlsRootConfig::Native)
            .follow_redirects(false)
            .max_redirects(3)
            .worker_threads(3);

        let config = builder.config();
        assert_eq!(config.pool.max_total, 10);
        assert_eq!(config.pool.max_per_route, 5);
        assert_eq!(config.pool.connect_timeout, Duration::from_secs(1));
        assert_eq!(config.pool.read_timeout, Duration::from_secs(2));
        assert_eq!(config.pool.write_timeout, Duration::from_secs(3));
        assert_eq!(config.pool.acquire_timeout, Duration::from_secs(4));
        assert_eq!(config.pool.idle_timeout, None);
        assert!(!config.pool.keep_alive);
        assert_eq!(config.user_agent, "test/1.0");
        assert_eq!(config.max_body_size, 1024);
        assert!(!config.content_compression);
        assert_eq!(config.tls_roots, TlsRootConfig::Native);
        assert_eq!(config.worker_threads, 3);
        assert!(!config.redirect.follow);
        assert_eq!(config.redirect.max_redirects, 3);

        let permissive = HttpClientBuilder::new().redirect(RedirectConfig::permissive());
        assert!(!permissive.config().redirect.same_origin_only);
    }

    #[test]
    fn test_invalid_pool_never_opens_backend() {
        let opened = Arc::new(AtomicBool::new(false));
        let result = HttpClientBuilder::new()
            .max_total(10)
            .max_per_route(20)
            .build_with(OpenRecorder(opened.clone()));

        match result {
            Err(HttpError::Config { field, .. }) => assert_eq!(field, "max_per_route"),
            Err(other) => panic!("unexpected error: {other:?}"),
            Ok(_) => panic!("invalid configuration must be rejected"),
        }
        assert!(!opened.load(Ordering::SeqCst));
    }

    #[test]
    fn test_valid_config_opens_backend() {
        let opened = Arc::new(AtomicBool::new(false));
        let client = HttpClientBuilder::with_config(HttpClientConfig::minimal())
            .build_with(OpenRecorder(opened.clone()))
            .unwrap();
        assert!(opened.load(Ordering::SeqCst));
        assert_eq!(client.backend_name(), "mock");
        client.close();
    }

    #[test]
    fn test_open_rejects_invalid_config_directly() {
        let config = HttpClientConfig {
            pool: PoolConfig {
                max_total: 10,
                max_per_route: 20,
                ..PoolConfig::default()
            },
            ..HttpClientConfig::for_testing()
        };

        let opened = Arc::new(AtomicBool::new(false));
        let err = OpenRecorder(opened.clone()).open(&config).unwrap_err();
        assert!(matches!(err, HttpError::Config { field: "max_per_route", .. }));
        assert!(!opened.load(Ordering::SeqCst));

        assert!(matches!(
            MockBackend::echo().open(&config),
            Err(HttpError::Config { field: "max_per_route", .. })
        ));
        assert!(matches!(
            HyperBackend.open(&config),
            Err(HttpError::Config { field: "max_per_route", .. })
        ));
    }

    #[test]
    fn test_build_hyper_backend() {
        let client = HttpClientBuilder::new().build().unwrap();
        assert_eq!(client.backend_name(), "hyper");
        client.close();
    }

    #[test]
    fn test_adapter_trait_object() {
        let adapter: Box<dyn BackendAdapter> =
            Box::new(MockBackend::echo().open(&HttpClientConfig::minimal()).unwrap());
        assert_eq!(adapter.name(), "mock");
        adapter.close();
    }

    /// `AllowInsecureHttp` emits a warning during `build()`
    #[test]
    fn test_insecure_http_warning_emitted() {
        use std::sync::Mutex;
        use tracing_subscriber::layer::SubscriberExt;

        #[derive(Clone, Default)]
        struct WarningCapture {
            warnings: Arc<Mutex<Vec<String>>>,
        }

        impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for WarningCapture {
            fn on_event(
                &self,
                event: &tracing::Event<'_>,
                _ctx: tracing_subscriber::layer::Context<'_, S>,
            ) {
                if *event.metadata().level() == tracing::Level::WARN {
                    let mut visitor = MessageVisitor(String::new());
                    event.record(&mut visitor);
                    self.warnings.lock().unwrap().push(visitor.0);
                }
            }
        }

        struct MessageVisitor(String);
        impl tracing::field::Visit for MessageVisitor {
            fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
                if field.name() == "message" {
                    self.0 = format!("{value:?}");
                }
            }
        }

        let capture = WarningCapture::default();
        let warnings = capture.warnings.clone();
        let subscriber = tracing_subscriber::registry().with(capture);

        tracing::subscriber::with_default(subscriber, || {
            let client = HttpClientBuilder::new()
                .allow_insecure_http()
                .build_with(MockBackend::echo())
                .unwrap();
            client.close();
        });

        let captured = warnings.lock().unwrap();
        assert!(
            captured
                .iter()
                .any(|w| w.contains("insecure HTTP") || w.contains("HTTP traffic")),
            "warning should mention insecure HTTP: {:?}",
            *captured
        );
    }
}
