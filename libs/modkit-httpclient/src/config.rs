use crate::error::HttpError;
use std::time::Duration;

/// Default User-Agent header value
pub const DEFAULT_USER_AGENT: &str = concat!("modkit-httpclient/", env!("CARGO_PKG_VERSION"));

/// Default maximum response body size (10 MB)
pub const DEFAULT_MAX_BODY_SIZE: usize = 10 * 1024 * 1024;

/// TLS root certificate configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[non_exhaustive]
pub enum TlsRootConfig {
    /// Use Mozilla's root certificates (webpki-roots, no OS dependency)
    #[default]
    WebPki,
    /// Use OS native root certificate store
    Native,
}

/// Transport security configuration
///
/// Controls whether the client enforces TLS or allows insecure HTTP.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[non_exhaustive]
pub enum TransportSecurity {
    /// Require TLS for all connections (HTTPS only) - default and recommended
    #[default]
    TlsOnly,
    /// Allow insecure HTTP connections (for testing with mock servers only)
    ///
    /// **WARNING**: This should only be used for local testing with mock servers.
    /// Never use in production as it exposes traffic to interception.
    AllowInsecureHttp,
}

/// Connection pool configuration
///
/// Backend-neutral pooling and timeout parameters. Each backend maps them to
/// its own settings when the client is opened; this type only validates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Maximum connections across all routes (default: 5000)
    pub max_total: usize,

    /// Maximum connections to a single `scheme://host:port` (default: 500)
    ///
    /// Must not exceed `max_total`.
    pub max_per_route: usize,

    /// How long an unused pooled connection is kept (default: 90 seconds)
    ///
    /// `None` keeps the backend's own default.
    pub idle_timeout: Option<Duration>,

    /// Time allowed for TCP connect and TLS handshake (default: 3 seconds)
    pub connect_timeout: Duration,

    /// Time allowed for the response head and body (default: 3 seconds)
    ///
    /// Requests may override it with `RequestBuilder::read_timeout`.
    pub read_timeout: Duration,

    /// Time allowed to hand the request to the connection (default: 3 seconds)
    pub write_timeout: Duration,

    /// Time a request may wait for a free connection slot (default: 5 seconds)
    pub acquire_timeout: Duration,

    /// Reuse connections between requests (default: true)
    pub keep_alive: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_total: 5000,
            max_per_route: 500,
            idle_timeout: Some(Duration::from_secs(90)),
            connect_timeout: Duration::from_secs(3),
            read_timeout: Duration::from_secs(3),
            write_timeout: Duration::from_secs(3),
            acquire_timeout: Duration::from_secs(5),
            keep_alive: true,
        }
    }
}

impl PoolConfig {
    /// Check limits and timeouts.
    ///
    /// # Errors
    /// Returns `HttpError::Config` naming the first offending field.
    pub fn validate(&self) -> Result<(), HttpError> {
        if self.max_total == 0 {
            return Err(HttpError::config("max_total", "must be at least 1"));
        }
        if self.max_per_route == 0 {
            return Err(HttpError::config("max_per_route", "must be at least 1"));
        }
        if self.max_per_route > self.max_total {
            return Err(HttpError::config(
                "max_per_route",
                format!(
                    "{} exceeds max_total ({})",
                    self.max_per_route, self.max_total
                ),
            ));
        }
        if self.idle_timeout.is_some_and(|t| t.is_zero()) {
            return Err(HttpError::config("idle_timeout", "must be greater than zero"));
        }

        let timeouts = [
            ("connect_timeout", self.connect_timeout),
            ("read_timeout", self.read_timeout),
            ("write_timeout", self.write_timeout),
            ("acquire_timeout", self.acquire_timeout),
        ];
        for (field, value) in timeouts {
            if value.is_zero() {
                return Err(HttpError::config(field, "must be greater than zero"));
            }
        }

        Ok(())
    }
}

/// Redirect handling
///
/// Redirects are followed inside the backend, so the caller sees only the
/// final response. A 3xx that is not followed is returned as-is.
///
/// Relative `Location` values are resolved against the request URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectConfig {
    /// Follow 3xx responses at all (default: true)
    pub follow: bool,

    /// Maximum redirects followed per request (default: 10)
    pub max_redirects: usize,

    /// Follow a redirect back to a URI already visited by this request (default: false)
    ///
    /// When `false`, the chain stops at the first repeated location and the
    /// redirect response is returned.
    pub allow_circular: bool,

    /// Only follow redirects to the same scheme, host and port (default: true)
    pub same_origin_only: bool,

    /// Remove `Authorization`, `Cookie` and `Proxy-Authorization` once the
    /// chain leaves the original origin (default: true)
    pub strip_sensitive_headers: bool,

    /// Follow HTTPS to HTTP redirects (default: false)
    pub allow_https_downgrade: bool,
}

impl Default for RedirectConfig {
    fn default() -> Self {
        Self {
            follow: true,
            max_redirects: 10,
            allow_circular: false,
            same_origin_only: true,
            strip_sensitive_headers: true,
            allow_https_downgrade: false,
        }
    }
}

impl RedirectConfig {
    /// Follow redirects to any origin, still stripping credentials and
    /// refusing downgrades
    #[must_use]
    pub fn permissive() -> Self {
        Self {
            same_origin_only: false,
            ..Self::default()
        }
    }

    /// Return every 3xx response to the caller
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            follow: false,
            max_redirects: 0,
            ..Self::default()
        }
    }
}

/// Overall HTTP client configuration
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Connection pool limits and timeouts
    pub pool: PoolConfig,

    /// User-Agent header value, added when a request has none
    pub user_agent: String,

    /// Maximum response body size in bytes (default: 10 MB)
    ///
    /// Applies to decompressed bytes.
    pub max_body_size: usize,

    /// Transparent gzip/brotli/deflate decoding (default: true)
    pub content_compression: bool,

    /// Transport security mode (default: `TlsOnly`)
    ///
    /// Use `AllowInsecureHttp` only for testing with local mock servers.
    pub transport: TransportSecurity,

    /// TLS root certificate strategy (default: `WebPki`)
    pub tls_roots: TlsRootConfig,

    /// Worker threads of the backend I/O runtime (default: 2)
    pub worker_threads: usize,

    /// How 3xx responses are followed
    pub redirect: RedirectConfig,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            pool: PoolConfig::default(),
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            content_compression: true,
            transport: TransportSecurity::TlsOnly,
            tls_roots: TlsRootConfig::default(),
            worker_threads: 2,
            redirect: RedirectConfig::default(),
        }
    }
}

impl HttpClientConfig {
    /// Create minimal configuration (small pool, short timeouts, one I/O thread)
    #[must_use]
    pub fn minimal() -> Self {
        Self {
            pool: PoolConfig {
                max_total: 16,
                max_per_route: 4,
                idle_timeout: Some(Duration::from_secs(30)),
                connect_timeout: Duration::from_secs(2),
                read_timeout: Duration::from_secs(5),
                write_timeout: Duration::from_secs(5),
                acquire_timeout: Duration::from_secs(2),
                keep_alive: true,
            },
            max_body_size: 1024 * 1024, // 1 MB
            worker_threads: 1,
            ..Self::default()
        }
    }

    /// Create configuration for testing with mock servers (allows insecure HTTP)
    ///
    /// **WARNING**: This configuration allows plain HTTP connections.
    /// Use only for local testing with mock servers, never in production.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            pool: PoolConfig {
                max_total: 64,
                max_per_route: 16,
                idle_timeout: Some(Duration::from_secs(10)),
                connect_timeout: Duration::from_secs(5),
                read_timeout: Duration::from_secs(10),
                write_timeout: Duration::from_secs(10),
                acquire_timeout: Duration::from_secs(10),
                keep_alive: true,
            },
            max_body_size: 1024 * 1024, // 1 MB
            transport: TransportSecurity::AllowInsecureHttp,
            ..Self::default()
        }
    }

    /// Check the pool and the client-wide settings.
    ///
    /// # Errors
    /// Returns `HttpError::Config` naming the first offending field.
    pub fn validate(&self) -> Result<(), HttpError> {
        self.pool.validate()?;
        if self.worker_threads == 0 {
            return Err(HttpError::config("worker_threads", "must be at least 1"));
        }
        if self.max_body_size == 0 {
            return Err(HttpError::config("max_body_size", "must be at least 1"));
        }
        if http::HeaderValue::try_from(self.user_agent.as_str()).is_err() {
            return Err(HttpError::config("user_agent", "not a valid header value"));
        }
        Ok(())
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    fn field_of(err: HttpError) -> &'static str {
        match err {
            HttpError::Config { field, .. } => field,
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    fn test_redirect_presets() {
        let default = RedirectConfig::default();
        assert!(default.follow);
        assert_eq!(default.max_redirects, 10);
        assert!(!default.allow_circular);
        assert!(default.same_origin_only);

        assert!(!RedirectConfig::permissive().same_origin_only);
        assert!(RedirectConfig::permissive().strip_sensitive_headers);
        assert!(!RedirectConfig::disabled().follow);
        assert_eq!(HttpClientConfig::default().redirect, RedirectConfig::default());
    }

    #[test]
    fn test_pool_defaults() {
        let pool = PoolConfig::default();
        assert_eq!(pool.max_total, 5000);
        assert_eq!(pool.max_per_route, 500);
        assert_eq!(pool.connect_timeout, Duration::from_secs(3));
        assert_eq!(pool.read_timeout, Duration::from_secs(3));
        assert_eq!(pool.write_timeout, Duration::from_secs(3));
        assert_eq!(pool.acquire_timeout, Duration::from_secs(5));
        assert_eq!(pool.idle_timeout, Some(Duration::from_secs(90)));
        assert!(pool.keep_alive);
        assert!(pool.validate().is_ok());
    }

    #[test]
    fn test_per_route_above_total_rejected() {
        let pool = PoolConfig {
            max_total: 10,
            max_per_route: 20,
            ..PoolConfig::default()
        };
        assert_eq!(field_of(pool.validate().unwrap_err()), "max_per_route");
    }

    #[test]
    fn test_per_route_equal_total_accepted() {
        let pool = PoolConfig {
            max_total: 10,
            max_per_route: 10,
            ..PoolConfig::default()
        };
        assert!(pool.validate().is_ok());
    }

    #[test]
    fn test_zero_limits_rejected() {
        let pool = PoolConfig {
            max_total: 0,
            ..PoolConfig::default()
        };
        assert_eq!(field_of(pool.validate().unwrap_err()), "max_total");

        let pool = PoolConfig {
            max_per_route: 0,
            ..PoolConfig::default()
        };
        assert_eq!(field_of(pool.validate().unwrap_err()), "max_per_route");
    }

    #[test]
    fn test_zero_timeouts_rejected() {
        let cases: [(&str, fn(&mut PoolConfig)); 5] = [
            ("connect_timeout", |p| p.connect_timeout = Duration::ZERO),
            ("read_timeout", |p| p.read_timeout = Duration::ZERO),
            ("write_timeout", |p| p.write_timeout = Duration::ZERO),
            ("acquire_timeout", |p| p.acquire_timeout = Duration::ZERO),
            ("idle_timeout", |p| p.idle_timeout = Some(Duration::ZERO)),
        ];
        for (expected, mutate) in cases {
            let mut pool = PoolConfig::default();
            mutate(&mut pool);
            assert_eq!(field_of(pool.validate().unwrap_err()), expected);
        }
    }

    #[test]
    fn test_client_config_presets_valid() {
        assert!(HttpClientConfig::default().validate().is_ok());
        assert!(HttpClientConfig::minimal().validate().is_ok());

        let testing = HttpClientConfig::for_testing();
        assert!(testing.validate().is_ok());
        assert_eq!(testing.transport, TransportSecurity::AllowInsecureHttp);
    }

    #[test]
    fn test_client_config_defaults() {
        let config = HttpClientConfig::default();
        assert_eq!(config.transport, TransportSecurity::TlsOnly);
        assert_eq!(config.tls_roots, TlsRootConfig::WebPki);
        assert_eq!(config.max_body_size, DEFAULT_MAX_BODY_SIZE);
        assert_eq!(config.worker_threads, 2);
        assert!(config.content_compression);
        assert!(config.user_agent.starts_with("modkit-httpclient/"));
    }

    #[test]
    fn test_client_config_rejects_zero_workers_and_body_size() {
        let config = HttpClientConfig {
            worker_threads: 0,
            ..HttpClientConfig::default()
        };
        assert_eq!(field_of(config.validate().unwrap_err()), "worker_threads");

        let config = HttpClientConfig {
            max_body_size: 0,
            ..HttpClientConfig::default()
        };
        assert_eq!(field_of(config.validate().unwrap_err()), "max_body_size");
    }

    #[test]
    fn test_client_config_rejects_bad_user_agent() {
        let config = HttpClientConfig {
            user_agent: "bad\nagent".to_owned(),
            ..HttpClientConfig::default()
        };
        assert_eq!(field_of(config.validate().unwrap_err()), "user_agent");
    }

    #[test]
    fn test_pool_errors_surface_through_client_config() {
        let mut config = HttpClientConfig::default();
        config.pool.max_total = 10;
        config.pool.max_per_route = 20;
        assert_eq!(field_of(config.validate().unwrap_err()), "max_per_route");
    }
}
