use std::fmt;
use thiserror::Error;

/// Boxed backend-native error kept as a diagnostic source.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Classification of URL validation failures.
///
/// Provides programmatic matching for different failure modes without
/// relying on unstable error message strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum InvalidUriKind {
    /// URL could not be parsed (malformed syntax)
    ParseError,
    /// URL is missing required host/authority component
    MissingAuthority,
    /// URL is missing required scheme (http/https)
    MissingScheme,
}

/// Request phase during which a configured timeout elapsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeoutPhase {
    /// Establishing the TCP/TLS connection
    Connect,
    /// Waiting for the response head or body
    Read,
    /// Handing the request head and body to the connection
    Write,
}

impl fmt::Display for TimeoutPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let phase = match self {
            Self::Connect => "connect",
            Self::Read => "read",
            Self::Write => "write",
        };
        f.write_str(phase)
    }
}

/// HTTP client error types
///
/// Every backend translates its native failures into one of these variants
/// before they leave the adapter, so callers never see engine types.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum HttpError {
    /// Invalid client or connection pool configuration (raised at build time only)
    #[error("Invalid configuration for '{field}': {reason}")]
    Config {
        /// Name of the offending configuration field
        field: &'static str,
        /// Why the value was rejected
        reason: String,
    },

    /// Failed to establish or acquire a pooled connection
    #[error("Connection error: {0}")]
    Connection(#[source] BoxError),

    /// A configured timeout elapsed
    #[error("{phase} timeout elapsed")]
    Timeout {
        /// Phase in which the timeout fired
        phase: TimeoutPhase,
    },

    /// Transport error (I/O or protocol fault after the connection was acquired)
    #[error("Transport error: {0}")]
    Transport(#[source] BoxError),

    /// Request was cancelled through its handle
    #[error("Request cancelled")]
    Cancelled,

    /// Client was closed before or while the request ran
    #[error("HTTP client is closed")]
    Closed,

    /// Method name is not a valid HTTP token
    #[error("Invalid HTTP method '{name}': {reason}")]
    InvalidMethod {
        /// The rejected method name
        name: String,
        /// Why the name is not a valid token
        reason: &'static str,
    },

    /// Method name is not present in the registry
    #[error("Unknown HTTP method '{0}'")]
    UnknownMethod(String),

    /// The process-wide method registry was already installed with different verbs
    #[error("Method registry is already initialized; missing verbs: {missing:?}")]
    RegistrySealed {
        /// Verbs that could not be added after initialization
        missing: Vec<String>,
    },

    /// Request building failed
    #[error("Failed to build request: {0}")]
    RequestBuild(#[from] http::Error),

    /// Invalid header name
    #[error("Invalid header name: {0}")]
    InvalidHeaderName(#[from] http::header::InvalidHeaderName),

    /// Invalid header value
    #[error("Invalid header value: {0}")]
    InvalidHeaderValue(#[from] http::header::InvalidHeaderValue),

    /// Response body exceeded size limit
    #[error("Response body too large: limit {limit} bytes, got {actual} bytes")]
    BodyTooLarge { limit: usize, actual: usize },

    /// HTTP non-2xx status
    #[error("HTTP {status}: {body_preview}")]
    HttpStatus {
        status: http::StatusCode,
        body_preview: String,
        content_type: Option<String>,
    },

    /// JSON encoding or parsing error
    #[error("JSON processing failed: {0}")]
    Json(#[from] serde_json::Error),

    /// Form URL encoding error
    #[error("Form encoding failed: {0}")]
    FormEncode(#[from] serde_urlencoded::ser::Error),

    /// Invalid URL (failed to parse)
    ///
    /// Use the `kind` field for programmatic matching. The `reason` field contains
    /// a diagnostic message intended for logging only.
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUri {
        /// The URL that failed to parse
        url: String,
        /// Structured failure classification for programmatic matching
        kind: InvalidUriKind,
        /// Diagnostic message (unstable format, for logging only)
        reason: String,
    },

    /// Invalid URL scheme for transport security configuration
    #[error("URL scheme '{scheme}' not allowed: {reason}")]
    InvalidScheme {
        /// The URL scheme that was rejected
        scheme: String,
        /// Reason the scheme was rejected
        reason: String,
    },
}

impl HttpError {
    /// Build a configuration error for `field`.
    pub(crate) fn config(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Config {
            field,
            reason: reason.into(),
        }
    }

    /// Phase of the elapsed timeout, if this is a timeout error.
    #[must_use]
    pub fn timeout_phase(&self) -> Option<TimeoutPhase> {
        match self {
            Self::Timeout { phase } => Some(*phase),
            _ => None,
        }
    }

    /// Whether the request never produced a response because of a
    /// connection, timeout or transport fault.
    #[must_use]
    pub fn is_transport_fault(&self) -> bool {
        matches!(
            self,
            Self::Connection(_) | Self::Timeout { .. } | Self::Transport(_)
        )
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use std::error::Error;

    #[derive(Debug)]
    struct TestError(&'static str);

    impl fmt::Display for TestError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}", self.0)
        }
    }

    impl Error for TestError {}

    #[test]
    fn test_transport_error_preserves_source() {
        let err = HttpError::Transport(Box::new(TestError("connection reset")));

        let source = err.source().expect("transport error should have a source");
        let downcast = source.downcast_ref::<TestError>();
        assert_eq!(downcast.map(|e| e.0), Some("connection reset"));
    }

    #[test]
    fn test_connection_error_chain_traversal() {
        let err = HttpError::Connection(Box::new(TestError("connection refused")));

        let mut count = 0;
        let mut current: Option<&(dyn Error + 'static)> = Some(&err);
        while let Some(e) = current {
            count += 1;
            current = e.source();
        }

        assert_eq!(count, 2, "HttpError and TestError should be in the chain");
    }

    #[test]
    fn test_timeout_display_names_phase() {
        let err = HttpError::Timeout {
            phase: TimeoutPhase::Read,
        };
        assert_eq!(err.to_string(), "read timeout elapsed");
        assert_eq!(err.timeout_phase(), Some(TimeoutPhase::Read));
    }

    #[test]
    fn test_config_error_names_field() {
        let err = HttpError::config("max_per_route", "must not exceed max_total (10)");
        match &err {
            HttpError::Config { field, .. } => assert_eq!(*field, "max_per_route"),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.to_string().contains("max_per_route"));
    }

    #[test]
    fn test_transport_fault_classification() {
        assert!(HttpError::Timeout {
            phase: TimeoutPhase::Connect
        }
        .is_transport_fault());
        assert!(HttpError::Connection(Box::new(TestError("refused"))).is_transport_fault());
        assert!(!HttpError::Cancelled.is_transport_fault());
        assert!(!HttpError::Closed.is_transport_fault());
        assert!(!HttpError::UnknownMethod("FOO".to_owned()).is_transport_fault());
    }
}
