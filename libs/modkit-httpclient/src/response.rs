use crate::error::HttpError;
use crate::headers::Headers;
use bytes::{Bytes, BytesMut};
use http::header::{HeaderName, HeaderValue};
use http::{StatusCode, Version};
use http_body::Frame;
use http_body_util::BodyExt;
use pin_project_lite::pin_project;
use serde::de::DeserializeOwned;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Maximum body preview size for status errors (8KB).
pub const ERROR_BODY_PREVIEW_LIMIT: usize = 8 * 1024;

/// Boxed streaming body produced by a backend before buffering.
pub(crate) type ResponseBody =
    http_body_util::combinators::BoxBody<Bytes, Box<dyn std::error::Error + Send + Sync>>;

pin_project! {
    /// Body wrapper that enforces a size limit while streaming.
    ///
    /// The limit applies to decoded bytes, so a small compressed payload that
    /// expands past the limit is rejected as well.
    pub(crate) struct LimitedBody {
        #[pin]
        inner: ResponseBody,
        limit: usize,
        read: usize,
    }
}

impl LimitedBody {
    pub(crate) fn new(inner: ResponseBody, limit: usize) -> Self {
        Self {
            inner,
            limit,
            read: 0,
        }
    }

    /// Read every frame into one buffer.
    pub(crate) async fn collect_bytes(self) -> Result<Bytes, HttpError> {
        let mut body = std::pin::pin!(self);
        let mut collected = BytesMut::new();
        while let Some(frame) = body.frame().await {
            if let Ok(data) = frame?.into_data() {
                collected.extend_from_slice(&data);
            }
        }
        Ok(collected.freeze())
    }
}

impl http_body::Body for LimitedBody {
    type Data = Bytes;
    type Error = HttpError;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.project();

        match this.inner.poll_frame(cx) {
            Poll::Ready(Some(Ok(frame))) => {
                if let Some(data) = frame.data_ref() {
                    *this.read += data.len();
                    if *this.read > *this.limit {
                        return Poll::Ready(Some(Err(HttpError::BodyTooLarge {
                            limit: *this.limit,
                            actual: *this.read,
                        })));
                    }
                }
                Poll::Ready(Some(Ok(frame)))
            }
            Poll::Ready(Some(Err(e))) => Poll::Ready(Some(Err(HttpError::Transport(e)))),
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Backend-neutral HTTP response with a fully buffered body.
///
/// Backends release their connection before handing the response out, so a
/// `Response` holds no transport resources. The body accessors consume the
/// value, which makes the body readable exactly once:
/// - `resp.bytes()` - raw bytes
/// - `resp.text()` - lossy UTF-8
/// - `resp.checked_bytes()?` - bytes, failing on non-2xx status
/// - `resp.json::<T>()?` - JSON with status check
#[derive(Debug)]
pub struct Response {
    status: StatusCode,
    reason: Option<String>,
    headers: Headers,
    version: Version,
    body: Bytes,
}

impl Response {
    /// Empty `HTTP/1.1` response with the given status.
    #[must_use]
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            reason: None,
            headers: Headers::new(),
            version: Version::HTTP_11,
            body: Bytes::new(),
        }
    }

    /// Set the reason phrase reported on the status line.
    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.push(name, value);
        self
    }

    #[must_use]
    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    #[must_use]
    pub fn with_version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Reason phrase from the wire, or the canonical phrase for the status.
    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        self.reason
            .as_deref()
            .or_else(|| self.status.canonical_reason())
    }

    #[must_use]
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    #[must_use]
    pub fn version(&self) -> Version {
        self.version
    }

    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get_str(http::header::CONTENT_TYPE.as_str())
    }

    /// Body length in bytes.
    #[must_use]
    pub fn content_length(&self) -> usize {
        self.body.len()
    }

    /// Check status and return an error for non-2xx responses.
    ///
    /// # Errors
    /// Returns `HttpError::HttpStatus` with up to 8KB of the body as preview.
    pub fn error_for_status(self) -> Result<Self, HttpError> {
        if self.status.is_success() {
            return Ok(self);
        }

        let preview = &self.body[..self.body.len().min(ERROR_BODY_PREVIEW_LIMIT)];
        Err(HttpError::HttpStatus {
            status: self.status,
            body_preview: String::from_utf8_lossy(preview).into_owned(),
            content_type: self.content_type().map(String::from),
        })
    }

    /// Take the body without a status check.
    #[must_use]
    pub fn bytes(self) -> Bytes {
        self.body
    }

    /// Take the body as text without a status check.
    ///
    /// Invalid UTF-8 sequences are replaced with U+FFFD.
    #[must_use]
    pub fn text(self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Take the body, failing on non-2xx status.
    ///
    /// # Errors
    /// Returns `HttpError::HttpStatus` if status is not 2xx.
    pub fn checked_bytes(self) -> Result<Bytes, HttpError> {
        Ok(self.error_for_status()?.body)
    }

    /// Parse the body as JSON, failing on non-2xx status.
    ///
    /// # Errors
    /// Returns `HttpError::HttpStatus` if status is not 2xx.
    /// Returns `HttpError::Json` if parsing fails.
    pub fn json<T: DeserializeOwned>(self) -> Result<T, HttpError> {
        let body = self.checked_bytes()?;
        Ok(serde_json::from_slice(&body)?)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use http_body_util::Full;

    fn boxed(data: &'static [u8]) -> ResponseBody {
        Full::new(Bytes::from_static(data))
            .map_err(Into::into)
            .boxed()
    }

    #[tokio::test]
    async fn test_limited_body_within_limit() {
        let bytes = LimitedBody::new(boxed(b"hello"), 5)
            .collect_bytes()
            .await
            .unwrap();
        assert_eq!(bytes.as_ref(), b"hello");
    }

    #[tokio::test]
    async fn test_limited_body_over_limit() {
        let err = LimitedBody::new(boxed(b"hello world"), 5)
            .collect_bytes()
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            HttpError::BodyTooLarge {
                limit: 5,
                actual: 11
            }
        ));
    }

    #[test]
    fn test_reason_falls_back_to_canonical() {
        let response = Response::new(StatusCode::NOT_FOUND);
        assert_eq!(response.reason(), Some("Not Found"));

        let response = Response::new(StatusCode::OK).with_reason("UNLINK /res/1");
        assert_eq!(response.reason(), Some("UNLINK /res/1"));
    }

    #[test]
    fn test_error_for_status_success_passthrough() {
        let response = Response::new(StatusCode::NO_CONTENT);
        assert!(response.error_for_status().is_ok());
    }

    #[test]
    fn test_error_for_status_preview_bounded() {
        let body = vec![b'x'; ERROR_BODY_PREVIEW_LIMIT * 2];
        let response = Response::new(StatusCode::BAD_GATEWAY)
            .with_header(
                http::header::CONTENT_TYPE,
                HeaderValue::from_static("text/plain"),
            )
            .with_body(body);

        match response.error_for_status().unwrap_err() {
            HttpError::HttpStatus {
                status,
                body_preview,
                content_type,
            } => {
                assert_eq!(status, StatusCode::BAD_GATEWAY);
                assert_eq!(body_preview.len(), ERROR_BODY_PREVIEW_LIMIT);
                assert_eq!(content_type.as_deref(), Some("text/plain"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_json_checks_status() {
        let ok = Response::new(StatusCode::OK).with_body(r#"{"id":7}"#);
        let value: serde_json::Value = ok.json().unwrap();
        assert_eq!(value["id"], 7);

        let failed = Response::new(StatusCode::INTERNAL_SERVER_ERROR).with_body(r#"{"id":7}"#);
        let err = failed.json::<serde_json::Value>().unwrap_err();
        assert!(matches!(err, HttpError::HttpStatus { .. }));
    }

    #[test]
    fn test_text_is_lossy() {
        let response = Response::new(StatusCode::OK).with_body(vec![b'o', b'k', 0xff]);
        assert_eq!(response.text(), "ok\u{fffd}");
    }
}
