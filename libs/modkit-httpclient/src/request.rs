use crate::error::{HttpError, InvalidUriKind};
use crate::headers::Headers;
use crate::method::Method;
use bytes::Bytes;
use http::header::{HeaderName, HeaderValue};
use http::{Uri, Version};
use serde::Serialize;
use std::time::Duration;

/// Request payload: opaque bytes plus their media type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Body {
    data: Bytes,
    content_type: Option<HeaderValue>,
}

impl Body {
    #[must_use]
    pub fn new(data: impl Into<Bytes>, content_type: Option<HeaderValue>) -> Self {
        Self {
            data: data.into(),
            content_type,
        }
    }

    #[must_use]
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    #[must_use]
    pub fn content_type(&self) -> Option<&HeaderValue> {
        self.content_type.as_ref()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Immutable, backend-neutral HTTP request.
///
/// Built and validated through [`Request::builder`]. A request never changes
/// after `build()`; derive a modified copy with [`Request::to_builder`].
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    uri: Uri,
    headers: Headers,
    body: Option<Body>,
    version: Option<Version>,
    read_timeout: Option<Duration>,
}

impl Request {
    /// Start building a request for `url`.
    ///
    /// The URL is parsed and checked in [`RequestBuilder::build`].
    pub fn builder(method: Method, url: impl Into<String>) -> RequestBuilder {
        RequestBuilder {
            method,
            url: url.into(),
            query: Vec::new(),
            headers: Headers::new(),
            body: None,
            version: None,
            read_timeout: None,
            error: None,
        }
    }

    /// Copy this request into a new builder.
    pub fn to_builder(&self) -> RequestBuilder {
        RequestBuilder {
            method: self.method.clone(),
            url: self.uri.to_string(),
            query: Vec::new(),
            headers: self.headers.clone(),
            body: self.body.clone(),
            version: self.version,
            read_timeout: self.read_timeout,
            error: None,
        }
    }

    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    #[must_use]
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    #[must_use]
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    #[must_use]
    pub fn body(&self) -> Option<&Body> {
        self.body.as_ref()
    }

    /// Protocol version hint. Backends may negotiate a different one.
    #[must_use]
    pub fn version(&self) -> Option<Version> {
        self.version
    }

    /// Per-request read timeout overriding the pool default.
    #[must_use]
    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout
    }

    /// `scheme://authority` used to group connections per route.
    pub(crate) fn route(&self) -> String {
        match (self.uri.scheme_str(), self.uri.authority()) {
            (Some(scheme), Some(authority)) => format!("{scheme}://{authority}"),
            _ => self.uri.to_string(),
        }
    }
}

/// Fluent builder for [`Request`].
///
/// Invalid header names or values are recorded and reported by
/// [`build()`](RequestBuilder::build), so chains stay infallible until then.
///
/// # Example
///
/// ```ignore
/// use modkit_httpclient::{Method, Request};
///
/// let request = Request::builder(Method::POST, "https://api.example.com/users")
///     .header("x-request-id", "abc123")
///     .query(&[("dry_run", "true")])
///     .json(&NewUser { name: "Alice" })
///     .build()?;
/// ```
#[must_use = "RequestBuilder does nothing until .build() is called"]
#[derive(Debug)]
pub struct RequestBuilder {
    method: Method,
    url: String,
    query: Vec<(String, String)>,
    headers: Headers,
    body: Option<Body>,
    version: Option<Version>,
    read_timeout: Option<Duration>,
    /// First error captured while chaining (reported by `build()`)
    error: Option<HttpError>,
}

impl RequestBuilder {
    /// Append a header. Repeated names are kept in order.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        if self.error.is_some() {
            return self;
        }

        match (HeaderName::try_from(name), HeaderValue::try_from(value)) {
            (Ok(name), Ok(value)) => self.headers.push(name, value),
            (Err(e), _) => self.error = Some(HttpError::InvalidHeaderName(e)),
            (_, Err(e)) => self.error = Some(HttpError::InvalidHeaderValue(e)),
        }
        self
    }

    /// Append several headers in order.
    pub fn headers<I, N, V>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (N, V)>,
        N: AsRef<str>,
        V: AsRef<str>,
    {
        for (name, value) in headers {
            self = self.header(name.as_ref(), value.as_ref());
        }
        self
    }

    /// Append URL-encoded query parameters to the target URI.
    pub fn query<K, V>(mut self, params: &[(K, V)]) -> Self
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        self.query.extend(
            params
                .iter()
                .map(|(k, v)| (k.as_ref().to_owned(), v.as_ref().to_owned())),
        );
        self
    }

    /// Set raw body bytes with an optional content type.
    pub fn body(mut self, data: impl Into<Bytes>, content_type: Option<&str>) -> Self {
        if self.error.is_some() {
            return self;
        }

        let content_type = match content_type.map(HeaderValue::try_from).transpose() {
            Ok(ct) => ct,
            Err(e) => {
                self.error = Some(HttpError::InvalidHeaderValue(e));
                return self;
            }
        };
        self.body = Some(Body::new(data, content_type));
        self
    }

    /// Set raw body bytes without a content type.
    pub fn body_bytes(mut self, data: impl Into<Bytes>) -> Self {
        self.body = Some(Body::new(data, None));
        self
    }

    /// Serialize `value` as the JSON body (`application/json`).
    pub fn json<T: Serialize + ?Sized>(mut self, value: &T) -> Self {
        if self.error.is_some() {
            return self;
        }

        match serde_json::to_vec(value) {
            Ok(bytes) => {
                self.body = Some(Body::new(
                    bytes,
                    Some(HeaderValue::from_static("application/json")),
                ));
            }
            Err(e) => self.error = Some(HttpError::Json(e)),
        }
        self
    }

    /// Encode `fields` as the form body (`application/x-www-form-urlencoded`).
    pub fn form<T: Serialize + ?Sized>(mut self, fields: &T) -> Self {
        if self.error.is_some() {
            return self;
        }

        match serde_urlencoded::to_string(fields) {
            Ok(encoded) => {
                self.body = Some(Body::new(
                    encoded,
                    Some(HeaderValue::from_static(
                        "application/x-www-form-urlencoded",
                    )),
                ));
            }
            Err(e) => self.error = Some(HttpError::FormEncode(e)),
        }
        self
    }

    pub fn version(mut self, version: Version) -> Self {
        self.version = Some(version);
        self
    }

    /// Override the pool read timeout for this request only.
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    /// Validate and freeze the request.
    ///
    /// # Errors
    /// Returns the first header or body error recorded while chaining,
    /// `HttpError::InvalidUri` if the URL is malformed or not absolute,
    /// `HttpError::InvalidScheme` for schemes other than `http`/`https`, and
    /// `HttpError::Config` for a zero read timeout.
    pub fn build(mut self) -> Result<Request, HttpError> {
        if let Some(e) = self.error.take() {
            return Err(e);
        }

        let url = self.url_with_query()?;
        let uri = validate_url(&url)?;

        if self.read_timeout.is_some_and(|t| t.is_zero()) {
            return Err(HttpError::config("read_timeout", "must be greater than zero"));
        }

        Ok(Request {
            method: self.method,
            uri,
            headers: self.headers,
            body: self.body,
            version: self.version,
            read_timeout: self.read_timeout,
        })
    }

    fn url_with_query(&self) -> Result<String, HttpError> {
        if self.query.is_empty() {
            return Ok(self.url.clone());
        }

        let encoded = serde_urlencoded::to_string(&self.query)?;
        let (base, fragment) = match self.url.split_once('#') {
            Some((base, fragment)) => (base, Some(fragment)),
            None => (self.url.as_str(), None),
        };
        let separator = if !base.contains('?') {
            "?"
        } else if base.ends_with('?') || base.ends_with('&') {
            ""
        } else {
            "&"
        };

        let mut url = format!("{base}{separator}{encoded}");
        if let Some(fragment) = fragment {
            url.push('#');
            url.push_str(fragment);
        }
        Ok(url)
    }
}

/// Parse `url` and require an absolute `http`/`https` URI.
fn validate_url(url: &str) -> Result<Uri, HttpError> {
    let uri: Uri = url
        .parse()
        .map_err(|e: http::uri::InvalidUri| HttpError::InvalidUri {
            url: url.to_owned(),
            kind: InvalidUriKind::ParseError,
            reason: e.to_string(),
        })?;

    match uri.scheme_str() {
        Some("http" | "https") => {}
        Some(scheme) => {
            return Err(HttpError::InvalidScheme {
                scheme: scheme.to_owned(),
                reason: "only http:// and https:// schemes are supported".to_owned(),
            });
        }
        None => {
            return Err(HttpError::InvalidUri {
                url: url.to_owned(),
                kind: InvalidUriKind::MissingScheme,
                reason: "missing scheme".to_owned(),
            });
        }
    }

    if uri.authority().is_none_or(|a| a.host().is_empty()) {
        return Err(HttpError::InvalidUri {
            url: url.to_owned(),
            kind: InvalidUriKind::MissingAuthority,
            reason: "missing host/authority".to_owned(),
        });
    }

    Ok(uri)
}
