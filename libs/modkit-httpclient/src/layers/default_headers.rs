use http::header::{HeaderName, HeaderValue};
use http::{Request, Response};
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};

/// Tower layer that fills in client-wide headers the request does not set.
///
/// Used for `User-Agent` and, when keep-alive is off, `Connection: close`.
/// Headers already present on the request are left untouched.
#[derive(Clone, Debug, Default)]
pub struct DefaultHeadersLayer {
    defaults: Arc<Vec<(HeaderName, HeaderValue)>>,
}

impl DefaultHeadersLayer {
    #[must_use]
    pub fn new(defaults: Vec<(HeaderName, HeaderValue)>) -> Self {
        Self {
            defaults: Arc::new(defaults),
        }
    }
}

impl<S> Layer<S> for DefaultHeadersLayer {
    type Service = DefaultHeadersService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        DefaultHeadersService {
            inner,
            defaults: self.defaults.clone(),
        }
    }
}

/// Service produced by [`DefaultHeadersLayer`].
#[derive(Clone, Debug)]
pub struct DefaultHeadersService<S> {
    inner: S,
    defaults: Arc<Vec<(HeaderName, HeaderValue)>>,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for DefaultHeadersService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<ReqBody>) -> Self::Future {
        for (name, value) in self.defaults.iter() {
            if !req.headers().contains_key(name) {
                req.headers_mut().insert(name.clone(), value.clone());
            }
        }
        self.inner.call(req)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http::{Method, StatusCode};
    use http_body_util::Full;
    use tower::ServiceExt;

    /// Echoes the request headers back as response headers.
    #[derive(Clone)]
    struct EchoHeaders;

    impl Service<Request<Full<Bytes>>> for EchoHeaders {
        type Response = Response<Full<Bytes>>;
        type Error = std::convert::Infallible;
        type Future = std::future::Ready<Result<Self::Response, Self::Error>>;

        fn poll_ready(&mut self, _: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, req: Request<Full<Bytes>>) -> Self::Future {
            let mut response = Response::new(Full::new(Bytes::new()));
            *response.status_mut() = StatusCode::OK;
            *response.headers_mut() = req.headers().clone();
            std::future::ready(Ok(response))
        }
    }

    fn layer() -> DefaultHeadersLayer {
        DefaultHeadersLayer::new(vec![
            (
                http::header::USER_AGENT,
                HeaderValue::from_static("test-agent/1.0"),
            ),
            (http::header::CONNECTION, HeaderValue::from_static("close")),
        ])
    }

    fn request(user_agent: Option<&'static str>) -> Request<Full<Bytes>> {
        let mut builder = Request::builder()
            .method(Method::GET)
            .uri("http://example.com");
        if let Some(ua) = user_agent {
            builder = builder.header(http::header::USER_AGENT, ua);
        }
        builder.body(Full::new(Bytes::new())).unwrap()
    }

    #[tokio::test]
    async fn test_defaults_added() {
        let response = layer().layer(EchoHeaders).oneshot(request(None)).await.unwrap();
        assert_eq!(response.headers()[http::header::USER_AGENT], "test-agent/1.0");
        assert_eq!(response.headers()[http::header::CONNECTION], "close");
    }

    #[tokio::test]
    async fn test_existing_header_not_overwritten() {
        let response = layer()
            .layer(EchoHeaders)
            .oneshot(request(Some("custom-agent/2.0")))
            .await
            .unwrap();
        let agents: Vec<_> = response
            .headers()
            .get_all(http::header::USER_AGENT)
            .iter()
            .collect();
        assert_eq!(agents, vec!["custom-agent/2.0"]);
    }
}
