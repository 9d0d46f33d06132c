use super::dispatch::Dispatcher;
use super::pool::PoolGate;
use super::{Backend, BackendAdapter};
use crate::completion::{AsyncCompletion, Handle};
use crate::config::{HttpClientConfig, PoolConfig};
use crate::error::{HttpError, TimeoutPhase};
use crate::headers::Headers;
use crate::layers::{DefaultHeadersLayer, RedirectPolicy};
use crate::request::Request;
use crate::response::{LimitedBody, Response, ResponseBody};
use crate::tls;
use bytes::Bytes;
use http::header::{CONNECTION, CONTENT_TYPE, HeaderValue, USER_AGENT};
use http::Version;
use http_body::{Frame, SizeHint};
use http_body_util::BodyExt;
use hyper_util::client::legacy::Client;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};
use std::time::Instant;
use tokio::sync::Notify;
use tower::util::BoxCloneSyncService;
use tower::{ServiceBuilder, ServiceExt};
use tower_http::decompression::DecompressionLayer;
use tower_http::follow_redirect::FollowRedirectLayer;

const IO_THREAD_NAME: &str = "modkit-httpclient-io";

/// Largest request body frame handed to hyper at once
const UPLOAD_FRAME_SIZE: usize = 64 * 1024;

/// Type-erased tower stack in front of the pooled hyper client.
type EngineService =
    BoxCloneSyncService<http::Request<UploadBody>, http::Response<ResponseBody>, HttpError>;

/// Transport engine built on the `hyper` pooled client with `rustls`.
///
/// Pool settings map onto the engine as follows:
/// - `max_total` / `max_per_route` bound in-flight requests through a
///   semaphore gate; `max_per_route` also caps idle connections per host
/// - `keep_alive == false` keeps no idle connections and sends
///   `Connection: close`
/// - `idle_timeout` evicts idle connections
/// - `connect_timeout` bounds TCP connect and TLS handshake
/// - `write_timeout` bounds each stall while the request body is written,
///   measured between successive body frames taken by the connection
/// - `read_timeout` bounds the response head and body
///
/// Redirects are followed by a `FollowRedirect` layer under
/// [`RedirectPolicy`]. Headers go out grouped by name in first-seen order
/// (see [`Headers`]).
#[derive(Debug, Clone, Copy, Default)]
pub struct HyperBackend;

impl Backend for HyperBackend {
    type Adapter = HyperAdapter;

    fn open_validated(self, config: &HttpClientConfig) -> Result<HyperAdapter, HttpError> {
        let dispatcher = Dispatcher::new(config.worker_threads, IO_THREAD_NAME)?;
        let service = {
            let _runtime = dispatcher.enter();
            build_service(config)?
        };

        tracing::debug!(
            backend = "hyper",
            max_total = config.pool.max_total,
            max_per_route = config.pool.max_per_route,
            keep_alive = config.pool.keep_alive,
            worker_threads = config.worker_threads,
            "opened HTTP backend"
        );

        Ok(HyperAdapter {
            engine: Arc::new(Engine {
                service,
                gate: PoolGate::new(&config.pool),
                pool: config.pool.clone(),
                max_body_size: config.max_body_size,
            }),
            dispatcher,
        })
    }
}

/// Opened [`HyperBackend`].
pub struct HyperAdapter {
    engine: Arc<Engine>,
    dispatcher: Dispatcher,
}

impl BackendAdapter for HyperAdapter {
    fn name(&self) -> &'static str {
        "hyper"
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

fn build_service(config: &HttpClientConfig) -> Result<EngineService, HttpError> {
    let pool = &config.pool;
    let https = tls::https_connector(config.tls_roots, config.transport, pool.connect_timeout)?;

    let mut client_builder = Client::builder(TokioExecutor::new());
    // pool_timer is required for pool_idle_timeout to take effect
    client_builder
        .pool_timer(TokioTimer::new())
        .pool_max_idle_per_host(if pool.keep_alive { pool.max_per_route } else { 0 })
        .http2_only(false);
    if let Some(idle_timeout) = pool.idle_timeout {
        client_builder.pool_idle_timeout(idle_timeout);
    }
    let client = client_builder.build::<_, UploadBody>(https);

    let mut defaults = vec![(USER_AGENT, HeaderValue::try_from(config.user_agent.as_str())?)];
    if !pool.keep_alive {
        defaults.push((CONNECTION, HeaderValue::from_static("close")));
    }
    let stack = ServiceBuilder::new().layer(DefaultHeadersLayer::new(defaults));
    let redirects = FollowRedirectLayer::with_policy(RedirectPolicy::new(config.redirect.clone()));

    // Request flow: DefaultHeaders -> [Decompression] -> FollowRedirect -> hyper client.
    // The decompression layer also advertises Accept-Encoding.
    let service = if config.content_compression {
        BoxCloneSyncService::new(
            stack
                .layer(DecompressionLayer::new())
                .layer(redirects)
                .service(client)
                .map_response(box_response_body)
                .map_err(classify_client_error),
        )
    } else {
        BoxCloneSyncService::new(
            stack
                .layer(redirects)
                .service(client)
                .map_response(box_response_body)
                .map_err(classify_client_error),
        )
    };
    Ok(service)
}

/// Erase the engine body type.
fn box_response_body<B>(response: http::Response<B>) -> http::Response<ResponseBody>
where
    B: http_body::Body<Data = Bytes> + Send + Sync + 'static,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let (parts, body) = response.into_parts();
    http::Response::from_parts(parts, body.map_err(Into::into).boxed())
}

/// Translate a pooled client failure into the neutral taxonomy.
///
/// Connector failures become `Connection`, or `Timeout { Connect }` when the
/// connect timeout fired; everything after the connection was acquired is a
/// `Transport` fault.
fn classify_client_error(err: hyper_util::client::legacy::Error) -> HttpError {
    if !err.is_connect() {
        return HttpError::Transport(Box::new(err));
    }
    if has_timed_out(&err) {
        return HttpError::Timeout {
            phase: TimeoutPhase::Connect,
        };
    }
    HttpError::Connection(Box::new(err))
}

/// Whether an `io::ErrorKind::TimedOut` appears anywhere in the source chain.
fn has_timed_out(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut source = Some(err);
    while let Some(current) = source {
        if let Some(io) = current.downcast_ref::<std::io::Error>()
            && io.kind() == std::io::ErrorKind::TimedOut
        {
            return true;
        }
        source = current.source();
    }
    false
}

struct Engine {
    service: EngineService,
    gate: PoolGate,
    pool: PoolConfig,
    max_body_size: usize,
}

impl Engine {
    async fn perform(self: Arc<Self>, request: Request) -> Result<Response, HttpError> {
        let started = Instant::now();
        let method = request.method().clone();
        let uri = request.uri().clone();

        let result = self.round_trip(request).await;

        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        match &result {
            Ok(response) => tracing::debug!(
                backend = "hyper",
                method = %method,
                uri = %uri,
                status = response.status().as_u16(),
                elapsed_ms,
                "HTTP request completed"
            ),
            Err(error) => tracing::debug!(
                backend = "hyper",
                method = %method,
                uri = %uri,
                error = %error,
                elapsed_ms,
                "HTTP request failed"
            ),
        }
        result
    }

    async fn round_trip(&self, request: Request) -> Result<Response, HttpError> {
        let read_timeout = request.read_timeout().unwrap_or(self.pool.read_timeout);
        let permit = self.gate.checkout(&request.route()).await?;

        let progress = Arc::new(WriteProgress::default());
        let http_request = to_http_request(&request, progress.clone())?;
        drop(request);

        let mut in_flight = Box::pin(self.service.clone().oneshot(http_request));

        // Write phase: connect, then hand head and body to the connection.
        // The first frame must be taken within connect + write timeout, each
        // later one within write timeout of the previous. A response may
        // arrive before the body is fully written.
        let stall = tokio::time::sleep(self.pool.connect_timeout + self.pool.write_timeout);
        tokio::pin!(stall);
        let early = loop {
            tokio::select! {
                biased;
                result = &mut in_flight => break Some(result),
                () = progress.advanced.notified() => {
                    if progress.is_finished() {
                        break None;
                    }
                    stall
                        .as_mut()
                        .reset(tokio::time::Instant::now() + self.pool.write_timeout);
                }
                () = &mut stall => {
                    return Err(HttpError::Timeout { phase: TimeoutPhase::Write });
                }
            }
        };

        // Read phase: response head and the whole body.
        let read = async move {
            let response = match early {
                Some(result) => result?,
                None => in_flight.await?,
            };
            let (parts, body) = response.into_parts();
            let bytes = LimitedBody::new(body, self.max_body_size)
                .collect_bytes()
                .await?;
            Ok::<_, HttpError>((parts, bytes))
        };
        let (parts, bytes) = tokio::time::timeout(read_timeout, read)
            .await
            .map_err(|_| HttpError::Timeout {
                phase: TimeoutPhase::Read,
            })??;
        drop(permit);

        let reason = parts
            .extensions
            .get::<hyper::ext::ReasonPhrase>()
            .and_then(|phrase| std::str::from_utf8(phrase.as_bytes()).ok())
            .map(str::to_owned);

        let mut response = Response::new(parts.status)
            .with_headers(Headers::from(&parts.headers))
            .with_version(parts.version)
            .with_body(bytes);
        if let Some(reason) = reason {
            response = response.with_reason(reason);
        }
        Ok(response)
    }
}

fn to_http_request(
    request: &Request,
    progress: Arc<WriteProgress>,
) -> Result<http::Request<UploadBody>, HttpError> {
    let mut builder = http::Request::builder()
        .method(request.method().as_http().clone())
        .uri(request.uri().clone());
    // HTTP/2 is negotiated through ALPN; only HTTP/1.x hints are forwarded.
    if let Some(version) = request.version()
        && (version == Version::HTTP_10 || version == Version::HTTP_11)
    {
        builder = builder.version(version);
    }

    let mut headers = request.headers().to_header_map();
    let data = match request.body() {
        Some(body) => {
            if !headers.contains_key(CONTENT_TYPE)
                && let Some(content_type) = body.content_type()
            {
                headers.insert(CONTENT_TYPE, content_type.clone());
            }
            body.data().clone()
        }
        None => Bytes::new(),
    };

    let mut http_request = builder.body(UploadBody::new(data, progress))?;
    *http_request.headers_mut() = headers;
    Ok(http_request)
}

/// Upload state shared by a request body and its write phase.
#[derive(Debug, Default)]
struct WriteProgress {
    advanced: Notify,
    finished: AtomicBool,
}

impl WriteProgress {
    fn advance(&self) {
        self.advanced.notify_one();
    }

    fn finish(&self) {
        self.finished.store(true, Ordering::Release);
        self.advanced.notify_one();
    }

    fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }
}

/// Buffered request body yielded in frames of at most
/// [`UPLOAD_FRAME_SIZE`] bytes.
///
/// hyper takes the next frame only once its write buffer has room, so each
/// frame taken means the peer is still reading. The upload counts as
/// finished when the last frame is taken, or when hyper sees an empty body
/// through `is_end_stream()`.
///
/// `Clone` and `Default` let `FollowRedirect` resend or drop the body.
#[derive(Debug, Clone, Default)]
struct UploadBody {
    remaining: Bytes,
    progress: Arc<WriteProgress>,
}

impl UploadBody {
    fn new(data: Bytes, progress: Arc<WriteProgress>) -> Self {
        Self {
            remaining: data,
            progress,
        }
    }
}

impl http_body::Body for UploadBody {
    type Data = Bytes;
    type Error = Infallible;

    fn poll_frame(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        if this.remaining.is_empty() {
            this.progress.finish();
            return Poll::Ready(None);
        }

        let len = this.remaining.len().min(UPLOAD_FRAME_SIZE);
        let frame = this.remaining.split_to(len);
        if this.remaining.is_empty() {
            this.progress.finish();
        } else {
            this.progress.advance();
        }
        Poll::Ready(Some(Ok(Frame::data(frame))))
    }

    fn is_end_stream(&self) -> bool {
        let end = self.remaining.is_empty();
        if end {
            self.progress.finish();
        }
        end
    }

    fn size_hint(&self) -> SizeHint {
        SizeHint::with_exact(u64::try_from(self.remaining.len()).unwrap_or(u64::MAX))
    }
}
