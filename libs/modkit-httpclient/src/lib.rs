#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![warn(warnings)]

//! Unified HTTP client for `ModKit`
//!
//! One client facade over interchangeable transport backends:
//! - Standard and extension HTTP methods (WebDAV, `LINK`/`UNLINK`, custom
//!   verbs) travel the same path to every backend
//! - Blocking ([`HttpClient::send`]), callback ([`HttpClient::send_async`])
//!   and future ([`HttpClient::fetch`]) request styles
//! - Bounded connection pool with connect, write, read and acquire timeouts
//! - Exactly one completion outcome per asynchronous request, with
//!   cancellation through [`Handle`]
//! - Transport failures mapped to [`HttpError`] regardless of backend
//! - Redirects followed inside the backend under a same-origin policy
//! - HTTPS only by default via rustls
//!
//! # Backends
//!
//! - [`HyperBackend`] - pooled `hyper` client (default for [`HttpClientBuilder::build`])
//! - [`MockBackend`] - scripted in-process engine for tests
//!
//! # Example
//!
//! ```ignore
//! use modkit_httpclient::{HttpClient, Method, MethodRegistry, Request};
//! use std::time::Duration;
//!
//! let client = HttpClient::builder()
//!     .max_total(64)
//!     .max_per_route(8)
//!     .read_timeout(Duration::from_secs(10))
//!     .build()?;
//!
//! let registry = MethodRegistry::with_well_known_extensions();
//! let unlink = registry.lookup("UNLINK")?;
//!
//! let request = Request::builder(unlink, "https://example.com/docs/1")
//!     .header("Link", "<https://example.com/tags/7>; rel=\"tag\"")
//!     .build()?;
//! let response = client.send(request)?.error_for_status()?;
//!
//! client.close();
//! ```

pub mod adapter;
mod builder;
mod client;
pub mod completion;
mod config;
mod error;
mod headers;
mod layers;
pub mod method;
mod request;
mod response;
mod tls;

pub use adapter::{
    Backend, BackendAdapter, HyperAdapter, HyperBackend, MockAdapter, MockBackend, MockJournal,
    MockReply,
};
pub use builder::HttpClientBuilder;
pub use client::HttpClient;
pub use completion::{AsyncCompletion, Handle, Outcome};
pub use config::{
    DEFAULT_MAX_BODY_SIZE, DEFAULT_USER_AGENT, HttpClientConfig, PoolConfig, RedirectConfig,
    TlsRootConfig, TransportSecurity,
};
pub use error::{BoxError, HttpError, InvalidUriKind, TimeoutPhase};
pub use headers::Headers;
pub use layers::{DefaultHeadersLayer, DefaultHeadersService, RedirectPolicy};
pub use method::{Method, MethodRegistry};
pub use request::{Body, Request, RequestBuilder};
pub use response::{ERROR_BODY_PREVIEW_LIMIT, Response};
