//! Backend adapters.
//!
//! A [`Backend`] is a recipe for one transport engine; opening it with a
//! validated [`HttpClientConfig`] yields a [`BackendAdapter`] that owns the
//! engine's pool and threads. Every adapter translates engine failures into
//! [`HttpError`] before they leave it, so the facade never sees engine types.
//!
//! Two engines ship with the crate:
//! - [`HyperBackend`] - `hyper` pooled client with `rustls`
//! - [`MockBackend`] - in-process responder for tests

mod dispatch;
mod hyper;
mod mock;
mod pool;

pub use self::hyper::{HyperAdapter, HyperBackend};
pub use mock::{MockAdapter, MockBackend, MockJournal, MockReply};

use crate::completion::{AsyncCompletion, Handle};
use crate::config::HttpClientConfig;
use crate::error::HttpError;
use crate::request::Request;
use crate::response::Response;

/// Transport engine that can be opened into an adapter.
pub trait Backend: Sized {
    type Adapter: BackendAdapter;

    /// Validate `config` and establish the pooled transport.
    ///
    /// # Errors
    /// Returns `HttpError::Config` naming the offending field before any
    /// engine resource is created, or the engine's own startup error.
    fn open(self, config: &HttpClientConfig) -> Result<Self::Adapter, HttpError> {
        config.validate()?;
        self.open_validated(config)
    }

    /// Start the engine with a configuration that passed validation.
    ///
    /// Called only through [`open`](Self::open).
    ///
    /// # Errors
    /// Returns `HttpError::Connection` if the engine cannot be started.
    fn open_validated(self, config: &HttpClientConfig) -> Result<Self::Adapter, HttpError>;
}

/// Opened transport engine.
///
/// Implementations must behave identically from the caller's point of view:
/// same error kinds, same timeout phases, exactly one completion callback
/// per asynchronous request.
pub trait BackendAdapter: Send + Sync + 'static {
    /// Short engine name for logs.
    fn name(&self) -> &'static str;

    /// Send `request` and block until the response is fully read.
    ///
    /// # Errors
    /// Returns a connection, timeout or transport error, or
    /// `HttpError::Closed` if the adapter was closed meanwhile.
    fn execute(&self, request: Request) -> Result<Response, HttpError>;

    /// Submit `request` without blocking and return its cancellation handle.
    ///
    /// All faults, including a closed adapter, are delivered to `completion`.
    fn execute_async(&self, request: Request, completion: Box<dyn AsyncCompletion>) -> Handle;

    /// Cancel in-flight work, wait for it to resolve and release the pool.
    ///
    /// Idempotent.
    fn close(&self);
}
