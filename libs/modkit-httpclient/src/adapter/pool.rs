use crate::config::PoolConfig;
use crate::error::HttpError;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

type RouteMap = Arc<Mutex<HashMap<String, Arc<Semaphore>>>>;

/// Admission control for pooled connections.
///
/// Bounds in-flight requests to `max_total` overall and `max_per_route` per
/// `scheme://authority`. Waiting for a slot is limited by `acquire_timeout`.
/// A route's semaphore lives only while some request holds or waits for it.
pub(crate) struct PoolGate {
    total: Arc<Semaphore>,
    routes: RouteMap,
    max_per_route: usize,
    acquire_timeout: Duration,
}

/// Slot held for the lifetime of one request.
///
/// Fields drop in order: both permits go back before the route lease is
/// released.
#[derive(Debug)]
pub(crate) struct PoolPermit {
    _route: OwnedSemaphorePermit,
    _total: OwnedSemaphorePermit,
    _lease: RouteLease,
}

/// Reference to a route's semaphore that evicts it from the map on drop
/// when nobody else uses it.
#[derive(Debug)]
struct RouteLease {
    routes: RouteMap,
    route: String,
    semaphore: Arc<Semaphore>,
}

impl RouteLease {
    fn acquire(routes: &RouteMap, route: &str, max_per_route: usize) -> Self {
        let semaphore = routes
            .lock()
            .entry(route.to_owned())
            .or_insert_with(|| Arc::new(Semaphore::new(max_per_route)))
            .clone();
        Self {
            routes: routes.clone(),
            route: route.to_owned(),
            semaphore,
        }
    }
}

impl Drop for RouteLease {
    fn drop(&mut self) {
        let mut routes = self.routes.lock();
        // Clones are only taken under this lock: two strong references are
        // the map's and ours.
        if Arc::strong_count(&self.semaphore) == 2
            && routes
                .get(&self.route)
                .is_some_and(|current| Arc::ptr_eq(current, &self.semaphore))
        {
            routes.remove(&self.route);
        }
    }
}

impl PoolGate {
    pub(crate) fn new(pool: &PoolConfig) -> Self {
        Self {
            total: Arc::new(Semaphore::new(pool.max_total.min(Semaphore::MAX_PERMITS))),
            routes: Arc::new(Mutex::new(HashMap::new())),
            max_per_route: pool.max_per_route.min(Semaphore::MAX_PERMITS),
            acquire_timeout: pool.acquire_timeout,
        }
    }

    /// Wait for a slot on `route`.
    ///
    /// # Errors
    /// `HttpError::Connection` if no slot frees up within the acquire timeout,
    /// `HttpError::Closed` once the gate is closed.
    pub(crate) async fn checkout(&self, route: &str) -> Result<PoolPermit, HttpError> {
        let lease = RouteLease::acquire(&self.routes, route, self.max_per_route);
        let per_route = lease.semaphore.clone();
        let total = self.total.clone();

        let acquire = async move {
            let route_permit = per_route.acquire_owned().await?;
            let total_permit = total.acquire_owned().await?;
            Ok::<_, tokio::sync::AcquireError>((route_permit, total_permit))
        };

        // On failure the lease drops after the acquire future, which may
        // evict the route.
        match tokio::time::timeout(self.acquire_timeout, acquire).await {
            Ok(Ok((route_permit, total_permit))) => Ok(PoolPermit {
                _route: route_permit,
                _total: total_permit,
                _lease: lease,
            }),
            Ok(Err(_closed)) => Err(HttpError::Closed),
            Err(_elapsed) => {
                tracing::debug!(
                    route,
                    acquire_timeout = ?self.acquire_timeout,
                    "timed out waiting for a pooled connection"
                );
                Err(HttpError::Connection(
                    format!(
                        "no pooled connection to {route} available within {:?}",
                        self.acquire_timeout
                    )
                    .into(),
                ))
            }
        }
    }

    /// Fail current and future waiters with `Closed`.
    pub(crate) fn close(&self) {
        self.total.close();
        for semaphore in self.routes.lock().values() {
            semaphore.close();
        }
    }

    #[cfg(test)]
    fn available(&self) -> usize {
        self.total.available_permits()
    }

    #[cfg(test)]
    fn tracked_routes(&self) -> usize {
        self.routes.lock().len()
    }
}
