//! Redirect policy for the hyper backend's `FollowRedirect` layer.
//!
//! Defaults follow same-origin redirects only, refuse HTTPS to HTTP
//! downgrades, stop at the first repeated location and strip credentials
//! once a chain leaves its origin. See [`RedirectConfig`].

use crate::config::RedirectConfig;
use http::{Request, Uri, header};
use tower_http::follow_redirect::policy::{Action, Attempt, Policy};

/// Headers removed once a redirect chain leaves the original origin
const SENSITIVE_HEADERS: &[header::HeaderName] = &[
    header::AUTHORIZATION,
    header::COOKIE,
    header::PROXY_AUTHORIZATION,
];

/// Per-request redirect state driven by a [`RedirectConfig`].
///
/// `FollowRedirect` clones the policy for every request, so counters and the
/// visited set start empty each time.
#[derive(Debug, Clone)]
pub struct RedirectPolicy {
    config: RedirectConfig,
    followed: usize,
    visited: Vec<Uri>,
    cross_origin: bool,
}

impl RedirectPolicy {
    #[must_use]
    pub fn new(config: RedirectConfig) -> Self {
        Self {
            config,
            followed: 0,
            visited: Vec::new(),
            cross_origin: false,
        }
    }

    fn decide(&mut self, previous: &Uri, target: &Uri) -> Action {
        if !self.config.follow {
            return Action::Stop;
        }
        if self.followed >= self.config.max_redirects {
            tracing::debug!(
                followed = self.followed,
                max = self.config.max_redirects,
                "redirect limit reached"
            );
            return Action::Stop;
        }

        if !self.config.allow_https_downgrade && is_https_downgrade(previous, target) {
            tracing::warn!(%previous, %target, "refusing HTTPS to HTTP redirect");
            return Action::Stop;
        }

        let same_origin = is_same_origin(previous, target);
        if self.config.same_origin_only && !same_origin {
            tracing::warn!(%previous, %target, "refusing cross-origin redirect");
            return Action::Stop;
        }

        if !self.config.allow_circular {
            if self.visited.is_empty() {
                self.visited.push(previous.clone());
            }
            if self.visited.contains(target) {
                tracing::warn!(%target, "circular redirect");
                return Action::Stop;
            }
            self.visited.push(target.clone());
        }

        if !same_origin {
            self.cross_origin = true;
        }
        self.followed += 1;
        Action::Follow
    }
}

fn default_port(scheme: &str) -> u16 {
    match scheme {
        "http" => 80,
        "https" => 443,
        _ => 0,
    }
}

/// Scheme, host and port match. A missing scheme counts as `https`.
fn is_same_origin(a: &Uri, b: &Uri) -> bool {
    let a_scheme = a.scheme_str().unwrap_or("https");
    let b_scheme = b.scheme_str().unwrap_or("https");
    let a_port = a.port_u16().unwrap_or_else(|| default_port(a_scheme));
    let b_port = b.port_u16().unwrap_or_else(|| default_port(b_scheme));

    a_scheme == b_scheme && a.host() == b.host() && a_port == b_port
}

fn is_https_downgrade(from: &Uri, to: &Uri) -> bool {
    from.scheme_str() == Some("https") && to.scheme_str() == Some("http")
}

impl<B: Clone, E> Policy<B, E> for RedirectPolicy {
    fn redirect(&mut self, attempt: &Attempt<'_>) -> Result<Action, E> {
        Ok(self.decide(attempt.previous(), attempt.location()))
    }

    fn on_request(&mut self, request: &mut Request<B>) {
        if !(self.cross_origin && self.config.strip_sensitive_headers) {
            return;
        }
        let headers = request.headers_mut();
        for name in SENSITIVE_HEADERS {
            if headers.remove(name).is_some() {
                tracing::debug!(header = %name, "stripped header on cross-origin redirect");
            }
        }
    }

    // 307 and 308 resend the original body
    fn clone_body(&self, body: &B) -> Option<B> {
        Some(body.clone())
    }
}
