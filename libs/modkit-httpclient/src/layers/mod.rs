//! Tower layers used by the hyper backend's service stack.
//!
//! - [`DefaultHeadersLayer`] - adds client-wide headers (User-Agent, Connection)
//! - [`RedirectPolicy`] - decides which 3xx responses `FollowRedirect` follows

mod default_headers;
mod redirect;

pub use default_headers::{DefaultHeadersLayer, DefaultHeadersService};
pub use redirect::RedirectPolicy;
