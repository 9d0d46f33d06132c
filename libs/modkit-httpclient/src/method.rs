//! HTTP verbs and the process-wide method registry.
//!
//! A [`Method`] can only be obtained from the standard constants or from a
//! [`MethodRegistry`], so every request carries a verb whose token was
//! validated once at registration time. Non-standard verbs such as `UNLINK`
//! need a registry entry and nothing else.
//!
//! # Startup
//!
//! The global registry is populated exactly once, before any request is
//! built from a looked-up name:
//!
//! ```ignore
//! use modkit_httpclient::{MethodRegistry, method};
//!
//! let mut registry = MethodRegistry::new();
//! registry.register("UNLINK")?;
//! method::install_global(registry)?;
//!
//! let unlink = method::lookup("unlink")?;
//! ```
//!
//! After installation the registry is read-only and lookups take no lock.

use crate::error::HttpError;
use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

/// Extension verbs understood by common WebDAV and link-management APIs.
///
/// They are not registered by default; see
/// [`MethodRegistry::with_well_known_extensions`].
pub const WELL_KNOWN_EXTENSIONS: [&str; 12] = [
    "COPY",
    "MOVE",
    "LINK",
    "UNLINK",
    "PURGE",
    "LOCK",
    "UNLOCK",
    "PROPFIND",
    "PROPPATCH",
    "REPORT",
    "VIEW",
    "WRAPPED",
];

/// A registered HTTP verb.
///
/// Names are stored in ASCII upper case and compare exactly.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Method(http::Method);

impl Method {
    pub const GET: Method = Method(http::Method::GET);
    pub const POST: Method = Method(http::Method::POST);
    pub const PUT: Method = Method(http::Method::PUT);
    pub const DELETE: Method = Method(http::Method::DELETE);
    pub const PATCH: Method = Method(http::Method::PATCH);
    pub const HEAD: Method = Method(http::Method::HEAD);
    pub const OPTIONS: Method = Method(http::Method::OPTIONS);
    pub const TRACE: Method = Method(http::Method::TRACE);
    pub const CONNECT: Method = Method(http::Method::CONNECT);

    /// The method token exactly as it is written on the request line.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Whether this is one of the nine verbs defined by RFC 9110.
    #[must_use]
    pub fn is_standard(&self) -> bool {
        STANDARD_METHODS.contains(self)
    }

    /// Whether repeating the request has no additional effect.
    ///
    /// RFC 9110 idempotent verbs plus the read-only WebDAV verbs.
    #[must_use]
    pub fn is_idempotent(&self) -> bool {
        matches!(
            self.as_str(),
            "GET" | "HEAD" | "PUT" | "DELETE" | "OPTIONS" | "TRACE" | "PROPFIND" | "PROPPATCH"
                | "REPORT"
        )
    }

    pub(crate) fn as_http(&self) -> &http::Method {
        &self.0
    }

    /// Validate `name` as an HTTP token and normalize it to upper case.
    fn parse(name: &str) -> Result<Self, HttpError> {
        let invalid = |reason| HttpError::InvalidMethod {
            name: name.to_owned(),
            reason,
        };

        if name.is_empty() {
            return Err(invalid("method name is empty"));
        }
        if name
            .bytes()
            .any(|b| b.is_ascii_whitespace() || b.is_ascii_control())
        {
            return Err(invalid("method name contains whitespace or control characters"));
        }
        if !name.bytes().all(is_token_byte) {
            return Err(invalid("method name contains a non-token character"));
        }

        let upper = name.to_ascii_uppercase();
        http::Method::from_bytes(upper.as_bytes())
            .map(Self)
            .map_err(|_| invalid("method name is not a valid HTTP token"))
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Method").field(&self.as_str()).finish()
    }
}

const STANDARD_METHODS: [Method; 9] = [
    Method::GET,
    Method::POST,
    Method::PUT,
    Method::DELETE,
    Method::PATCH,
    Method::HEAD,
    Method::OPTIONS,
    Method::TRACE,
    Method::CONNECT,
];

/// `tchar` from RFC 9110 section 5.6.2.
fn is_token_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
}

/// Table of verbs usable in requests.
///
/// Registration is idempotent: registering an existing name returns the
/// already registered [`Method`].
#[derive(Debug, Clone)]
pub struct MethodRegistry {
    methods: HashMap<String, Method>,
}

impl MethodRegistry {
    /// Registry holding the standard verbs only.
    #[must_use]
    pub fn new() -> Self {
        let methods = STANDARD_METHODS
            .iter()
            .map(|m| (m.as_str().to_owned(), m.clone()))
            .collect();
        Self { methods }
    }

    /// Registry holding the standard verbs and [`WELL_KNOWN_EXTENSIONS`].
    #[must_use]
    pub fn with_well_known_extensions() -> Self {
        let mut registry = Self::new();
        for name in WELL_KNOWN_EXTENSIONS {
            if let Ok(method) = Method::parse(name) {
                registry.methods.insert(name.to_owned(), method);
            }
        }
        registry
    }

    /// Add a verb to the registry.
    ///
    /// # Errors
    /// Returns `HttpError::InvalidMethod` if `name` is not a valid HTTP token.
    pub fn register(&mut self, name: &str) -> Result<Method, HttpError> {
        let method = Method::parse(name)?;
        let entry = self
            .methods
            .entry(method.as_str().to_owned())
            .or_insert(method);
        Ok(entry.clone())
    }

    /// Find a verb by name (case-insensitive).
    ///
    /// # Errors
    /// Returns `HttpError::UnknownMethod` if the name was never registered.
    pub fn lookup(&self, name: &str) -> Result<Method, HttpError> {
        self.methods
            .get(&name.to_ascii_uppercase())
            .cloned()
            .ok_or_else(|| HttpError::UnknownMethod(name.to_owned()))
    }

    /// Whether a verb with this name is registered (case-insensitive).
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.methods.contains_key(&name.to_ascii_uppercase())
    }

    /// Iterate over all registered verbs in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &Method> {
        self.methods.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.methods.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

impl Default for MethodRegistry {
    fn default() -> Self {
        Self::new()
    }
}

static GLOBAL_REGISTRY: OnceLock<MethodRegistry> = OnceLock::new();

/// Install the process-wide registry.
///
/// Must run during startup, before any concurrent [`global`] or [`lookup`]
/// call. Installing again succeeds only when every verb of `registry` is
/// already present, which keeps repeated startup code idempotent.
///
/// # Errors
/// Returns `HttpError::RegistrySealed` if a different registry was already
/// installed (or sealed by an earlier [`global`] call) and lacks some of the
/// requested verbs.
pub fn install_global(registry: MethodRegistry) -> Result<&'static MethodRegistry, HttpError> {
    let mut pending = Some(registry);
    let installed = GLOBAL_REGISTRY.get_or_init(|| pending.take().unwrap_or_default());

    let Some(rejected) = pending else {
        tracing::debug!(verbs = installed.len(), "installed global HTTP method registry");
        return Ok(installed);
    };

    let mut missing: Vec<String> = rejected
        .methods
        .keys()
        .filter(|name| !installed.methods.contains_key(*name))
        .cloned()
        .collect();
    if missing.is_empty() {
        return Ok(installed);
    }
    missing.sort();
    Err(HttpError::RegistrySealed { missing })
}

/// The process-wide registry.
///
/// Seals the registry with the standard verbs if nothing was installed yet.
pub fn global() -> &'static MethodRegistry {
    GLOBAL_REGISTRY.get_or_init(MethodRegistry::new)
}

/// Find a verb in the process-wide registry.
///
/// # Errors
/// Returns `HttpError::UnknownMethod` if the name was never registered.
pub fn lookup(name: &str) -> Result<Method, HttpError> {
    global().lookup(name)
}
