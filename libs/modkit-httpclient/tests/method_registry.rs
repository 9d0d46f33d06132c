#![allow(clippy::unwrap_used, clippy::expect_used)]

//! Process-wide method registry lifecycle
//!
//! Kept in its own test binary: the global registry can be installed once
//! per process.

use modkit_httpclient::method::{self, WELL_KNOWN_EXTENSIONS};
use modkit_httpclient::{HttpError, MethodRegistry};

#[test]
fn global_registry_installs_once() {
    let mut registry = MethodRegistry::with_well_known_extensions();
    registry.register("X-SYNC").unwrap();
    let installed = method::install_global(registry).unwrap();
    assert!(installed.contains("x-sync"));

    for name in WELL_KNOWN_EXTENSIONS {
        assert_eq!(method::lookup(name).unwrap().as_str(), name);
    }
    assert_eq!(method::lookup("unlink").unwrap().as_str(), "UNLINK");
    assert!(method::lookup("GET").unwrap().is_standard());

    // Re-installing a subset is a no-op.
    let mut subset = MethodRegistry::new();
    subset.register("PURGE").unwrap();
    assert!(method::install_global(subset).is_ok());

    // New verbs cannot be added once sealed.
    let mut extended = MethodRegistry::new();
    extended.register("BREW").unwrap();
    extended.register("WHEN").unwrap();
    match method::install_global(extended) {
        Err(HttpError::RegistrySealed { missing }) => assert_eq!(missing, vec!["BREW", "WHEN"]),
        other => panic!("expected RegistrySealed, got {other:?}"),
    }

    assert!(matches!(method::lookup("BREW"), Err(HttpError::UnknownMethod(name)) if name == "BREW"));
    assert!(std::ptr::eq(method::global(), installed));
}
