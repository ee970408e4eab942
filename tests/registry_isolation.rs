//! Integration tests for registry isolation and multiple registries.
//!
//! Every registry owns its own instances and locks; the same singleton type can
//! have one instance per registry.

use singleton_lock_registry::{
    define_registry, same_lock, Construction, LockType, Registry, Singleton,
};
use std::convert::Infallible;
use std::sync::Arc;

struct Endpoint(String);

impl Singleton for Endpoint {
    type Args = &'static str;
    type Error = Infallible;

    fn create(_ctx: &Construction<'_>, url: &'static str) -> Result<Self, Infallible> {
        Ok(Endpoint(url.to_string()))
    }
}

#[test]
fn test_multiple_isolated_registries() {
    define_registry!(database);
    define_registry!(cache);

    let db = database::get_or_create::<Endpoint>("postgresql://localhost").unwrap();
    let cache_val = cache::get_or_create::<Endpoint>("redis://localhost").unwrap();

    assert_eq!(db.0, "postgresql://localhost");
    assert_eq!(cache_val.0, "redis://localhost");
    assert!(!same_lock(db.lock(), cache_val.lock()));
}

#[test]
fn test_registry_does_not_leak_between_instances() {
    let a = Registry::new();
    let b = Registry::new();

    a.get_or_create::<Endpoint>("only in A").unwrap();

    assert!(a.contains::<Endpoint>());
    assert!(!b.contains::<Endpoint>());
    assert!(b.get::<Endpoint>().is_err());
}

#[test]
fn test_reset_is_scoped_to_one_registry() {
    let a = Registry::new();
    let b = Registry::new();

    let kept = b.get_or_create::<Endpoint>("b").unwrap();
    a.get_or_create::<Endpoint>("a").unwrap();
    a.reset();

    assert!(!a.contains::<Endpoint>());
    assert!(Arc::ptr_eq(&kept, &b.get::<Endpoint>().unwrap()));
}

#[test]
fn test_lock_type_is_scoped_to_one_registry() {
    let a = Registry::with_lock_type(LockType::abortable());
    let b = Registry::new();

    assert_eq!(a.get_or_create::<Endpoint>("a").unwrap().lock().kind(), "abortable");
    assert_eq!(b.get_or_create::<Endpoint>("b").unwrap().lock().kind(), "standard");
}

#[test]
fn test_registry_scoping() {
    mod module_a {
        use singleton_lock_registry::define_registry;
        define_registry!(scoped);

        pub fn value() -> String {
            scoped::get_or_create::<super::Endpoint>("module A")
                .unwrap()
                .0
                .clone()
        }
    }

    mod module_b {
        use singleton_lock_registry::define_registry;
        define_registry!(scoped);

        pub fn value() -> String {
            scoped::get_or_create::<super::Endpoint>("module B")
                .unwrap()
                .0
                .clone()
        }
    }

    assert_eq!(module_a::value(), "module A");
    assert_eq!(module_b::value(), "module B");
}
