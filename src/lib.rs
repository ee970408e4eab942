//! # Singleton Lock Registry
//!
//! Exactly-once, thread-safe construction of singletons with per-type, pluggable locks.
//!
//! A type opts in by implementing [`Singleton`]. [`Registry::get_or_create`] returns the
//! single instance of that type, constructing it on first use under a lock owned by the
//! type's registry entry. Constructors may build other singletons without deadlocking,
//! because every type has its own lock.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::convert::Infallible;
//! use std::sync::Arc;
//! use singleton_lock_registry::{Construction, Registry, Singleton};
//!
//! struct Database {
//!     url: String,
//! }
//!
//! impl Singleton for Database {
//!     type Args = &'static str;
//!     type Error = Infallible;
//!
//!     fn create(_ctx: &Construction<'_>, url: &'static str) -> Result<Self, Infallible> {
//!         Ok(Database { url: url.to_string() })
//!     }
//! }
//!
//! let registry = Registry::new();
//! let db = registry.get_or_create::<Database>("postgres://localhost").unwrap();
//! let again = registry.get_or_create::<Database>("ignored").unwrap();
//!
//! assert!(Arc::ptr_eq(&db, &again));
//! assert_eq!(db.url, "postgres://localhost");
//! ```
//!
//! ## Features
//!
//! - **Exactly once**: concurrent callers share a single construction
//! - **Lock-free hits**: constructed instances are returned without taking a lock
//! - **Nested construction**: constructors may build other singletons
//! - **Rollback**: a failed constructor leaves the type uncreated, ready for a retry
//! - **Pluggable locks**: [`LockType::standard`] by default, [`LockType::abortable`]
//!   together with a [`Watchdog`] to turn deadlocks into errors in tests
//! - **Tracing support**: `tracing` diagnostics plus an optional event callback
//!
//! ## Main Items
//!
//! - [`Registry`] - the registry; [`define_registry!`] creates a process-wide one
//! - [`Singleton`] - implemented by singleton types
//! - [`Instance`] - a constructed singleton, exposing its lock under [`LOCK_ATTR_KEY`]
//! - [`Lockable`], [`StandardLock`], [`AbortableLock`], [`Watchdog`] - the lock layer
//! - [`LockStrategy`] - the lock type used for new entries

mod lock;
mod macros;
mod registry;
mod registry_error;
mod registry_event;
mod singleton;
mod strategy;

pub use lock::{
    same_lock, AbortableLock, Hold, LockError, LockGuard, LockType, Lockable,
    ParseLockTypeError, StandardLock, Watchdog,
};
pub use registry::{Registry, SingletonState, TraceCallback};
pub use registry_error::RegistryError;
pub use registry_event::RegistryEvent;
pub use singleton::{Construction, Instance, Singleton, LOCK_ATTR_KEY};
pub use strategy::LockStrategy;
