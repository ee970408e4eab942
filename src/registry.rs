//! Exactly-once, thread-safe construction of singletons.
//!
//! A [`Registry`] keeps one entry per singleton type. Each entry owns a lock created
//! from the registry's [`LockStrategy`] and, once constructed, the published instance.
//!
//! # Examples
//!
//! ```
//! use std::convert::Infallible;
//! use std::sync::Arc;
//! use singleton_lock_registry::{Construction, Registry, Singleton, LOCK_ATTR_KEY};
//!
//! struct Pool {
//!     size: usize,
//! }
//!
//! impl Singleton for Pool {
//!     type Args = usize;
//!     type Error = Infallible;
//!
//!     fn create(_ctx: &Construction<'_>, size: usize) -> Result<Self, Infallible> {
//!         Ok(Pool { size })
//!     }
//! }
//!
//! let registry = Registry::new();
//! let pool = registry.get_or_create::<Pool>(4).unwrap();
//! assert_eq!(pool.size, 4);
//! assert!(pool.attribute(LOCK_ATTR_KEY).is_some());
//!
//! let again = registry.get_or_create::<Pool>(8).unwrap();
//! assert!(Arc::ptr_eq(&pool, &again));
//! ```

use std::{
    any::{Any, TypeId},
    collections::HashMap,
    fmt,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex, OnceLock,
    },
};

use arc_swap::{ArcSwap, ArcSwapOption};
use tracing::{debug, info, trace, warn};

use crate::lock::{LockError, LockGuard, LockType, Lockable};
use crate::singleton::{Construction, Instance, Singleton};
use crate::strategy::LockStrategy;
use crate::{RegistryError, RegistryEvent};

/// Type alias for the user-supplied tracing callback.
///
/// The callback receives a reference to a `RegistryEvent` every time the registry is
/// interacted with. It must be thread-safe because the registry itself is shared.
pub type TraceCallback = dyn Fn(&RegistryEvent) + Send + Sync + 'static;

type Entries = HashMap<TypeId, Arc<Entry>>;

/// Construction state of one singleton type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SingletonState {
    /// Never constructed, rolled back after a failure, or reset.
    Uncreated,
    /// A constructor is currently running.
    Constructing,
    /// The instance is published.
    Ready,
}

struct Entry {
    lock: Arc<dyn Lockable>,
    instance: OnceLock<Arc<dyn Any + Send + Sync>>,
    /// Constructors currently running; more than one only after the lock was aborted.
    constructing: AtomicUsize,
}

impl Entry {
    fn new(lock: Arc<dyn Lockable>) -> Self {
        Self {
            lock,
            instance: OnceLock::new(),
            constructing: AtomicUsize::new(0),
        }
    }
}

/// Counts a running constructor; uncounted on return or unwind.
struct ConstructingFlag<'a>(&'a AtomicUsize);

impl<'a> ConstructingFlag<'a> {
    fn raise(count: &'a AtomicUsize) -> Self {
        count.fetch_add(1, Ordering::AcqRel);
        Self(count)
    }
}

impl Drop for ConstructingFlag<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// What a caller found after taking a type's lock.
enum Outcome {
    Published(Arc<dyn Any + Send + Sync>),
    Constructed(Arc<dyn Any + Send + Sync>),
    Failed(RegistryError),
}

/// Registry guaranteeing at most one instance per [`Singleton`] type.
///
/// Lookups of constructed instances never block: the entry map is read through an
/// [`ArcSwap`] snapshot, the instance through a `OnceLock` and the trace callback
/// through an [`ArcSwapOption`]. Creating an entry is
/// serialized by a registry-wide creation mutex, and construction of each type is
/// serialized by that type's own lock, so a constructor may build other singletons
/// without contending on its own lock.
///
/// `reset` must not run while constructions are in flight.
pub struct Registry {
    entries: ArcSwap<Entries>,
    creation: Mutex<()>,
    strategy: LockStrategy,
    trace: ArcSwapOption<Box<TraceCallback>>,
}

impl Registry {
    /// An empty registry using [`LockType::standard`] locks.
    pub fn new() -> Self {
        Self::with_lock_type(LockType::standard())
    }

    /// An empty registry whose entries start out with `lock_type` locks.
    pub fn with_lock_type(lock_type: LockType) -> Self {
        Self {
            entries: ArcSwap::from_pointee(HashMap::new()),
            creation: Mutex::new(()),
            strategy: LockStrategy::new(lock_type),
            trace: ArcSwapOption::empty(),
        }
    }

    // -------------------------------------------------------------------------------------------------
    // Tracing
    // -------------------------------------------------------------------------------------------------

    /// Sets a tracing callback invoked for every registry operation.
    ///
    /// An event about type `T` is emitted while `T`'s lock is not held, so the callback
    /// may use the registry, including for `T`. Events of a nested construction are
    /// emitted while the enclosing constructor still holds its own type's lock.
    pub fn set_trace_callback(&self, callback: impl Fn(&RegistryEvent) + Send + Sync + 'static) {
        let callback: Box<TraceCallback> = Box::new(callback);
        self.trace.store(Some(Arc::new(callback)));
    }

    /// Clears the tracing callback.
    pub fn clear_trace_callback(&self) {
        self.trace.store(None);
    }

    fn emit_event(&self, event: &RegistryEvent) {
        if let Some(callback) = self.trace.load_full() {
            callback(event);
        }
    }

    // -------------------------------------------------------------------------------------------------
    // Lock strategy
    // -------------------------------------------------------------------------------------------------

    /// Replaces the lock type used for entries created from now on. Always returns `true`.
    ///
    /// Entries that already exist keep their lock.
    pub fn set_lock_type(&self, lock_type: LockType) -> bool {
        let to = lock_type.name();
        let from = self.strategy.replace_lock_type(lock_type).name();

        info!(from, to, "singleton lock type changed");
        self.emit_event(&RegistryEvent::LockType { from, to });

        true
    }

    pub fn get_lock_type(&self) -> LockType {
        self.strategy.get_lock_type()
    }

    // -------------------------------------------------------------------------------------------------
    // Registry
    // -------------------------------------------------------------------------------------------------

    /// Returns the instance of `T`, constructing it with `args` if it does not exist.
    ///
    /// `args` is ignored when the instance already exists. Concurrent callers all
    /// receive the same instance; only one of them runs the constructor.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::LockCreation`] if the lock for a new entry cannot be created
    /// - [`RegistryError::LockAborted`] if waiting for the type's lock was aborted
    /// - [`RegistryError::Construction`] if `T::create` failed; `T` stays
    ///   [`SingletonState::Uncreated`] and a later call may retry
    pub fn get_or_create<T: Singleton>(
        &self,
        args: T::Args,
    ) -> Result<Arc<Instance<T>>, RegistryError> {
        let type_name = std::any::type_name::<T>();

        if let Some(instance) = self.published(TypeId::of::<T>()) {
            trace!(type_name, "singleton cache hit");
            self.emit_event(&RegistryEvent::Get {
                type_name,
                found: true,
            });
            return downcast::<T>(instance);
        }

        let entry = self.entry(TypeId::of::<T>(), type_name)?;
        self.emit_event(&RegistryEvent::Get {
            type_name,
            found: false,
        });

        let outcome = {
            let _guard = LockGuard::acquire(&*entry.lock).map_err(|err| {
                warn!(
                    type_name,
                    lock_type = entry.lock.kind(),
                    error = %err,
                    "singleton lock acquisition failed"
                );
                match err {
                    LockError::Aborted => RegistryError::LockAborted { type_name },
                }
            })?;
            self.construct::<T>(&entry, type_name, args)
        };

        match outcome {
            Outcome::Published(instance) => downcast::<T>(instance),
            Outcome::Constructed(instance) => {
                self.emit_event(&RegistryEvent::Create {
                    type_name,
                    lock_type: entry.lock.kind(),
                });
                downcast::<T>(instance)
            }
            Outcome::Failed(err) => {
                self.emit_event(&RegistryEvent::Fail { type_name });
                Err(err)
            }
        }
    }

    /// Runs `T::create` for `entry`; the caller holds the entry's lock.
    fn construct<T: Singleton>(
        &self,
        entry: &Entry,
        type_name: &'static str,
        args: T::Args,
    ) -> Outcome {
        // Another thread may have finished constructing while we waited.
        if let Some(instance) = entry.instance.get() {
            trace!(type_name, "singleton constructed by concurrent caller");
            return Outcome::Published(instance.clone());
        }

        let created = {
            let _constructing = ConstructingFlag::raise(&entry.constructing);
            let ctx = Construction {
                registry: self,
                lock: &entry.lock,
                type_name,
            };
            T::create(&ctx, args)
        };

        match created {
            Ok(value) => {
                let instance: Arc<dyn Any + Send + Sync> =
                    Arc::new(Instance::new(value, entry.lock.clone()));
                let published = entry.instance.get_or_init(|| instance).clone();
                debug!(type_name, lock_type = entry.lock.kind(), "singleton constructed");
                Outcome::Constructed(published)
            }
            Err(err) => {
                warn!(type_name, error = %err, "singleton construction failed");
                Outcome::Failed(RegistryError::Construction {
                    type_name,
                    source: Box::new(err),
                })
            }
        }
    }

    /// Returns the instance of `T` without constructing it.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::TypeNotFound`] if `T` is not [`SingletonState::Ready`]
    pub fn get<T: Singleton>(&self) -> Result<Arc<Instance<T>>, RegistryError> {
        let type_name = std::any::type_name::<T>();
        let result = match self.published(TypeId::of::<T>()) {
            Some(instance) => downcast::<T>(instance),
            None => Err(RegistryError::TypeNotFound { type_name }),
        };

        self.emit_event(&RegistryEvent::Get {
            type_name,
            found: result.is_ok(),
        });

        result
    }

    /// Whether an instance of `T` is published.
    pub fn contains<T: Singleton>(&self) -> bool {
        self.published(TypeId::of::<T>()).is_some()
    }

    pub fn state<T: Singleton>(&self) -> SingletonState {
        match self.entries.load().get(&TypeId::of::<T>()) {
            Some(entry) if entry.instance.get().is_some() => SingletonState::Ready,
            Some(entry) if entry.constructing.load(Ordering::Acquire) > 0 => {
                SingletonState::Constructing
            }
            _ => SingletonState::Uncreated,
        }
    }

    /// Number of published instances.
    pub fn len(&self) -> usize {
        self.entries
            .load()
            .values()
            .filter(|entry| entry.instance.get().is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every entry together with its lock.
    ///
    /// Afterwards every type behaves as if it had never been constructed. Instances
    /// already handed out stay valid but are no longer returned by the registry.
    /// Calling this on an empty registry changes nothing.
    pub fn reset(&self) {
        let _creation = self.creation.lock().unwrap_or_else(|p| p.into_inner());
        let cleared = self.entries.swap(Arc::new(HashMap::new())).len();

        info!(entries = cleared, "singleton registry reset");
        self.emit_event(&RegistryEvent::Reset {});
    }

    fn published(&self, id: TypeId) -> Option<Arc<dyn Any + Send + Sync>> {
        self.entries
            .load()
            .get(&id)
            .and_then(|entry| entry.instance.get().cloned())
    }

    /// Finds or creates the entry for `id`; creation happens under the creation mutex.
    fn entry(&self, id: TypeId, type_name: &'static str) -> Result<Arc<Entry>, RegistryError> {
        if let Some(entry) = self.entries.load().get(&id) {
            return Ok(entry.clone());
        }

        let _creation = self.creation.lock().unwrap_or_else(|p| p.into_inner());
        let current = self.entries.load_full();
        if let Some(entry) = current.get(&id) {
            return Ok(entry.clone());
        }

        let lock = self
            .strategy
            .create_lock()
            .map_err(|(lock_type, reason)| {
                warn!(type_name, lock_type, %reason, "failed to create singleton lock");
                RegistryError::LockCreation {
                    type_name,
                    lock_type,
                    reason,
                }
            })?;

        debug!(type_name, lock_type = lock.kind(), "singleton entry created");

        let entry = Arc::new(Entry::new(lock));
        let mut next = Entries::clone(&current);
        next.insert(id, entry.clone());
        self.entries.store(Arc::new(next));

        Ok(entry)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("lock_type", &self.get_lock_type())
            .field("instances", &self.len())
            .finish_non_exhaustive()
    }
}

fn downcast<T: Singleton>(
    instance: Arc<dyn Any + Send + Sync>,
) -> Result<Arc<Instance<T>>, RegistryError> {
    instance
        .downcast::<Instance<T>>()
        .map_err(|_| RegistryError::TypeMismatch {
            type_name: std::any::type_name::<T>(),
        })
}

// -------------------------------------------------------------------------------------------------
// Tests
// -------------------------------------------------------------------------------------------------
