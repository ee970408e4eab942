//! The `Singleton` trait and the instance handle returned by the registry.

use std::error::Error as StdError;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use crate::lock::Lockable;
use crate::{Registry, RegistryError};

/// Name under which every constructed [`Instance`] publishes its per-type lock.
///
/// [`Instance::attribute`] answers to this key, and the instance's `Debug` output
/// lists the lock under it.
pub const LOCK_ATTR_KEY: &str = "_lock";

/// A type constructed at most once per [`Registry`].
///
/// Implementing this trait is how a type opts into singleton behaviour. `create` is
/// only ever called by the registry, under the type's lock.
///
/// # Examples
///
/// ```rust
/// use std::convert::Infallible;
/// use singleton_lock_registry::{Construction, Registry, Singleton};
///
/// struct Settings {
///     verbose: bool,
/// }
///
/// impl Singleton for Settings {
///     type Args = bool;
///     type Error = Infallible;
///
///     fn create(_ctx: &Construction<'_>, verbose: bool) -> Result<Self, Infallible> {
///         Ok(Settings { verbose })
///     }
/// }
///
/// let registry = Registry::new();
/// let first = registry.get_or_create::<Settings>(true).unwrap();
/// // Arguments of later calls are ignored once the instance exists.
/// let second = registry.get_or_create::<Settings>(false).unwrap();
///
/// assert!(second.verbose);
/// assert!(std::sync::Arc::ptr_eq(&first, &second));
/// ```
pub trait Singleton: Sized + Send + Sync + 'static {
    /// Arguments passed to the constructor.
    type Args;

    /// Error returned by the constructor.
    type Error: StdError + Send + Sync + 'static;

    /// Builds the single instance.
    ///
    /// The constructor may build *other* singletons through `ctx`. Building the same
    /// type again from here is undefined behaviour: with a non-reentrant lock it
    /// deadlocks.
    fn create(ctx: &Construction<'_>, args: Self::Args) -> Result<Self, Self::Error>;
}

/// Context handed to [`Singleton::create`].
pub struct Construction<'a> {
    pub(crate) registry: &'a Registry,
    pub(crate) lock: &'a Arc<dyn Lockable>,
    pub(crate) type_name: &'static str,
}

impl<'a> Construction<'a> {
    /// The registry performing the construction.
    pub fn registry(&self) -> &'a Registry {
        self.registry
    }

    /// Builds (or fetches) another singleton from the same registry.
    pub fn get_or_create<U: Singleton>(
        &self,
        args: U::Args,
    ) -> Result<Arc<Instance<U>>, RegistryError> {
        self.registry.get_or_create::<U>(args)
    }

    /// The lock guarding this construction. It is held while `create` runs.
    pub fn lock(&self) -> &'a Arc<dyn Lockable> {
        self.lock
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl fmt::Debug for Construction<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Construction")
            .field("type_name", &self.type_name)
            .field(LOCK_ATTR_KEY, self.lock)
            .finish()
    }
}

/// A constructed singleton together with the lock that guarded its construction.
///
/// Dereferences to the value. The lock is exposed for introspection only; it is not
/// meant to be locked again by callers.
pub struct Instance<T> {
    value: T,
    lock: Arc<dyn Lockable>,
}

impl<T> Instance<T> {
    pub(crate) fn new(value: T, lock: Arc<dyn Lockable>) -> Self {
        Self { value, lock }
    }

    /// The per-type lock, published under [`LOCK_ATTR_KEY`].
    pub fn lock(&self) -> &Arc<dyn Lockable> {
        &self.lock
    }

    /// Looks up a published attribute by name. Only [`LOCK_ATTR_KEY`] is defined.
    pub fn attribute(&self, key: &str) -> Option<&Arc<dyn Lockable>> {
        (key == LOCK_ATTR_KEY).then_some(&self.lock)
    }

    pub fn value(&self) -> &T {
        &self.value
    }
}

impl<T> Deref for Instance<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

// Singleton types are often not `Debug`, so only the type name is printed.
impl<T> fmt::Debug for Instance<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("type", &std::any::type_name::<T>())
            .field(LOCK_ATTR_KEY, &self.lock)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::{same_lock, StandardLock};

    #[test]
    fn test_attribute_lookup() {
        let lock: Arc<dyn Lockable> = Arc::new(StandardLock::new());
        let instance = Instance::new(7u32, lock.clone());

        assert!(same_lock(instance.attribute(LOCK_ATTR_KEY).unwrap(), &lock));
        assert!(same_lock(instance.lock(), &lock));
        assert!(instance.attribute("lock").is_none());
        assert_eq!(*instance, 7);
        assert_eq!(*instance.value(), 7);
    }

    #[test]
    fn test_debug_lists_lock_attribute() {
        struct Opaque;

        let instance = Instance::new(Opaque, Arc::new(StandardLock::new()) as Arc<dyn Lockable>);
        let rendered = format!("{:?}", instance);
        assert!(rendered.starts_with("Instance { type: \""));
        assert!(rendered.contains("Opaque\", _lock: StandardLock"));
    }
}
