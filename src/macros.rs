//! Macros for creating process-wide singleton registries.

/// Creates a process-wide [`Registry`](crate::Registry) with a single macro invocation.
///
/// The macro generates a module containing a lazily initialized registry (built on first
/// use with the standard lock type) and free functions delegating to it. Call
/// `reset()` from test teardown to return every singleton to the uncreated state.
///
/// # Examples
///
/// ```rust
/// use std::convert::Infallible;
/// use std::sync::Arc;
/// use singleton_lock_registry::{define_registry, Construction, Singleton};
///
/// define_registry!(global);
///
/// struct Clock {
///     offset: i64,
/// }
///
/// impl Singleton for Clock {
///     type Args = i64;
///     type Error = Infallible;
///
///     fn create(_ctx: &Construction<'_>, offset: i64) -> Result<Self, Infallible> {
///         Ok(Clock { offset })
///     }
/// }
///
/// let clock = global::get_or_create::<Clock>(5).unwrap();
/// let same = global::get::<Clock>().unwrap();
/// assert!(Arc::ptr_eq(&clock, &same));
/// assert_eq!(same.offset, 5);
///
/// global::reset();
/// assert!(!global::contains::<Clock>());
/// ```
///
/// # Multiple Registries
///
/// Every invocation creates an isolated registry:
///
/// ```rust
/// use std::convert::Infallible;
/// use singleton_lock_registry::{define_registry, Construction, Singleton};
///
/// define_registry!(primary);
/// define_registry!(secondary);
///
/// struct Token(u32);
///
/// impl Singleton for Token {
///     type Args = u32;
///     type Error = Infallible;
///
///     fn create(_ctx: &Construction<'_>, id: u32) -> Result<Self, Infallible> {
///         Ok(Token(id))
///     }
/// }
///
/// assert_eq!(primary::get_or_create::<Token>(1).unwrap().0, 1);
/// assert_eq!(secondary::get_or_create::<Token>(2).unwrap().0, 2);
/// ```
#[macro_export]
macro_rules! define_registry {
    ($name:ident) => {
        pub mod $name {
            use std::sync::{Arc, LazyLock};

            // Registry storage (module-private)
            static REGISTRY: LazyLock<$crate::Registry> = LazyLock::new($crate::Registry::new);

            /// The registry behind this module.
            pub fn registry() -> &'static $crate::Registry {
                &REGISTRY
            }

            /// Return the instance of `T`, constructing it with `args` if needed.
            pub fn get_or_create<T: $crate::Singleton>(
                args: T::Args,
            ) -> Result<Arc<$crate::Instance<T>>, $crate::RegistryError> {
                REGISTRY.get_or_create::<T>(args)
            }

            /// Return the instance of `T` without constructing it.
            pub fn get<T: $crate::Singleton>(
            ) -> Result<Arc<$crate::Instance<T>>, $crate::RegistryError> {
                REGISTRY.get::<T>()
            }

            /// Check if an instance of `T` exists.
            pub fn contains<T: $crate::Singleton>() -> bool {
                REGISTRY.contains::<T>()
            }

            /// Set the lock type for singletons constructed from now on.
            pub fn set_lock_type(lock_type: $crate::LockType) -> bool {
                REGISTRY.set_lock_type(lock_type)
            }

            /// Current lock type for new singletons.
            pub fn get_lock_type() -> $crate::LockType {
                REGISTRY.get_lock_type()
            }

            /// Drop every singleton and its lock.
            pub fn reset() {
                REGISTRY.reset()
            }

            /// Set a tracing callback for registry operations.
            pub fn set_trace_callback(
                callback: impl Fn(&$crate::RegistryEvent) + Send + Sync + 'static,
            ) {
                REGISTRY.set_trace_callback(callback)
            }

            /// Clear the tracing callback.
            pub fn clear_trace_callback() {
                REGISTRY.clear_trace_callback()
            }
        }
    };
}
