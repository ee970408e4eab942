//! Integration tests for exactly-once construction under concurrent callers.

use singleton_lock_registry::{
    same_lock, Construction, Instance, LockType, Registry, Singleton, LOCK_ATTR_KEY,
};
use std::convert::Infallible;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

const CALLERS: usize = 16;

fn init_logging() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

// Each test gets its own type so the construction counters are not shared.
macro_rules! slow_singleton {
    ($name:ident, $counter:ident) => {
        static $counter: AtomicUsize = AtomicUsize::new(0);

        struct $name {
            built_by: usize,
        }

        impl Singleton for $name {
            type Args = usize;
            type Error = Infallible;

            fn create(_ctx: &Construction<'_>, caller: usize) -> Result<Self, Infallible> {
                $counter.fetch_add(1, Ordering::SeqCst);
                // Widen the window in which other callers pile up on the lock.
                thread::sleep(Duration::from_millis(20));
                Ok($name { built_by: caller })
            }
        }
    };
}

slow_singleton!(Telemetry, TELEMETRY_BUILDS);
slow_singleton!(Scheduler, SCHEDULER_BUILDS);
slow_singleton!(MetricsSink, METRICS_BUILDS);

fn race<T: Singleton<Args = usize>>(registry: &Arc<Registry>) -> Vec<Arc<Instance<T>>> {
    let barrier = Arc::new(Barrier::new(CALLERS));

    let handles: Vec<_> = (0..CALLERS)
        .map(|caller| {
            let registry = registry.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                match registry.get_or_create::<T>(caller) {
                    Ok(instance) => instance,
                    Err(err) => panic!("construction failed: {err}"),
                }
            })
        })
        .collect();

    handles.into_iter().map(|h| h.join().unwrap()).collect()
}

#[test]
fn test_concurrent_callers_share_one_instance() {
    init_logging();
    let registry = Arc::new(Registry::new());

    let instances = race::<Telemetry>(&registry);

    assert_eq!(TELEMETRY_BUILDS.load(Ordering::SeqCst), 1);
    let first = &instances[0];
    assert!(instances.iter().all(|i| Arc::ptr_eq(i, first)));
    assert!(first.built_by < CALLERS);
    assert!(!first.lock().is_locked());
}

#[test]
fn test_concurrent_callers_with_abortable_locks() {
    init_logging();
    let registry = Arc::new(Registry::with_lock_type(LockType::abortable()));

    let instances = race::<Scheduler>(&registry);

    assert_eq!(SCHEDULER_BUILDS.load(Ordering::SeqCst), 1);
    let first = &instances[0];
    assert!(instances.iter().all(|i| Arc::ptr_eq(i, first)));
    assert_eq!(first.lock().kind(), "abortable");
}

#[test]
fn test_every_caller_sees_the_same_lock() {
    init_logging();
    let registry = Arc::new(Registry::new());

    let instances = race::<MetricsSink>(&registry);

    assert_eq!(METRICS_BUILDS.load(Ordering::SeqCst), 1);
    let lock = instances[0].attribute(LOCK_ATTR_KEY).unwrap();
    assert!(instances
        .iter()
        .all(|i| same_lock(i.attribute(LOCK_ATTR_KEY).unwrap(), lock)));
}

#[test]
fn test_different_types_construct_in_parallel() {
    init_logging();

    struct Left;
    struct Right;

    impl Singleton for Left {
        type Args = Arc<Barrier>;
        type Error = Infallible;

        fn create(_ctx: &Construction<'_>, meet: Arc<Barrier>) -> Result<Self, Infallible> {
            meet.wait();
            Ok(Left)
        }
    }

    impl Singleton for Right {
        type Args = Arc<Barrier>;
        type Error = Infallible;

        fn create(_ctx: &Construction<'_>, meet: Arc<Barrier>) -> Result<Self, Infallible> {
            meet.wait();
            Ok(Right)
        }
    }

    // Both constructors must be running at the same time to pass the barrier.
    let registry = Arc::new(Registry::new());
    let meet = Arc::new(Barrier::new(2));

    let left = {
        let registry = registry.clone();
        let meet = meet.clone();
        thread::spawn(move || registry.get_or_create::<Left>(meet).is_ok())
    };
    let right = registry.get_or_create::<Right>(meet).unwrap();

    assert!(left.join().unwrap());
    let left = registry.get::<Left>().unwrap();
    assert!(!same_lock(left.lock(), right.lock()));
    assert_eq!(registry.len(), 2);
}
