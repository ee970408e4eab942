//! Nested singletons example for singleton-lock-registry.
//!
//! Demonstrates:
//! - Implementing `Singleton` for application services
//! - Building one singleton from inside another's constructor
//! - Concurrent first access from several threads
//! - Switching to abortable locks and catching a self-deadlock with a `Watchdog`
//!
//! Run with: `cargo run --example nested_singletons`

use singleton_lock_registry::{
    same_lock, Construction, LockError, LockType, Registry, RegistryError, Singleton, Watchdog,
    LOCK_ATTR_KEY,
};
use std::convert::Infallible;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

struct Config {
    database_url: String,
}

impl Singleton for Config {
    type Args = &'static str;
    type Error = Infallible;

    fn create(_ctx: &Construction<'_>, url: &'static str) -> Result<Self, Infallible> {
        Ok(Config {
            database_url: url.to_string(),
        })
    }
}

struct Database {
    url: String,
}

impl Singleton for Database {
    type Args = ();
    type Error = RegistryError;

    fn create(ctx: &Construction<'_>, _: ()) -> Result<Self, RegistryError> {
        // Config has its own lock, so this does not contend with ours.
        let config = ctx.get_or_create::<Config>("postgres://localhost/app")?;
        Ok(Database {
            url: config.database_url.clone(),
        })
    }
}

struct Careless;

impl Singleton for Careless {
    type Args = ();
    type Error = LockError;

    fn create(ctx: &Construction<'_>, _: ()) -> Result<Self, LockError> {
        let _watchdog = Watchdog::arm(ctx.lock().clone(), Duration::from_millis(200));
        ctx.lock().acquire()?;
        Ok(Careless)
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    println!("=== singleton-lock-registry: Nested Singletons ===\n");

    // -------------------------------------------------------------------------
    // 1. Concurrent first access
    // -------------------------------------------------------------------------
    println!("1. Building Database from 4 threads...");

    let registry = Arc::new(Registry::new());
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let registry = registry.clone();
            thread::spawn(move || registry.get_or_create::<Database>(()))
        })
        .collect();

    let databases: Vec<_> = handles
        .into_iter()
        .filter_map(|h| h.join().ok().and_then(Result::ok))
        .collect();

    let all_same = databases.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1]));
    println!("   {} handles, all the same instance: {}", databases.len(), all_same);

    // -------------------------------------------------------------------------
    // 2. Inspect the locks
    // -------------------------------------------------------------------------
    println!("\n2. Inspecting per-type locks...");

    if let (Ok(database), Ok(config)) = (registry.get::<Database>(), registry.get::<Config>()) {
        println!("   Database url: {}", database.url);
        if let (Some(a), Some(b)) = (
            database.attribute(LOCK_ATTR_KEY),
            config.attribute(LOCK_ATTR_KEY),
        ) {
            println!("   Database and Config share a lock: {}", same_lock(a, b));
        }
    }

    // -------------------------------------------------------------------------
    // 3. Catching a self-deadlock
    // -------------------------------------------------------------------------
    println!("\n3. Catching a self-deadlock with an abortable lock...");

    registry.set_lock_type(LockType::abortable());
    match registry.get_or_create::<Careless>(()) {
        Ok(_) => println!("   unexpectedly constructed"),
        Err(err) => println!("   caught: {err}"),
    }

    // -------------------------------------------------------------------------
    // 4. Reset
    // -------------------------------------------------------------------------
    println!("\n4. Resetting...");

    registry.reset();
    println!("   instances after reset: {}", registry.len());

    println!("\n=== Example completed successfully! ===");
}
