//! Pluggable locks guarding singleton construction.
//!
//! Every registry entry owns one [`Lockable`] created from the [`LockType`] that was
//! active when the entry was created. Two implementations ship with the crate:
//!
//! - [`StandardLock`] - the default, a plain non-reentrant mutual-exclusion lock.
//! - [`AbortableLock`] - a test lock whose waiters can be failed from another thread,
//!   typically by a [`Watchdog`], so an accidental deadlock becomes an error instead
//!   of a hung test.

use std::any::Any;
use std::fmt;
use std::str::FromStr;
use std::sync::{mpsc, Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use thiserror::Error;

/// Errors reported by a [`Lockable`].
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockError {
    /// The acquisition was forcibly terminated by [`Lockable::abort`].
    #[error("lock acquisition was aborted")]
    Aborted,
}

/// A lock that can be acquired and released without a borrowed guard.
///
/// Implementations must be usable from any thread. The registry goes through
/// [`LockGuard`], which pairs every [`acquire_hold`](Lockable::acquire_hold) with
/// exactly one [`release_hold`](Lockable::release_hold).
pub trait Lockable: Any + Send + Sync + fmt::Debug {
    /// Blocks until the lock is held by the caller.
    ///
    /// # Errors
    ///
    /// - [`LockError::Aborted`] if the wait was terminated by [`Lockable::abort`]
    fn acquire(&self) -> Result<(), LockError>;

    /// Releases the lock and wakes a waiter.
    fn release(&self);

    /// Like [`acquire`](Lockable::acquire), returning a [`Hold`] that identifies this
    /// acquisition.
    fn acquire_hold(&self) -> Result<Hold, LockError> {
        self.acquire().map(|()| Hold::default())
    }

    /// Releases the acquisition identified by `hold`.
    ///
    /// Locks that support [`abort`](Lockable::abort) ignore holds taken before the
    /// last abort, so a holder whose lock was aborted cannot release a newer holder.
    fn release_hold(&self, hold: Hold) {
        let _ = hold;
        self.release();
    }

    /// Forcibly releases the lock and fails every pending `acquire`.
    ///
    /// Returns `false` when the implementation does not support aborting.
    fn abort(&self) -> bool {
        false
    }

    /// Whether the lock is currently held.
    fn is_locked(&self) -> bool;

    /// Short name of the implementation, matching its [`LockType`] name.
    fn kind(&self) -> &'static str;

    /// Access to the concrete lock, for downcasting in tests.
    fn as_any(&self) -> &dyn Any;
}

/// Identifies one successful acquisition of a [`Lockable`] by the abort epoch it
/// was taken in.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Hold {
    epoch: u64,
}

impl Hold {
    pub fn new(epoch: u64) -> Self {
        Self { epoch }
    }

    pub fn epoch(self) -> u64 {
        self.epoch
    }
}

/// Returns `true` if both handles point at the same lock object.
pub fn same_lock(a: &Arc<dyn Lockable>, b: &Arc<dyn Lockable>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// Holds a [`Lockable`] until dropped.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct LockGuard<'a> {
    lock: &'a dyn Lockable,
    hold: Hold,
}

impl<'a> LockGuard<'a> {
    /// Acquires `lock` and returns a guard releasing it on drop.
    pub fn acquire(lock: &'a dyn Lockable) -> Result<Self, LockError> {
        let hold = lock.acquire_hold()?;
        Ok(Self { lock, hold })
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        self.lock.release_hold(self.hold);
    }
}

impl fmt::Debug for LockGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockGuard")
            .field("lock", &self.lock)
            .field("hold", &self.hold)
            .finish()
    }
}

// -------------------------------------------------------------------------------------------------
// StandardLock
// -------------------------------------------------------------------------------------------------

/// The default lock: a non-reentrant mutex.
///
/// Acquiring it twice from the same thread blocks forever.
#[derive(Debug, Default)]
pub struct StandardLock {
    locked: Mutex<bool>,
    released: Condvar,
}

impl StandardLock {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, bool> {
        self.locked.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl Lockable for StandardLock {
    fn acquire(&self) -> Result<(), LockError> {
        let mut locked = self.state();
        while *locked {
            locked = self
                .released
                .wait(locked)
                .unwrap_or_else(|p| p.into_inner());
        }
        *locked = true;
        Ok(())
    }

    fn release(&self) {
        *self.state() = false;
        self.released.notify_one();
    }

    fn is_locked(&self) -> bool {
        *self.state()
    }

    fn kind(&self) -> &'static str {
        LockType::STANDARD
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// -------------------------------------------------------------------------------------------------
// AbortableLock
// -------------------------------------------------------------------------------------------------

#[derive(Debug, Default)]
struct AbortState {
    locked: bool,
    /// Bumped by every abort; a waiter that sees it change was aborted.
    epoch: u64,
}

/// A non-reentrant lock whose waiters can be forcibly failed.
///
/// [`abort`](Lockable::abort) clears the held flag and makes every thread currently
/// blocked in `acquire` return [`LockError::Aborted`]. Threads arriving afterwards
/// acquire normally, so an aborted lock stays usable. A [`Hold`] taken before an abort
/// is stale: releasing it through [`release_hold`](Lockable::release_hold) is a no-op.
#[derive(Debug, Default)]
pub struct AbortableLock {
    state: Mutex<AbortState>,
    changed: Condvar,
}

impl AbortableLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of times this lock has been aborted.
    pub fn aborts(&self) -> u64 {
        self.state().epoch
    }

    fn state(&self) -> MutexGuard<'_, AbortState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl Lockable for AbortableLock {
    fn acquire(&self) -> Result<(), LockError> {
        self.acquire_hold().map(|_| ())
    }

    fn release(&self) {
        self.state().locked = false;
        self.changed.notify_all();
    }

    fn acquire_hold(&self) -> Result<Hold, LockError> {
        let mut state = self.state();
        let epoch = state.epoch;
        while state.locked {
            state = self.changed.wait(state).unwrap_or_else(|p| p.into_inner());
            if state.epoch != epoch {
                return Err(LockError::Aborted);
            }
        }
        state.locked = true;
        Ok(Hold::new(epoch))
    }

    fn release_hold(&self, hold: Hold) {
        {
            let mut state = self.state();
            if state.epoch != hold.epoch() {
                return;
            }
            state.locked = false;
        }
        self.changed.notify_all();
    }

    fn abort(&self) -> bool {
        {
            let mut state = self.state();
            state.epoch += 1;
            state.locked = false;
        }
        self.changed.notify_all();
        true
    }

    fn is_locked(&self) -> bool {
        self.state().locked
    }

    fn kind(&self) -> &'static str {
        LockType::ABORTABLE
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// -------------------------------------------------------------------------------------------------
// Watchdog
// -------------------------------------------------------------------------------------------------

/// Aborts a lock if it is not disarmed within a deadline.
///
/// Dropping the watchdog disarms it.
///
/// ```rust
/// use std::sync::Arc;
/// use std::time::Duration;
/// use singleton_lock_registry::{AbortableLock, LockError, Lockable, Watchdog};
///
/// let lock: Arc<dyn Lockable> = Arc::new(AbortableLock::new());
/// lock.acquire().unwrap();
///
/// let watchdog = Watchdog::arm(lock.clone(), Duration::from_millis(50));
/// // Second acquire on a non-reentrant lock: would hang without the watchdog.
/// assert_eq!(lock.acquire(), Err(LockError::Aborted));
/// assert!(watchdog.disarm());
/// ```
#[derive(Debug)]
pub struct Watchdog {
    disarm: Option<mpsc::Sender<()>>,
    handle: Option<JoinHandle<bool>>,
}

impl Watchdog {
    /// Starts a supervisor thread that aborts `lock` after `after`.
    pub fn arm(lock: Arc<dyn Lockable>, after: Duration) -> Self {
        let (disarm, disarmed) = mpsc::channel::<()>();
        let handle = thread::spawn(move || match disarmed.recv_timeout(after) {
            Err(mpsc::RecvTimeoutError::Timeout) => {
                tracing::warn!(
                    lock_type = lock.kind(),
                    timeout_ms = after.as_millis() as u64,
                    "watchdog deadline expired, aborting lock"
                );
                lock.abort()
            }
            _ => false,
        });

        Self {
            disarm: Some(disarm),
            handle: Some(handle),
        }
    }

    /// Stops the watchdog and reports whether it had already aborted the lock.
    pub fn disarm(mut self) -> bool {
        self.stop()
    }

    fn stop(&mut self) -> bool {
        if let Some(disarm) = self.disarm.take() {
            let _ = disarm.send(());
        }
        self.handle
            .take()
            .map(|handle| handle.join().unwrap_or(false))
            .unwrap_or(false)
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.stop();
    }
}

// -------------------------------------------------------------------------------------------------
// LockType
// -------------------------------------------------------------------------------------------------

type LockFactory = dyn Fn() -> Result<Arc<dyn Lockable>, String> + Send + Sync;

/// A named constructor for per-type locks.
///
/// Two lock types compare equal when their names are equal.
#[derive(Clone)]
pub struct LockType {
    name: &'static str,
    factory: Arc<LockFactory>,
}

impl LockType {
    /// Name of [`LockType::standard`].
    pub const STANDARD: &'static str = "standard";
    /// Name of [`LockType::abortable`].
    pub const ABORTABLE: &'static str = "abortable";

    /// The default lock type, producing [`StandardLock`]s.
    pub fn standard() -> Self {
        Self::new(Self::STANDARD, || {
            Ok(Arc::new(StandardLock::new()) as Arc<dyn Lockable>)
        })
    }

    /// Produces [`AbortableLock`]s.
    pub fn abortable() -> Self {
        Self::new(Self::ABORTABLE, || {
            Ok(Arc::new(AbortableLock::new()) as Arc<dyn Lockable>)
        })
    }

    /// A custom lock type. The factory may fail; its message ends up in
    /// [`RegistryError::LockCreation`](crate::RegistryError::LockCreation).
    pub fn new(
        name: &'static str,
        factory: impl Fn() -> Result<Arc<dyn Lockable>, String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name,
            factory: Arc::new(factory),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Instantiates a new lock of this type.
    pub fn create(&self) -> Result<Arc<dyn Lockable>, String> {
        (self.factory)()
    }
}

impl Default for LockType {
    fn default() -> Self {
        Self::standard()
    }
}

impl PartialEq for LockType {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for LockType {}

impl fmt::Debug for LockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("LockType").field(&self.name).finish()
    }
}

impl fmt::Display for LockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Returned when parsing an unknown lock type name.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown lock type `{0}` (expected `standard` or `abortable`)")]
pub struct ParseLockTypeError(pub String);

impl FromStr for LockType {
    type Err = ParseLockTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            Self::STANDARD => Ok(Self::standard()),
            Self::ABORTABLE => Ok(Self::abortable()),
            _ => Err(ParseLockTypeError(s.to_string())),
        }
    }
}

// -------------------------------------------------------------------------------------------------
// Tests
// -------------------------------------------------------------------------------------------------
