//! Selection of the lock type used for newly created registry entries.

use std::sync::{Arc, RwLock};

use crate::lock::{LockType, Lockable};

/// Holds the active [`LockType`].
///
/// Changing the lock type only affects entries created afterwards; locks that were
/// already handed out keep their type. The state is guarded by its own `RwLock`,
/// independent of any per-type lock, so it can be changed while constructions run.
#[derive(Debug, Default)]
pub struct LockStrategy {
    active: RwLock<LockType>,
}

impl LockStrategy {
    /// A strategy starting out with `lock_type` instead of [`LockType::standard`].
    pub fn new(lock_type: LockType) -> Self {
        Self {
            active: RwLock::new(lock_type),
        }
    }

    /// Replaces the lock type used for future entries. Always returns `true`.
    pub fn set_lock_type(&self, lock_type: LockType) -> bool {
        self.replace_lock_type(lock_type);
        true
    }

    /// Replaces the lock type and returns the one it superseded.
    pub fn replace_lock_type(&self, lock_type: LockType) -> LockType {
        let mut active = self.active.write().unwrap_or_else(|p| p.into_inner());
        std::mem::replace(&mut *active, lock_type)
    }

    pub fn get_lock_type(&self) -> LockType {
        self.active
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    /// Creates a lock of the active type.
    ///
    /// On failure returns the name of the lock type together with the factory's reason.
    pub fn create_lock(&self) -> Result<Arc<dyn Lockable>, (&'static str, String)> {
        let lock_type = self.get_lock_type();
        lock_type
            .create()
            .map_err(|reason| (lock_type.name(), reason))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::{AbortableLock, StandardLock};
    use std::collections::HashSet;
    use std::thread;

    #[test]
    fn test_default_is_standard() {
        let strategy = LockStrategy::default();
        assert_eq!(strategy.get_lock_type(), LockType::standard());

        let lock = strategy.create_lock().unwrap();
        assert!(lock.as_any().is::<StandardLock>());
    }

    #[test]
    fn test_set_lock_type_applies_to_new_locks_only() {
        let strategy = LockStrategy::default();
        let before = strategy.create_lock().unwrap();

        assert!(strategy.set_lock_type(LockType::abortable()));
        assert_eq!(strategy.get_lock_type(), LockType::abortable());

        let after = strategy.create_lock().unwrap();
        assert!(before.as_any().is::<StandardLock>());
        assert!(after.as_any().is::<AbortableLock>());
    }

    #[test]
    fn test_create_lock_reports_failing_type() {
        let strategy = LockStrategy::new(LockType::new("broken", || Err("nope".into())));
        let (name, reason) = strategy.create_lock().unwrap_err();
        assert_eq!(name, "broken");
        assert_eq!(reason, "nope");
    }

    #[test]
    fn test_concurrent_set_and_create() {
        let strategy = Arc::new(LockStrategy::default());

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let strategy = strategy.clone();
                thread::spawn(move || {
                    for _ in 0..100 {
                        let lock_type = if i % 2 == 0 {
                            LockType::standard()
                        } else {
                            LockType::abortable()
                        };
                        assert!(strategy.set_lock_type(lock_type));
                        let lock = strategy.create_lock().unwrap();
                        assert!(matches!(lock.kind(), "standard" | "abortable"));
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
    }

    #[test]
    fn test_replace_hands_out_each_lock_type_once() {
        const NAMES: [&str; 8] = ["a", "b", "c", "d", "e", "f", "g", "h"];
        let strategy = Arc::new(LockStrategy::default());

        let handles: Vec<_> = NAMES
            .iter()
            .map(|&name| {
                let strategy = strategy.clone();
                thread::spawn(move || {
                    let lock_type = LockType::new(name, || Err("unused".into()));
                    strategy.replace_lock_type(lock_type).name()
                })
            })
            .collect();

        let mut seen: HashSet<&str> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        seen.insert(strategy.get_lock_type().name());

        let mut expected: HashSet<&str> = NAMES.into_iter().collect();
        expected.insert(LockType::STANDARD);
        assert_eq!(seen, expected);
    }
}
