//! Lock helpers shared by the in-memory test doubles.

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Acquires a `Mutex` even after a panicking holder poisoned it.
///
/// Scripted backends and recorders only keep plain bookkeeping behind their
/// locks, so a poisoned guard still holds usable data and the original panic
/// is what a failing test should report.
pub trait IgnoreLock<T> {
    /// Locks, recovering the guard from a poison error.
    fn lock_ignore_poison(&self) -> MutexGuard<'_, T>;

    /// Runs `action` with the lock held and returns its result.
    fn with_lock<R>(&self, action: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = self.lock_ignore_poison();
        action(&mut guard)
    }
}

impl<T> IgnoreLock<T> for Mutex<T> {
    fn lock_ignore_poison(&self) -> MutexGuard<'_, T> {
        self.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "Test code is allowed to unwrap")]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_poisoned_lock_is_still_usable() {
        let shared = Arc::new(Mutex::new(vec![1]));
        let cloned = Arc::clone(&shared);
        let result = thread::spawn(move || {
            let _guard = cloned.lock_ignore_poison();
            panic!("poison the lock");
        })
        .join();
        let payload = result.unwrap_err();
        assert_eq!(payload.downcast_ref::<&str>(), Some(&"poison the lock"));
        assert!(shared.is_poisoned());

        shared.with_lock(|values| values.push(2));
        assert_eq!(*shared.lock_ignore_poison(), vec![1, 2]);
    }
}
