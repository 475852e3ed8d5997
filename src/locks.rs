// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Poison-tolerant lock helpers.
//!
//! Engine callbacks, the reconciler task and the CLI all read shared
//! download snapshots. A panic in one of them must not take every later
//! reader down with it, so these helpers log the poisoning and hand back
//! the guard anyway. A snapshot that is one event stale is corrected by the
//! next event for the same group.
//!
//! ```no_run
//! use std::sync::RwLock;
//! use droidget::locks::{resilient_read, resilient_write};
//!
//! let snapshots = RwLock::new(Vec::<u32>::new());
//! resilient_write(&snapshots).push(7);
//! assert_eq!(resilient_read(&snapshots).len(), 1);
//! ```

use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Acquire a read lock, recovering from poisoning.
#[inline]
pub fn resilient_read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    match lock.read() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::error!(
                target: "droidget::locks",
                event = "LOCK_POISONED_READ",
                "RwLock poisoned during read; recovering possibly stale data"
            );
            poisoned.into_inner()
        }
    }
}

/// Acquire a write lock, recovering from poisoning.
#[inline]
pub fn resilient_write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    match lock.write() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::error!(
                target: "droidget::locks",
                event = "LOCK_POISONED_WRITE",
                "RwLock poisoned during write; recovering possibly stale data"
            );
            poisoned.into_inner()
        }
    }
}

/// Lock a mutex, recovering from poisoning.
#[inline]
pub fn resilient_lock<T>(lock: &Mutex<T>) -> MutexGuard<'_, T> {
    match lock.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::error!(
                target: "droidget::locks",
                event = "LOCK_POISONED_MUTEX",
                "Mutex poisoned; recovering possibly stale data"
            );
            poisoned.into_inner()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_resilient_write_then_read() {
        let lock = RwLock::new(42);
        {
            let mut guard = resilient_write(&lock);
            *guard = 100;
        }
        assert_eq!(*resilient_read(&lock), 100);
    }

    #[test]
    fn test_resilient_read_poisoned() {
        let lock = Arc::new(RwLock::new(42));
        let lock_clone = Arc::clone(&lock);

        let handle = thread::spawn(move || {
            let _guard = lock_clone.write().unwrap();
            panic!("intentional panic to poison lock");
        });
        let _ = handle.join();

        assert_eq!(*resilient_read(&lock), 42);
    }

    #[test]
    fn test_resilient_lock_poisoned() {
        let lock = Arc::new(Mutex::new(vec![1]));
        let lock_clone = Arc::clone(&lock);

        let handle = thread::spawn(move || {
            let _guard = lock_clone.lock().unwrap();
            panic!("intentional panic to poison lock");
        });
        let _ = handle.join();

        let mut guard = resilient_lock(&lock);
        guard.push(2);
        assert_eq!(*guard, vec![1, 2]);
    }
}
