//! Pluggable locking policies.
//!
//! Every collection and pool owns a `lock_api::Mutex<R, State>`; the raw
//! lock `R` is picked at construction and fixes the thread-safety mode for
//! the lifetime of the object:
//!
//! - [`SyncLock`]: `parking_lot::RawMutex`. Blocks, honours timeouts, and
//!   makes the collection `Send + Sync` (given `Send` contents).
//! - [`LocalLock`]: single-threaded. Never blocks; a nested acquisition on
//!   the same thread panics (it would otherwise deadlock) and a timed
//!   acquisition fails immediately. Being `!Send`/`!Sync`, it turns the
//!   "only touch this from one thread" contract into a compile-time check.

use crate::error::{CollectionError, Result};
use core::cell::Cell;
use core::marker::PhantomData;
use parking_lot::lock_api::{GuardNoSend, Mutex, MutexGuard, RawMutex, RawMutexTimed};
use std::time::{Duration, Instant};

/// Thread-safe raw lock.
pub type SyncLock = parking_lot::RawMutex;

/// Scoped-lock primitive. Holding one gives exclusive access to the
/// collection's state; dropping it unlocks.
pub type ScopedLock<'a, R, S> = MutexGuard<'a, R, S>;

/// A raw lock usable by collections: timed acquisition measured in std
/// `Duration`s.
pub trait LockPolicy: RawMutexTimed<Duration = Duration, Instant = Instant> {
    /// Whether instances guarded by this lock may be shared across threads.
    const THREAD_SAFE: bool;
}

impl LockPolicy for SyncLock {
    const THREAD_SAFE: bool = true;
}

impl LockPolicy for LocalLock {
    const THREAD_SAFE: bool = false;
}

/// Single-threaded raw lock. See the module docs.
#[derive(Debug)]
pub struct LocalLock {
    locked: Cell<bool>,
    // Keep !Send + !Sync in line with single-threaded design.
    _nosend: PhantomData<*mut ()>,
}

unsafe impl RawMutex for LocalLock {
    #[allow(clippy::declare_interior_mutable_const)]
    const INIT: Self = LocalLock {
        locked: Cell::new(false),
        _nosend: PhantomData,
    };

    type GuardMarker = GuardNoSend;

    fn lock(&self) {
        if !self.try_lock() {
            panic!("reentrancy detected: nested lock of a single-threaded collection");
        }
    }

    #[inline]
    fn try_lock(&self) -> bool {
        if self.locked.get() {
            return false;
        }
        self.locked.set(true);
        true
    }

    #[inline]
    unsafe fn unlock(&self) {
        debug_assert!(self.locked.get());
        self.locked.set(false);
    }

    #[inline]
    fn is_locked(&self) -> bool {
        self.locked.get()
    }
}

// Only the owning thread can hold the lock, so waiting can never succeed.
unsafe impl RawMutexTimed for LocalLock {
    type Duration = Duration;
    type Instant = Instant;

    fn try_lock_for(&self, _timeout: Duration) -> bool {
        self.try_lock()
    }

    fn try_lock_until(&self, _timeout: Instant) -> bool {
        self.try_lock()
    }
}

/// Acquire `mutex`, waiting at most `timeout` when one is given.
pub(crate) fn acquire<'a, R: LockPolicy, S>(
    mutex: &'a Mutex<R, S>,
    name: &str,
    timeout: Option<Duration>,
) -> Result<ScopedLock<'a, R, S>> {
    match timeout {
        None => Ok(mutex.lock()),
        Some(t) => mutex.try_lock_for(t).ok_or_else(|| {
            log::warn!("lock on `{}` timed out after {:?}", name, t);
            CollectionError::LockTimeout {
                collection: name.to_string(),
                timeout: t,
            }
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_lock_and_release_is_ok() {
        let m: Mutex<LocalLock, u32> = Mutex::new(1);
        {
            let mut g = m.lock();
            *g += 1;
        }
        assert_eq!(*m.lock(), 2);
    }

    #[test]
    fn local_lock_reentry_panics() {
        let m: Mutex<LocalLock, u32> = Mutex::new(0);
        let res = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _g1 = m.lock();
            // Re-entering must panic rather than deadlock
            let _g2 = m.lock();
        }));
        assert!(res.is_err(), "expected nested lock to panic");
    }

    #[test]
    fn local_lock_timed_acquire_fails_fast_when_held() {
        let m: Mutex<LocalLock, u32> = Mutex::new(0);
        let _g = m.lock();
        let err = acquire(&m, "local", Some(Duration::from_secs(5))).unwrap_err();
        assert!(matches!(err, CollectionError::LockTimeout { .. }));
    }

    #[test]
    fn sync_lock_times_out_across_threads() {
        let m: std::sync::Arc<Mutex<SyncLock, u32>> = std::sync::Arc::new(Mutex::new(0));
        let g = m.lock();
        let m2 = m.clone();
        let res = std::thread::spawn(move || {
            acquire(&m2, "shared", Some(Duration::from_millis(10))).map(|_| ())
        })
        .join()
        .unwrap();
        assert!(matches!(res, Err(CollectionError::LockTimeout { .. })));
        drop(g);
        assert!(acquire(&m, "shared", Some(Duration::from_millis(10))).is_ok());
    }

    #[test]
    fn thread_safety_flags() {
        assert!(<SyncLock as LockPolicy>::THREAD_SAFE);
        assert!(!<LocalLock as LockPolicy>::THREAD_SAFE);
    }
}
