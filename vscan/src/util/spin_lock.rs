//! Bare metal spinlocks using atomic memory operations.

use core::cell::UnsafeCell;
use core::fmt;
use core::sync::atomic::{AtomicBool, Ordering};

/// Protects a `T` so that it can't be accessed concurrently or reentrantly.
///
/// `SpinLock` is a lot like `Mutex` from the standard library, but in a greatly
/// simplified form intended for bare metal use. Locking never waits: it either
/// succeeds at once or fails. The driver shares state between its interrupt
/// handlers with these, and treats failure as an overrun (one handler running
/// long enough to collide with the next) rather than something to retry.
#[derive(Debug)]
pub struct SpinLock<T: ?Sized> {
    locked: AtomicBool,
    contents: UnsafeCell<T>,
}

unsafe impl<T: Send + ?Sized> Sync for SpinLock<T> {}

impl<T> SpinLock<T> {
    pub const fn new(contents: T) -> Self {
        SpinLock {
            locked: AtomicBool::new(false),
            contents: UnsafeCell::new(contents),
        }
    }
}

/// Reasons a lock attempt fails.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SpinLockError {
    Contended,
}

impl fmt::Display for SpinLockError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SpinLockError::Contended => f.write_str("lock contended"),
        }
    }
}

impl<T: ?Sized + Send> SpinLock<T> {
    /// Locks the cell if nobody else has it.
    pub fn try_lock(&self) -> Result<SpinLockGuard<T>, SpinLockError> {
        if self.locked.swap(true, Ordering::Acquire) {
            Err(SpinLockError::Contended)
        } else {
            // Only one caller can observe the false->true transition, so the
            // reference below is exclusive until the guard drops.
            Ok(SpinLockGuard {
                locked: LockBorrow(&self.locked),
                // Safety: we've locked, so we can generate an exclusive
                // reference.
                contents: unsafe { &mut *self.contents.get() },
            })
        }
    }

    /// Locks the cell, retrying until it's free. Only sensible where the holder
    /// can run concurrently, i.e. not against a preempted holder.
    pub fn lock(&self) -> SpinLockGuard<T> {
        loop {
            if let Ok(guard) = self.try_lock() {
                return guard;
            }
        }
    }
}

#[must_use = "if dropped, the spinlock will immediately unlock"]
#[derive(Debug)]
pub struct SpinLockGuard<'a, T: ?Sized> {
    locked: LockBorrow<'a>,
    contents: &'a mut T,
}

/// The lock flag, released on drop. Kept separate from `SpinLockGuard` so that
/// `map` can take the guard apart, which `Drop` types don't allow.
#[derive(Debug)]
struct LockBorrow<'a>(&'a AtomicBool);

impl<'a, T: ?Sized> SpinLockGuard<'a, T> {
    /// Narrows a guard of `T` to a guard of some part of `T`.
    pub fn map<U: ?Sized>(
        orig: SpinLockGuard<'a, T>,
        f: impl FnOnce(&mut T) -> &mut U,
    ) -> SpinLockGuard<'a, U> {
        let SpinLockGuard { locked, contents } = orig;
        SpinLockGuard {
            locked,
            contents: f(contents),
        }
    }
}

impl<'a, T: ?Sized> core::ops::Deref for SpinLockGuard<'a, T> {
    type Target = T;
    fn deref(&self) -> &T {
        self.contents
    }
}

impl<'a, T: ?Sized> core::ops::DerefMut for SpinLockGuard<'a, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.contents
    }
}

impl<'a> Drop for LockBorrow<'a> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exclusive_until_dropped() {
        let lock = SpinLock::new(3);
        let mut g = lock.try_lock().unwrap();
        *g += 1;
        assert_eq!(lock.try_lock().err(), Some(SpinLockError::Contended));
        drop(g);
        assert_eq!(*lock.try_lock().unwrap(), 4);
    }

    #[test]
    fn mapped_guard_keeps_lock() {
        let lock = SpinLock::new(Some((1, 2)));
        {
            let mut g = SpinLockGuard::map(lock.try_lock().unwrap(), |o| {
                &mut o.as_mut().unwrap().1
            });
            *g = 7;
            assert!(lock.try_lock().is_err());
        }
        assert_eq!(*lock.lock(), Some((1, 7)));
    }
}
