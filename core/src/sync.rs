//! Scoped lock guards with bounded acquisition
//!
//! RAII wrappers over a mutual-exclusion lock, a reader/writer lock, and a
//! counting semaphore. Plain acquisition blocks indefinitely; the `*_timeout`
//! variants return [`CoreError::LockTimeout`] instead of blocking forever.
//! Release always happens on guard drop, on every exit path.

use crate::{CoreError, Result};
use parking_lot::{Condvar, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

/// Mutual-exclusion lock whose acquisition can be bounded by a timeout
#[derive(Debug, Default)]
pub struct TimedMutex<T> {
    inner: Mutex<T>,
}

impl<T> TimedMutex<T> {
    /// Create a new lock holding `value`
    pub fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(value),
        }
    }

    /// Acquire the lock, blocking until it is available
    pub fn lock(&self) -> MutexGuard<'_, T> {
        self.inner.lock()
    }

    /// Acquire the lock, waiting at most `timeout`
    pub fn lock_timeout(&self, timeout: Duration) -> Result<MutexGuard<'_, T>> {
        self.inner
            .try_lock_for(timeout)
            .ok_or(CoreError::LockTimeout(timeout))
    }
}

/// Reader/writer lock whose acquisition can be bounded by a timeout
#[derive(Debug, Default)]
pub struct TimedRwLock<T> {
    inner: RwLock<T>,
}

impl<T> TimedRwLock<T> {
    /// Create a new lock holding `value`
    pub fn new(value: T) -> Self {
        Self {
            inner: RwLock::new(value),
        }
    }

    /// Acquire a shared read guard, blocking until available
    pub fn read(&self) -> RwLockReadGuard<'_, T> {
        self.inner.read()
    }

    /// Acquire an exclusive write guard, blocking until available
    pub fn write(&self) -> RwLockWriteGuard<'_, T> {
        self.inner.write()
    }

    /// Acquire a shared read guard, waiting at most `timeout`
    pub fn read_timeout(&self, timeout: Duration) -> Result<RwLockReadGuard<'_, T>> {
        self.inner
            .try_read_for(timeout)
            .ok_or(CoreError::LockTimeout(timeout))
    }

    /// Acquire an exclusive write guard, waiting at most `timeout`
    pub fn write_timeout(&self, timeout: Duration) -> Result<RwLockWriteGuard<'_, T>> {
        self.inner
            .try_write_for(timeout)
            .ok_or(CoreError::LockTimeout(timeout))
    }
}

/// Counting semaphore with RAII permits
///
/// Permits are returned on drop, including when the holding scope unwinds.
#[derive(Debug)]
pub struct Semaphore {
    permits: Mutex<usize>,
    available: Condvar,
}

impl Semaphore {
    /// Create a semaphore with `permits` initially available slots
    pub fn new(permits: usize) -> Self {
        Self {
            permits: Mutex::new(permits),
            available: Condvar::new(),
        }
    }

    /// Acquire one permit, blocking until a slot frees up
    pub fn acquire(&self) -> SemaphorePermit<'_> {
        let mut count = self.permits.lock();
        while *count == 0 {
            self.available.wait(&mut count);
        }
        *count -= 1;
        SemaphorePermit { semaphore: self }
    }

    /// Acquire one permit, waiting at most `timeout`
    pub fn acquire_timeout(&self, timeout: Duration) -> Result<SemaphorePermit<'_>> {
        let deadline = std::time::Instant::now() + timeout;
        let mut count = self.permits.lock();
        while *count == 0 {
            if self.available.wait_until(&mut count, deadline).timed_out() {
                return Err(CoreError::LockTimeout(timeout));
            }
        }
        *count -= 1;
        Ok(SemaphorePermit { semaphore: self })
    }

    /// Number of currently available permits
    pub fn available_permits(&self) -> usize {
        *self.permits.lock()
    }

    fn release(&self) {
        let mut count = self.permits.lock();
        *count += 1;
        self.available.notify_one();
    }
}

/// RAII permit for a [`Semaphore`]; the slot is released on drop
#[derive(Debug)]
pub struct SemaphorePermit<'a> {
    semaphore: &'a Semaphore,
}

impl Drop for SemaphorePermit<'_> {
    fn drop(&mut self) {
        self.semaphore.release();
    }
}
