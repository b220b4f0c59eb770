//! Reusable pools of resettable values.
//!
//! Decoded envelopes and handler inputs are checked out of a [`Pool`] for the
//! lifetime of one dispatch and handed back afterwards. A checked-out value is
//! wrapped in a [`Pooled`] guard: it has exactly one owner, and dropping the guard
//! resets the value and returns it to the free list.
//!
//! # Example
//!
//! ```
//! use smartnet::pool::{Pool, Resettable};
//!
//! #[derive(Default)]
//! struct Input {
//!     id: u32,
//! }
//!
//! impl Resettable for Input {}
//!
//! let pool: Pool<Input> = Pool::new();
//! {
//!     let mut input = pool.acquire();
//!     input.id = 7;
//!     assert_eq!(pool.in_use(), 1);
//! }
//! assert_eq!(pool.in_use(), 0);
//! assert_eq!(pool.acquire().id, 0);
//! ```

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

/// Default number of idle values kept per pool.
pub const DEFAULT_MAX_IDLE: usize = 1024;

/// A value that can be returned to its default state before reuse.
///
/// The default implementation replaces the value with `Default::default()`.
/// Override it to keep allocations (e.g. `Vec::clear` instead of a fresh `Vec`).
pub trait Resettable: Default {
    /// Return to the declared default state.
    fn reset(&mut self) {
        *self = Self::default();
    }
}

struct PoolInner<T> {
    free: Mutex<Vec<T>>,
    in_use: AtomicUsize,
    max_idle: usize,
}

/// Thread-safe free list of resettable values.
///
/// Cloning a `Pool` yields another handle to the same free list.
pub struct Pool<T: Resettable> {
    inner: Arc<PoolInner<T>>,
}

impl<T: Resettable> Clone for Pool<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Resettable> Pool<T> {
    /// Create an empty pool keeping at most [`DEFAULT_MAX_IDLE`] idle values.
    pub fn new() -> Self {
        Self::with_max_idle(DEFAULT_MAX_IDLE)
    }

    /// Create an empty pool keeping at most `max_idle` idle values.
    pub fn with_max_idle(max_idle: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                free: Mutex::new(Vec::new()),
                in_use: AtomicUsize::new(0),
                max_idle,
            }),
        }
    }

    /// Check a value out of the pool, creating one if the free list is empty.
    pub fn acquire(&self) -> Pooled<T> {
        let value = self.inner.free.lock().pop().unwrap_or_default();
        self.inner.in_use.fetch_add(1, Ordering::AcqRel);
        Pooled {
            value: Some(value),
            pool: self.inner.clone(),
        }
    }

    /// Number of values currently checked out.
    #[inline]
    pub fn in_use(&self) -> usize {
        self.inner.in_use.load(Ordering::Acquire)
    }

    /// Number of values waiting on the free list.
    pub fn idle(&self) -> usize {
        self.inner.free.lock().len()
    }
}

impl<T: Resettable> Default for Pool<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard for a checked-out value.
///
/// Dropping the guard resets the value and moves the same instance back to
/// its pool.
pub struct Pooled<T: Resettable> {
    /// `None` only while the guard is being dropped.
    value: Option<T>,
    pool: Arc<PoolInner<T>>,
}

impl<T: Resettable> Deref for Pooled<T> {
    type Target = T;

    fn deref(&self) -> &T {
        match &self.value {
            Some(value) => value,
            None => unreachable!("pooled value taken before drop"),
        }
    }
}

impl<T: Resettable> DerefMut for Pooled<T> {
    fn deref_mut(&mut self) -> &mut T {
        match &mut self.value {
            Some(value) => value,
            None => unreachable!("pooled value taken before drop"),
        }
    }
}

impl<T: Resettable> Drop for Pooled<T> {
    fn drop(&mut self) {
        if let Some(mut value) = self.value.take() {
            value.reset();
            let mut free = self.pool.free.lock();
            if free.len() < self.pool.max_idle {
                free.push(value);
            }
        }
        self.pool.in_use.fetch_sub(1, Ordering::AcqRel);
    }
}

impl<T: Resettable + std::fmt::Debug> std::fmt::Debug for Pooled<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Pooled").field(&**self).finish()
    }
}
