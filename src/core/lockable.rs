//! Pluggable access strategies for shared values.
//!
//! A [`Lockable`] brokers access to a value through three levels:
//!
//! - `unlocked`: bypasses any lock. Takes `&mut self`, so it is only reachable
//!   while the value has not been published to other threads.
//! - `read`: read-only access, possibly shared with other readers.
//! - `write`: access with side effects, exclusive against other writers.
//!
//! Strategies are chosen once per instance and never mixed:
//!
//! - [`NoLock`]: the value synchronizes itself ([`Shared`])
//! - [`MutexLock`]: one exclusive lock for readers and writers alike
//! - [`ReadWriteLock`]: shared readers, exclusive writers
//!
//! No access times out. A contended strategy blocks until the value is free.
//!
//! Locked strategies are reentrant for reads: a thread holding access may
//! `read` the same instance again. Inside a `write` task the `&mut` argument
//! is the read capability. Re-entering the same instance from inside a
//! `write` task would alias that `&mut` and panics instead of deadlocking.

use std::cell::RefCell;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::{ReentrantMutex, RwLock};

/// Access broker for a protected value.
pub trait Lockable: Send + Sync {
    type Target;

    /// Runs `task` without locking. Exclusive ownership of the wrapper is the
    /// proof that no other thread can observe the value yet.
    fn unlocked<V>(&mut self, task: impl FnOnce(&mut Self::Target) -> V) -> V;

    /// Runs a read-only `task`.
    fn read<V>(&self, task: impl FnOnce(&Self::Target) -> V) -> V;

    /// Runs a `task` that may mutate the value.
    fn write<V>(&self, task: impl FnOnce(&mut Self::Target) -> V) -> V;
}

/// A cheap-to-clone handle onto storage that synchronizes itself.
///
/// Every clone observes and mutates the same storage, so a write task may be
/// handed a fresh handle instead of exclusive access to the original.
pub trait Shared: Clone + Send + Sync {}

// ───────────────────────────────────────────────────────────
// No lock
// ───────────────────────────────────────────────────────────

/// Runs every task immediately. Only wraps self-synchronizing handles.
#[derive(Debug, Default)]
pub struct NoLock<T: Shared> {
    value: T,
}

impl<T: Shared> NoLock<T> {
    pub fn new(value: T) -> Self {
        Self { value }
    }
}

impl<T: Shared> Lockable for NoLock<T> {
    type Target = T;

    #[inline]
    fn unlocked<V>(&mut self, task: impl FnOnce(&mut T) -> V) -> V {
        task(&mut self.value)
    }

    #[inline]
    fn read<V>(&self, task: impl FnOnce(&T) -> V) -> V {
        task(&self.value)
    }

    #[inline]
    fn write<V>(&self, task: impl FnOnce(&mut T) -> V) -> V {
        let mut handle = self.value.clone();
        task(&mut handle)
    }
}

// ───────────────────────────────────────────────────────────
// Mutex
// ───────────────────────────────────────────────────────────

/// Serializes readers and writers behind one reentrant mutex.
///
/// # Panics
///
/// `read` or `write` from inside a `write` task on the same instance, and
/// `write` from inside a `read` task.
#[derive(Debug, Default)]
pub struct MutexLock<T> {
    inner: ReentrantMutex<RefCell<T>>,
}

impl<T> MutexLock<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: ReentrantMutex::new(RefCell::new(value)),
        }
    }
}

impl<T: Send> Lockable for MutexLock<T> {
    type Target = T;

    #[inline]
    fn unlocked<V>(&mut self, task: impl FnOnce(&mut T) -> V) -> V {
        task(self.inner.get_mut().get_mut())
    }

    #[inline]
    fn read<V>(&self, task: impl FnOnce(&T) -> V) -> V {
        let guard = self.inner.lock();
        let value = guard.borrow();
        task(&*value)
    }

    #[inline]
    fn write<V>(&self, task: impl FnOnce(&mut T) -> V) -> V {
        let guard = self.inner.lock();
        let mut value = guard.borrow_mut();
        task(&mut *value)
    }
}

// ───────────────────────────────────────────────────────────
// Reader/writer lock
// ───────────────────────────────────────────────────────────

/// Address of a thread-local, unique among live threads.
fn thread_token() -> usize {
    thread_local!(static TOKEN: u8 = 0);
    TOKEN.with(|token| token as *const u8 as usize)
}

/// Marks the current thread as the writer until dropped.
struct WriterMark<'a>(&'a AtomicUsize);

impl<'a> WriterMark<'a> {
    fn set(slot: &'a AtomicUsize) -> Self {
        slot.store(thread_token(), Ordering::Relaxed);
        Self(slot)
    }
}

impl Drop for WriterMark<'_> {
    fn drop(&mut self) {
        self.0.store(0, Ordering::Relaxed);
    }
}

/// Many concurrent readers or one writer.
///
/// Reads are recursive, so a thread already holding a read may read again
/// even while a writer waits. A read is never upgraded to a write: callers
/// needing both release, reacquire, and re-validate.
///
/// # Panics
///
/// `read` or `write` from inside a `write` task on the same instance.
#[derive(Debug, Default)]
pub struct ReadWriteLock<T> {
    inner: RwLock<T>,
    /// Token of the thread inside `write`, `0` if none.
    writer: AtomicUsize,
}

impl<T> ReadWriteLock<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: RwLock::new(value),
            writer: AtomicUsize::new(0),
        }
    }

    /// Only the writing thread can observe its own token here.
    fn reject_reentry(&self) {
        if self.writer.load(Ordering::Relaxed) == thread_token() {
            panic!("ReadWriteLock re-entered from inside its own write task");
        }
    }
}

impl<T: Send + Sync> Lockable for ReadWriteLock<T> {
    type Target = T;

    #[inline]
    fn unlocked<V>(&mut self, task: impl FnOnce(&mut T) -> V) -> V {
        task(self.inner.get_mut())
    }

    #[inline]
    fn read<V>(&self, task: impl FnOnce(&T) -> V) -> V {
        self.reject_reentry();
        task(&*self.inner.read_recursive())
    }

    #[inline]
    fn write<V>(&self, task: impl FnOnce(&mut T) -> V) -> V {
        self.reject_reentry();
        let mut guard = self.inner.write();
        let _mark = WriterMark::set(&self.writer);
        task(&mut *guard)
    }
}
