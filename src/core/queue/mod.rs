//! Message containers.
//!
//! Defines the per-queue container abstraction and the map of named queues.
//! Each abstraction ships in two flavours:
//!
//! - plain std collections (`VecDeque`, `HashMap`), protected from the
//!   outside by a [`MutexLock`](crate::core::lockable::MutexLock) or
//!   [`ReadWriteLock`](crate::core::lockable::ReadWriteLock)
//! - self-synchronized handles ([`ConcurrentQueue`], [`ConcurrentMap`]) that
//!   are wrapped in a [`NoLock`](crate::core::lockable::NoLock)

pub mod concurrent;
pub mod map;

pub use concurrent::ConcurrentQueue;
pub use map::{ConcurrentMap, QueueMap};

use std::collections::VecDeque;
use std::sync::Arc;

use crate::core::message::MessageRef;

/// Verdict of a scan callback on one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visit {
    /// Leave the message in place and move on.
    Keep,
    /// Remove the message and move on.
    Evict,
    /// Stop the scan and return this message. It stays queued.
    Take,
}

/// An ordered, FIFO sequence of messages.
pub trait MessageQueue: Send + Sync {
    /// Appends at the tail.
    fn enqueue(&mut self, message: MessageRef);

    /// Visits messages from the head until one is taken, evicting along the
    /// way as instructed. Stops early on the first error.
    fn scan<E>(
        &mut self,
        visit: impl FnMut(&MessageRef) -> Result<Visit, E>,
    ) -> Result<Option<MessageRef>, E>;

    /// Removes `message` by identity. Returns whether it was present.
    fn remove(&mut self, message: &MessageRef) -> bool;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MessageQueue for VecDeque<MessageRef> {
    #[inline]
    fn enqueue(&mut self, message: MessageRef) {
        self.push_back(message);
    }

    fn scan<E>(
        &mut self,
        mut visit: impl FnMut(&MessageRef) -> Result<Visit, E>,
    ) -> Result<Option<MessageRef>, E> {
        let mut i = 0;
        while i < VecDeque::len(self) {
            match visit(&self[i])? {
                Visit::Keep => i += 1,
                Visit::Evict => {
                    VecDeque::remove(self, i);
                }
                Visit::Take => return Ok(Some(Arc::clone(&self[i]))),
            }
        }
        Ok(None)
    }

    fn remove(&mut self, message: &MessageRef) -> bool {
        match self.iter().position(|m| Arc::ptr_eq(m, message)) {
            Some(pos) => VecDeque::remove(self, pos).is_some(),
            None => false,
        }
    }

    #[inline]
    fn len(&self) -> usize {
        VecDeque::len(self)
    }
}
