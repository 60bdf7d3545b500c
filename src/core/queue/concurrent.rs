//! Self-synchronized message queue.
//!
//! Appends are lock-free: producers push onto a `SegQueue` and never contend
//! with scanners. Scanners first settle pending appends into an ordered
//! backlog, then walk the backlog under a shared read lock, so concurrent
//! pullers really do race for the same head messages.

use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;

use crossbeam_queue::SegQueue;
use parking_lot::RwLock;

use crate::core::lockable::Shared;
use crate::core::message::MessageRef;
use crate::core::queue::{MessageQueue, Visit};

#[derive(Default)]
struct Inner {
    /// Appended but not yet visible to scans.
    incoming: SegQueue<MessageRef>,
    /// Scan order. Every settled message precedes every pending one.
    settled: RwLock<VecDeque<MessageRef>>,
}

/// Cheap-to-clone handle onto one concurrent queue.
#[derive(Clone, Default)]
pub struct ConcurrentQueue {
    inner: Arc<Inner>,
}

impl Shared for ConcurrentQueue {}

impl ConcurrentQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves pending appends behind the backlog, preserving their order.
    fn settle(&self) {
        if self.inner.incoming.is_empty() {
            return;
        }
        let mut settled = self.inner.settled.write();
        while let Some(message) = self.inner.incoming.pop() {
            settled.push_back(message);
        }
    }

    fn evict(&self, evicted: HashSet<MessageRef>) {
        if evicted.is_empty() {
            return;
        }
        self.inner
            .settled
            .write()
            .retain(|m| !evicted.contains(m));
    }
}

impl fmt::Debug for ConcurrentQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConcurrentQueue")
            .field("pending", &self.inner.incoming.len())
            .field("settled", &self.inner.settled.read().len())
            .finish()
    }
}

impl MessageQueue for ConcurrentQueue {
    #[inline]
    fn enqueue(&mut self, message: MessageRef) {
        self.inner.incoming.push(message);
    }

    fn scan<E>(
        &mut self,
        mut visit: impl FnMut(&MessageRef) -> Result<Visit, E>,
    ) -> Result<Option<MessageRef>, E> {
        self.settle();

        let mut evicted = HashSet::new();
        let outcome = {
            let settled = self.inner.settled.read();
            let mut outcome = Ok(None);
            for message in settled.iter() {
                match visit(message) {
                    Ok(Visit::Keep) => {}
                    Ok(Visit::Evict) => {
                        evicted.insert(Arc::clone(message));
                    }
                    Ok(Visit::Take) => {
                        outcome = Ok(Some(Arc::clone(message)));
                        break;
                    }
                    Err(e) => {
                        outcome = Err(e);
                        break;
                    }
                }
            }
            outcome
        };

        // Concurrent scanners may evict the same message; `retain` tolerates it.
        self.evict(evicted);
        outcome
    }

    fn remove(&mut self, message: &MessageRef) -> bool {
        self.settle();

        let mut settled = self.inner.settled.write();
        match settled.iter().position(|m| Arc::ptr_eq(m, message)) {
            Some(pos) => settled.remove(pos).is_some(),
            None => false,
        }
    }

    fn len(&self) -> usize {
        self.inner.incoming.len() + self.inner.settled.read().len()
    }
}
