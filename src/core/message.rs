//! Messages and the identity of the engine that accepted them.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::ptr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::core::lease::{AtomicLease, Lease, PlainLease};

/// Shared handle to a pushed message. The engine keeps ownership of the
/// storage slot; callers hold this handle between `pull` and `complete`.
pub type MessageRef = Arc<Message>;

/// Id reported by engines that do not number their messages.
pub const NO_ID: i64 = -1;

/// Identity of the engine instance a message was pushed through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EngineId(u64);

/// Monotonically increasing engine ids (fast, lock-free).
static NEXT_ENGINE: AtomicU64 = AtomicU64::new(1);

impl EngineId {
    /// Carried by messages not yet accepted by any engine.
    pub(crate) const UNBOUND: EngineId = EngineId(0);

    pub(crate) fn next() -> Self {
        EngineId(NEXT_ENGINE.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for EngineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "engine-{}", self.0)
    }
}

/// An immutable (queue, content) pair with its own lease.
///
/// Equality and hashing are by identity: two pushes of the same content are
/// two different messages.
pub struct Message {
    pub(crate) origin: EngineId,
    pub(crate) id: i64,
    queue: String,
    content: String,
    lease: Box<dyn Lease>,
}

impl Message {
    pub fn new(queue: String, content: String, lease: impl Lease + 'static) -> Self {
        Self {
            origin: EngineId::UNBOUND,
            id: NO_ID,
            queue,
            content,
            lease: Box::new(lease),
        }
    }

    /// Message with a [`PlainLease`]. Usable directly as a message factory.
    pub fn plain(queue: String, content: String) -> Self {
        Self::new(queue, content, PlainLease::new())
    }

    /// Message with an [`AtomicLease`]. Usable directly as a message factory.
    pub fn atomic(queue: String, content: String) -> Self {
        Self::new(queue, content, AtomicLease::new())
    }

    /// The message content.
    #[inline]
    pub fn get(&self) -> &str {
        &self.content
    }

    /// Name of the queue this message was pushed to.
    #[inline]
    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Engine-assigned number, or [`NO_ID`] for every message of an engine
    /// that does not number messages. Not unique across engines.
    #[inline]
    pub fn id(&self) -> i64 {
        self.id
    }

    #[inline]
    pub(crate) fn lease(&self) -> &dyn Lease {
        self.lease.as_ref()
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("origin", &self.origin)
            .field("id", &self.id)
            .field("queue", &self.queue)
            .field("content", &self.content)
            .field("lease", &self.lease)
            .finish()
    }
}

impl PartialEq for Message {
    fn eq(&self, other: &Self) -> bool {
        ptr::eq(self, other)
    }
}

impl Eq for Message {}

impl Hash for Message {
    fn hash<H: Hasher>(&self, state: &mut H) {
        ptr::hash(self, state);
    }
}
