//! The queue engine.
//!
//! One algorithm, generic over how the map and the queues are synchronized.
//! Locks are always taken map first, queue second, and never re-entered.

use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, trace};

use crate::core::configuration::{Configuration, Eviction, FrozenConfiguration};
use crate::core::error::{require_queue_name, QueueError, QueueResult};
use crate::core::lease::Grab;
use crate::core::lockable::Lockable;
use crate::core::message::{EngineId, MessageRef};
use crate::core::queue::{MessageQueue, QueueMap, Visit};
use crate::metrics::{EngineStats, StatsSnapshot};

/// Object-safe face of every engine, whatever its type parameters.
pub trait QueueService: Send + Sync {
    /// Identity stamped on every message this engine accepts.
    fn id(&self) -> EngineId;

    /// Appends `content` to `queue`, creating the queue if needed.
    fn push(&self, queue: &str, content: &str) -> QueueResult<()>;

    /// Pushes every item of `contents` in order. Stops at the first error.
    fn push_all(&self, queue: &str, contents: &[&str]) -> QueueResult<()> {
        contents
            .iter()
            .try_for_each(|content| self.push(queue, content))
    }

    /// Leases the first deliverable message of `queue`, if any.
    fn pull(&self, queue: &str) -> QueueResult<Option<MessageRef>>;

    /// Acknowledges a message obtained from [`pull`](Self::pull).
    fn complete(&self, message: &MessageRef) -> QueueResult<()>;

    fn contains_queue(&self, queue: &str) -> bool;

    /// Number of stored messages (leased and completed-but-not-evicted
    /// included), `None` if the queue does not exist.
    fn queue_len(&self, queue: &str) -> Option<usize>;

    /// Existing queue names, sorted.
    fn queue_names(&self) -> Vec<String>;

    fn stats(&self) -> StatsSnapshot;
}

/// Result of one scan over a queue.
struct Scan {
    grabbed: Option<MessageRef>,
    /// Observed after eviction, still under the queue lock.
    empty: bool,
}

/// Push/pull/complete over a map `M` of lock-wrapped queues `Q`.
pub struct QueueEngine<Q, M> {
    id: EngineId,
    config: FrozenConfiguration<Q, M>,
    next_id: AtomicI64,
    stats: EngineStats,
}

impl<Q, M> QueueEngine<Q, M>
where
    Q: Lockable,
    Q::Target: MessageQueue,
    M: Lockable,
    M::Target: QueueMap<Q>,
{
    /// Freezes `configuration` and builds an engine from it.
    pub fn new(configuration: &mut Configuration<Q, M>) -> QueueResult<Self> {
        let config = configuration.freeze()?;
        let id = EngineId::next();
        debug!(
            engine = %id,
            timeout = ?config.timeout,
            eviction = ?config.eviction,
            numbered = config.numbered,
            "queue engine created"
        );
        Ok(Self {
            id,
            config,
            next_id: AtomicI64::new(0),
            stats: EngineStats::default(),
        })
    }

    pub fn configuration(&self) -> &FrozenConfiguration<Q, M> {
        &self.config
    }

    fn visit_lazily(message: &MessageRef, now: Instant, expiry: Instant) -> QueueResult<Visit> {
        Ok(match message.lease().try_grab(now, expiry)? {
            Grab::Succeeded => Visit::Take,
            Grab::Active => Visit::Keep,
            Grab::Completed => {
                trace!(queue = message.queue(), id = message.id(), "evicting completed message");
                Visit::Evict
            }
        })
    }

    fn visit_eagerly(message: &MessageRef, now: Instant, expiry: Instant) -> QueueResult<Visit> {
        Ok(match message.lease().try_grab(now, expiry)? {
            Grab::Succeeded => Visit::Take,
            // Completed messages are removed by `complete`; one still here is
            // about to go.
            Grab::Active | Grab::Completed => Visit::Keep,
        })
    }

    /// Removes `queue` if it is still present and empty once the map is
    /// exclusively held.
    fn try_delete(&self, queue: &str) -> bool {
        let deleted = self
            .config
            .map
            .write(|map| map.remove_if(queue, |lq| lq.read(|q| q.is_empty())));
        if deleted {
            self.stats.inc_queues_deleted();
            debug!(engine = %self.id, queue, "queue deleted");
        }
        deleted
    }
}

impl<Q, M> QueueService for QueueEngine<Q, M>
where
    Q: Lockable,
    Q::Target: MessageQueue,
    M: Lockable,
    M::Target: QueueMap<Q>,
{
    fn id(&self) -> EngineId {
        self.id
    }

    fn push(&self, queue: &str, content: &str) -> QueueResult<()> {
        require_queue_name(queue)?;

        let mut message = (self.config.message)(queue.to_owned(), content.to_owned());
        message.origin = self.id;
        if self.config.numbered {
            message.id = self.next_id.fetch_add(1, Ordering::Relaxed);
        }
        let message = Arc::new(message);
        let fresh = Arc::clone(&message);

        let created = self.config.map.write(|map| {
            map.upsert(
                queue,
                |lq| lq.write(|q| q.enqueue(message)),
                || {
                    let mut lq = (self.config.queue)();
                    lq.unlocked(|q| q.enqueue(fresh));
                    Arc::new(lq)
                },
            )
        });

        self.stats.inc_pushed();
        if created {
            self.stats.inc_queues_created();
            debug!(engine = %self.id, queue, "queue created");
        }
        Ok(())
    }

    fn pull(&self, queue: &str) -> QueueResult<Option<MessageRef>> {
        require_queue_name(queue)?;
        let now = Instant::now();
        let expiry = now + self.config.timeout;

        let scanned = self.config.map.read(|map| -> QueueResult<Option<Scan>> {
            let Some(lq) = map.get(queue) else {
                return Ok(None);
            };
            let eviction = self.config.eviction;
            let mut evicted = 0;
            // Exclusive even when nothing is evicted: plain leases rely on
            // pullers of one queue being serialized.
            let scan = lq.write(|q| -> QueueResult<Scan> {
                let grabbed = q.scan(|m| {
                    let visit = match eviction {
                        Eviction::Lazy => Self::visit_lazily(m, now, expiry)?,
                        Eviction::Eager => Self::visit_eagerly(m, now, expiry)?,
                    };
                    if visit == Visit::Evict {
                        evicted += 1;
                    }
                    Ok::<_, QueueError>(visit)
                })?;
                Ok(Scan {
                    grabbed,
                    empty: q.is_empty(),
                })
            })?;
            if evicted > 0 {
                self.stats.inc_evicted(evicted);
            }
            Ok(Some(scan))
        })?;

        match scanned {
            // Unknown queue: nothing to delete either.
            None => Ok(None),
            Some(Scan {
                grabbed: Some(message),
                ..
            }) => {
                self.stats.inc_delivered();
                trace!(queue, id = message.id(), "message grabbed");
                Ok(Some(message))
            }
            Some(Scan {
                grabbed: None,
                empty: true,
            }) => {
                self.try_delete(queue);
                Ok(None)
            }
            Some(Scan {
                grabbed: None,
                empty: false,
            }) => Ok(None),
        }
    }

    fn complete(&self, message: &MessageRef) -> QueueResult<()> {
        if message.origin != self.id {
            return Err(QueueError::invalid(format!(
                "message originates from {}, not {}",
                message.origin, self.id
            )));
        }
        message.lease().complete()?;
        self.stats.inc_completed();

        if self.config.eviction == Eviction::Lazy {
            return Ok(());
        }

        let name = message.queue();
        let (removed, deleted) = self.config.map.write(|map| {
            let Some(lq) = map.get(name) else {
                return (false, false);
            };
            let (removed, emptied) = lq.write(|q| {
                let removed = q.remove(message);
                (removed, removed && q.is_empty())
            });
            // Re-checked inside `remove_if`: a push may have landed since.
            let deleted = emptied && map.remove_if(name, |lq| lq.read(|q| q.is_empty()));
            (removed, deleted)
        });

        if removed {
            self.stats.inc_evicted(1);
            trace!(queue = name, id = message.id(), "evicted on completion");
        }
        if deleted {
            self.stats.inc_queues_deleted();
            debug!(engine = %self.id, queue = name, "queue deleted");
        }
        Ok(())
    }

    fn contains_queue(&self, queue: &str) -> bool {
        self.config.map.read(|map| map.contains(queue))
    }

    fn queue_len(&self, queue: &str) -> Option<usize> {
        self.config
            .map
            .read(|map| map.get(queue))
            .map(|lq| lq.read(|q| q.len()))
    }

    fn queue_names(&self) -> Vec<String> {
        let mut names = self.config.map.read(|map| map.names());
        names.sort_unstable();
        names
    }

    fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}

impl<Q, M> fmt::Debug for QueueEngine<Q, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueEngine")
            .field("id", &self.id)
            .field("config", &self.config)
            .field("stats", &self.stats)
            .finish()
    }
}
