//! Name → queue maps.
//!
//! Entries hold `Arc`s so a caller can keep using a queue it looked up after
//! releasing the map. Creation and removal go through closures so that the
//! map decides, within one critical section, which branch runs.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::core::lockable::Shared;

/// A map of queue name → shared queue.
pub trait QueueMap<Q>: Send + Sync {
    /// Returns the queue registered under `name`, if any.
    fn get(&self, name: &str) -> Option<Arc<Q>>;

    /// Runs exactly one of `occupied` (with the installed queue) or `vacant`
    /// (whose result is installed under `name`). Returns `true` if `vacant`
    /// ran.
    fn upsert(
        &mut self,
        name: &str,
        occupied: impl FnOnce(&Q),
        vacant: impl FnOnce() -> Arc<Q>,
    ) -> bool;

    /// Removes `name` if it is present and `pred` holds for its queue when
    /// checked at removal time.
    fn remove_if(&mut self, name: &str, pred: impl FnOnce(&Q) -> bool) -> bool;

    fn contains(&self, name: &str) -> bool;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registered names, in no particular order.
    fn names(&self) -> Vec<String>;
}

impl<Q: Send + Sync> QueueMap<Q> for HashMap<String, Arc<Q>> {
    fn get(&self, name: &str) -> Option<Arc<Q>> {
        HashMap::get(self, name).cloned()
    }

    fn upsert(
        &mut self,
        name: &str,
        occupied: impl FnOnce(&Q),
        vacant: impl FnOnce() -> Arc<Q>,
    ) -> bool {
        if let Some(existing) = HashMap::get(self, name) {
            occupied(existing);
            return false;
        }
        self.insert(name.to_owned(), vacant());
        true
    }

    fn remove_if(&mut self, name: &str, pred: impl FnOnce(&Q) -> bool) -> bool {
        let matched = HashMap::get(self, name).is_some_and(|queue| pred(queue));
        matched && HashMap::remove(self, name).is_some()
    }

    fn contains(&self, name: &str) -> bool {
        self.contains_key(name)
    }

    fn len(&self) -> usize {
        HashMap::len(self)
    }

    fn names(&self) -> Vec<String> {
        self.keys().cloned().collect()
    }
}

/// Cheap-to-clone handle onto a sharded concurrent map.
///
/// Every entry operation holds the shard lock of its key, so the closures
/// passed to [`QueueMap::upsert`] and [`QueueMap::remove_if`] run atomically
/// with respect to other operations on the same name.
pub struct ConcurrentMap<Q> {
    queues: Arc<DashMap<String, Arc<Q>>>,
}

impl<Q> ConcurrentMap<Q> {
    pub fn new() -> Self {
        Self {
            queues: Arc::new(DashMap::new()),
        }
    }
}

impl<Q> Default for ConcurrentMap<Q> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Q> Clone for ConcurrentMap<Q> {
    fn clone(&self) -> Self {
        Self {
            queues: Arc::clone(&self.queues),
        }
    }
}

impl<Q> fmt::Debug for ConcurrentMap<Q> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConcurrentMap")
            .field("queues", &self.queues.len())
            .finish()
    }
}

impl<Q: Send + Sync> Shared for ConcurrentMap<Q> {}

impl<Q: Send + Sync> QueueMap<Q> for ConcurrentMap<Q> {
    fn get(&self, name: &str) -> Option<Arc<Q>> {
        self.queues.get(name).map(|entry| Arc::clone(entry.value()))
    }

    fn upsert(
        &mut self,
        name: &str,
        occupied: impl FnOnce(&Q),
        vacant: impl FnOnce() -> Arc<Q>,
    ) -> bool {
        // Fast path: a shared shard lock is enough for an existing queue, and
        // holding it keeps a concurrent `remove_if` from unlinking the queue
        // before `occupied` is done with it.
        if let Some(existing) = self.queues.get(name) {
            occupied(existing.value());
            return false;
        }

        match self.queues.entry(name.to_owned()) {
            Entry::Occupied(entry) => {
                occupied(entry.get());
                false
            }
            Entry::Vacant(entry) => {
                entry.insert(vacant());
                true
            }
        }
    }

    fn remove_if(&mut self, name: &str, pred: impl FnOnce(&Q) -> bool) -> bool {
        self.queues
            .remove_if(name, |_, queue| pred(queue))
            .is_some()
    }

    fn contains(&self, name: &str) -> bool {
        self.queues.contains_key(name)
    }

    fn len(&self) -> usize {
        self.queues.len()
    }

    fn names(&self) -> Vec<String> {
        self.queues.iter().map(|entry| entry.key().clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    fn exercise<M: QueueMap<AtomicUsize>>(mut map: M) {
        assert!(map.get("a").is_none());

        let created = map.upsert("a", |_| unreachable!(), || Arc::new(AtomicUsize::new(1)));
        assert!(created);

        let created = map.upsert(
            "a",
            |n| {
                n.fetch_add(1, Ordering::Relaxed);
            },
            || unreachable!(),
        );
        assert!(!created);
        assert_eq!(map.get("a").unwrap().load(Ordering::Relaxed), 2);

        assert!(!map.remove_if("a", |n| n.load(Ordering::Relaxed) == 0));
        assert!(map.contains("a"));
        assert!(map.remove_if("a", |n| n.load(Ordering::Relaxed) == 2));
        assert!(!map.contains("a"));
        assert!(!map.remove_if("a", |_| true));
        assert!(map.is_empty());
    }

    #[test]
    fn hash_map_upserts_and_removes_conditionally() {
        exercise(HashMap::<String, Arc<AtomicUsize>>::new());
    }

    #[test]
    fn concurrent_map_upserts_and_removes_conditionally() {
        exercise(ConcurrentMap::<AtomicUsize>::new());
    }

    #[test]
    fn lookups_outlive_removal() {
        let mut map = ConcurrentMap::new();
        map.upsert("q", |_| {}, || Arc::new(AtomicUsize::new(7)));
        let held = map.get("q").unwrap();

        assert!(map.remove_if("q", |_| true));
        assert_eq!(held.load(Ordering::Relaxed), 7);
    }

    #[test]
    fn racing_upserts_create_once() {
        let map = ConcurrentMap::<AtomicUsize>::new();
        let created = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let mut map = map.clone();
                let created = Arc::clone(&created);
                thread::spawn(move || {
                    for _ in 0..100 {
                        map.upsert(
                            "shared",
                            |n| {
                                n.fetch_add(1, Ordering::Relaxed);
                            },
                            || {
                                created.fetch_add(1, Ordering::Relaxed);
                                Arc::new(AtomicUsize::new(1))
                            },
                        );
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(created.load(Ordering::Relaxed), 1);
        assert_eq!(map.get("shared").unwrap().load(Ordering::Relaxed), 800);
        assert_eq!(map.names(), ["shared"]);
    }
}
