//! Ready-made engine wirings.
//!
//! | preset              | map lock   | queue lock | lease  |
//! |---------------------|------------|------------|--------|
//! | `synchronized`      | mutex      | mutex      | plain  |
//! | `read_write`        | read/write | read/write | plain  |
//! | `concurrent_plain`  | none       | none       | plain  |
//! | `concurrent_atomic` | none       | none       | atomic |

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use crate::core::configuration::Configuration;
use crate::core::engine::QueueEngine;
use crate::core::error::QueueResult;
use crate::core::lockable::{MutexLock, NoLock, ReadWriteLock};
use crate::core::message::{Message, MessageRef};
use crate::core::queue::{ConcurrentMap, ConcurrentQueue};

/// Queue container guarded from the outside.
pub type PlainQueue = VecDeque<MessageRef>;

/// Queue map guarded from the outside.
pub type PlainMap<Q> = HashMap<String, Arc<Q>>;

pub type SynchronizedQueue = MutexLock<PlainQueue>;
pub type SynchronizedEngine = QueueEngine<SynchronizedQueue, MutexLock<PlainMap<SynchronizedQueue>>>;

pub type ReadWriteQueue = ReadWriteLock<PlainQueue>;
pub type ReadWriteEngine = QueueEngine<ReadWriteQueue, ReadWriteLock<PlainMap<ReadWriteQueue>>>;

pub type LockFreeQueue = NoLock<ConcurrentQueue>;
pub type ConcurrentEngine = QueueEngine<LockFreeQueue, NoLock<ConcurrentMap<LockFreeQueue>>>;

/// Every operation serialized behind mutexes. Plain leases.
pub fn synchronized(timeout: Duration) -> QueueResult<SynchronizedEngine> {
    let mut config = Configuration::new();
    config
        .message(Message::plain)?
        .queue(|| MutexLock::new(PlainQueue::new()))?
        .map(MutexLock::new(PlainMap::new()))?
        .timeout(timeout)?;
    QueueEngine::new(&mut config)
}

/// Concurrent lookups and pulls under reader/writer locks. Plain leases.
pub fn read_write(timeout: Duration) -> QueueResult<ReadWriteEngine> {
    let mut config = Configuration::new();
    config
        .message(Message::plain)?
        .queue(|| ReadWriteLock::new(PlainQueue::new()))?
        .map(ReadWriteLock::new(PlainMap::new()))?
        .timeout(timeout)?;
    QueueEngine::new(&mut config)
}

/// Self-synchronized containers with plain leases: at-least-once, racing
/// pullers may both receive a message.
pub fn concurrent_plain(timeout: Duration) -> QueueResult<ConcurrentEngine> {
    concurrent(timeout, Message::plain)
}

/// Self-synchronized containers with atomic leases: racing pullers elect one
/// receiver.
pub fn concurrent_atomic(timeout: Duration) -> QueueResult<ConcurrentEngine> {
    concurrent(timeout, Message::atomic)
}

fn concurrent(timeout: Duration, message: fn(String, String) -> Message) -> QueueResult<ConcurrentEngine> {
    let mut config = Configuration::new();
    config
        .message(message)?
        .queue(|| NoLock::new(ConcurrentQueue::new()))?
        .map(NoLock::new(ConcurrentMap::new()))?
        .timeout(timeout)?;
    QueueEngine::new(&mut config)
}
