use serde::{Deserialize, Serialize};
use std::fmt;
use std::{fs, path::Path};

use crate::core::configuration::{Configuration, Eviction};
use crate::core::engine::{QueueEngine, QueueService};
use crate::core::error::QueueResult;
use crate::core::lockable::{Lockable, MutexLock, NoLock, ReadWriteLock};
use crate::core::message::Message;
use crate::core::presets::{PlainMap, PlainQueue};
use crate::core::queue::{ConcurrentMap, ConcurrentQueue, MessageQueue, QueueMap};

/// How the map, or each queue, is synchronized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum LockStrategy {
    /// Self-synchronized concurrent containers.
    None,
    Mutex,
    ReadWrite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum LeaseKind {
    Plain,
    Atomic,
}

/// Named wirings of map lock, queue lock and lease.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Preset {
    Synchronized,
    ReadWrite,
    ConcurrentPlain,
    ConcurrentAtomic,
}

impl Preset {
    pub const ALL: [Preset; 4] = [
        Preset::Synchronized,
        Preset::ReadWrite,
        Preset::ConcurrentPlain,
        Preset::ConcurrentAtomic,
    ];

    /// `(map lock, queue lock, lease)`.
    pub fn wiring(self) -> (LockStrategy, LockStrategy, LeaseKind) {
        match self {
            Preset::Synchronized => (LockStrategy::Mutex, LockStrategy::Mutex, LeaseKind::Plain),
            Preset::ReadWrite => (
                LockStrategy::ReadWrite,
                LockStrategy::ReadWrite,
                LeaseKind::Plain,
            ),
            Preset::ConcurrentPlain => (LockStrategy::None, LockStrategy::None, LeaseKind::Plain),
            Preset::ConcurrentAtomic => (LockStrategy::None, LockStrategy::None, LeaseKind::Atomic),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EngineConfig {
    pub map_lock: LockStrategy,
    pub queue_lock: LockStrategy,
    pub lease: LeaseKind,
    pub eviction: Eviction,
    /// Signed so that a negative value reaches engine validation.
    pub lease_timeout_ms: i64,
    pub numbered: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            map_lock: LockStrategy::None,
            queue_lock: LockStrategy::None,
            lease: LeaseKind::Atomic,
            eviction: Eviction::Lazy,
            lease_timeout_ms: 30_000, // 30 seconds
            numbered: false,
        }
    }
}

impl From<Preset> for EngineConfig {
    fn from(preset: Preset) -> Self {
        let mut config = EngineConfig::default();
        config.apply_preset(preset);
        config
    }
}

impl fmt::Display for EngineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "map={:?} queue={:?} lease={:?} eviction={:?} timeout={}ms numbered={}",
            self.map_lock,
            self.queue_lock,
            self.lease,
            self.eviction,
            self.lease_timeout_ms,
            self.numbered
        )
    }
}

impl EngineConfig {
    /// Overrides the lock strategies and the lease representation.
    pub fn apply_preset(&mut self, preset: Preset) {
        let (map_lock, queue_lock, lease) = preset.wiring();
        self.map_lock = map_lock;
        self.queue_lock = queue_lock;
        self.lease = lease;
    }

    /// Picks the concrete engine type for this configuration.
    pub fn build(&self) -> QueueResult<Box<dyn QueueService>> {
        match self.queue_lock {
            LockStrategy::None => self.with_queue(|| NoLock::new(ConcurrentQueue::new())),
            LockStrategy::Mutex => self.with_queue(|| MutexLock::new(PlainQueue::new())),
            LockStrategy::ReadWrite => self.with_queue(|| ReadWriteLock::new(PlainQueue::new())),
        }
    }

    fn with_queue<Q>(
        &self,
        queue: impl Fn() -> Q + Send + Sync + 'static,
    ) -> QueueResult<Box<dyn QueueService>>
    where
        Q: Lockable + 'static,
        Q::Target: MessageQueue,
    {
        match self.map_lock {
            LockStrategy::None => self.finish(queue, NoLock::new(ConcurrentMap::<Q>::new())),
            LockStrategy::Mutex => self.finish(queue, MutexLock::new(PlainMap::<Q>::new())),
            LockStrategy::ReadWrite => self.finish(queue, ReadWriteLock::new(PlainMap::<Q>::new())),
        }
    }

    fn finish<Q, M>(
        &self,
        queue: impl Fn() -> Q + Send + Sync + 'static,
        map: M,
    ) -> QueueResult<Box<dyn QueueService>>
    where
        Q: Lockable + 'static,
        Q::Target: MessageQueue,
        M: Lockable + 'static,
        M::Target: QueueMap<Q>,
    {
        let message: fn(String, String) -> Message = match self.lease {
            LeaseKind::Plain => Message::plain,
            LeaseKind::Atomic => Message::atomic,
        };

        let mut config = Configuration::new();
        config
            .message(message)?
            .queue(queue)?
            .map(map)?
            .timeout_ms(self.lease_timeout_ms)?
            .eviction(self.eviction)?
            .numbered(self.numbered)?;
        Ok(Box::new(QueueEngine::new(&mut config)?))
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct WorkloadConfig {
    pub producers: usize,
    pub consumers: usize,
    pub queues: usize,
    pub messages_per_producer: usize,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            producers: 4,
            consumers: 4,
            queues: 8,
            messages_per_producer: 1_000,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub engine: EngineConfig,
    pub workload: WorkloadConfig,
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, anyhow::Error> {
    let raw: String = fs::read_to_string(path)?;
    let config: Config = toml::from_str(&raw)?;
    Ok(config)
}
