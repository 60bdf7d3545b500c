pub mod configuration;
pub mod engine;
pub mod error;
pub mod lease;
pub mod lockable;
pub mod message;
pub mod presets;
pub mod queue;

pub use configuration::{Configuration, Eviction, FrozenConfiguration};
pub use engine::{QueueEngine, QueueService};
pub use error::{QueueError, QueueResult};
pub use lease::{AtomicLease, Grab, Lease, PlainLease, Stamps};
pub use lockable::{Lockable, MutexLock, NoLock, ReadWriteLock, Shared};
pub use message::{EngineId, Message, MessageRef, NO_ID};
pub use queue::{ConcurrentMap, ConcurrentQueue, MessageQueue, QueueMap, Visit};
