//! leasemq – an in-process, lease-based message queue engine.
//!
//! This crate exports
//!  * `core`     – leases, locking strategies, containers and the engine
//!  * `config`   – TOML-driven engine and workload configuration
//!  * `metrics`  – per-engine counters
//!  * `workload` – multi-threaded producer/consumer driver
//!
//! Messages are pushed to named FIFO queues, pulled under a time-bounded
//! lease and completed once processed. A message whose lease expires before
//! completion is delivered again.
//!
//! ```
//! use std::time::Duration;
//! use leasemq::core::presets;
//! use leasemq::QueueService;
//!
//! let engine = presets::concurrent_atomic(Duration::from_secs(30))?;
//! engine.push("orders", "order #1")?;
//!
//! let message = engine.pull("orders")?.expect("one message queued");
//! assert_eq!(message.get(), "order #1");
//! engine.complete(&message)?;
//! # Ok::<(), leasemq::QueueError>(())
//! ```

// ───────────────────────────────────────────────────────────
// Public modules
// ───────────────────────────────────────────────────────────
pub mod config;
pub mod core;
pub mod logging;
pub mod metrics;
pub mod workload;

// ───────────────────────────────────────────────────────────
// Re-exports
// ───────────────────────────────────────────────────────────
pub use config::{load_config, Config, EngineConfig, Preset, WorkloadConfig};
pub use crate::core::{Eviction, MessageRef, QueueEngine, QueueError, QueueResult, QueueService};
pub use metrics::StatsSnapshot;
