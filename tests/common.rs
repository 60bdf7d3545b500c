#![allow(dead_code)]

use std::sync::Once;

use leasemq::config::{EngineConfig, Preset};
use leasemq::{Eviction, QueueService};

pub fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        // Another harness may already own the global subscriber.
        let _ = leasemq::logging::init_logging();
    });
}

/// One engine per preset, all with the same lease timeout and eviction.
pub fn engines(timeout_ms: i64, eviction: Eviction) -> Vec<(Preset, Box<dyn QueueService>)> {
    init_logging();
    Preset::ALL
        .into_iter()
        .map(|preset| {
            let config = EngineConfig {
                lease_timeout_ms: timeout_ms,
                eviction,
                ..EngineConfig::from(preset)
            };
            let engine = config.build().expect("preset builds");
            (preset, engine)
        })
        .collect()
}

/// Lease long enough never to expire during a test.
pub const LONG_LEASE_MS: i64 = 60 * 60 * 1_000;
