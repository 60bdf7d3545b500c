mod common;

use leasemq::config::{load_config, LeaseKind, LockStrategy};
use leasemq::{Config, Eviction};

#[test]
fn load_config_matches_toml() {
    let cfg: Config = load_config("leasemq.toml").expect("failed to load config");

    assert_eq!(cfg.engine.map_lock, LockStrategy::None);
    assert_eq!(cfg.engine.queue_lock, LockStrategy::None);
    assert_eq!(cfg.engine.lease, LeaseKind::Atomic);
    assert_eq!(cfg.engine.eviction, Eviction::Lazy);
    assert_eq!(cfg.engine.lease_timeout_ms, 30_000);
    assert!(!cfg.engine.numbered);
    assert_eq!(cfg.workload.producers, 4);
    assert_eq!(cfg.workload.consumers, 4);
    assert_eq!(cfg.workload.queues, 8);
    assert_eq!(cfg.workload.messages_per_producer, 1_000);
}

#[test]
fn loaded_config_builds_a_working_engine() {
    common::init_logging();
    let cfg = load_config("leasemq.toml").unwrap();
    let engine = cfg.engine.build().unwrap();

    engine.push("orders", "order #1").unwrap();
    let message = engine.pull("orders").unwrap().expect("queued");
    assert_eq!(message.get(), "order #1");
    engine.complete(&message).unwrap();
}

#[test]
fn missing_file_is_an_error() {
    assert!(load_config("does-not-exist.toml").is_err());
}
