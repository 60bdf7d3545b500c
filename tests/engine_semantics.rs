mod common;

use std::collections::HashSet;
use std::sync::Arc;

use common::{engines, LONG_LEASE_MS};
use leasemq::config::{EngineConfig, Preset};
use leasemq::core::NO_ID;
use leasemq::{Eviction, QueueError};

#[test]
fn single_threaded_pull_order_is_push_order() {
    for (preset, engine) in engines(LONG_LEASE_MS, Eviction::Lazy) {
        let pushed: Vec<String> = (0..50).map(|i| format!("m{i}")).collect();
        for content in &pushed {
            engine.push("fifo", content).unwrap();
        }

        let mut pulled = Vec::new();
        while let Some(message) = engine.pull("fifo").unwrap() {
            pulled.push(message.get().to_owned());
            engine.complete(&message).unwrap();
        }

        assert_eq!(pulled, pushed, "{preset:?}");
    }
}

#[test]
fn identical_pushes_are_distinct_messages() {
    for (preset, engine) in engines(LONG_LEASE_MS, Eviction::Lazy) {
        engine.push_all("dups", &["same", "same", "same"]).unwrap();

        let pulled: Vec<_> = std::iter::from_fn(|| engine.pull("dups").unwrap()).collect();
        assert_eq!(pulled.len(), 3, "{preset:?}");
        assert!(pulled.iter().all(|m| m.get() == "same"));

        let identities: HashSet<_> = pulled.iter().map(Arc::as_ptr).collect();
        assert_eq!(identities.len(), 3, "{preset:?}");
    }
}

#[test]
fn pulling_unknown_queue_creates_nothing() {
    for (preset, engine) in engines(LONG_LEASE_MS, Eviction::Lazy) {
        assert!(engine.pull("nowhere").unwrap().is_none(), "{preset:?}");
        assert!(!engine.contains_queue("nowhere"));
        assert!(engine.queue_names().is_empty());
        assert_eq!(engine.stats().queues_created, 0);
    }
}

#[test]
fn push_pull_complete_drains_and_deletes_queue() {
    for (preset, engine) in engines(LONG_LEASE_MS, Eviction::Lazy) {
        engine.push("q", "only").unwrap();
        assert_eq!(engine.queue_names(), ["q"]);

        let message = engine.pull("q").unwrap().expect("queued");
        engine.complete(&message).unwrap();

        assert!(engine.pull("q").unwrap().is_none(), "{preset:?}");
        assert!(!engine.contains_queue("q"), "{preset:?}");

        let stats = engine.stats();
        assert_eq!(stats.pushed, 1);
        assert_eq!(stats.delivered, 1);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.evicted, 1);
        assert_eq!(stats.live_queues(), 0);
    }
}

#[test]
fn zero_timeout_redelivers_immediately() {
    for (preset, engine) in engines(0, Eviction::Lazy) {
        engine.push("q", "again").unwrap();

        let first = engine.pull("q").unwrap().expect("first delivery");
        let second = engine.pull("q").unwrap().expect("redelivery");
        assert!(Arc::ptr_eq(&first, &second), "{preset:?}");
    }
}

#[test]
fn leased_messages_are_withheld_but_keep_the_queue() {
    for (preset, engine) in engines(LONG_LEASE_MS, Eviction::Lazy) {
        engine.push("q", "held").unwrap();
        let _leased = engine.pull("q").unwrap().expect("queued");

        assert!(engine.pull("q").unwrap().is_none(), "{preset:?}");
        assert!(engine.contains_queue("q"), "{preset:?}");
        assert_eq!(engine.queue_len("q"), Some(1));
    }
}

#[test]
fn completing_twice_is_harmless() {
    for (preset, engine) in engines(0, Eviction::Lazy) {
        engine.push("q", "done").unwrap();
        let message = engine.pull("q").unwrap().expect("queued");

        engine.complete(&message).unwrap();
        engine.complete(&message).unwrap();

        // Even with an expired lease, a completed message never comes back.
        assert!(engine.pull("q").unwrap().is_none(), "{preset:?}");
    }
}

#[test]
fn completing_through_another_engine_is_rejected() {
    for (preset, engine) in engines(LONG_LEASE_MS, Eviction::Lazy) {
        let other = EngineConfig::from(preset).build().unwrap();
        other.push("q", "foreign").unwrap();
        let message = other.pull("q").unwrap().expect("queued");

        assert!(
            matches!(engine.complete(&message), Err(QueueError::InvalidArgument(_))),
            "{preset:?}"
        );
        other.complete(&message).unwrap();
        assert_ne!(engine.id(), other.id());
    }
}

#[test]
fn empty_queue_names_are_rejected() {
    for (_, engine) in engines(LONG_LEASE_MS, Eviction::Lazy) {
        assert!(matches!(engine.push("", "x"), Err(QueueError::InvalidArgument(_))));
        assert!(matches!(engine.pull(""), Err(QueueError::InvalidArgument(_))));
    }
}

#[test]
fn empty_content_is_a_message() {
    for (preset, engine) in engines(LONG_LEASE_MS, Eviction::Lazy) {
        engine.push("q", "").unwrap();
        let message = engine.pull("q").unwrap().expect("queued");
        assert_eq!(message.get(), "", "{preset:?}");
    }
}

#[test]
fn queues_are_independent() {
    for (preset, engine) in engines(LONG_LEASE_MS, Eviction::Lazy) {
        engine.push("a", "for a").unwrap();
        engine.push("b", "for b").unwrap();

        assert_eq!(engine.pull("b").unwrap().unwrap().get(), "for b", "{preset:?}");
        assert_eq!(engine.pull("a").unwrap().unwrap().get(), "for a", "{preset:?}");
        assert_eq!(engine.queue_names(), ["a", "b"]);
    }
}

#[test]
fn numbering_is_per_engine_and_optional() {
    let numbered = EngineConfig {
        numbered: true,
        ..EngineConfig::from(Preset::ReadWrite)
    }
    .build()
    .unwrap();
    let plain = EngineConfig::from(Preset::ReadWrite).build().unwrap();

    numbered.push_all("q", &["a", "b", "c"]).unwrap();
    plain.push_all("q", &["a", "b"]).unwrap();

    let ids: Vec<i64> = std::iter::from_fn(|| numbered.pull("q").unwrap())
        .map(|m| m.id())
        .collect();
    assert_eq!(ids, [0, 1, 2]);

    let ids: Vec<i64> = std::iter::from_fn(|| plain.pull("q").unwrap())
        .map(|m| m.id())
        .collect();
    assert_eq!(ids, [NO_ID, NO_ID]);
}
