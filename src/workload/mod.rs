//! Multi-threaded delivery workload.
//!
//! Producers push uniquely tagged messages to random queues while consumers
//! pull and complete from every queue. Each tag's delivery count is recorded
//! so the delivery guarantee of an engine can be read off the histogram:
//! every tag at least once, and ideally exactly once.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail};
use dashmap::DashMap;
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{debug, info};

use crate::config::WorkloadConfig;
use crate::core::engine::QueueService;

/// Delivery counts of one workload run.
#[derive(Debug, Clone)]
pub struct DeliveryReport {
    /// Tags pushed.
    pub expected: usize,
    /// Delivery count → number of tags delivered that many times. Tags never
    /// delivered are counted under `0`.
    pub histogram: BTreeMap<usize, usize>,
    pub elapsed: Duration,
}

impl DeliveryReport {
    fn from_frequencies(expected: usize, frequencies: DashMap<String, usize>, elapsed: Duration) -> Self {
        let mut histogram = BTreeMap::new();
        let delivered = frequencies.len();
        for (_, count) in frequencies {
            *histogram.entry(count).or_insert(0) += 1;
        }
        if delivered < expected {
            histogram.insert(0, expected - delivered);
        }
        Self {
            expected,
            histogram,
            elapsed,
        }
    }

    /// Every tag was delivered at least once.
    pub fn all_delivered(&self) -> bool {
        !self.histogram.contains_key(&0)
    }

    /// Tags delivered more than once.
    pub fn over_delivered(&self) -> usize {
        self.histogram
            .iter()
            .filter(|(count, _)| **count > 1)
            .map(|(_, tags)| tags)
            .sum()
    }

    /// Sum of all deliveries, duplicates included.
    pub fn deliveries(&self) -> usize {
        self.histogram.iter().map(|(count, tags)| count * tags).sum()
    }
}

impl fmt::Display for DeliveryReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} messages, {} deliveries in {:?}",
            self.expected,
            self.deliveries(),
            self.elapsed
        )?;
        for (count, tags) in &self.histogram {
            writeln!(f, "  delivered {count}x: {tags}")?;
        }
        Ok(())
    }
}

fn queue_name(index: usize) -> String {
    format!("queue-{index}")
}

/// Runs `workload` against `service` and waits for every consumer to drain.
///
/// Consumers stop once the producers are done and a full pass over all
/// queues finds nothing to pull. Messages must be leased for long enough to
/// be completed by their first receiver, or the run reports duplicates.
pub fn run(service: &dyn QueueService, workload: &WorkloadConfig) -> anyhow::Result<DeliveryReport> {
    if workload.queues == 0 || workload.consumers == 0 {
        bail!("workload needs at least one queue and one consumer");
    }

    let expected = workload.producers * workload.messages_per_producer;
    let frequencies: DashMap<String, usize> = DashMap::with_capacity(expected);
    let producers_done = AtomicBool::new(false);
    let queues: Vec<String> = (0..workload.queues).map(queue_name).collect();

    info!(
        producers = workload.producers,
        consumers = workload.consumers,
        queues = workload.queues,
        messages = expected,
        "starting workload"
    );
    let started = Instant::now();

    thread::scope(|scope| -> anyhow::Result<()> {
        let consumers: Vec<_> = (0..workload.consumers)
            .map(|c| {
                let mut order = queues.clone();
                let frequencies = &frequencies;
                let producers_done = &producers_done;
                scope.spawn(move || -> anyhow::Result<()> {
                    order.shuffle(&mut rand::thread_rng());
                    loop {
                        // Read before the pass: a pass that starts after the
                        // last push and finds nothing proves the queues are drained.
                        let done = producers_done.load(Ordering::Acquire);
                        let mut found = false;
                        for queue in &order {
                            while let Some(message) = service.pull(queue)? {
                                *frequencies.entry(message.get().to_owned()).or_insert(0) += 1;
                                service.complete(&message)?;
                                found = true;
                            }
                        }
                        if done && !found {
                            debug!(consumer = c, "consumer drained");
                            return Ok(());
                        }
                        if !found {
                            thread::yield_now();
                        }
                    }
                })
            })
            .collect();

        let producers: Vec<_> = (0..workload.producers)
            .map(|p| {
                let queues = &queues;
                scope.spawn(move || -> anyhow::Result<()> {
                    let mut rng = rand::thread_rng();
                    for seq in 0..workload.messages_per_producer {
                        let queue = &queues[rng.gen_range(0..queues.len())];
                        service.push(queue, &format!("p{p}-m{seq}"))?;
                    }
                    Ok(())
                })
            })
            .collect();

        let mut outcome = Ok(());
        for handle in producers {
            let joined = handle
                .join()
                .map_err(|_| anyhow!("producer thread panicked"))
                .and_then(|r| r);
            if outcome.is_ok() {
                outcome = joined;
            }
        }
        producers_done.store(true, Ordering::Release);

        for handle in consumers {
            let joined = handle
                .join()
                .map_err(|_| anyhow!("consumer thread panicked"))
                .and_then(|r| r);
            if outcome.is_ok() {
                outcome = joined;
            }
        }
        outcome
    })?;

    let report = DeliveryReport::from_frequencies(expected, frequencies, started.elapsed());
    info!(
        deliveries = report.deliveries(),
        over_delivered = report.over_delivered(),
        elapsed = ?report.elapsed,
        "workload finished"
    );
    Ok(report)
}
