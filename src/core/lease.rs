//! Per-message lease state.
//!
//! A lease is the time-bounded claim a puller holds on a message between a
//! successful grab and either completion or expiry. Two representations:
//!
//! - [`PlainLease`]: independent loads and stores, no read-modify-write. It is
//!   exact only while the caller holds exclusive access to the owning queue;
//!   racing grabs may both succeed (at-least-once).
//! - [`AtomicLease`]: an immutable [`Stamps`] snapshot behind one
//!   compare-and-swap slot. Racing grabs elect exactly one winner
//!   (best-effort exactly-once).

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;

use crossbeam_epoch::{self as epoch, Atomic, Owned};
use once_cell::sync::Lazy;

use crate::core::error::{QueueError, QueueResult};

/// Outcome of an attempt to grab a message for consumption.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grab {
    /// Never grabbed before, or the previous lease expired. The caller now
    /// holds the lease.
    Succeeded,
    /// Leased by someone else and not yet expired.
    Active,
    /// Already completed; the message is dead.
    Completed,
}

/// Lease state machine shared by every puller racing for one message.
pub trait Lease: Send + Sync + fmt::Debug {
    /// Tries to take (or renew after expiry) the lease. `expiry` is stored
    /// only when the grab succeeds.
    fn try_grab(&self, now: Instant, expiry: Instant) -> QueueResult<Grab>;

    /// Marks the message completed. Fails if it was never grabbed; completing
    /// twice is a no-op.
    fn complete(&self) -> QueueResult<()>;

    fn is_completed(&self) -> bool;
}

fn check_window(grabbed: Instant, expires: Instant) -> QueueResult<()> {
    if expires < grabbed {
        return Err(QueueError::invalid(format!(
            "lease expiry precedes grab time (grabbed: {grabbed:?}, expires: {expires:?})"
        )));
    }
    Ok(())
}

fn complete_before_grab() -> QueueError {
    QueueError::illegal("message must be grabbed before it is completed")
}

// ───────────────────────────────────────────────────────────
// Plain lease
// ───────────────────────────────────────────────────────────

/// Reference point for encoding instants as `u64` ticks.
static EPOCH: Lazy<Instant> = Lazy::new(Instant::now);

const NEVER_GRABBED: u64 = u64::MAX;

#[inline]
fn ticks(instant: Instant) -> u64 {
    let nanos = instant.saturating_duration_since(*EPOCH).as_nanos();
    u64::try_from(nanos).map_or(NEVER_GRABBED - 1, |n| n.min(NEVER_GRABBED - 1))
}

/// Lease with plain fields: an expiry (unset until the first grab) and a
/// completed flag.
///
/// The fields are atomics only so that unsynchronized access stays memory
/// safe; every decision is a separate load followed by a separate store.
pub struct PlainLease {
    expires: AtomicU64,
    completed: AtomicBool,
}

impl PlainLease {
    pub fn new() -> Self {
        Lazy::force(&EPOCH);
        Self {
            expires: AtomicU64::new(NEVER_GRABBED),
            completed: AtomicBool::new(false),
        }
    }
}

impl Default for PlainLease {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PlainLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let expires = self.expires.load(Ordering::Relaxed);
        f.debug_struct("PlainLease")
            .field("grabbed", &(expires != NEVER_GRABBED))
            .field("completed", &self.completed.load(Ordering::Relaxed))
            .finish()
    }
}

impl Lease for PlainLease {
    fn try_grab(&self, now: Instant, expiry: Instant) -> QueueResult<Grab> {
        check_window(now, expiry)?;

        let expires = self.expires.load(Ordering::Acquire);
        if expires == NEVER_GRABBED {
            self.expires.store(ticks(expiry), Ordering::Release);
            return Ok(Grab::Succeeded);
        }

        if self.completed.load(Ordering::Acquire) {
            return Ok(Grab::Completed);
        }

        if ticks(now) >= expires {
            self.expires.store(ticks(expiry), Ordering::Release);
            return Ok(Grab::Succeeded);
        }

        Ok(Grab::Active)
    }

    fn complete(&self) -> QueueResult<()> {
        if self.expires.load(Ordering::Acquire) == NEVER_GRABBED {
            return Err(complete_before_grab());
        }
        self.completed.store(true, Ordering::Release);
        Ok(())
    }

    fn is_completed(&self) -> bool {
        self.completed.load(Ordering::Acquire)
    }
}

// ───────────────────────────────────────────────────────────
// Atomic lease
// ───────────────────────────────────────────────────────────

/// Immutable lease snapshot: when the message was grabbed, when that lease
/// expires, and when (if ever) it was completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stamps {
    grabbed: Instant,
    expires: Instant,
    completed: Option<Instant>,
}

impl Stamps {
    /// Fails if `expires` is strictly before `grabbed`.
    pub fn new(grabbed: Instant, expires: Instant) -> QueueResult<Self> {
        check_window(grabbed, expires)?;
        Ok(Self {
            grabbed,
            expires,
            completed: None,
        })
    }

    pub fn grabbed(&self) -> Instant {
        self.grabbed
    }

    pub fn expires(&self) -> Instant {
        self.expires
    }

    pub fn completed(&self) -> Option<Instant> {
        self.completed
    }

    pub fn has_completed(&self) -> bool {
        self.completed.is_some()
    }

    pub fn has_expired(&self, now: Instant) -> bool {
        now >= self.expires
    }

    fn completed_at(self, at: Instant) -> Self {
        Self {
            completed: Some(at),
            ..self
        }
    }
}

/// Lease whose whole state is one [`Stamps`] snapshot swapped atomically.
///
/// Whoever installs a new snapshot has grabbed the message. Retired snapshots
/// are reclaimed through epoch-based reclamation.
pub struct AtomicLease {
    stamps: Atomic<Stamps>,
}

impl AtomicLease {
    pub fn new() -> Self {
        Self {
            stamps: Atomic::null(),
        }
    }

    /// Current snapshot, `None` if never grabbed.
    pub fn stamps(&self) -> Option<Stamps> {
        let guard = &epoch::pin();
        let current = self.stamps.load(Ordering::Acquire, guard);
        // SAFETY: snapshots are only retired via `defer_destroy`, so a pinned
        // load stays valid for the lifetime of `guard`.
        unsafe { current.as_ref() }.copied()
    }
}

impl Default for AtomicLease {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for AtomicLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AtomicLease")
            .field("stamps", &self.stamps())
            .finish()
    }
}

impl Lease for AtomicLease {
    fn try_grab(&self, now: Instant, expiry: Instant) -> QueueResult<Grab> {
        let mut next = Owned::new(Stamps::new(now, expiry)?);
        let guard = &epoch::pin();
        let mut current = self.stamps.load(Ordering::Acquire, guard);

        loop {
            // SAFETY: see `stamps()`.
            if let Some(stamps) = unsafe { current.as_ref() } {
                if stamps.has_completed() {
                    return Ok(Grab::Completed);
                }
                if !stamps.has_expired(now) {
                    return Ok(Grab::Active);
                }
            }

            // Only the thread that replaces the snapshot it decided on wins.
            match self.stamps.compare_exchange(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
                guard,
            ) {
                Ok(_) => {
                    if !current.is_null() {
                        // SAFETY: `current` is unlinked and no longer reachable
                        // by new readers.
                        unsafe { guard.defer_destroy(current) };
                    }
                    return Ok(Grab::Succeeded);
                }
                Err(lost) => {
                    current = lost.current;
                    next = lost.new;
                }
            }
        }
    }

    fn complete(&self) -> QueueResult<()> {
        let guard = &epoch::pin();
        let current = self.stamps.load(Ordering::Acquire, guard);

        // SAFETY: see `stamps()`.
        let stamps = match unsafe { current.as_ref() } {
            Some(stamps) => *stamps,
            None => return Err(complete_before_grab()),
        };
        if stamps.has_completed() {
            return Ok(());
        }

        // Unconditional store, not a CAS: a grab racing this completion may
        // still win or be overwritten. Exactly-once holds among grabs only.
        let previous = self.stamps.swap(
            Owned::new(stamps.completed_at(Instant::now())),
            Ordering::AcqRel,
            guard,
        );
        if !previous.is_null() {
            // SAFETY: `previous` was just unlinked by the swap.
            unsafe { guard.defer_destroy(previous) };
        }
        Ok(())
    }

    fn is_completed(&self) -> bool {
        self.stamps().is_some_and(|s| s.has_completed())
    }
}

impl Drop for AtomicLease {
    fn drop(&mut self) {
        // SAFETY: `&mut self` guarantees no other thread can reach the slot.
        unsafe {
            let stamps = self.stamps.load(Ordering::Relaxed, epoch::unprotected());
            if !stamps.is_null() {
                drop(stamps.into_owned());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier};
    use std::thread;
    use std::time::Duration;

    const MINUTE: Duration = Duration::from_secs(60);

    fn walk_transition_table(lease: &dyn Lease) {
        let t0 = Instant::now();

        assert!(
            lease.complete().is_err(),
            "complete before grab must be rejected"
        );

        assert_eq!(lease.try_grab(t0, t0 + MINUTE).unwrap(), Grab::Succeeded);
        assert_eq!(
            lease.try_grab(t0 + Duration::from_secs(1), t0 + 2 * MINUTE).unwrap(),
            Grab::Active
        );

        // Lease expired exactly at `now`: redelivery.
        assert_eq!(
            lease.try_grab(t0 + MINUTE, t0 + 2 * MINUTE).unwrap(),
            Grab::Succeeded
        );

        lease.complete().unwrap();
        lease.complete().unwrap();
        assert!(lease.is_completed());

        assert_eq!(
            lease.try_grab(t0 + 10 * MINUTE, t0 + 11 * MINUTE).unwrap(),
            Grab::Completed
        );
    }

    #[test]
    fn plain_lease_follows_transition_table() {
        walk_transition_table(&PlainLease::new());
    }

    #[test]
    fn atomic_lease_follows_transition_table() {
        walk_transition_table(&AtomicLease::new());
    }

    #[test]
    fn expiry_before_grab_is_rejected() {
        let now = Instant::now() + MINUTE;
        let earlier = now - Duration::from_secs(1);

        for lease in [
            Box::new(PlainLease::new()) as Box<dyn Lease>,
            Box::new(AtomicLease::new()) as Box<dyn Lease>,
        ] {
            assert!(matches!(
                lease.try_grab(now, earlier),
                Err(QueueError::InvalidArgument(_))
            ));
        }
        assert!(Stamps::new(now, earlier).is_err());
    }

    #[test]
    fn zero_timeout_lease_is_immediately_regrabbable() {
        let lease = AtomicLease::new();
        let now = Instant::now();
        assert_eq!(lease.try_grab(now, now).unwrap(), Grab::Succeeded);
        assert_eq!(lease.try_grab(now, now).unwrap(), Grab::Succeeded);
    }

    #[test]
    fn completion_keeps_grab_stamps() {
        let lease = AtomicLease::new();
        let now = Instant::now();
        lease.try_grab(now, now + MINUTE).unwrap();
        lease.complete().unwrap();

        let stamps = lease.stamps().expect("grabbed");
        assert_eq!(stamps.grabbed(), now);
        assert_eq!(stamps.expires(), now + MINUTE);
        assert!(stamps.completed().is_some());
    }

    fn race_grabs(lease: Arc<AtomicLease>, now: Instant, expiry: Instant) -> usize {
        const THREADS: usize = 16;
        let barrier = Arc::new(Barrier::new(THREADS));

        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let lease = Arc::clone(&lease);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    lease.try_grab(now, expiry).unwrap()
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|g| *g == Grab::Succeeded)
            .count()
    }

    #[test]
    fn concurrent_first_grabs_elect_one_winner() {
        let now = Instant::now();
        let winners = race_grabs(Arc::new(AtomicLease::new()), now, now + MINUTE);
        assert_eq!(winners, 1);
    }

    #[test]
    fn concurrent_redelivery_grabs_elect_one_winner() {
        let lease = Arc::new(AtomicLease::new());
        let t0 = Instant::now();
        lease.try_grab(t0, t0).unwrap();

        let later = t0 + Duration::from_millis(5);
        let winners = race_grabs(Arc::clone(&lease), later, later + MINUTE);
        assert_eq!(winners, 1);
    }
}
