//! Periodic scheduler for per-target probe actions
//!
//! Fires one action per registered key at a fixed interval, indefinitely,
//! without cumulative drift and without leaking concurrent executions.
//!
//! ## Design
//!
//! A min-heap of `(fire_at, key)` entries is the pending work; a map of
//! `key -> JoinHandle` owns the in-flight task per key so the runtime can
//! never discard a probe mid-run. On each [`PeriodicScheduler::pump`], all
//! entries whose fire time has elapsed are popped; each one launches its
//! action as a concurrent task (replacing the previously retained handle)
//! and immediately re-arms at `now + interval`.
//!
//! The pump never blocks waiting for the next entry, so the caller must
//! invoke it at a cadence at least twice as fine as the tolerated
//! scheduling error (500 ms sampling for ~1 s precision).
//!
//! Duplicate registrations for the same key are last-wins: entries carry a
//! generation stamp, and an entry whose generation no longer matches the
//! current registration is discarded when popped instead of firing.

use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::trace;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Entry {
    fire_at: Instant,
    key: String,
    generation: u64,
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.fire_at
            .cmp(&other.fire_at)
            .then_with(|| self.key.cmp(&other.key))
    }
}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Clone)]
struct Registration {
    interval: Duration,
    generation: u64,
}

/// Re-arms a timed action indefinitely at a fixed interval per key.
///
/// The scheduler exclusively owns both the pending queue and the map of
/// in-flight task handles. A handle is replaced, not merged, each time the
/// action for its key fires again.
#[derive(Default)]
pub struct PeriodicScheduler {
    queue: BinaryHeap<Reverse<Entry>>,
    registrations: HashMap<String, Registration>,
    tasks: HashMap<String, JoinHandle<()>>,
    next_generation: u64,
}

impl PeriodicScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a key to fire every `interval`, first firing at `now`.
    ///
    /// Registering an already-registered key replaces its schedule: the
    /// prior entry becomes inert and only the new one will ever fire. A
    /// non-positive interval is a configuration error rejected upstream.
    pub fn register(&mut self, key: &str, interval: Duration, now: Instant) {
        self.next_generation += 1;
        let generation = self.next_generation;
        self.registrations
            .insert(key.to_string(), Registration { interval, generation });
        self.queue.push(Reverse(Entry {
            fire_at: now,
            key: key.to_string(),
            generation,
        }));
        trace!("registered {key} every {interval:?}");
    }

    /// Fire every entry whose time has elapsed and re-arm it.
    ///
    /// `launch` starts the action for a key as a concurrent task and
    /// returns its handle, which the scheduler retains (superseding the
    /// previous one for that key). Entries are processed earliest first.
    pub fn pump<F>(&mut self, now: Instant, mut launch: F)
    where
        F: FnMut(&str) -> JoinHandle<()>,
    {
        loop {
            match self.queue.peek() {
                Some(Reverse(entry)) if entry.fire_at <= now => {}
                _ => break,
            }
            let Reverse(entry) = self.queue.pop().expect("peeked entry vanished");

            let Some(registration) = self.registrations.get(&entry.key) else {
                // Cancelled since it was queued.
                continue;
            };
            if registration.generation != entry.generation {
                // Superseded by a later registration for the same key.
                continue;
            }

            self.queue.push(Reverse(Entry {
                fire_at: now + registration.interval,
                key: entry.key.clone(),
                generation: entry.generation,
            }));

            let handle = launch(&entry.key);
            // Dropping the previous handle detaches a task that is either
            // finished or still running to completion on its own.
            self.tasks.insert(entry.key, handle);
        }
    }

    /// Drop every pending entry.
    ///
    /// In-flight tasks are left alone; they are expected to observe their
    /// cancellation token and exit, and remain visible via
    /// [`PeriodicScheduler::live_tasks`] until they do.
    pub fn cancel_all(&mut self) {
        self.queue.clear();
        self.registrations.clear();
    }

    /// Number of pending entries that can still fire.
    pub fn pending(&self) -> usize {
        self.queue
            .iter()
            .filter(|Reverse(entry)| {
                self.registrations
                    .get(&entry.key)
                    .is_some_and(|r| r.generation == entry.generation)
            })
            .count()
    }

    /// Number of launched tasks still running. Prunes finished handles.
    pub fn live_tasks(&mut self) -> usize {
        self.tasks.retain(|_, handle| !handle.is_finished());
        self.tasks.len()
    }
}
