//! Timer storage for the user-space scheduler.
//!
//! A small min-heap of `(deadline, key, generation)` entries over a slab of
//! registrations. Cancellation removes the registration; stale heap entries
//! are skipped lazily when their key or generation no longer matches.

use super::ScheduledTask;
use core::fmt;
use slab::Slab;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::Duration;

/// Virtual time, in nanoseconds since scheduler start.
///
/// The scheduler never consults a wall clock; time advances only when the
/// run loop reaches the next deadline, which keeps runs deterministic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Time(u64);

impl Time {
    /// Time zero.
    pub const ZERO: Self = Self(0);

    /// Creates a time from nanoseconds.
    #[must_use]
    pub const fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    /// Creates a time from milliseconds.
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis * 1_000_000)
    }

    /// Returns the time as nanoseconds.
    #[must_use]
    pub const fn as_nanos(self) -> u64 {
        self.0
    }

    /// Returns the time as whole milliseconds.
    #[must_use]
    pub const fn as_millis(self) -> u64 {
        self.0 / 1_000_000
    }

    /// Adds a duration, saturating on overflow.
    #[must_use]
    pub fn saturating_add(self, duration: Duration) -> Self {
        let nanos = duration.as_nanos().min(u128::from(u64::MAX)) as u64;
        Self(self.0.saturating_add(nanos))
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ns", self.0)
    }
}

/// Opaque handle to a scheduled timer, returned by the timeout and
/// interval primitives and accepted by cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerKey {
    slot: usize,
    generation: u64,
}

struct HeapEntry {
    deadline: Time,
    key: TimerKey,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.key.generation == other.key.generation
    }
}

impl Eq for HeapEntry {}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap (earliest deadline first);
        // generation breaks ties in registration order.
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.key.generation.cmp(&self.key.generation))
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

pub(super) struct Registration {
    generation: u64,
    period: Option<Duration>,
    task: Option<ScheduledTask>,
}

/// Deadline-ordered timer storage.
pub(super) struct TimerWheel {
    heap: BinaryHeap<HeapEntry>,
    registrations: Slab<Registration>,
    next_generation: u64,
}

impl TimerWheel {
    pub(super) fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            registrations: Slab::new(),
            next_generation: 0,
        }
    }

    pub(super) fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    pub(super) fn insert(
        &mut self,
        task: ScheduledTask,
        deadline: Time,
        period: Option<Duration>,
    ) -> TimerKey {
        let generation = self.next_generation;
        self.next_generation += 1;
        let slot = self.registrations.insert(Registration {
            generation,
            period,
            task: Some(task),
        });
        let key = TimerKey { slot, generation };
        self.heap.push(HeapEntry { deadline, key });
        key
    }

    pub(super) fn cancel(&mut self, key: TimerKey) -> bool {
        match self.registrations.get(key.slot) {
            Some(registration) if registration.generation == key.generation => {
                self.registrations.remove(key.slot);
                true
            }
            _ => false,
        }
    }

    fn entry_is_live(&self, entry: &HeapEntry) -> bool {
        self.registrations
            .get(entry.key.slot)
            .is_some_and(|r| r.generation == entry.key.generation)
    }

    /// Returns the earliest live deadline, discarding stale entries.
    pub(super) fn next_deadline(&mut self) -> Option<Time> {
        while let Some(entry) = self.heap.peek() {
            if self.entry_is_live(entry) {
                return Some(entry.deadline);
            }
            self.heap.pop();
        }
        None
    }

    /// Takes the earliest timer due at or before `now`. Interval
    /// registrations stay in the slab with their task checked out; the
    /// caller hands the task back through [`Self::requeue`].
    pub(super) fn pop_due(
        &mut self,
        now: Time,
    ) -> Option<(TimerKey, ScheduledTask, Option<Duration>)> {
        let deadline = self.next_deadline()?;
        if deadline > now {
            return None;
        }
        let entry = self.heap.pop()?;
        let key = entry.key;
        let period = self.registrations[key.slot].period;
        match period {
            Some(_) => {
                let task = self.registrations[key.slot].task.take()?;
                Some((key, task, period))
            }
            None => {
                let registration = self.registrations.remove(key.slot);
                registration.task.map(|task| (key, task, None))
            }
        }
    }

    /// Returns an interval's task after a firing and schedules its next
    /// deadline. Dropped silently if the interval was cancelled while its
    /// callback ran.
    pub(super) fn requeue(&mut self, key: TimerKey, task: ScheduledTask, now: Time) {
        let Some(registration) = self.registrations.get_mut(key.slot) else {
            return;
        };
        if registration.generation != key.generation {
            return;
        }
        let Some(period) = registration.period else {
            return;
        };
        registration.task = Some(task);
        self.heap.push(HeapEntry {
            deadline: now.saturating_add(period),
            key,
        });
    }
}
