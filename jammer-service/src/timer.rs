//! Host clock and never-cancelling timer queue.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::convert::Infallible;
use std::ops::Add;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use jammer_core::{EpochInstant, Generation, TimerService};
use tokio::time::Instant;

/// Monotonic instant paired with the wall-clock time it was taken at.
///
/// Deadlines use the monotonic half; transmission timestamps use the wall
/// clock half.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct HostInstant {
    monotonic: Instant,
    since_epoch: Duration,
}

impl HostInstant {
    pub fn now() -> Self {
        Self {
            monotonic: Instant::now(),
            since_epoch: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default(),
        }
    }

    #[must_use]
    pub const fn from_parts(monotonic: Instant, since_epoch: Duration) -> Self {
        Self {
            monotonic,
            since_epoch,
        }
    }

    #[must_use]
    pub const fn monotonic(&self) -> Instant {
        self.monotonic
    }
}

impl Add<Duration> for HostInstant {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self::Output {
        Self {
            monotonic: self.monotonic + rhs,
            since_epoch: self.since_epoch + rhs,
        }
    }
}

impl EpochInstant for HostInstant {
    fn epoch_micros(&self) -> u64 {
        let micros = (self.since_epoch.as_nanos() + 500) / 1_000;
        u64::try_from(micros).unwrap_or(u64::MAX)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct TimerEntry {
    deadline: Instant,
    order: u64,
    generation: Generation,
}

/// Min-heap of pending chain firings.
///
/// Entries are never removed early; a superseded chain's entry fires and the
/// controller discards it. Entries with equal deadlines fire in insertion
/// order.
#[derive(Debug, Default)]
pub struct HostTimerQueue {
    entries: BinaryHeap<Reverse<TimerEntry>>,
    inserted: u64,
}

impl HostTimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Earliest pending deadline.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.entries.peek().map(|Reverse(entry)| entry.deadline)
    }

    /// Removes the earliest entry if it is due at `now`.
    pub fn pop_due(&mut self, now: Instant) -> Option<Generation> {
        if self.next_deadline()? > now {
            return None;
        }
        self.entries.pop().map(|Reverse(entry)| entry.generation)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl TimerService for HostTimerQueue {
    type Instant = HostInstant;
    type Error = Infallible;

    fn schedule_at(
        &mut self,
        deadline: HostInstant,
        generation: Generation,
    ) -> Result<(), Infallible> {
        self.entries.push(Reverse(TimerEntry {
            deadline: deadline.monotonic(),
            order: self.inserted,
            generation,
        }));
        self.inserted = self.inserted.wrapping_add(1);
        Ok(())
    }
}
