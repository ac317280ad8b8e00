//! # Discrete-Event Engine
//!
//! A single-threaded discrete-event scheduler: a global ordering of events by
//! `(time, insertion_seq)`, with no preemption — handlers run to completion
//! and resumption is always a freshly scheduled event, never a suspended
//! stack (spec section 5, "Concurrency & Resource Model").
//!
//! This crate knows nothing about pages, migrations or caches; it is the
//! generic "when does the next thing happen" primitive the memory manager is
//! built on top of, the same way `kernel-sync`'s lock primitives are generic
//! over the data they protect.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Simulated time, in whatever unit the caller schedules delays in (cycles or
/// instructions — spec section 4.5's `periodType`).
pub type Time = u64;

/// Opaque handle returned by [`Engine::schedule`]. Not currently used for
/// cancellation: spec section 5 states cancellation is "exclusively
/// cooperative via ROLLBACK event" — nothing in this crate cancels a
/// scheduled entry directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventId(u64);

struct Scheduled<Ev> {
    time: Time,
    seq: u64,
    payload: Ev,
}

impl<Ev> PartialEq for Scheduled<Ev> {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.seq == other.seq
    }
}
impl<Ev> Eq for Scheduled<Ev> {}

impl<Ev> PartialOrd for Scheduled<Ev> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<Ev> Ord for Scheduled<Ev> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so `BinaryHeap` (a max-heap) behaves as a min-heap on
        // (time, seq): earliest-scheduled, then first-inserted, wins.
        other
            .time
            .cmp(&self.time)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Orders events by `(time, insertion_seq)` and hands them back one at a time.
///
/// `Ev` is the event payload type; this crate imposes no bounds on it beyond
/// ownership, so a caller is free to carry a `FrameId`, a `CpuId`, or
/// whatever else the event needs alongside its discriminant.
pub struct Engine<Ev> {
    queue: BinaryHeap<Scheduled<Ev>>,
    next_seq: u64,
    now: Time,
}

impl<Ev> Default for Engine<Ev> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Ev> Engine<Ev> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            queue: BinaryHeap::new(),
            next_seq: 0,
            now: 0,
        }
    }

    /// Current simulated time: the time of the most recently delivered event.
    #[must_use]
    pub const fn now(&self) -> Time {
        self.now
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Schedule `payload` to be delivered `delay` units of time from now.
    pub fn schedule(&mut self, delay: Time, payload: Ev) -> EventId {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push(Scheduled {
            time: self.now.saturating_add(delay),
            seq,
            payload,
        });
        log::trace!("scheduled event #{seq} at t={}", self.now.saturating_add(delay));
        EventId(seq)
    }

    /// Pop the next event in `(time, seq)` order, advancing `now` to its time.
    ///
    /// Returns `None` once the queue is drained — the simulation is idle.
    pub fn advance(&mut self) -> Option<(Time, Ev)> {
        let next = self.queue.pop()?;
        self.now = next.time;
        Some((next.time, next.payload))
    }
}
