//! Deadline-ordered deferred events for the match loop
//!
//! Respawns, reload completions and round-ending delays are scheduled here and
//! drained by the owning loop on every tick. Nothing ever sleeps; the only way
//! to cancel a pending entry is to clear the whole scheduler on a match reset.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::Instant;

/// Work the match performs once a deadline passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    /// Bring a dead player back. `life` pins the death this respawn belongs to.
    Respawn { player_id: u32, life: u32 },
    /// Finish a reload started under `epoch`.
    ReloadComplete { player_id: u32, epoch: u32 },
    /// Leave the round-ending pause of `round_number`.
    NextRound { round_number: u32 },
}

#[derive(Debug)]
struct Scheduled {
    deadline: Instant,
    seq: u64,
    event: TimerEvent,
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Eq for Scheduled {}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    // Reversed so the max-heap yields the earliest deadline, then insertion order.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Min-heap of pending timer events.
#[derive(Debug, Default)]
pub struct Scheduler {
    heap: BinaryHeap<Scheduled>,
    next_seq: u64,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, deadline: Instant, event: TimerEvent) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Scheduled {
            deadline,
            seq,
            event,
        });
    }

    /// Pops the earliest event whose deadline is at or before `now`.
    pub fn pop_due(&mut self, now: Instant) -> Option<TimerEvent> {
        match self.heap.peek() {
            Some(next) if next.deadline <= now => self.heap.pop().map(|s| s.event),
            _ => None,
        }
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.heap.peek().map(|s| s.deadline)
    }

    /// Drops every pending event.
    pub fn clear(&mut self) {
        self.heap.clear();
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}
