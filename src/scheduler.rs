//! One-shot delayed-event scheduling for a single session: delayed
//! responses, delayed variable sets, and unsolicited-item timers all pass
//! through here, each carrying its own payload and firing exactly once.

use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug)]
pub struct Scheduler<T> {
    pending: Vec<(Instant, T)>,
}

impl<T> Scheduler<T> {
    pub fn new() -> Self {
        Self { pending: Vec::new() }
    }

    pub fn schedule(&mut self, delay_ms: u64, payload: T) {
        let fire_at = Instant::now() + Duration::from_millis(delay_ms);
        self.pending.push((fire_at, payload));
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// The earliest deadline across all pending events, if any.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.iter().map(|(t, _)| *t).min()
    }

    /// Removes and returns every payload whose deadline has already passed.
    pub fn drain_ready(&mut self) -> Vec<T> {
        let now = Instant::now();
        let mut ready = Vec::new();
        let mut remaining = Vec::new();
        for (fire_at, payload) in self.pending.drain(..) {
            if fire_at <= now {
                ready.push(payload);
            } else {
                remaining.push((fire_at, payload));
            }
        }
        self.pending = remaining;
        ready
    }

    /// Drops every pending event. Used when a state transition cancels the
    /// outgoing state's unsolicited timers; note this crate's delayed
    /// variable-set timers are tracked separately and are deliberately
    /// never cancelled this way (see DESIGN.md).
    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

impl<T> Default for Scheduler<T> {
    fn default() -> Self {
        Self::new()
    }
}
