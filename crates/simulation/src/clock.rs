//! Simulation clock: monotonically increasing ticks over a wall-clock source.

use std::sync::Arc;

use parcelsim_core::{Clock, Timestamp};

/// One heartbeat of the simulation.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Tick {
    pub seq: u64,
    pub now: Timestamp,
}

/// Turns a [`Clock`] into a strictly ordered tick stream.
///
/// If the underlying clock steps backwards (NTP adjustment, a test resetting a
/// manual clock) the tick time holds at the last observed value.
#[derive(Clone)]
pub struct SimulationClock {
    source: Arc<dyn Clock>,
    seq: u64,
    last: Timestamp,
}

impl SimulationClock {
    pub fn new(source: Arc<dyn Clock>) -> Self {
        let last = source.now();
        Self { source, seq: 0, last }
    }

    pub fn next_tick(&mut self) -> Tick {
        let now = self.source.now().max(self.last);
        self.seq += 1;
        self.last = now;
        Tick { seq: self.seq, now }
    }

    /// Time of the most recent tick (or of construction).
    pub fn last_observed(&self) -> Timestamp {
        self.last
    }

    /// Current source time, clamped so it never precedes the last tick.
    pub fn now(&self) -> Timestamp {
        self.source.now().max(self.last)
    }
}

impl core::fmt::Debug for SimulationClock {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SimulationClock")
            .field("seq", &self.seq)
            .field("last", &self.last)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use parcelsim_core::ManualClock;

    use super::*;

    #[test]
    fn ticks_are_monotonic_even_if_source_steps_back() {
        let source = Arc::new(ManualClock::new(Timestamp::from_millis(1_000)));
        let mut clock = SimulationClock::new(source.clone());

        source.advance(100);
        let a = clock.next_tick();
        source.set(Timestamp::from_millis(500));
        let b = clock.next_tick();

        assert_eq!(a, Tick { seq: 1, now: Timestamp::from_millis(1_100) });
        assert_eq!(b, Tick { seq: 2, now: Timestamp::from_millis(1_100) });
    }
}
