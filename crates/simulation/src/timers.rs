//! Deadline-based timer queue.
//!
//! Timers hold absolute deadlines and are polled by the simulation on each
//! tick. A tick that arrives late fires everything that came due in the
//! meantime; a repeating timer fires once for a missed stretch and is
//! rescheduled from the current time instead of bursting.

use std::collections::{BTreeMap, HashMap};

use parcelsim_core::Timestamp;

/// Cancellation handle for a scheduled timer.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(u64);

#[derive(Debug, Clone)]
struct Entry<T> {
    task: T,
    every: Option<u64>,
}

/// A fired timer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fired<T> {
    pub handle: TimerHandle,
    pub deadline: Timestamp,
    pub task: T,
}

#[derive(Debug, Clone)]
pub struct TimerQueue<T> {
    next_id: u64,
    by_deadline: BTreeMap<(Timestamp, u64), Entry<T>>,
    deadlines: HashMap<u64, Timestamp>,
}

impl<T> Default for TimerQueue<T> {
    fn default() -> Self {
        Self {
            next_id: 1,
            by_deadline: BTreeMap::new(),
            deadlines: HashMap::new(),
        }
    }
}

impl<T: Clone> TimerQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.deadlines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deadlines.is_empty()
    }

    /// One-shot timer firing at `deadline`.
    pub fn schedule_at(&mut self, deadline: Timestamp, task: T) -> TimerHandle {
        self.insert(deadline, Entry { task, every: None })
    }

    /// Repeating timer: first at `first`, then every `interval_ms`.
    pub fn schedule_every(&mut self, first: Timestamp, interval_ms: u64, task: T) -> TimerHandle {
        self.insert(
            first,
            Entry {
                task,
                every: Some(interval_ms.max(1)),
            },
        )
    }

    fn insert(&mut self, deadline: Timestamp, entry: Entry<T>) -> TimerHandle {
        let id = self.next_id;
        self.next_id += 1;
        self.by_deadline.insert((deadline, id), entry);
        self.deadlines.insert(id, deadline);
        TimerHandle(id)
    }

    /// Cancel a timer. Returns false if it already fired (one-shot) or was cancelled.
    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        match self.deadlines.remove(&handle.0) {
            Some(deadline) => self.by_deadline.remove(&(deadline, handle.0)).is_some(),
            None => false,
        }
    }

    pub fn cancel_all(&mut self) {
        self.by_deadline.clear();
        self.deadlines.clear();
    }

    pub fn deadline(&self, handle: TimerHandle) -> Option<Timestamp> {
        self.deadlines.get(&handle.0).copied()
    }

    /// Remove and return every timer due at `now`, earliest first.
    pub fn pop_due(&mut self, now: Timestamp) -> Vec<Fired<T>> {
        let mut fired = Vec::new();
        while let Some((&(deadline, id), _)) = self.by_deadline.first_key_value() {
            if deadline > now {
                break;
            }
            let Some(entry) = self.by_deadline.remove(&(deadline, id)) else {
                break;
            };
            self.deadlines.remove(&id);

            if let Some(every) = entry.every {
                let mut next = deadline.plus_millis(every);
                if next <= now {
                    next = now.plus_millis(every);
                }
                self.by_deadline.insert((next, id), entry.clone());
                self.deadlines.insert(id, next);
            }

            fired.push(Fired {
                handle: TimerHandle(id),
                deadline,
                task: entry.task,
            });
        }
        fired
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(ms: i64) -> Timestamp {
        Timestamp::from_millis(ms)
    }

    #[test]
    fn one_shot_fires_once_in_deadline_order() {
        let mut q = TimerQueue::new();
        q.schedule_at(ts(300), "late");
        q.schedule_at(ts(100), "early");

        assert!(q.pop_due(ts(50)).is_empty());
        let fired: Vec<&str> = q.pop_due(ts(1_000)).into_iter().map(|f| f.task).collect();
        assert_eq!(fired, vec!["early", "late"]);
        assert!(q.pop_due(ts(2_000)).is_empty());
        assert!(q.is_empty());
    }

    #[test]
    fn cancelled_timers_never_fire() {
        let mut q = TimerQueue::new();
        let h = q.schedule_at(ts(100), 1);
        assert!(q.cancel(h));
        assert!(!q.cancel(h));
        assert!(q.pop_due(ts(500)).is_empty());
    }

    #[test]
    fn repeating_timer_skips_missed_intervals_without_bursting() {
        let mut q = TimerQueue::new();
        let h = q.schedule_every(ts(1_000), 1_000, "poll");

        assert_eq!(q.pop_due(ts(1_000)).len(), 1);
        assert_eq!(q.deadline(h), Some(ts(2_000)));

        // Paused for a long time: one firing, then back on cadence from now.
        assert_eq!(q.pop_due(ts(7_500)).len(), 1);
        assert_eq!(q.deadline(h), Some(ts(8_500)));

        assert!(q.cancel(h));
        assert!(q.pop_due(ts(100_000)).is_empty());
    }
}
