//! Worker state machine.
//!
//! ```text
//! IDLE ──processed──▶ WORKING ──cooldown──▶ IDLE
//!                        │
//!                        └──breakdown──▶ BROKEN ──now >= broken_until──▶ IDLE
//! ```
//!
//! Invariants held by every method here:
//! - `work_started_at` is set once, on the first processed parcel, and never cleared
//! - `total_work_time` never decreases
//! - `status == Broken` if and only if `broken_until` is set

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use parcelsim_core::{DomainError, DomainResult, Entity, Timestamp, WorkerId};
use parcelsim_events::ProcessOutcome;

use crate::metrics::{format_ratio, ratio};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerStatus {
    Idle,
    Working,
    Broken,
}

impl WorkerStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            WorkerStatus::Idle => "IDLE",
            WorkerStatus::Working => "WORKING",
            WorkerStatus::Broken => "BROKEN",
        }
    }
}

impl core::fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Worker {
    id: WorkerId,
    status: WorkerStatus,
    processed_count: u32,
    accident_count: u32,
    last_processed_at: Option<Timestamp>,
    work_started_at: Option<Timestamp>,
    total_work_time: u64,
    broken_until: Option<Timestamp>,
}

impl Worker {
    pub fn new(id: WorkerId) -> Self {
        Self {
            id,
            status: WorkerStatus::Idle,
            processed_count: 0,
            accident_count: 0,
            last_processed_at: None,
            work_started_at: None,
            total_work_time: 0,
            broken_until: None,
        }
    }

    pub fn status(&self) -> WorkerStatus {
        self.status
    }

    pub fn processed_count(&self) -> u32 {
        self.processed_count
    }

    pub fn accident_count(&self) -> u32 {
        self.accident_count
    }

    pub fn last_processed_at(&self) -> Option<Timestamp> {
        self.last_processed_at
    }

    pub fn work_started_at(&self) -> Option<Timestamp> {
        self.work_started_at
    }

    /// Accumulated active processing time, in milliseconds.
    pub fn total_work_time(&self) -> u64 {
        self.total_work_time
    }

    pub fn broken_until(&self) -> Option<Timestamp> {
        self.broken_until
    }

    pub fn can_process(&self) -> bool {
        self.status != WorkerStatus::Broken
    }

    /// Close the open work interval (if any) at `at`.
    fn bank_work_time(&mut self, at: Timestamp) {
        if self.status == WorkerStatus::Working {
            if let Some(last) = self.last_processed_at {
                self.total_work_time = self.total_work_time.saturating_add(at.millis_since(last));
            }
        }
    }

    /// IDLE/WORKING → WORKING on a processed parcel.
    pub fn record_processed(&mut self, outcome: ProcessOutcome, at: Timestamp) -> DomainResult<()> {
        if !self.can_process() {
            return Err(DomainError::illegal("worker", self.status.as_str(), "WORKING"));
        }
        self.bank_work_time(at);
        match outcome {
            ProcessOutcome::Normal => self.processed_count += 1,
            ProcessOutcome::Accident => self.accident_count += 1,
        }
        self.work_started_at.get_or_insert(at);
        self.last_processed_at = Some(at);
        self.status = WorkerStatus::Working;
        Ok(())
    }

    /// WORKING → IDLE once the cooldown elapsed.
    pub fn end_cooldown(&mut self, at: Timestamp) -> DomainResult<()> {
        if self.status != WorkerStatus::Working {
            return Err(DomainError::illegal("worker", self.status.as_str(), "IDLE"));
        }
        self.bank_work_time(at);
        self.status = WorkerStatus::Idle;
        Ok(())
    }

    /// → BROKEN until `until`. A worker that is already broken is left alone,
    /// so a redelivered breakdown does not count twice.
    pub fn break_down(&mut self, until: Timestamp, at: Timestamp) -> DomainResult<()> {
        if self.status == WorkerStatus::Broken {
            return Err(DomainError::illegal("worker", "BROKEN", "BROKEN"));
        }
        self.bank_work_time(at);
        self.accident_count += 1;
        self.broken_until = Some(until);
        self.status = WorkerStatus::Broken;
        Ok(())
    }

    /// BROKEN → IDLE if `now` reached the deadline. Returns whether it recovered.
    ///
    /// Calling this late, or twice, is harmless.
    pub fn recover_if_due(&mut self, now: Timestamp) -> bool {
        match self.broken_until {
            Some(until) if self.status == WorkerStatus::Broken && now >= until => {
                self.force_recover();
                true
            }
            _ => false,
        }
    }

    /// BROKEN → IDLE regardless of the deadline (the publisher already decided).
    pub fn force_recover(&mut self) -> bool {
        if self.status != WorkerStatus::Broken {
            return false;
        }
        self.broken_until = None;
        self.status = WorkerStatus::Idle;
        true
    }

    /// `accidents / (processed + accidents)`, zero before any activity.
    pub fn accident_rate(&self) -> f64 {
        self.accident_ratio().unwrap_or(0.0)
    }

    fn accident_ratio(&self) -> Option<f64> {
        let accidents = f64::from(self.accident_count);
        ratio(accidents, f64::from(self.processed_count) + accidents)
    }

    /// `"25.0%"`, or `"-"` before any activity.
    pub fn accident_rate_label(&self) -> String {
        format_ratio(self.accident_ratio())
    }

    /// Share of the time since the first processed parcel spent working.
    pub fn utilization(&self, now: Timestamp) -> Option<f64> {
        let started = self.work_started_at?;
        ratio(self.total_work_time as f64, now.millis_since(started) as f64)
    }

    /// `"40.0%"`, or `"-"` if the worker never processed anything.
    pub fn utilization_label(&self, now: Timestamp) -> String {
        format_ratio(self.utilization(now))
    }
}

impl Entity for Worker {
    type Id = WorkerId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// The fixed worker roster of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerPool {
    workers: Vec<Worker>,
    index: HashMap<WorkerId, usize>,
}

impl WorkerPool {
    /// Fresh pool with zeroed counters, in roster order.
    pub fn new(roster: &[WorkerId]) -> Self {
        let mut workers = Vec::with_capacity(roster.len());
        let mut index = HashMap::with_capacity(roster.len());
        for id in roster {
            if index.contains_key(id) {
                continue;
            }
            index.insert(id.clone(), workers.len());
            workers.push(Worker::new(id.clone()));
        }
        Self { workers, index }
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    pub fn get(&self, id: &WorkerId) -> Option<&Worker> {
        self.index.get(id).map(|&i| &self.workers[i])
    }

    pub fn get_mut(&mut self, id: &WorkerId) -> Option<&mut Worker> {
        match self.index.get(id) {
            Some(&i) => self.workers.get_mut(i),
            None => None,
        }
    }

    /// Workers in roster order.
    pub fn iter(&self) -> impl Iterator<Item = &Worker> {
        self.workers.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Worker> {
        self.workers.iter_mut()
    }

    pub fn count(&self, status: WorkerStatus) -> usize {
        self.workers.iter().filter(|w| w.status == status).count()
    }

    pub fn roster(&self) -> Vec<WorkerId> {
        self.workers.iter().map(|w| w.id.clone()).collect()
    }
}
