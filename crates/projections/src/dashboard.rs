//! Tabular dashboard read models.

use serde::Serialize;

use parcelsim_core::{Entity, Timestamp, WorkerId};
use parcelsim_events::{EventEnvelope, Projection, SimEvent};
use parcelsim_simulation::{ParcelStatus, WarehouseState, WorkerStatus};

/// One row of the worker table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerRow {
    pub worker_id: WorkerId,
    pub status: WorkerStatus,
    pub processed_count: u32,
    pub accident_count: u32,
    pub total_work_time: u64,
    pub broken_until: Option<Timestamp>,
    pub accident_rate: String,
    pub utilization: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct WorkerSummary {
    pub idle: usize,
    pub working: usize,
    pub broken: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusTotal {
    pub status: ParcelStatus,
    pub count: usize,
    pub declared_value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParcelSummary {
    pub total: usize,
    /// Every status, in lifecycle order, including empty ones.
    pub by_status: Vec<StatusTotal>,
}

impl ParcelSummary {
    pub fn get(&self, status: ParcelStatus) -> Option<&StatusTotal> {
        self.by_status.iter().find(|t| t.status == status)
    }
}

#[derive(Debug, Clone)]
pub struct DashboardTables {
    state: WarehouseState,
}

impl DashboardTables {
    pub fn new(state: WarehouseState) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &WarehouseState {
        &self.state
    }

    pub fn recover_due(&mut self, now: Timestamp) {
        self.state.recover_due(now);
    }

    /// Worker table in roster order; utilization is relative to `now`.
    pub fn worker_rows(&self, now: Timestamp) -> Vec<WorkerRow> {
        self.state
            .workers()
            .iter()
            .map(|w| WorkerRow {
                worker_id: w.id().clone(),
                status: w.status(),
                processed_count: w.processed_count(),
                accident_count: w.accident_count(),
                total_work_time: w.total_work_time(),
                broken_until: w.broken_until(),
                accident_rate: w.accident_rate_label(),
                utilization: w.utilization_label(now),
            })
            .collect()
    }

    pub fn worker_summary(&self) -> WorkerSummary {
        let workers = self.state.workers();
        WorkerSummary {
            idle: workers.count(WorkerStatus::Idle),
            working: workers.count(WorkerStatus::Working),
            broken: workers.count(WorkerStatus::Broken),
        }
    }

    pub fn parcel_summary(&self) -> ParcelSummary {
        let parcels = self.state.parcels();
        let by_status = ParcelStatus::ALL
            .iter()
            .map(|&status| {
                let (count, declared_value) = parcels
                    .with_status(status)
                    .fold((0, 0.0), |(n, sum), p| (n + 1, sum + p.declared_value()));
                StatusTotal {
                    status,
                    count,
                    declared_value,
                }
            })
            .collect();
        ParcelSummary {
            total: parcels.len(),
            by_status,
        }
    }
}

impl Projection for DashboardTables {
    type Ev = SimEvent;

    fn apply(&mut self, envelope: &EventEnvelope<SimEvent>) {
        self.state.apply(envelope.payload());
    }
}
