//! Outbound persistence of status transitions.
//!
//! The CRUD side may want to store final parcel statuses and breakdowns. The
//! forwarder folds the stream like any other projection and hands those
//! transitions to a [`StatusSink`]. Forwarding is fire-and-forget: a sink
//! failure is logged and the stream moves on.

use std::sync::Mutex;

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use parcelsim_core::{Timestamp, WaybillId, WorkerId};
use parcelsim_events::{EventEnvelope, Projection, SimEvent};
use parcelsim_simulation::{Change, ParcelStatus, WarehouseState, WorkerStatus};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum StatusUpdate {
    #[serde(rename_all = "camelCase")]
    Parcel {
        waybill_id: WaybillId,
        status: ParcelStatus,
        processed_by: Option<String>,
        at: Timestamp,
    },
    #[serde(rename_all = "camelCase")]
    Worker {
        worker_id: WorkerId,
        status: WorkerStatus,
        broken_until: Option<Timestamp>,
        at: Timestamp,
    },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SinkError {
    #[error("sink unavailable: {0}")]
    Unavailable(String),

    #[error("update rejected: {0}")]
    Rejected(String),
}

pub trait StatusSink: Send + Sync {
    fn forward(&self, update: &StatusUpdate) -> Result<(), SinkError>;
}

/// Keeps every forwarded update (tests, local inspection).
#[derive(Debug, Default)]
pub struct InMemorySink {
    updates: Mutex<Vec<StatusUpdate>>,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn updates(&self) -> Vec<StatusUpdate> {
        self.updates.lock().map(|u| u.clone()).unwrap_or_default()
    }
}

impl StatusSink for InMemorySink {
    fn forward(&self, update: &StatusUpdate) -> Result<(), SinkError> {
        let mut updates = self
            .updates
            .lock()
            .map_err(|_| SinkError::Unavailable("in-memory sink poisoned".to_string()))?;
        updates.push(update.clone());
        Ok(())
    }
}

/// Writes each update as a structured log line.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingSink;

impl StatusSink for LoggingSink {
    fn forward(&self, update: &StatusUpdate) -> Result<(), SinkError> {
        let json = serde_json::to_string(update).map_err(|e| SinkError::Rejected(e.to_string()))?;
        info!(update = %json, "status transition");
        Ok(())
    }
}

impl<S: StatusSink + ?Sized> StatusSink for std::sync::Arc<S> {
    fn forward(&self, update: &StatusUpdate) -> Result<(), SinkError> {
        (**self).forward(update)
    }
}

#[derive(Debug)]
pub struct PersistenceForwarder<S> {
    state: WarehouseState,
    sink: S,
    failures: u64,
}

impl<S: StatusSink> PersistenceForwarder<S> {
    pub fn new(state: WarehouseState, sink: S) -> Self {
        Self {
            state,
            sink,
            failures: 0,
        }
    }

    pub fn state(&self) -> &WarehouseState {
        &self.state
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Updates the sink refused so far.
    pub fn failures(&self) -> u64 {
        self.failures
    }

    fn to_update(&self, change: &Change) -> Option<StatusUpdate> {
        match change {
            Change::Parcel { waybill_id, to, at, .. } if to.is_terminal() => Some(StatusUpdate::Parcel {
                waybill_id: waybill_id.clone(),
                status: *to,
                processed_by: self
                    .state
                    .parcels()
                    .get(waybill_id)
                    .and_then(|p| p.processed_by())
                    .map(ToString::to_string),
                at: *at,
            }),
            Change::Worker {
                worker_id,
                to: WorkerStatus::Broken,
                at,
                ..
            } => Some(StatusUpdate::Worker {
                worker_id: worker_id.clone(),
                status: WorkerStatus::Broken,
                broken_until: self.state.workers().get(worker_id).and_then(|w| w.broken_until()),
                at: *at,
            }),
            _ => None,
        }
    }
}

impl<S: StatusSink> Projection for PersistenceForwarder<S> {
    type Ev = SimEvent;

    fn apply(&mut self, envelope: &EventEnvelope<SimEvent>) {
        let changes = self.state.apply(envelope.payload());
        let updates: Vec<StatusUpdate> = changes.iter().filter_map(|c| self.to_update(c)).collect();
        for update in updates {
            if let Err(err) = self.sink.forward(&update) {
                self.failures += 1;
                warn!(seq = envelope.sequence_number(), error = %err, "status forward failed; dropped");
            }
        }
    }
}
