//! Floor view for the animated 2D visualization.
//!
//! Only the status of parcels and workers comes from events. Belt positions
//! are computed when a frame is requested, from `unloaded_at` and the belt
//! speed, so the render rate never depends on the event rate.

use std::collections::VecDeque;

use serde::Serialize;
use tracing::debug;

use parcelsim_core::{Entity, Timestamp, WaybillId, WorkerId};
use parcelsim_events::{Category, EventEnvelope, Projection, SimEvent, WireEvent};
use parcelsim_simulation::{BeltTracker, Change, ParcelStatus, WarehouseState, WorkerStatus};

pub const DEFAULT_TICKER_CAPACITY: usize = 50;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParcelSprite {
    pub waybill_id: WaybillId,
    pub status: ParcelStatus,
    /// Belt position in `[0, 1]` while the parcel is on the belt.
    pub position: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerLamp {
    pub worker_id: WorkerId,
    pub status: WorkerStatus,
}

/// One line of the scrolling message ticker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TickerLine {
    pub at: Timestamp,
    pub category: Category,
    pub severity: Option<String>,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Frame {
    pub at: Timestamp,
    pub parcels: Vec<ParcelSprite>,
    pub workers: Vec<WorkerLamp>,
    pub ticker: Vec<TickerLine>,
}

#[derive(Debug, Clone)]
pub struct FloorView {
    state: WarehouseState,
    belt: BeltTracker,
    belt_speed: f64,
    ticker: VecDeque<TickerLine>,
    ticker_capacity: usize,
}

impl FloorView {
    pub fn new(state: WarehouseState, belt_length: f64, belt_speed: f64) -> Self {
        Self {
            state,
            belt: BeltTracker::new(belt_length),
            belt_speed,
            ticker: VecDeque::new(),
            ticker_capacity: DEFAULT_TICKER_CAPACITY,
        }
    }

    pub fn with_ticker_capacity(mut self, capacity: usize) -> Self {
        self.ticker_capacity = capacity.max(1);
        self
    }

    pub fn state(&self) -> &WarehouseState {
        &self.state
    }

    /// Change the belt speed from now on; a non-positive speed freezes every
    /// parcel at its last drawn position.
    pub fn set_belt_speed(&mut self, speed: f64) {
        self.belt_speed = speed;
    }

    pub fn recover_due(&mut self, now: Timestamp) {
        self.state.recover_due(now);
    }

    pub fn ticker(&self) -> impl Iterator<Item = &TickerLine> {
        self.ticker.iter()
    }

    /// Build the frame to draw at `now`.
    pub fn frame(&mut self, now: Timestamp) -> Frame {
        let mut parcels = Vec::with_capacity(self.state.parcels().len());
        for parcel in self.state.parcels().iter() {
            let position = match (parcel.status(), parcel.unloaded_at()) {
                (ParcelStatus::Unloaded, Some(start)) => {
                    Some(self.belt.advance(parcel.id(), start, self.belt_speed, now))
                }
                _ => None,
            };
            parcels.push(ParcelSprite {
                waybill_id: parcel.id().clone(),
                status: parcel.status(),
                position,
            });
        }
        let workers = self
            .state
            .workers()
            .iter()
            .map(|w| WorkerLamp {
                worker_id: w.id().clone(),
                status: w.status(),
            })
            .collect();
        Frame {
            at: now,
            parcels,
            workers,
            ticker: self.ticker.iter().cloned().collect(),
        }
    }

    fn push_ticker(&mut self, event: &SimEvent) {
        let wire = WireEvent::from(event.clone());
        let subject = wire.worker_id.as_deref().or(wire.waybill_id.as_deref());
        let text = match subject {
            Some(subject) => format!("{} ({subject})", wire.msg),
            None => wire.msg.clone(),
        };
        self.ticker.push_back(TickerLine {
            at: Timestamp::from_millis(wire.ts),
            category: wire.category,
            severity: wire.severity,
            text,
        });
        while self.ticker.len() > self.ticker_capacity {
            self.ticker.pop_front();
        }
    }
}

impl Projection for FloorView {
    type Ev = SimEvent;

    fn apply(&mut self, envelope: &EventEnvelope<SimEvent>) {
        let event = envelope.payload();
        let changes = self.state.apply(event);
        if changes.is_empty() {
            return;
        }
        if matches!(event, SimEvent::Reset { .. }) {
            self.belt.clear();
            self.ticker.clear();
        }
        for waybill_id in changes.iter().filter_map(|c| match c {
            Change::Parcel { waybill_id, to, .. } if to.is_terminal() => Some(waybill_id),
            _ => None,
        }) {
            self.belt.forget(waybill_id);
        }
        debug!(seq = envelope.sequence_number(), changes = changes.len(), "floor view updated");
        self.push_ticker(event);
    }
}
