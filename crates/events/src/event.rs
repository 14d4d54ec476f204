use serde::{Deserialize, Serialize};

use parcelsim_core::{Timestamp, WaybillId, WorkerId};

use crate::wire::{Category, WireEvent};

/// A domain-agnostic event.
///
/// Events are facts: immutable, self-describing, and safe to apply twice.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable event name/type identifier (e.g. "parcel.unloaded").
    fn event_type(&self) -> &'static str;

    /// Schema version for this event type.
    fn version(&self) -> u32;

    /// When the event occurred (simulation wall-clock time).
    fn occurred_at(&self) -> Timestamp;
}

/// How a worker finished with a parcel.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessOutcome {
    Normal,
    Accident,
}

/// Human operator attached to a processing event by the dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operator {
    pub id: i64,
    pub name: String,
}

/// Everything that can happen on the warehouse floor.
///
/// The JSON form of this enum is the [`WireEvent`] shape; the Korean display
/// strings live only in the wire module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "WireEvent", into = "WireEvent")]
pub enum SimEvent {
    /// Parcel handed off from the truck onto the belt.
    Unloaded { waybill_id: WaybillId, at: Timestamp },

    /// A worker finished a parcel.
    Processed {
        waybill_id: WaybillId,
        worker_id: WorkerId,
        outcome: ProcessOutcome,
        operator: Option<Operator>,
        at: Timestamp,
    },

    /// A worker broke down and stays out of service until `broken_until`.
    Broken {
        worker_id: WorkerId,
        broken_until: Timestamp,
        at: Timestamp,
    },

    /// A worker's cooldown after processing elapsed.
    CooldownEnded { worker_id: WorkerId, at: Timestamp },

    /// The recovery poll found a broken worker past its deadline.
    Recovered { worker_id: WorkerId, at: Timestamp },

    /// Operator reset the run: parcels return to their seeded state and a
    /// fresh worker pool is created.
    Reset { parcels: u32, at: Timestamp },
}

impl SimEvent {
    pub fn worker_id(&self) -> Option<&WorkerId> {
        match self {
            SimEvent::Processed { worker_id, .. }
            | SimEvent::Broken { worker_id, .. }
            | SimEvent::CooldownEnded { worker_id, .. }
            | SimEvent::Recovered { worker_id, .. } => Some(worker_id),
            SimEvent::Unloaded { .. } | SimEvent::Reset { .. } => None,
        }
    }

    pub fn waybill_id(&self) -> Option<&WaybillId> {
        match self {
            SimEvent::Unloaded { waybill_id, .. } | SimEvent::Processed { waybill_id, .. } => {
                Some(waybill_id)
            }
            _ => None,
        }
    }

    pub fn category(&self) -> Category {
        match self {
            SimEvent::Unloaded { .. } | SimEvent::CooldownEnded { .. } => Category::Process,
            SimEvent::Processed { outcome, .. } => match outcome {
                ProcessOutcome::Normal => Category::Process,
                ProcessOutcome::Accident => Category::Alarm,
            },
            SimEvent::Broken { .. } => Category::Alarm,
            SimEvent::Recovered { .. } | SimEvent::Reset { .. } => Category::System,
        }
    }
}

impl Event for SimEvent {
    fn event_type(&self) -> &'static str {
        match self {
            SimEvent::Unloaded { .. } => "parcel.unloaded",
            SimEvent::Processed { .. } => "parcel.processed",
            SimEvent::Broken { .. } => "worker.broken",
            SimEvent::CooldownEnded { .. } => "worker.cooldown_ended",
            SimEvent::Recovered { .. } => "worker.recovered",
            SimEvent::Reset { .. } => "simulation.reset",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> Timestamp {
        match self {
            SimEvent::Unloaded { at, .. }
            | SimEvent::Processed { at, .. }
            | SimEvent::Broken { at, .. }
            | SimEvent::CooldownEnded { at, .. }
            | SimEvent::Recovered { at, .. }
            | SimEvent::Reset { at, .. } => *at,
        }
    }
}
