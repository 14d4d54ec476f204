//! Parcel lifecycle: `PENDING_UNLOAD → UNLOADED → {NORMAL, ACCIDENT}`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use parcelsim_core::{DomainError, DomainResult, Entity, Timestamp, WaybillId, WorkerId};
use parcelsim_events::ProcessOutcome;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ParcelStatus {
    PendingUnload,
    Unloaded,
    Normal,
    Accident,
}

impl ParcelStatus {
    pub const ALL: [ParcelStatus; 4] = [
        ParcelStatus::PendingUnload,
        ParcelStatus::Unloaded,
        ParcelStatus::Normal,
        ParcelStatus::Accident,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ParcelStatus::PendingUnload => "PENDING_UNLOAD",
            ParcelStatus::Unloaded => "UNLOADED",
            ParcelStatus::Normal => "NORMAL",
            ParcelStatus::Accident => "ACCIDENT",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ParcelStatus::Normal | ParcelStatus::Accident)
    }

    /// Position along the lifecycle; terminal states share the last rank.
    pub fn rank(self) -> u8 {
        match self {
            ParcelStatus::PendingUnload => 0,
            ParcelStatus::Unloaded => 1,
            ParcelStatus::Normal | ParcelStatus::Accident => 2,
        }
    }

    pub fn can_become(self, next: ParcelStatus) -> bool {
        matches!(
            (self, next),
            (ParcelStatus::PendingUnload, ParcelStatus::Unloaded)
                | (ParcelStatus::Unloaded, ParcelStatus::Normal)
                | (ParcelStatus::Unloaded, ParcelStatus::Accident)
        )
    }
}

impl core::fmt::Display for ParcelStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who closed out a parcel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessedBy {
    Worker(WorkerId),
    /// Closed by the accident policy rather than by a worker.
    System,
}

impl core::fmt::Display for ProcessedBy {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ProcessedBy::Worker(id) => write!(f, "{id}"),
            ProcessedBy::System => f.write_str("system"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Parcel {
    waybill_id: WaybillId,
    status: ParcelStatus,
    created_at: Timestamp,
    unloaded_at: Option<Timestamp>,
    worker_processed_at: Option<Timestamp>,
    processed_by: Option<ProcessedBy>,
    declared_value: f64,
}

impl Parcel {
    /// A parcel waiting on the truck.
    pub fn pending(waybill_id: WaybillId, created_at: Timestamp, declared_value: f64) -> DomainResult<Self> {
        if !declared_value.is_finite() || declared_value < 0.0 {
            return Err(DomainError::validation(format!(
                "declared value of {waybill_id} must be a non-negative number"
            )));
        }
        Ok(Self {
            waybill_id,
            status: ParcelStatus::PendingUnload,
            created_at,
            unloaded_at: None,
            worker_processed_at: None,
            processed_by: None,
            declared_value,
        })
    }

    /// Rebuild a parcel exactly as the snapshot collaborator reported it.
    pub(crate) fn restore(
        mut base: Parcel,
        status: ParcelStatus,
        unloaded_at: Option<Timestamp>,
        worker_processed_at: Option<Timestamp>,
        processed_by: Option<ProcessedBy>,
    ) -> Parcel {
        base.status = status;
        if status.rank() >= ParcelStatus::Unloaded.rank() {
            base.unloaded_at = unloaded_at.or(Some(base.created_at));
        }
        if status.is_terminal() {
            base.worker_processed_at = worker_processed_at;
            base.processed_by = processed_by;
        }
        base
    }

    pub fn waybill_id(&self) -> &WaybillId {
        &self.waybill_id
    }

    pub fn status(&self) -> ParcelStatus {
        self.status
    }

    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    pub fn unloaded_at(&self) -> Option<Timestamp> {
        self.unloaded_at
    }

    pub fn worker_processed_at(&self) -> Option<Timestamp> {
        self.worker_processed_at
    }

    pub fn processed_by(&self) -> Option<&ProcessedBy> {
        self.processed_by.as_ref()
    }

    pub fn declared_value(&self) -> f64 {
        self.declared_value
    }

    fn transition(&mut self, next: ParcelStatus) -> DomainResult<()> {
        if !self.status.can_become(next) {
            return Err(DomainError::illegal("parcel", self.status.as_str(), next.as_str()));
        }
        self.status = next;
        Ok(())
    }

    /// Truck-to-belt handoff.
    pub fn mark_unloaded(&mut self, at: Timestamp) -> DomainResult<()> {
        self.transition(ParcelStatus::Unloaded)?;
        self.unloaded_at = Some(at);
        Ok(())
    }

    /// A worker finished this parcel.
    pub fn mark_processed(&mut self, worker: &WorkerId, outcome: ProcessOutcome, at: Timestamp) -> DomainResult<()> {
        let next = match outcome {
            ProcessOutcome::Normal => ParcelStatus::Normal,
            ProcessOutcome::Accident => ParcelStatus::Accident,
        };
        self.transition(next)?;
        self.worker_processed_at = Some(at);
        self.processed_by = Some(ProcessedBy::Worker(worker.clone()));
        Ok(())
    }

    /// Damaged on the floor when a worker broke down.
    pub fn mark_accident(&mut self, at: Timestamp) -> DomainResult<()> {
        self.transition(ParcelStatus::Accident)?;
        self.worker_processed_at = Some(at);
        self.processed_by = Some(ProcessedBy::System);
        Ok(())
    }
}

impl Entity for Parcel {
    type Id = WaybillId;

    fn id(&self) -> &Self::Id {
        &self.waybill_id
    }
}

/// All parcels of a run, kept in seeding order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParcelBook {
    parcels: Vec<Parcel>,
    index: HashMap<WaybillId, usize>,
}

impl ParcelBook {
    /// Build a book; a duplicated waybill keeps its first occurrence.
    pub fn new(parcels: impl IntoIterator<Item = Parcel>) -> Self {
        let mut book = Self::default();
        for parcel in parcels {
            if book.index.contains_key(parcel.id()) {
                tracing::warn!(waybill_id = %parcel.id(), "duplicate waybill in snapshot; keeping first");
                continue;
            }
            book.index.insert(parcel.id().clone(), book.parcels.len());
            book.parcels.push(parcel);
        }
        book
    }

    pub fn len(&self) -> usize {
        self.parcels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parcels.is_empty()
    }

    pub fn get(&self, id: &WaybillId) -> Option<&Parcel> {
        self.index.get(id).map(|&i| &self.parcels[i])
    }

    pub fn get_mut(&mut self, id: &WaybillId) -> Option<&mut Parcel> {
        match self.index.get(id) {
            Some(&i) => self.parcels.get_mut(i),
            None => None,
        }
    }

    /// Parcels in seeding order.
    pub fn iter(&self) -> impl Iterator<Item = &Parcel> {
        self.parcels.iter()
    }

    pub fn with_status(&self, status: ParcelStatus) -> impl Iterator<Item = &Parcel> {
        self.parcels.iter().filter(move |p| p.status == status)
    }

    pub fn count(&self, status: ParcelStatus) -> usize {
        self.with_status(status).count()
    }

    /// Accident policy: the single UNLOADED parcel with the earliest
    /// `unloaded_at` (seeding order breaks ties), regardless of which worker
    /// broke down.
    pub fn oldest_unloaded(&self) -> Option<&WaybillId> {
        self.parcels
            .iter()
            .enumerate()
            .filter(|(_, p)| p.status == ParcelStatus::Unloaded)
            .min_by_key(|(i, p)| (p.unloaded_at.unwrap_or(p.created_at), *i))
            .map(|(_, p)| p.id())
    }
}
