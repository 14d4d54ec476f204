//! Inbound snapshot collaborator.
//!
//! The CRUD side of the dashboard owns parcels; the simulation only reads the
//! initial set once at start-up (`{ parcels: [...], total }`).

use std::path::PathBuf;
use std::sync::OnceLock;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use parcelsim_core::{DomainError, Timestamp, WaybillId, WorkerId};

use crate::parcel::{Parcel, ParcelStatus, ProcessedBy};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SnapshotError {
    #[error("failed to read snapshot: {0}")]
    Io(String),

    #[error("failed to parse snapshot: {0}")]
    Parse(String),

    #[error("invalid parcel in snapshot: {0}")]
    Invalid(#[from] DomainError),
}

/// One parcel as reported by the CRUD API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParcelRecord {
    pub waybill_id: WaybillId,
    #[serde(default = "default_status")]
    pub status: ParcelStatus,
    pub created_at: Timestamp,
    #[serde(default)]
    pub unloaded_at: Option<Timestamp>,
    #[serde(default)]
    pub worker_processed_at: Option<Timestamp>,
    /// Worker code, or `"system"`.
    #[serde(default)]
    pub processed_by: Option<String>,
    #[serde(default)]
    pub declared_value: f64,
}

fn default_status() -> ParcelStatus {
    ParcelStatus::PendingUnload
}

impl ParcelRecord {
    pub fn pending(waybill_id: WaybillId, created_at: Timestamp, declared_value: f64) -> Self {
        Self {
            waybill_id,
            status: ParcelStatus::PendingUnload,
            created_at,
            unloaded_at: None,
            worker_processed_at: None,
            processed_by: None,
            declared_value,
        }
    }

    pub fn to_parcel(&self) -> Result<Parcel, DomainError> {
        let base = Parcel::pending(self.waybill_id.clone(), self.created_at, self.declared_value)?;
        if self.status == ParcelStatus::PendingUnload {
            return Ok(base);
        }
        let processed_by = match self.processed_by.as_deref() {
            None => None,
            Some("system") => Some(ProcessedBy::System),
            Some(code) => Some(ProcessedBy::Worker(WorkerId::new(code)?)),
        };
        Ok(Parcel::restore(
            base,
            self.status,
            self.unloaded_at,
            self.worker_processed_at,
            processed_by,
        ))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitialSnapshot {
    pub parcels: Vec<ParcelRecord>,
    pub total: u64,
}

impl InitialSnapshot {
    pub fn new(parcels: Vec<ParcelRecord>) -> Self {
        let total = parcels.len() as u64;
        Self { parcels, total }
    }

    pub fn from_json(json: &str) -> Result<Self, SnapshotError> {
        let snapshot: Self = serde_json::from_str(json).map_err(|e| SnapshotError::Parse(e.to_string()))?;
        if snapshot.total != snapshot.parcels.len() as u64 {
            warn!(
                total = snapshot.total,
                received = snapshot.parcels.len(),
                "snapshot total differs from parcels received; seeding what was received"
            );
        }
        Ok(snapshot)
    }

    /// Validated parcels in snapshot order.
    pub fn to_parcels(&self) -> Result<Vec<Parcel>, SnapshotError> {
        self.parcels
            .iter()
            .map(|r| r.to_parcel().map_err(SnapshotError::from))
            .collect()
    }

    /// Seeded demo data: `count` pending parcels created one second apart.
    pub fn synthetic(count: usize, seed: u64, start: Timestamp) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let parcels = (0..count)
            .filter_map(|i| {
                let id = WaybillId::new(format!("WB{:06}", i + 1)).ok()?;
                let value = f64::from(rng.gen_range(1_000u32..500_000));
                let created_at = start.plus_millis((i as u64).saturating_mul(1_000));
                Some(ParcelRecord::pending(id, created_at, value))
            })
            .collect();
        Self::new(parcels)
    }
}

/// Read-only source of the initial parcel set.
pub trait SnapshotSource: Send + Sync {
    fn fetch(&self) -> Result<InitialSnapshot, SnapshotError>;
}

/// Fixed snapshot (tests, synthetic demo data).
#[derive(Debug, Clone)]
pub struct StaticSnapshot(pub InitialSnapshot);

impl SnapshotSource for StaticSnapshot {
    fn fetch(&self) -> Result<InitialSnapshot, SnapshotError> {
        Ok(self.0.clone())
    }
}

/// Snapshot exported from the CRUD API as a JSON file.
#[derive(Debug, Clone)]
pub struct JsonFileSnapshot {
    path: PathBuf,
}

impl JsonFileSnapshot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SnapshotSource for JsonFileSnapshot {
    fn fetch(&self) -> Result<InitialSnapshot, SnapshotError> {
        let raw = std::fs::read_to_string(&self.path)
            .map_err(|e| SnapshotError::Io(format!("{}: {e}", self.path.display())))?;
        InitialSnapshot::from_json(&raw)
    }
}

/// One-shot fetch: the first successful result is reused for the rest of the
/// process. Failures are not cached.
#[derive(Debug)]
pub struct CachedSnapshot<S> {
    inner: S,
    cached: OnceLock<InitialSnapshot>,
}

impl<S> CachedSnapshot<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            cached: OnceLock::new(),
        }
    }
}

impl<S: SnapshotSource> SnapshotSource for CachedSnapshot<S> {
    fn fetch(&self) -> Result<InitialSnapshot, SnapshotError> {
        if let Some(hit) = self.cached.get() {
            debug!("serving cached snapshot");
            return Ok(hit.clone());
        }
        let fresh = self.inner.fetch()?;
        Ok(self.cached.get_or_init(|| fresh).clone())
    }
}
