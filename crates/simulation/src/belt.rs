//! Belt progress as a pure function of elapsed time.
//!
//! Positions are never integrated frame by frame; they are recomputed from
//! the start time on demand, so the simulation rate and any consumer's render
//! rate are independent.

use std::collections::HashMap;

use parcelsim_core::{Timestamp, WaybillId};

/// `clamp((now - start) * speed / length, 0, 1)`.
///
/// Returns `None` when the inputs cannot produce a position (non-positive
/// speed or length, non-finite values); callers keep the last known position.
pub fn progress(start: Timestamp, speed: f64, length: f64, now: Timestamp) -> Option<f64> {
    if speed <= 0.0 || length <= 0.0 || !speed.is_finite() || !length.is_finite() {
        return None;
    }
    let elapsed = now.as_millis().saturating_sub(start.as_millis()) as f64;
    Some((elapsed * speed / length).clamp(0.0, 1.0))
}

/// Remembers the last computed position per parcel.
///
/// A parcel on a stalled segment (speed <= 0) stays where it was; a parcel
/// never moves backwards, even if `now` does.
#[derive(Debug, Clone)]
pub struct BeltTracker {
    length: f64,
    last: HashMap<WaybillId, f64>,
}

impl BeltTracker {
    pub fn new(length: f64) -> Self {
        Self {
            length,
            last: HashMap::new(),
        }
    }

    pub fn length(&self) -> f64 {
        self.length
    }

    /// Position of `parcel` in `[0, 1]`; `1.0` means it reached the end.
    pub fn advance(&mut self, parcel: &WaybillId, start: Timestamp, speed: f64, now: Timestamp) -> f64 {
        let previous = self.last.get(parcel).copied().unwrap_or(0.0);
        let position = match progress(start, speed, self.length, now) {
            Some(p) => p.max(previous),
            None => previous,
        };
        self.last.insert(parcel.clone(), position);
        position
    }

    /// Last computed position without recomputing.
    pub fn last(&self, parcel: &WaybillId) -> Option<f64> {
        self.last.get(parcel).copied()
    }

    pub fn forget(&mut self, parcel: &WaybillId) {
        self.last.remove(parcel);
    }

    pub fn clear(&mut self) {
        self.last.clear();
    }
}
