//! Warehouse state folded from the event stream.
//!
//! The simulation driver and every projection own one of these. They all
//! apply the same ordered events, so they end up with the same parcels and
//! workers without sharing memory.

use tracing::debug;

use parcelsim_core::{DomainError, DomainResult, Entity, Timestamp, WaybillId, WorkerId};
use parcelsim_events::{Event, ProcessOutcome, SimEvent};

use crate::parcel::{Parcel, ParcelBook, ParcelStatus};
use crate::snapshot::{InitialSnapshot, SnapshotError};
use crate::worker::{WorkerPool, WorkerStatus};

/// A visible state change produced by applying one event.
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    Parcel {
        waybill_id: WaybillId,
        from: ParcelStatus,
        to: ParcelStatus,
        at: Timestamp,
    },
    Worker {
        worker_id: WorkerId,
        from: WorkerStatus,
        to: WorkerStatus,
        at: Timestamp,
    },
    Reset {
        at: Timestamp,
    },
}

#[derive(Debug, Clone)]
pub struct WarehouseState {
    seed: Vec<Parcel>,
    roster: Vec<WorkerId>,
    parcels: ParcelBook,
    workers: WorkerPool,
}

impl WarehouseState {
    pub fn new(roster: &[WorkerId], parcels: Vec<Parcel>) -> Self {
        let workers = WorkerPool::new(roster);
        Self {
            roster: workers.roster(),
            parcels: ParcelBook::new(parcels.iter().cloned()),
            seed: parcels,
            workers,
        }
    }

    pub fn from_snapshot(roster: &[WorkerId], snapshot: &InitialSnapshot) -> Result<Self, SnapshotError> {
        Ok(Self::new(roster, snapshot.to_parcels()?))
    }

    pub fn parcels(&self) -> &ParcelBook {
        &self.parcels
    }

    pub fn workers(&self) -> &WorkerPool {
        &self.workers
    }

    pub fn roster(&self) -> &[WorkerId] {
        &self.roster
    }

    /// Fold one event. Events that do not apply (unknown ids, illegal or
    /// repeated transitions) leave the state untouched and yield no changes.
    pub fn apply(&mut self, event: &SimEvent) -> Vec<Change> {
        let result = match event {
            SimEvent::Unloaded { waybill_id, at } => self.unload(waybill_id, *at),
            SimEvent::Processed {
                waybill_id,
                worker_id,
                outcome,
                at,
                ..
            } => self.process(waybill_id, worker_id, *outcome, *at),
            SimEvent::Broken {
                worker_id,
                broken_until,
                at,
            } => self.break_down(worker_id, *broken_until, *at),
            SimEvent::CooldownEnded { worker_id, at } => self.end_cooldown(worker_id, *at),
            SimEvent::Recovered { worker_id, at } => self.recover(worker_id, *at),
            SimEvent::Reset { at, .. } => Ok(self.reset(*at)),
        };

        match result {
            Ok(changes) => changes,
            Err(err) => {
                debug!(event = event.event_type(), error = %err, "event not applied");
                Vec::new()
            }
        }
    }

    /// Recover every broken worker whose deadline has passed.
    pub fn recover_due(&mut self, now: Timestamp) -> Vec<Change> {
        self.workers
            .iter_mut()
            .filter_map(|w| {
                w.recover_if_due(now).then(|| Change::Worker {
                    worker_id: w.id().clone(),
                    from: WorkerStatus::Broken,
                    to: WorkerStatus::Idle,
                    at: now,
                })
            })
            .collect()
    }

    fn unload(&mut self, waybill_id: &WaybillId, at: Timestamp) -> DomainResult<Vec<Change>> {
        let parcel = self
            .parcels
            .get_mut(waybill_id)
            .ok_or_else(|| DomainError::unknown("parcel", waybill_id.as_str()))?;
        let from = parcel.status();
        parcel.mark_unloaded(at)?;
        Ok(vec![Change::Parcel {
            waybill_id: waybill_id.clone(),
            from,
            to: parcel.status(),
            at,
        }])
    }

    fn process(
        &mut self,
        waybill_id: &WaybillId,
        worker_id: &WorkerId,
        outcome: ProcessOutcome,
        at: Timestamp,
    ) -> DomainResult<Vec<Change>> {
        // Both sides are checked before either is touched, so a rejected
        // event never half-applies.
        let worker = self
            .workers
            .get(worker_id)
            .ok_or_else(|| DomainError::unknown("worker", worker_id.as_str()))?;
        if !worker.can_process() {
            return Err(DomainError::illegal(
                "worker",
                worker.status().as_str(),
                WorkerStatus::Working.as_str(),
            ));
        }
        let worker_from = worker.status();

        let parcel = self
            .parcels
            .get_mut(waybill_id)
            .ok_or_else(|| DomainError::unknown("parcel", waybill_id.as_str()))?;
        let parcel_from = parcel.status();
        parcel.mark_processed(worker_id, outcome, at)?;
        let parcel_to = parcel.status();

        let mut changes = vec![Change::Parcel {
            waybill_id: waybill_id.clone(),
            from: parcel_from,
            to: parcel_to,
            at,
        }];
        if let Some(worker) = self.workers.get_mut(worker_id) {
            worker.record_processed(outcome, at)?;
            if worker_from != worker.status() {
                changes.push(Change::Worker {
                    worker_id: worker_id.clone(),
                    from: worker_from,
                    to: worker.status(),
                    at,
                });
            }
        }
        Ok(changes)
    }

    fn break_down(&mut self, worker_id: &WorkerId, until: Timestamp, at: Timestamp) -> DomainResult<Vec<Change>> {
        let worker = self
            .workers
            .get_mut(worker_id)
            .ok_or_else(|| DomainError::unknown("worker", worker_id.as_str()))?;
        let from = worker.status();
        worker.break_down(until, at)?;
        let mut changes = vec![Change::Worker {
            worker_id: worker_id.clone(),
            from,
            to: WorkerStatus::Broken,
            at,
        }];

        // The damaged parcel is the oldest one on the floor, whoever broke.
        if let Some(victim) = self.parcels.oldest_unloaded().cloned() {
            if let Some(parcel) = self.parcels.get_mut(&victim) {
                parcel.mark_accident(at)?;
                changes.push(Change::Parcel {
                    waybill_id: victim,
                    from: ParcelStatus::Unloaded,
                    to: ParcelStatus::Accident,
                    at,
                });
            }
        }
        Ok(changes)
    }

    fn end_cooldown(&mut self, worker_id: &WorkerId, at: Timestamp) -> DomainResult<Vec<Change>> {
        let worker = self
            .workers
            .get_mut(worker_id)
            .ok_or_else(|| DomainError::unknown("worker", worker_id.as_str()))?;
        worker.end_cooldown(at)?;
        Ok(vec![Change::Worker {
            worker_id: worker_id.clone(),
            from: WorkerStatus::Working,
            to: WorkerStatus::Idle,
            at,
        }])
    }

    fn recover(&mut self, worker_id: &WorkerId, at: Timestamp) -> DomainResult<Vec<Change>> {
        let worker = self
            .workers
            .get_mut(worker_id)
            .ok_or_else(|| DomainError::unknown("worker", worker_id.as_str()))?;
        if !worker.force_recover() {
            return Ok(Vec::new());
        }
        Ok(vec![Change::Worker {
            worker_id: worker_id.clone(),
            from: WorkerStatus::Broken,
            to: WorkerStatus::Idle,
            at,
        }])
    }

    /// Parcels back to their seeded state, fresh worker pool.
    fn reset(&mut self, at: Timestamp) -> Vec<Change> {
        self.parcels = ParcelBook::new(self.seed.iter().cloned());
        self.workers = WorkerPool::new(&self.roster);
        vec![Change::Reset { at }]
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use parcelsim_events::Operator;

    use super::*;

    fn w(id: &str) -> WaybillId {
        WaybillId::new(id).unwrap()
    }

    fn worker(id: &str) -> WorkerId {
        WorkerId::new(id).unwrap()
    }

    fn ts(ms: i64) -> Timestamp {
        Timestamp::from_millis(ms)
    }

    fn state(parcels: &[&str]) -> WarehouseState {
        let seed = parcels
            .iter()
            .map(|id| Parcel::pending(w(id), Timestamp::EPOCH, 100.0).unwrap())
            .collect();
        WarehouseState::new(&WorkerId::roster("AB", 2), seed)
    }

    fn unloaded(id: &str, at: i64) -> SimEvent {
        SimEvent::Unloaded {
            waybill_id: w(id),
            at: ts(at),
        }
    }

    fn processed(id: &str, by: &str, at: i64) -> SimEvent {
        SimEvent::Processed {
            waybill_id: w(id),
            worker_id: worker(by),
            outcome: ProcessOutcome::Normal,
            operator: Some(Operator {
                id: 1,
                name: "kim".into(),
            }),
            at: ts(at),
        }
    }

    fn broken(by: &str, at: i64) -> SimEvent {
        SimEvent::Broken {
            worker_id: worker(by),
            broken_until: ts(at + 10_000),
            at: ts(at),
        }
    }

    #[test]
    fn end_to_end_floor_sequence() {
        let mut s = state(&["W1"]);

        s.apply(&unloaded("W1", 100));
        assert_eq!(s.parcels().get(&w("W1")).unwrap().status(), ParcelStatus::Unloaded);

        s.apply(&processed("W1", "A1", 200));
        assert_eq!(s.parcels().get(&w("W1")).unwrap().status(), ParcelStatus::Normal);
        assert_eq!(s.workers().get(&worker("A1")).unwrap().processed_count(), 1);

        let changes = s.apply(&broken("A2", 300));
        assert_eq!(changes.len(), 1);
        assert_eq!(s.parcels().count(ParcelStatus::Accident), 0);
        assert_eq!(s.workers().get(&worker("A2")).unwrap().status(), WorkerStatus::Broken);
    }

    #[test]
    fn breakdown_damages_oldest_unloaded_parcel() {
        let mut s = state(&["U2", "U1"]);
        s.apply(&unloaded("U1", 100));
        s.apply(&unloaded("U2", 200));

        // B2 broke, but the victim is picked by unload time alone.
        s.apply(&broken("B2", 300));

        let u1 = s.parcels().get(&w("U1")).unwrap();
        assert_eq!(u1.status(), ParcelStatus::Accident);
        assert_eq!(u1.processed_by().map(ToString::to_string).as_deref(), Some("system"));
        assert_eq!(s.parcels().get(&w("U2")).unwrap().status(), ParcelStatus::Unloaded);
    }

    #[test]
    fn duplicate_processed_event_is_a_no_op() {
        let mut s = state(&["W1"]);
        s.apply(&unloaded("W1", 100));
        s.apply(&processed("W1", "A1", 200));
        let once_parcels = s.parcels().clone();
        let once_workers = s.workers().clone();

        assert!(s.apply(&processed("W1", "A1", 200)).is_empty());
        assert_eq!(s.parcels(), &once_parcels);
        assert_eq!(s.workers(), &once_workers);
    }

    #[test]
    fn broken_worker_cannot_process() {
        let mut s = state(&["W1"]);
        s.apply(&unloaded("W1", 100));
        s.apply(&broken("A1", 150));
        // W1 was the oldest unloaded parcel, so it is already an accident.
        assert!(s.apply(&processed("W1", "A1", 200)).is_empty());

        let mut s = state(&["W1", "W2"]);
        s.apply(&broken("A1", 50));
        s.apply(&unloaded("W2", 100));
        assert!(s.apply(&processed("W2", "A1", 200)).is_empty());
        assert_eq!(s.parcels().get(&w("W2")).unwrap().status(), ParcelStatus::Unloaded);
        assert_eq!(s.workers().get(&worker("A1")).unwrap().processed_count(), 0);
    }

    #[test]
    fn unknown_ids_are_dropped() {
        let mut s = state(&["W1"]);
        assert!(s.apply(&unloaded("NOPE", 1)).is_empty());
        assert!(s.apply(&processed("W1", "Z9", 2)).is_empty());
        assert!(s.apply(&broken("Z9", 3)).is_empty());
        assert_eq!(s.parcels().get(&w("W1")).unwrap().status(), ParcelStatus::PendingUnload);
    }

    #[test]
    fn recovery_event_and_poll_converge() {
        let mut a = state(&[]);
        let mut b = state(&[]);
        a.apply(&broken("A1", 0));
        b.apply(&broken("A1", 0));

        assert!(b.recover_due(ts(9_999)).is_empty());
        a.apply(&SimEvent::Recovered {
            worker_id: worker("A1"),
            at: ts(10_000),
        });
        assert_eq!(b.recover_due(ts(10_050)).len(), 1);

        assert_eq!(a.workers(), b.workers());
        assert_eq!(a.workers().get(&worker("A1")).unwrap().broken_until(), None);
    }

    #[test]
    fn reset_restores_seeded_parcels_and_fresh_pool() {
        let mut s = state(&["W1"]);
        s.apply(&unloaded("W1", 100));
        s.apply(&processed("W1", "A1", 200));

        s.apply(&SimEvent::Reset { parcels: 1, at: ts(500) });
        assert_eq!(s.parcels().get(&w("W1")).unwrap().status(), ParcelStatus::PendingUnload);
        assert_eq!(s.workers().get(&worker("A1")).unwrap().processed_count(), 0);
        assert_eq!(s.workers().len(), 4);
    }

    fn any_event() -> impl Strategy<Value = SimEvent> {
        let parcel = prop::sample::select(vec!["P1", "P2", "P3"]);
        let who = prop::sample::select(vec!["A1", "A2", "B1"]);
        prop_oneof![
            (parcel.clone(), 0i64..1_000).prop_map(|(p, t)| unloaded(p, t)),
            (parcel, who.clone(), 0i64..1_000).prop_map(|(p, by, t)| processed(p, by, t)),
            (who.clone(), 0i64..1_000).prop_map(|(by, t)| broken(by, t)),
            (who.clone(), 0i64..1_000).prop_map(|(by, t)| SimEvent::CooldownEnded {
                worker_id: worker(by),
                at: ts(t),
            }),
            (who, 0i64..1_000).prop_map(|(by, t)| SimEvent::Recovered {
                worker_id: worker(by),
                at: ts(t),
            }),
        ]
    }

    proptest! {
        #[test]
        fn folded_state_keeps_invariants(events in prop::collection::vec(any_event(), 0..60)) {
            let mut s = state(&["P1", "P2", "P3"]);
            let mut ranks: Vec<u8> = s.parcels().iter().map(|p| p.status().rank()).collect();
            for event in &events {
                s.apply(event);

                let now: Vec<u8> = s.parcels().iter().map(|p| p.status().rank()).collect();
                for (before, after) in ranks.iter().zip(&now) {
                    prop_assert!(after >= before);
                }
                ranks = now;

                for w in s.workers().iter() {
                    prop_assert_eq!(w.status() == WorkerStatus::Broken, w.broken_until().is_some());
                }
            }
        }

        #[test]
        fn reapplying_any_event_twice_equals_once(events in prop::collection::vec(any_event(), 0..30)) {
            let mut once = state(&["P1", "P2", "P3"]);
            let mut twice = state(&["P1", "P2", "P3"]);
            for event in &events {
                once.apply(event);
                twice.apply(event);
                if matches!(event, SimEvent::Processed { .. } | SimEvent::Unloaded { .. }) {
                    twice.apply(event);
                }
            }
            prop_assert_eq!(once.parcels(), twice.parcels());
            prop_assert_eq!(once.workers(), twice.workers());
        }
    }
}
