//! The simulation driver.
//!
//! On every tick the driver looks at its own [`WarehouseState`], decides what
//! happens next on the floor, and publishes each decision as an enveloped
//! [`SimEvent`]. It applies its own events through the same fold as every
//! other consumer, so it never holds a private view of the warehouse.
//!
//! Work within a tick runs in a fixed order:
//! 1. due timers (cooldowns, recovery poll)
//! 2. truck unloading, staggered by `unload_interval_ms`
//! 3. belt arrivals
//! 4. assignment of arrived parcels to idle workers
//! 5. random breakage of working workers

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;
use tracing::{debug, info, warn};

use parcelsim_core::{Clock, Entity, Timestamp, WaybillId, WorkerId};
use parcelsim_events::{ChannelName, Event, EventBus, EventEnvelope, ProcessOutcome, SimEvent};

use crate::belt::BeltTracker;
use crate::clock::{SimulationClock, Tick};
use crate::config::{ConfigError, SimulationConfig};
use crate::parcel::ParcelStatus;
use crate::snapshot::{InitialSnapshot, SnapshotError};
use crate::state::WarehouseState;
use crate::timers::{TimerHandle, TimerQueue};
use crate::worker::WorkerStatus;

#[derive(Debug, Error)]
pub enum SimulationError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum TimerTask {
    Cooldown(WorkerId),
    RecoveryPoll,
}

/// Everything one tick decided.
#[derive(Debug, Clone)]
pub struct TickReport {
    pub tick: Tick,
    pub events: Vec<SimEvent>,
}

pub struct Simulation<B> {
    config: SimulationConfig,
    bus: B,
    channel: ChannelName,
    next_seq: u64,
    state: WarehouseState,
    clock: SimulationClock,
    rng: StdRng,
    processing_ms: HashMap<WorkerId, u64>,
    truck: BeltTracker,
    belt: BeltTracker,
    started_at: Timestamp,
    unload_order: Vec<WaybillId>,
    waiting: VecDeque<WaybillId>,
    timers: TimerQueue<TimerTask>,
    cooldowns: HashMap<WorkerId, TimerHandle>,
    recovery_poll: Option<TimerHandle>,
}

impl<B> Simulation<B>
where
    B: EventBus<EventEnvelope<SimEvent>>,
{
    pub fn new(
        config: SimulationConfig,
        bus: B,
        clock: Arc<dyn Clock>,
        snapshot: &InitialSnapshot,
    ) -> Result<Self, SimulationError> {
        config.validate()?;
        let roster = config.roster();
        let state = WarehouseState::from_snapshot(&roster, snapshot)?;

        let mut rng = StdRng::seed_from_u64(config.seed);
        let processing_ms = roster
            .iter()
            .map(|id| {
                let ms = rng.gen_range(config.min_processing_ms..=config.max_processing_ms);
                (id.clone(), ms)
            })
            .collect();

        let clock = SimulationClock::new(clock);
        let started_at = clock.last_observed();

        let mut sim = Self {
            channel: ChannelName::new(config.channel.clone()),
            truck: BeltTracker::new(config.truck_length),
            belt: BeltTracker::new(config.belt_length),
            config,
            bus,
            next_seq: 1,
            state,
            clock,
            rng,
            processing_ms,
            started_at,
            unload_order: Vec::new(),
            waiting: VecDeque::new(),
            timers: TimerQueue::new(),
            cooldowns: HashMap::new(),
            recovery_poll: None,
        };
        sim.arm(started_at);

        info!(
            channel = %sim.channel,
            workers = sim.state.workers().len(),
            parcels = sim.state.parcels().len(),
            seed = sim.config.seed,
            "simulation ready"
        );
        Ok(sim)
    }

    pub fn state(&self) -> &WarehouseState {
        &self.state
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn channel(&self) -> &ChannelName {
        &self.channel
    }

    /// Cooldown length assigned to `worker` from the seeded RNG.
    pub fn processing_ms(&self, worker: &WorkerId) -> Option<u64> {
        self.processing_ms.get(worker).copied()
    }

    /// Parcels that reached the end of the belt and wait for a free worker.
    pub fn waiting(&self) -> impl Iterator<Item = &WaybillId> {
        self.waiting.iter()
    }

    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    /// Restart staggering from `start` and schedule the recovery poll.
    fn arm(&mut self, start: Timestamp) {
        self.started_at = start;
        self.unload_order = self
            .state
            .parcels()
            .with_status(ParcelStatus::PendingUnload)
            .map(|p| p.id().clone())
            .collect();
        let first = start.plus_millis(self.config.recovery_poll_ms);
        self.recovery_poll = Some(
            self.timers
                .schedule_every(first, self.config.recovery_poll_ms, TimerTask::RecoveryPoll),
        );
    }

    pub fn tick(&mut self) -> TickReport {
        let tick = self.clock.next_tick();
        let now = tick.now;
        let mut events = Vec::new();

        self.fire_timers(now, &mut events);
        self.unload(now, &mut events);
        self.collect_arrivals(now);
        self.assign(now, &mut events);
        self.break_workers(now, &mut events);

        if !events.is_empty() {
            debug!(tick = tick.seq, %now, events = events.len(), "tick");
        }
        TickReport { tick, events }
    }

    fn fire_timers(&mut self, now: Timestamp, events: &mut Vec<SimEvent>) {
        for fired in self.timers.pop_due(now) {
            match fired.task {
                TimerTask::Cooldown(worker_id) => {
                    self.cooldowns.remove(&worker_id);
                    self.emit(
                        SimEvent::CooldownEnded {
                            worker_id,
                            at: fired.deadline,
                        },
                        events,
                    );
                }
                TimerTask::RecoveryPoll => {
                    let due: Vec<WorkerId> = self
                        .state
                        .workers()
                        .iter()
                        .filter(|w| w.broken_until().is_some_and(|until| now >= until))
                        .map(|w| w.id().clone())
                        .collect();
                    for worker_id in due {
                        self.emit(SimEvent::Recovered { worker_id, at: now }, events);
                    }
                }
            }
        }
    }

    fn unload(&mut self, now: Timestamp, events: &mut Vec<SimEvent>) {
        let mut arrived = Vec::new();
        for (i, id) in self.unload_order.iter().enumerate() {
            let still_pending = self
                .state
                .parcels()
                .get(id)
                .is_some_and(|p| p.status() == ParcelStatus::PendingUnload);
            if !still_pending {
                continue;
            }
            let start = self
                .started_at
                .plus_millis((i as u64).saturating_mul(self.config.unload_interval_ms));
            if self.truck.advance(id, start, self.config.truck_speed, now) >= 1.0 {
                arrived.push(id.clone());
            }
        }
        for waybill_id in arrived {
            self.truck.forget(&waybill_id);
            self.emit(SimEvent::Unloaded { waybill_id, at: now }, events);
        }
    }

    fn collect_arrivals(&mut self, now: Timestamp) {
        let on_belt: Vec<(WaybillId, Timestamp)> = self
            .state
            .parcels()
            .with_status(ParcelStatus::Unloaded)
            .filter(|p| !self.waiting.contains(p.id()))
            .map(|p| (p.id().clone(), p.unloaded_at().unwrap_or(p.created_at())))
            .collect();
        for (id, start) in on_belt {
            if self.belt.advance(&id, start, self.config.belt_speed, now) >= 1.0 {
                debug!(waybill_id = %id, "parcel reached the end of the belt");
                self.waiting.push_back(id);
            }
        }
    }

    /// The idle worker on the line with the fewest busy workers; roster order
    /// breaks ties.
    fn pick_worker(&self) -> Option<WorkerId> {
        let workers = self.state.workers();
        let busy_on = |line: Option<char>| {
            workers
                .iter()
                .filter(|w| w.status() == WorkerStatus::Working && w.id().line() == line)
                .count()
        };
        workers
            .iter()
            .enumerate()
            .filter(|(_, w)| w.status() == WorkerStatus::Idle)
            .min_by_key(|(i, w)| (busy_on(w.id().line()), *i))
            .map(|(_, w)| w.id().clone())
    }

    fn assign(&mut self, now: Timestamp, events: &mut Vec<SimEvent>) {
        while let Some(waybill_id) = self.waiting.front().cloned() {
            let unloaded = self
                .state
                .parcels()
                .get(&waybill_id)
                .is_some_and(|p| p.status() == ParcelStatus::Unloaded);
            if !unloaded {
                // Damaged while waiting.
                self.waiting.pop_front();
                self.belt.forget(&waybill_id);
                continue;
            }
            let Some(worker_id) = self.pick_worker() else {
                break;
            };
            self.waiting.pop_front();
            self.belt.forget(&waybill_id);

            let outcome = if self.rng.gen_bool(self.config.accident_probability) {
                ProcessOutcome::Accident
            } else {
                ProcessOutcome::Normal
            };
            let applied = self.emit(
                SimEvent::Processed {
                    waybill_id,
                    worker_id: worker_id.clone(),
                    outcome,
                    operator: None,
                    at: now,
                },
                events,
            );
            if applied {
                let cooldown = self.processing_ms(&worker_id).unwrap_or(self.config.min_processing_ms);
                let handle = self
                    .timers
                    .schedule_at(now.plus_millis(cooldown), TimerTask::Cooldown(worker_id.clone()));
                self.cooldowns.insert(worker_id, handle);
            }
        }
    }

    fn break_workers(&mut self, now: Timestamp, events: &mut Vec<SimEvent>) {
        if self.config.break_probability <= 0.0 {
            return;
        }
        let working: Vec<WorkerId> = self
            .state
            .workers()
            .iter()
            .filter(|w| w.status() == WorkerStatus::Working)
            .map(|w| w.id().clone())
            .collect();
        for worker_id in working {
            if !self.rng.gen_bool(self.config.break_probability) {
                continue;
            }
            if let Some(handle) = self.cooldowns.remove(&worker_id) {
                self.timers.cancel(handle);
            }
            warn!(worker_id = %worker_id, "worker broke down");
            self.emit(
                SimEvent::Broken {
                    worker_id,
                    broken_until: now.plus_millis(self.config.recovery_ms),
                    at: now,
                },
                events,
            );
        }
    }

    /// Apply to our own state, then broadcast. Returns whether the event
    /// changed anything.
    fn emit(&mut self, event: SimEvent, events: &mut Vec<SimEvent>) -> bool {
        if self.state.apply(&event).is_empty() {
            debug!(event = event.event_type(), "decision did not apply; not publishing");
            return false;
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        let envelope = EventEnvelope::new(self.channel.clone(), seq, event.clone());
        if let Err(err) = self.bus.publish(&self.channel, envelope) {
            warn!(channel = %self.channel, seq, error = ?err, "publish failed");
        }
        events.push(event);
        true
    }

    /// Operator reset: every consumer returns parcels to their seeded state
    /// and rebuilds a fresh worker pool.
    pub fn reset(&mut self, now: Timestamp) -> TickReport {
        self.timers.cancel_all();
        self.cooldowns.clear();
        self.recovery_poll = None;
        self.waiting.clear();
        self.truck.clear();
        self.belt.clear();

        let mut events = Vec::new();
        let parcels = u32::try_from(self.state.parcels().len()).unwrap_or(u32::MAX);
        self.emit(SimEvent::Reset { parcels, at: now }, &mut events);
        self.arm(now);
        info!(channel = %self.channel, %now, "simulation reset");

        TickReport {
            tick: Tick { seq: 0, now },
            events,
        }
    }

    /// Cancel every pending timer. Ticking afterwards still moves parcels but
    /// no cooldown or recovery fires.
    pub fn shutdown(&mut self) {
        self.timers.cancel_all();
        self.recovery_poll = None;
        self.cooldowns.clear();
    }
}

impl<B> core::fmt::Debug for Simulation<B> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Simulation")
            .field("channel", &self.channel)
            .field("next_seq", &self.next_seq)
            .field("clock", &self.clock)
            .field("waiting", &self.waiting.len())
            .field("timers", &self.timers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use parcelsim_core::ManualClock;
    use parcelsim_events::InMemoryEventBus;

    use super::*;

    type Bus = Arc<InMemoryEventBus<EventEnvelope<SimEvent>>>;

    fn config() -> SimulationConfig {
        SimulationConfig {
            lines: "A".into(),
            workers_per_line: 1,
            truck_length: 500.0,
            truck_speed: 0.5,
            belt_length: 500.0,
            belt_speed: 0.5,
            unload_interval_ms: 1_000,
            min_processing_ms: 1_000,
            max_processing_ms: 1_000,
            break_probability: 0.0,
            accident_probability: 0.0,
            recovery_ms: 500,
            recovery_poll_ms: 100,
            ..SimulationConfig::default()
        }
    }

    fn setup(cfg: SimulationConfig, parcels: usize) -> (Simulation<Bus>, Arc<ManualClock>, Arc<Mutex<Vec<u64>>>) {
        let clock = Arc::new(ManualClock::new(Timestamp::EPOCH));
        let bus: Bus = Arc::new(InMemoryEventBus::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _sub = bus.subscribe(
            &ChannelName::new(cfg.channel.clone()),
            Arc::new(move |env: &EventEnvelope<SimEvent>| -> anyhow::Result<()> {
                sink.lock().unwrap().push(env.sequence_number());
                Ok(())
            }),
        );
        let snapshot = InitialSnapshot::synthetic(parcels, 1, Timestamp::EPOCH);
        let sim = Simulation::new(cfg, bus, clock.clone(), &snapshot).unwrap();
        (sim, clock, seen)
    }

    fn names(report: &TickReport) -> Vec<&'static str> {
        report.events.iter().map(|e| e.event_type()).collect()
    }

    #[test]
    fn parcels_flow_truck_belt_worker_cooldown() {
        let (mut sim, clock, seen) = setup(config(), 2);

        assert!(sim.tick().events.is_empty());

        clock.set(Timestamp::from_millis(1_000));
        assert_eq!(names(&sim.tick()), vec!["parcel.unloaded"]);

        clock.set(Timestamp::from_millis(2_000));
        assert_eq!(names(&sim.tick()), vec!["parcel.unloaded", "parcel.processed"]);

        clock.set(Timestamp::from_millis(3_000));
        let report = sim.tick();
        assert_eq!(names(&report), vec!["worker.cooldown_ended", "parcel.processed"]);
        assert_eq!(
            report.events[0],
            SimEvent::CooldownEnded {
                worker_id: WorkerId::new("A1").unwrap(),
                at: Timestamp::from_millis(3_000),
            }
        );

        assert_eq!(sim.state().parcels().count(ParcelStatus::Normal), 2);
        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn breakdown_cancels_cooldown_and_recovers_after_deadline() {
        let cfg = SimulationConfig {
            break_probability: 1.0,
            ..config()
        };
        let (mut sim, clock, _) = setup(cfg, 1);
        let a1 = WorkerId::new("A1").unwrap();

        clock.set(Timestamp::from_millis(1_000));
        sim.tick();
        clock.set(Timestamp::from_millis(2_000));
        let report = sim.tick();
        assert_eq!(names(&report), vec!["parcel.processed", "worker.broken"]);
        let worker = sim.state().workers().get(&a1).unwrap();
        assert_eq!(worker.status(), WorkerStatus::Broken);
        assert_eq!(worker.broken_until(), Some(Timestamp::from_millis(2_500)));

        // Cooldown was cancelled: only the recovery poll is left.
        assert_eq!(sim.pending_timers(), 1);

        clock.set(Timestamp::from_millis(2_400));
        assert!(sim.tick().events.is_empty());

        clock.set(Timestamp::from_millis(9_000));
        assert_eq!(names(&sim.tick()), vec!["worker.recovered"]);
        assert_eq!(sim.state().workers().get(&a1).unwrap().status(), WorkerStatus::Idle);
    }

    #[test]
    fn same_seed_same_event_stream() {
        let cfg = SimulationConfig {
            lines: "AB".into(),
            workers_per_line: 3,
            break_probability: 0.2,
            accident_probability: 0.3,
            min_processing_ms: 500,
            max_processing_ms: 4_000,
            ..config()
        };
        let (mut a, clock_a, _) = setup(cfg.clone(), 12);
        let (mut b, clock_b, _) = setup(cfg, 12);

        let mut stream_a = Vec::new();
        let mut stream_b = Vec::new();
        for step in 1..=60 {
            clock_a.set(Timestamp::from_millis(step * 250));
            clock_b.set(Timestamp::from_millis(step * 250));
            stream_a.extend(a.tick().events);
            stream_b.extend(b.tick().events);
        }
        assert!(!stream_a.is_empty());
        assert_eq!(stream_a, stream_b);
    }

    #[test]
    fn reset_restarts_from_seeded_parcels() {
        let (mut sim, clock, seen) = setup(config(), 1);
        clock.set(Timestamp::from_millis(1_000));
        sim.tick();
        clock.set(Timestamp::from_millis(2_000));
        sim.tick();
        assert_eq!(sim.state().parcels().count(ParcelStatus::Normal), 1);

        let report = sim.reset(Timestamp::from_millis(2_500));
        assert_eq!(names(&report), vec!["simulation.reset"]);
        assert_eq!(sim.state().parcels().count(ParcelStatus::PendingUnload), 1);
        assert_eq!(
            sim.state()
                .workers()
                .get(&WorkerId::new("A1").unwrap())
                .unwrap()
                .processed_count(),
            0
        );

        // The old cooldown must not fire into the fresh pool.
        clock.set(Timestamp::from_millis(3_500));
        assert_eq!(names(&sim.tick()), vec!["parcel.unloaded"]);
        assert_eq!(seen.lock().unwrap().len(), 4);
    }

    #[test]
    fn huge_unload_interval_only_releases_the_first_parcel() {
        let cfg = SimulationConfig::from_lookup(|key| {
            (key == "PARCELSIM_UNLOAD_INTERVAL_MS").then(|| u64::MAX.to_string())
        })
        .unwrap();
        let cfg = SimulationConfig {
            unload_interval_ms: cfg.unload_interval_ms,
            ..config()
        };
        let (mut sim, clock, _) = setup(cfg, 3);

        assert!(sim.tick().events.is_empty());
        clock.set(Timestamp::from_millis(1_000));
        assert_eq!(names(&sim.tick()), vec!["parcel.unloaded"]);
        clock.set(Timestamp::from_millis(60_000));
        sim.tick();
        assert_eq!(sim.state().parcels().count(ParcelStatus::PendingUnload), 2);
    }

    #[test]
    fn shutdown_cancels_every_timer() {
        let cfg = SimulationConfig {
            lines: "AB".into(),
            unload_interval_ms: 0,
            ..config()
        };
        let (mut sim, clock, _) = setup(cfg, 2);
        clock.set(Timestamp::from_millis(1_000));
        sim.tick();
        clock.set(Timestamp::from_millis(2_000));
        assert_eq!(names(&sim.tick()), vec!["parcel.processed", "parcel.processed"]);
        // Two cooldowns plus the recovery poll.
        assert_eq!(sim.pending_timers(), 3);

        sim.shutdown();
        assert_eq!(sim.pending_timers(), 0);

        clock.set(Timestamp::from_millis(10_000));
        assert!(!names(&sim.tick()).contains(&"worker.cooldown_ended"));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let cfg = SimulationConfig {
            lines: String::new(),
            ..config()
        };
        let clock = Arc::new(ManualClock::new(Timestamp::EPOCH));
        let bus: Bus = Arc::new(InMemoryEventBus::new());
        let result = Simulation::new(cfg, bus, clock, &InitialSnapshot::new(Vec::new()));
        assert!(matches!(result, Err(SimulationError::Config(_))));
    }
}
