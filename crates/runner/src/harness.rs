//! Simulation plus consumers, wired on one in-memory bus.

use std::sync::Arc;

use tracing::info;

use parcelsim_core::{Clock, Timestamp};
use parcelsim_events::{ChannelName, EventEnvelope, InMemoryEventBus, SimEvent};
use parcelsim_projections::{
    ChatContext, DashboardTables, FloorView, PersistenceForwarder, ProjectionHandle, StatusSink, attach,
};
use parcelsim_simulation::{
    InitialSnapshot, ParcelStatus, Simulation, SimulationConfig, SimulationError, TickReport, WarehouseState,
};

pub type Bus = Arc<InMemoryEventBus<EventEnvelope<SimEvent>>>;

pub struct Harness {
    bus: Bus,
    simulation: Simulation<Bus>,
    floor: ProjectionHandle<FloorView>,
    tables: ProjectionHandle<DashboardTables>,
    chat: ProjectionHandle<ChatContext>,
    forwarder: ProjectionHandle<PersistenceForwarder<Arc<dyn StatusSink>>>,
}

impl Harness {
    pub fn new(
        config: SimulationConfig,
        snapshot: &InitialSnapshot,
        clock: Arc<dyn Clock>,
        sink: Arc<dyn StatusSink>,
    ) -> Result<Self, SimulationError> {
        config.validate()?;
        let roster = config.roster();
        let seeded = || WarehouseState::from_snapshot(&roster, snapshot);

        let bus: Bus = Arc::new(InMemoryEventBus::new());
        let channel = ChannelName::new(config.channel.clone());

        // Consumers subscribe before the driver publishes anything.
        let floor = attach(&bus, &channel, FloorView::new(seeded()?, config.belt_length, config.belt_speed));
        let tables = attach(&bus, &channel, DashboardTables::new(seeded()?));
        let chat = attach(&bus, &channel, ChatContext::new(seeded()?));
        let forwarder = attach(&bus, &channel, PersistenceForwarder::new(seeded()?, sink));

        let simulation = Simulation::new(config, Arc::clone(&bus), clock, snapshot)?;
        Ok(Self {
            bus,
            simulation,
            floor,
            tables,
            chat,
            forwarder,
        })
    }

    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    pub fn simulation(&self) -> &Simulation<Bus> {
        &self.simulation
    }

    pub fn floor(&self) -> &ProjectionHandle<FloorView> {
        &self.floor
    }

    pub fn tables(&self) -> &ProjectionHandle<DashboardTables> {
        &self.tables
    }

    pub fn chat(&self) -> &ProjectionHandle<ChatContext> {
        &self.chat
    }

    pub fn step(&mut self) -> TickReport {
        self.simulation.tick()
    }

    pub fn log_summary(&self, now: Timestamp) {
        let (workers, parcels) = self.tables.read(|t| (t.worker_summary(), t.parcel_summary()));
        let count = |status| parcels.get(status).map_or(0, |t| t.count);
        let on_belt = self.floor.update(|f| {
            f.frame(now)
                .parcels
                .iter()
                .filter(|p| p.position.is_some())
                .count()
        });
        let forward_failures = self.forwarder.read(|f| f.failures());
        info!(
            idle = workers.idle,
            working = workers.working,
            broken = workers.broken,
            pending = count(ParcelStatus::PendingUnload),
            on_belt,
            normal = count(ParcelStatus::Normal),
            accident = count(ParcelStatus::Accident),
            forward_failures,
            "dashboard"
        );
    }

    /// Assemble the assistant context as of `now`.
    pub fn chat_context(&self, now: Timestamp) -> Option<String> {
        self.chat.update(|c| c.refresh(now).map(|s| s.render()))
    }

    pub fn shutdown(&mut self) {
        self.simulation.shutdown();
        self.chat.update(|c| c.end_cycle());
    }
}

#[cfg(test)]
mod tests {
    use parcelsim_core::ManualClock;
    use parcelsim_projections::InMemorySink;

    use super::*;

    fn config() -> SimulationConfig {
        SimulationConfig {
            lines: "A".into(),
            workers_per_line: 4,
            truck_speed: 0.05,
            belt_speed: 0.5,
            unload_interval_ms: 200,
            min_processing_ms: 300,
            max_processing_ms: 600,
            tick_ms: 50,
            ..SimulationConfig::default()
        }
    }

    #[test]
    fn projections_follow_the_driver() {
        let clock = Arc::new(ManualClock::new(Timestamp::EPOCH));
        let sink = Arc::new(InMemorySink::new());
        let snapshot = InitialSnapshot::synthetic(6, 1, Timestamp::EPOCH);
        let mut harness = Harness::new(config(), &snapshot, clock.clone(), sink.clone()).unwrap();

        for _ in 0..400 {
            clock.advance(50);
            harness.step();
        }

        let driver = harness.simulation().state().clone();
        harness.tables().read(|t| {
            assert_eq!(t.state().parcels(), driver.parcels());
            assert_eq!(t.state().workers(), driver.workers());
        });
        let done = driver.parcels().count(ParcelStatus::Normal) + driver.parcels().count(ParcelStatus::Accident);
        assert_eq!(done, 6);
        assert!(sink.updates().len() >= 6);

        harness.shutdown();
        let context = harness.chat_context(clock.now()).unwrap();
        assert!(context.contains("[workers]"));
        assert!(context.contains("[alerts]"));
    }
}
