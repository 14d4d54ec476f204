//! Warehouse simulation: belt motion, parcel and worker state machines, and
//! the driver that turns clock ticks into broadcast events.
//!
//! Everything here is deterministic given a seed and a clock. The driver
//! ([`Simulation`]) is the only component that makes decisions; every
//! consumer, including the driver itself, learns about them by folding
//! [`SimEvent`](parcelsim_events::SimEvent)s into a [`WarehouseState`].

pub mod belt;
pub mod clock;
pub mod config;
pub mod engine;
pub mod metrics;
pub mod parcel;
pub mod snapshot;
pub mod state;
pub mod timers;
pub mod worker;

pub use belt::{BeltTracker, progress};
pub use clock::{SimulationClock, Tick};
pub use config::{ConfigError, SimulationConfig};
pub use engine::{Simulation, SimulationError, TickReport};
pub use metrics::{RATIO_UNDEFINED, format_ratio};
pub use parcel::{Parcel, ParcelBook, ParcelStatus, ProcessedBy};
pub use snapshot::{
    CachedSnapshot, InitialSnapshot, JsonFileSnapshot, ParcelRecord, SnapshotError, SnapshotSource,
    StaticSnapshot,
};
pub use state::{Change, WarehouseState};
pub use timers::{TimerHandle, TimerQueue};
pub use worker::{Worker, WorkerPool, WorkerStatus};
