//! Headless runner: wires the simulation, the bus and every consumer
//! together and drives the clock.

pub mod harness;
pub mod settings;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::time::MissedTickBehavior;
use tracing::info;

use parcelsim_core::{Clock, SystemClock};
use parcelsim_projections::LoggingSink;
use parcelsim_simulation::{
    CachedSnapshot, InitialSnapshot, JsonFileSnapshot, SimulationConfig, SnapshotSource, StaticSnapshot,
};

pub use harness::Harness;
pub use settings::RunnerSettings;

/// Log a dashboard line every this many ticks.
const SUMMARY_EVERY: u64 = 50;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub ticks: u64,
    pub events: usize,
    pub context: Option<String>,
}

/// Where the initial parcels come from.
pub fn snapshot_source(settings: &RunnerSettings, seed: u64, clock: &dyn Clock) -> Box<dyn SnapshotSource> {
    match &settings.snapshot {
        Some(path) => Box::new(CachedSnapshot::new(JsonFileSnapshot::new(path.clone()))),
        None => Box::new(StaticSnapshot(InitialSnapshot::synthetic(settings.parcels, seed, clock.now()))),
    }
}

/// Run until the configured duration elapses or the process is interrupted.
pub async fn run(config: SimulationConfig, settings: RunnerSettings) -> anyhow::Result<RunOutcome> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let snapshot = snapshot_source(&settings, config.seed, clock.as_ref())
        .fetch()
        .context("failed to load initial snapshot")?;

    let tick_ms = config.tick_ms;
    let mut harness = Harness::new(config, &snapshot, Arc::clone(&clock), Arc::new(LoggingSink))?;
    let deadline = settings
        .duration_ms
        .map(|ms| clock.now().plus_millis(ms));

    let mut interval = tokio::time::interval(Duration::from_millis(tick_ms));
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let mut ticks = 0u64;
    let mut events = 0usize;
    loop {
        tokio::select! {
            _ = interval.tick() => {
                let report = harness.step();
                ticks += 1;
                events += report.events.len();
                if ticks % SUMMARY_EVERY == 0 {
                    harness.log_summary(report.tick.now);
                }
                if deadline.is_some_and(|d| report.tick.now >= d) {
                    break;
                }
            }
            _ = &mut shutdown => {
                info!("interrupted");
                break;
            }
        }
    }

    harness.shutdown();
    let context = harness.chat_context(clock.now());
    Ok(RunOutcome { ticks, events, context })
}
