use anyhow::Context;

use parcelsim_runner::RunnerSettings;
use parcelsim_simulation::SimulationConfig;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    parcelsim_observability::init();

    let config = SimulationConfig::from_env().context("invalid simulation configuration")?;
    let settings = RunnerSettings::from_env().context("invalid runner settings")?;

    let outcome = parcelsim_runner::run(config, settings).await?;
    tracing::info!(ticks = outcome.ticks, events = outcome.events, "simulation stopped");

    match outcome.context {
        Some(context) => println!("{context}"),
        None => tracing::warn!("no chat context was assembled"),
    }
    Ok(())
}
