//! Simulation configuration.
//!
//! Values come from `PARCELSIM_*` environment variables with sensible
//! defaults. All randomness is derived from `seed`, so two runs with the same
//! configuration and clock produce the same event stream.

use core::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use parcelsim_core::WorkerId;

pub const ENV_PREFIX: &str = "PARCELSIM_";

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{key}: cannot parse {value:?}: {reason}")]
    Parse {
        key: String,
        value: String,
        reason: String,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Seed for worker speeds, breakage draws and processing mishaps.
    pub seed: u64,
    /// One letter per worker line (`"AB"` → lines A and B).
    pub lines: String,
    pub workers_per_line: u16,

    /// Belt from the handoff point to the worker stations.
    pub belt_length: f64,
    /// Belt speed in length units per millisecond.
    pub belt_speed: f64,
    /// Truck bed a parcel travels before the handoff onto the belt.
    pub truck_length: f64,
    pub truck_speed: f64,
    /// Delay between consecutive parcels leaving the truck.
    pub unload_interval_ms: u64,

    /// Bounds of the per-worker processing (cooldown) time.
    pub min_processing_ms: u64,
    pub max_processing_ms: u64,
    /// Chance per tick that a working worker breaks down.
    pub break_probability: f64,
    /// Chance that a processed parcel ends up damaged.
    pub accident_probability: f64,
    pub recovery_ms: u64,
    pub recovery_poll_ms: u64,

    pub tick_ms: u64,
    pub channel: String,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            lines: "AB".to_string(),
            workers_per_line: 10,
            belt_length: 100.0,
            belt_speed: 0.02,
            truck_length: 10.0,
            truck_speed: 0.005,
            unload_interval_ms: 1_500,
            min_processing_ms: 2_000,
            max_processing_ms: 5_000,
            break_probability: 0.002,
            accident_probability: 0.01,
            recovery_ms: 8_000,
            recovery_poll_ms: 1_000,
            tick_ms: 100,
            channel: "warehouse-events".to_string(),
        }
    }
}

impl SimulationConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through an arbitrary key lookup (unset keys keep defaults).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let d = Self::default();
        let cfg = Self {
            seed: parse(&lookup, "SEED", d.seed)?,
            lines: lookup(&key("LINES")).unwrap_or(d.lines),
            workers_per_line: parse(&lookup, "WORKERS_PER_LINE", d.workers_per_line)?,
            belt_length: parse(&lookup, "BELT_LENGTH", d.belt_length)?,
            belt_speed: parse(&lookup, "BELT_SPEED", d.belt_speed)?,
            truck_length: parse(&lookup, "TRUCK_LENGTH", d.truck_length)?,
            truck_speed: parse(&lookup, "TRUCK_SPEED", d.truck_speed)?,
            unload_interval_ms: parse(&lookup, "UNLOAD_INTERVAL_MS", d.unload_interval_ms)?,
            min_processing_ms: parse(&lookup, "MIN_PROCESSING_MS", d.min_processing_ms)?,
            max_processing_ms: parse(&lookup, "MAX_PROCESSING_MS", d.max_processing_ms)?,
            break_probability: parse(&lookup, "BREAK_PROBABILITY", d.break_probability)?,
            accident_probability: parse(&lookup, "ACCIDENT_PROBABILITY", d.accident_probability)?,
            recovery_ms: parse(&lookup, "RECOVERY_MS", d.recovery_ms)?,
            recovery_poll_ms: parse(&lookup, "RECOVERY_POLL_MS", d.recovery_poll_ms)?,
            tick_ms: parse(&lookup, "TICK_MS", d.tick_ms)?,
            channel: lookup(&key("CHANNEL")).unwrap_or(d.channel),
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.roster().is_empty() {
            return Err(ConfigError::Invalid(
                "at least one worker line and one worker per line are required".to_string(),
            ));
        }
        if !(self.belt_length > 0.0) || !(self.truck_length > 0.0) {
            return Err(ConfigError::Invalid("belt and truck lengths must be positive".to_string()));
        }
        for (name, p) in [
            ("break_probability", self.break_probability),
            ("accident_probability", self.accident_probability),
        ] {
            if !(0.0..=1.0).contains(&p) {
                return Err(ConfigError::Invalid(format!("{name} must be within [0, 1]")));
            }
        }
        if self.min_processing_ms > self.max_processing_ms {
            return Err(ConfigError::Invalid(
                "min_processing_ms cannot exceed max_processing_ms".to_string(),
            ));
        }
        if self.recovery_poll_ms == 0 || self.tick_ms == 0 {
            return Err(ConfigError::Invalid(
                "recovery_poll_ms and tick_ms must be positive".to_string(),
            ));
        }
        if self.channel.trim().is_empty() {
            return Err(ConfigError::Invalid("channel cannot be empty".to_string()));
        }
        Ok(())
    }

    /// Worker ids for this configuration, line-major.
    pub fn roster(&self) -> Vec<WorkerId> {
        WorkerId::roster(&self.lines, self.workers_per_line)
    }
}

fn key(name: &str) -> String {
    format!("{ENV_PREFIX}{name}")
}

fn parse<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: core::fmt::Display,
{
    let key = key(name);
    match lookup(&key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse::<T>().map_err(|e| ConfigError::Parse {
            key,
            value: raw.clone(),
            reason: e.to_string(),
        }),
    }
}
