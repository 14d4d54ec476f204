//! Runner-only settings (the simulation itself reads `SimulationConfig`).

use std::path::PathBuf;

use parcelsim_simulation::ConfigError;
use parcelsim_simulation::config::ENV_PREFIX;

pub const DEFAULT_PARCELS: usize = 40;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerSettings {
    /// JSON snapshot exported from the CRUD API; synthetic parcels when unset.
    pub snapshot: Option<PathBuf>,
    pub parcels: usize,
    /// Stop after this long; run until interrupted when unset.
    pub duration_ms: Option<u64>,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            snapshot: None,
            parcels: DEFAULT_PARCELS,
            duration_ms: None,
        }
    }
}

impl RunnerSettings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| {
            let key = format!("{ENV_PREFIX}{name}");
            lookup(&key).map(|v| (key, v.trim().to_string())).filter(|(_, v)| !v.is_empty())
        };
        let number = |name: &str| -> Result<Option<u64>, ConfigError> {
            match get(name) {
                None => Ok(None),
                Some((key, value)) => value.parse().map(Some).map_err(|e: core::num::ParseIntError| {
                    ConfigError::Parse {
                        key,
                        value,
                        reason: e.to_string(),
                    }
                }),
            }
        };

        let parcels = match number("PARCELS")? {
            Some(n) => usize::try_from(n).map_err(|_| ConfigError::Invalid("PARCELS is too large".to_string()))?,
            None => DEFAULT_PARCELS,
        };
        Ok(Self {
            snapshot: get("SNAPSHOT").map(|(_, path)| PathBuf::from(path)),
            parcels,
            duration_ms: number("DURATION_MS")?,
        })
    }
}
