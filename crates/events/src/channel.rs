//! Channel names.
//!
//! Channels are process-local identifiers, not network addresses. Two
//! channels never cross-deliver.

use serde::{Deserialize, Serialize};

/// Name of a broadcast channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelName(String);

impl ChannelName {
    pub const WAREHOUSE_EVENTS: &'static str = "warehouse-events";
    pub const FACTORY_EVENTS: &'static str = "factory-events";

    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn warehouse() -> Self {
        Self::new(Self::WAREHOUSE_EVENTS)
    }

    pub fn factory() -> Self {
        Self::new(Self::FACTORY_EVENTS)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for ChannelName {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChannelName {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}
