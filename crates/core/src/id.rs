//! Strongly-typed identifiers used across the simulation.
//!
//! Both identifiers are opaque strings handed to us by the snapshot
//! collaborator (waybills) or generated from the configured roster (workers).

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Identifier of a parcel (its waybill number).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WaybillId(String);

/// Identifier of a worker station (e.g. `A1`, `B10`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WorkerId(String);

macro_rules! impl_string_newtype {
    ($t:ty, $name:literal) => {
        impl $t {
            /// Build an identifier, rejecting blank input.
            pub fn new(value: impl Into<String>) -> Result<Self, DomainError> {
                let value = value.into();
                let trimmed = value.trim();
                if trimmed.is_empty() {
                    return Err(DomainError::invalid_id(concat!($name, " cannot be empty")));
                }
                Ok(Self(trimmed.to_string()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl TryFrom<String> for $t {
            type Error = DomainError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$t> for String {
            fn from(value: $t) -> Self {
                value.0
            }
        }

        impl FromStr for $t {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }
    };
}

impl_string_newtype!(WaybillId, "WaybillId");
impl_string_newtype!(WorkerId, "WorkerId");

impl WorkerId {
    /// Build the fixed worker roster: one letter per line, `per_line` stations each.
    ///
    /// `roster("AB", 10)` yields `A1..A10, B1..B10` in that order.
    pub fn roster(lines: &str, per_line: u16) -> Vec<WorkerId> {
        lines
            .chars()
            .filter(|c| c.is_ascii_alphabetic())
            .flat_map(|line| (1..=per_line).map(move |n| WorkerId(format!("{line}{n}"))))
            .collect()
    }

    /// Line letter of this station, if the id follows the roster convention.
    pub fn line(&self) -> Option<char> {
        self.0.chars().next().filter(|c| c.is_ascii_alphabetic())
    }
}
