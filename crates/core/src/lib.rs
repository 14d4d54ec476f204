//! `parcelsim-core`: simulation building blocks shared by every crate.
//!
//! This crate contains identifiers, time primitives and the domain error model.
//! It has no knowledge of the bus or of any consumer.

pub mod entity;
pub mod error;
pub mod id;
pub mod time;

pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{WaybillId, WorkerId};
pub use time::{Clock, ManualClock, SystemClock, Timestamp};
