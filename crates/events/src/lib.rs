//! Simulation events and the in-process broadcast transport.
//!
//! - [`SimEvent`]: the closed set of things that can happen in the warehouse
//! - [`wire`]: the JSON message shape consumers outside the core understand
//! - [`EventBus`] / [`InMemoryEventBus`]: named-channel pub/sub
//! - [`Projection`] / [`ProjectionRunner`]: folding the stream into local state

pub mod bus;
pub mod channel;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;
pub mod projection;
pub mod runner;
pub mod wire;

pub use bus::{EventBus, Handler, Subscription};
pub use channel::ChannelName;
pub use envelope::EventEnvelope;
pub use event::{Event, Operator, ProcessOutcome, SimEvent};
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
pub use projection::Projection;
pub use runner::{ProjectionCursor, ProjectionError, ProjectionRunner, RunOutcome};
pub use wire::{Category, WireError, WireEvent};
