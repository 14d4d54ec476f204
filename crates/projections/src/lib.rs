//! Consumers of the warehouse event stream.
//!
//! Each projection is an independent state container: it is constructed
//! explicitly from the initial snapshot, attached to a bus channel, and folds
//! every event into its own copy of the warehouse. No projection reads
//! another's memory.

pub mod attach;
pub mod barrier;
pub mod chat_context;
pub mod dashboard;
pub mod forwarder;
pub mod visualization;

pub use attach::{ProjectionHandle, attach};
pub use barrier::{ContextBarrier, ContextSnapshot};
pub use chat_context::ChatContext;
pub use dashboard::{DashboardTables, ParcelSummary, StatusTotal, WorkerRow, WorkerSummary};
pub use forwarder::{InMemorySink, LoggingSink, PersistenceForwarder, SinkError, StatusSink, StatusUpdate};
pub use visualization::{FloorView, Frame, ParcelSprite, TickerLine, WorkerLamp};
