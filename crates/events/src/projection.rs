use crate::{Event, EventEnvelope};

/// A projection builds a local state copy from the broadcast event stream.
///
/// Every consumer (visualization, dashboard tables, the chat-context builder)
/// owns its own projection and never reads another consumer's memory. Each one
/// folds the same ordered stream, so they converge without talking to each
/// other.
///
/// ## Idempotency
///
/// Projections must tolerate duplicate and out-of-order delivery:
/// - re-applying an event to an entity already in a terminal state is a no-op
/// - an event for an id the projection does not know is dropped, never a panic
///
/// The `ProjectionRunner` additionally skips envelopes whose sequence number
/// was already applied.
///
/// ## Error Handling
///
/// `apply` does not return errors. An event that cannot be applied is either
/// irrelevant to this projection or refers to unknown state; both are logged
/// and ignored so one consumer can never stall the others.
pub trait Projection {
    type Ev: Event;

    /// Apply a single event to the projection, updating its local state.
    fn apply(&mut self, envelope: &EventEnvelope<Self::Ev>);
}
