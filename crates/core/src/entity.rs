//! Entity trait: identity that survives state changes.

/// Anything tracked by a stable identifier across the event stream
/// (parcels, workers).
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}
