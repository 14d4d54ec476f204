//! Wiring a projection to a bus channel.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use parcelsim_events::{
    ChannelName, EventBus, EventEnvelope, Projection, ProjectionCursor, ProjectionRunner, RunOutcome, Subscription,
};

/// A projection subscribed to one channel.
///
/// The projection sits behind a mutex shared with the bus handler; reads take
/// the same lock, so a reader never sees a half-applied event. Dropping the
/// handle unsubscribes.
pub struct ProjectionHandle<P: Projection> {
    runner: Arc<Mutex<ProjectionRunner<P>>>,
    subscription: Subscription,
}

/// Subscribe `projection` to `channel` on `bus`.
///
/// Envelopes already applied (same or lower sequence number) are skipped.
pub fn attach<B, P>(bus: &B, channel: &ChannelName, projection: P) -> ProjectionHandle<P>
where
    B: EventBus<EventEnvelope<P::Ev>> + ?Sized,
    P: Projection + Send + 'static,
{
    let runner = Arc::new(Mutex::new(ProjectionRunner::new_for_channel(channel.clone(), projection)));
    let shared = Arc::clone(&runner);
    let subscription = bus.subscribe(
        channel,
        Arc::new(move |envelope: &EventEnvelope<P::Ev>| -> anyhow::Result<()> {
            let mut runner = shared.lock().unwrap_or_else(PoisonError::into_inner);
            if runner.apply(envelope)? == RunOutcome::Skipped {
                debug!(seq = envelope.sequence_number(), "envelope already applied");
            }
            Ok(())
        }),
    );
    ProjectionHandle { runner, subscription }
}

impl<P: Projection> ProjectionHandle<P> {
    fn lock(&self) -> MutexGuard<'_, ProjectionRunner<P>> {
        // A panicking handler is already reported by the bus; keep serving
        // whatever state it left behind.
        self.runner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn read<R>(&self, f: impl FnOnce(&P) -> R) -> R {
        f(self.lock().projection())
    }

    /// Run local maintenance (recovery polls, barrier cycles) under the lock.
    pub fn update<R>(&self, f: impl FnOnce(&mut P) -> R) -> R {
        f(self.lock().projection_mut())
    }

    pub fn cursor(&self) -> Option<ProjectionCursor> {
        self.lock().cursor().cloned()
    }

    pub fn is_attached(&self) -> bool {
        self.subscription.is_active()
    }

    /// Stop receiving events; the projection keeps its current state.
    pub fn detach(&self) {
        self.subscription.unsubscribe();
    }
}

impl<P: Projection> Drop for ProjectionHandle<P> {
    fn drop(&mut self) {
        self.subscription.unsubscribe();
    }
}

impl<P: Projection> core::fmt::Debug for ProjectionHandle<P> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ProjectionHandle")
            .field("subscription", &self.subscription)
            .finish()
    }
}
