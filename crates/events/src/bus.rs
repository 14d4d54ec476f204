//! Event publishing/subscription abstraction (mechanics only).
//!
//! This module provides the **broadcast bus pattern**: publishers push events
//! onto a named channel, and every handler currently registered on that
//! channel is called with each event.
//!
//! ## Guarantees
//!
//! - **Per-channel order**: handlers observe events in publish order, even when
//!   a handler publishes while being called.
//! - **No replay**: a handler only sees events published after it subscribed.
//! - **Channel isolation**: nothing published on one channel reaches another.
//! - **Fault isolation**: a handler that fails or panics is logged and skipped;
//!   the remaining handlers still receive the event.
//!
//! Delivery is synchronous and run-to-completion: a handler finishes before
//! the next queued event is delivered. Consumers must still be idempotent,
//! because a publisher may redeliver the same envelope.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use crate::channel::ChannelName;

/// Callback invoked for every event on a channel.
///
/// Returning an error does not affect other handlers; the bus logs it.
pub type Handler<M> = Arc<dyn Fn(&M) -> anyhow::Result<()> + Send + Sync>;

/// Something that can remove a registration (the bus, seen type-erased).
pub(crate) trait Detach: Send + Sync {
    fn detach(&self, channel: &ChannelName, id: u64);
}

/// Handle to a registered handler.
///
/// Cloning the handle does not duplicate the registration; every clone
/// cancels the same one. Dropping the handle does **not** unsubscribe.
#[derive(Clone)]
pub struct Subscription {
    channel: ChannelName,
    id: u64,
    active: Arc<AtomicBool>,
    bus: Weak<dyn Detach>,
}

impl Subscription {
    pub(crate) fn new(channel: ChannelName, id: u64, active: Arc<AtomicBool>, bus: Weak<dyn Detach>) -> Self {
        Self {
            channel,
            id,
            active,
            bus,
        }
    }

    pub fn channel(&self) -> &ChannelName {
        &self.channel
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Stop receiving events.
    ///
    /// Safe to call any number of times, from any thread, and from inside the
    /// handler itself (the handler is not called again afterwards, including
    /// for events already queued).
    pub fn unsubscribe(&self) {
        if !self.active.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(bus) = self.bus.upgrade() {
            bus.detach(&self.channel, self.id);
        }
    }
}

impl core::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Subscription")
            .field("channel", &self.channel)
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

/// Named-channel broadcast bus.
///
/// ## Delivery
///
/// `publish()` is fire-and-forget: it never waits for a slow subscriber held
/// by someone else. The only error it surfaces is a broken bus (e.g. a
/// poisoned lock), never a handler failure.
///
/// ## Thread Safety
///
/// The trait requires `Send + Sync`, so a bus can be shared via `Arc` between
/// the simulation driver and any number of consumers.
pub trait EventBus<M>: Send + Sync {
    type Error: core::fmt::Debug + Send + Sync + 'static;

    fn publish(&self, channel: &ChannelName, message: M) -> Result<(), Self::Error>;

    fn subscribe(&self, channel: &ChannelName, handler: Handler<M>) -> Subscription;
}

impl<M, B> EventBus<M> for Arc<B>
where
    B: EventBus<M> + ?Sized,
{
    type Error = B::Error;

    fn publish(&self, channel: &ChannelName, message: M) -> Result<(), Self::Error> {
        (**self).publish(channel, message)
    }

    fn subscribe(&self, channel: &ChannelName, handler: Handler<M>) -> Subscription {
        (**self).subscribe(channel, handler)
    }
}
