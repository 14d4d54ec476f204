//! In-process event bus.

use std::collections::{HashMap, VecDeque};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use thiserror::Error;
use tracing::{error, warn};

use crate::bus::{Detach, EventBus, Handler, Subscription};
use crate::channel::ChannelName;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InMemoryBusError {
    /// Publish failed due to internal lock poisoning.
    #[error("event bus lock poisoned")]
    Poisoned,
}

struct Registration<M> {
    id: u64,
    active: Arc<AtomicBool>,
    handler: Handler<M>,
}

struct Dispatch<M> {
    queue: VecDeque<(ChannelName, M)>,
    draining: bool,
}

struct BusInner<M> {
    next_id: AtomicU64,
    channels: Mutex<HashMap<ChannelName, Vec<Arc<Registration<M>>>>>,
    dispatch: Mutex<Dispatch<M>>,
}

/// In-memory pub/sub bus.
///
/// - No IO / no async
/// - Synchronous fan-out, run-to-completion per event
/// - Publishing from inside a handler enqueues; the outer publish call
///   delivers it after the current event, so every handler sees the same order
pub struct InMemoryEventBus<M> {
    inner: Arc<BusInner<M>>,
}

impl<M> InMemoryEventBus<M> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live handlers on `channel`.
    pub fn subscriber_count(&self, channel: &ChannelName) -> usize {
        self.inner
            .channels
            .lock()
            .map(|map| map.get(channel).map_or(0, Vec::len))
            .unwrap_or(0)
    }
}

impl<M> Default for InMemoryEventBus<M> {
    fn default() -> Self {
        Self {
            inner: Arc::new(BusInner {
                next_id: AtomicU64::new(1),
                channels: Mutex::new(HashMap::new()),
                dispatch: Mutex::new(Dispatch {
                    queue: VecDeque::new(),
                    draining: false,
                }),
            }),
        }
    }
}

impl<M> core::fmt::Debug for InMemoryEventBus<M> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let channels = self.inner.channels.lock().map(|m| m.len()).unwrap_or(0);
        f.debug_struct("InMemoryEventBus").field("channels", &channels).finish()
    }
}

impl<M> Detach for BusInner<M>
where
    M: Send,
{
    fn detach(&self, channel: &ChannelName, id: u64) {
        if let Ok(mut map) = self.channels.lock() {
            if let Some(regs) = map.get_mut(channel) {
                regs.retain(|r| r.id != id);
                if regs.is_empty() {
                    map.remove(channel);
                }
            }
        }
    }
}

impl<M> BusInner<M> {
    /// Deliver queued messages until the queue is empty.
    fn drain(&self) -> Result<(), InMemoryBusError> {
        loop {
            let (channel, message) = {
                let mut dispatch = self.dispatch.lock().map_err(|_| InMemoryBusError::Poisoned)?;
                match dispatch.queue.pop_front() {
                    Some(next) => next,
                    None => {
                        dispatch.draining = false;
                        return Ok(());
                    }
                }
            };
            self.deliver(&channel, &message);
        }
    }

    fn deliver(&self, channel: &ChannelName, message: &M) {
        // Snapshot so handlers may (un)subscribe while being called.
        let registrations: Vec<Arc<Registration<M>>> = match self.channels.lock() {
            Ok(map) => map.get(channel).cloned().unwrap_or_default(),
            Err(_) => {
                error!(%channel, "subscriber registry poisoned; dropping event");
                return;
            }
        };

        for reg in registrations {
            if !reg.active.load(Ordering::SeqCst) {
                continue;
            }
            match catch_unwind(AssertUnwindSafe(|| (reg.handler)(message))) {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    warn!(%channel, subscription = reg.id, error = %err, "handler failed; continuing delivery");
                }
                Err(panic) => {
                    let reason = panic
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".to_string());
                    error!(%channel, subscription = reg.id, %reason, "handler panicked; continuing delivery");
                }
            }
        }
    }
}

impl<M> EventBus<M> for InMemoryEventBus<M>
where
    M: Send + 'static,
{
    type Error = InMemoryBusError;

    fn publish(&self, channel: &ChannelName, message: M) -> Result<(), Self::Error> {
        {
            let mut dispatch = self.inner.dispatch.lock().map_err(|_| InMemoryBusError::Poisoned)?;
            dispatch.queue.push_back((channel.clone(), message));
            if dispatch.draining {
                // Someone up the stack (or another thread) is already delivering.
                return Ok(());
            }
            dispatch.draining = true;
        }
        self.inner.drain()
    }

    fn subscribe(&self, channel: &ChannelName, handler: Handler<M>) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        let active = Arc::new(AtomicBool::new(true));

        match self.inner.channels.lock() {
            Ok(mut map) => map.entry(channel.clone()).or_default().push(Arc::new(Registration {
                id,
                active: Arc::clone(&active),
                handler,
            })),
            // The subscription is returned regardless; it just never fires.
            Err(_) => error!(%channel, "subscriber registry poisoned; subscription is inert"),
        }

        let bus: Weak<dyn Detach> = Arc::downgrade(&self.inner) as Weak<dyn Detach>;
        Subscription::new(channel.clone(), id, active, bus)
    }
}
