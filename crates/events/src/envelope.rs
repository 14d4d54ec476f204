use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::channel::ChannelName;

/// Envelope for an event, carrying delivery metadata.
///
/// This is the unit published on a channel.
///
/// Notes:
/// - `sequence_number` is assigned by the publisher and increases per channel.
/// - `event_id` is unique per publication; a redelivered envelope keeps it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    event_id: Uuid,
    channel: ChannelName,

    /// Monotonically increasing position on the channel.
    sequence_number: u64,

    payload: E,
}

impl<E> EventEnvelope<E> {
    pub fn new(channel: ChannelName, sequence_number: u64, payload: E) -> Self {
        Self::with_id(Uuid::now_v7(), channel, sequence_number, payload)
    }

    pub fn with_id(event_id: Uuid, channel: ChannelName, sequence_number: u64, payload: E) -> Self {
        Self {
            event_id,
            channel,
            sequence_number,
            payload,
        }
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn channel(&self) -> &ChannelName {
        &self.channel
    }

    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }

    pub fn into_payload(self) -> E {
        self.payload
    }
}
