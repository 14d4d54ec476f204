//! Projection runner utilities.
//!
//! Projections are **disposable**; a fresh one can be rebuilt by feeding it
//! envelopes again. This module tracks which envelopes a projection has seen
//! so redelivered ones are skipped.

use thiserror::Error;
use tracing::debug;

use crate::{ChannelName, EventEnvelope, Projection};

/// Tracks projection progress on one channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectionCursor {
    channel: ChannelName,
    last_sequence_number: u64,
}

impl ProjectionCursor {
    pub fn channel(&self) -> &ChannelName {
        &self.channel
    }

    pub fn last_sequence_number(&self) -> u64 {
        self.last_sequence_number
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProjectionError {
    #[error("envelope from channel {found} delivered to a projection pinned to {expected}")]
    ChannelMismatch { expected: ChannelName, found: ChannelName },
}

/// What happened to one envelope.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Applied,
    /// Sequence number at or below the cursor: a redelivery or a late straggler.
    Skipped,
}

/// Runs envelopes through a projection and tracks progress.
#[derive(Debug)]
pub struct ProjectionRunner<P>
where
    P: Projection,
{
    projection: P,
    cursor: Option<ProjectionCursor>,
}

impl<P> ProjectionRunner<P>
where
    P: Projection,
{
    pub fn new(projection: P) -> Self {
        Self {
            projection,
            cursor: None,
        }
    }

    /// Create a runner pinned to a specific channel.
    pub fn new_for_channel(channel: ChannelName, projection: P) -> Self {
        Self {
            projection,
            cursor: Some(ProjectionCursor {
                channel,
                last_sequence_number: 0,
            }),
        }
    }

    pub fn projection(&self) -> &P {
        &self.projection
    }

    pub fn projection_mut(&mut self) -> &mut P {
        &mut self.projection
    }

    pub fn into_projection(self) -> P {
        self.projection
    }

    pub fn cursor(&self) -> Option<&ProjectionCursor> {
        self.cursor.as_ref()
    }

    /// Apply a single envelope, skipping anything already covered by the cursor.
    pub fn apply(&mut self, envelope: &EventEnvelope<P::Ev>) -> Result<RunOutcome, ProjectionError> {
        let found_seq = envelope.sequence_number();

        match &mut self.cursor {
            None => {
                self.projection.apply(envelope);
                self.cursor = Some(ProjectionCursor {
                    channel: envelope.channel().clone(),
                    last_sequence_number: found_seq,
                });
                Ok(RunOutcome::Applied)
            }
            Some(c) => {
                if &c.channel != envelope.channel() {
                    return Err(ProjectionError::ChannelMismatch {
                        expected: c.channel.clone(),
                        found: envelope.channel().clone(),
                    });
                }
                if found_seq <= c.last_sequence_number {
                    debug!(channel = %c.channel, seq = found_seq, last = c.last_sequence_number, "skipping already-applied envelope");
                    return Ok(RunOutcome::Skipped);
                }
                if found_seq != c.last_sequence_number + 1 {
                    debug!(channel = %c.channel, seq = found_seq, last = c.last_sequence_number, "sequence gap; applying anyway");
                }

                self.projection.apply(envelope);
                c.last_sequence_number = found_seq;
                Ok(RunOutcome::Applied)
            }
        }
    }

    /// Apply many envelopes in order.
    pub fn run<'a>(
        &mut self,
        envelopes: impl IntoIterator<Item = &'a EventEnvelope<P::Ev>>,
    ) -> Result<(), ProjectionError>
    where
        P::Ev: 'a,
    {
        for env in envelopes {
            self.apply(env)?;
        }
        Ok(())
    }
}
