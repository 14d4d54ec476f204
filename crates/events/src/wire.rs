//! Wire shape of simulation events.
//!
//! Dashboards, the visualization and the chat assistant all speak this JSON
//! shape: a display message, a category, a timestamp and a handful of
//! optional entity fields. The core never matches on `msg` anywhere except in
//! this module.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use parcelsim_core::{DomainError, Timestamp, WaybillId, WorkerId};

use crate::bus::EventBus;
use crate::channel::ChannelName;
use crate::envelope::EventEnvelope;
use crate::event::{Operator, ProcessOutcome, SimEvent};

pub const MSG_UNLOADED: &str = "하차된 물건";
pub const MSG_PROCESSED: &str = "작업자 처리";
pub const MSG_ACCIDENT: &str = "사고 발생";
pub const MSG_BROKEN: &str = "작업자 고장";
pub const MSG_COOLDOWN_ENDED: &str = "작업 종료";
pub const MSG_RECOVERED: &str = "작업자 복구";
pub const MSG_RESET: &str = "시뮬레이션 초기화";

/// Recovery window assumed when a breakdown message arrives without `brokenUntil`.
pub const DEFAULT_RECOVERY_MS: u64 = 10_000;

/// Event category as shown on the dashboards.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    Process,
    Alarm,
    System,
    #[serde(other)]
    Other,
}

/// JSON message exchanged on a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireEvent {
    pub msg: String,
    #[serde(default = "default_category")]
    pub category: Category,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
    #[serde(default)]
    pub ts: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub waybill_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub broken_until: Option<i64>,
}

fn default_category() -> Category {
    Category::Other
}

/// Why a wire message could not become a [`SimEvent`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WireError {
    #[error("unknown event message: {0:?}")]
    UnknownMessage(String),

    #[error("{msg:?} is missing required field `{field}`")]
    MissingField { msg: &'static str, field: &'static str },

    #[error("invalid field: {0}")]
    InvalidField(#[from] DomainError),

    #[error("malformed json: {0}")]
    Json(String),
}

impl WireEvent {
    fn bare(msg: &str, category: Category, ts: Timestamp) -> Self {
        Self {
            msg: msg.to_string(),
            category,
            severity: None,
            ts: ts.as_millis(),
            worker_id: None,
            waybill_id: None,
            operator_id: None,
            operator_name: None,
            count: None,
            broken_until: None,
        }
    }

    fn require_worker(&self, msg: &'static str) -> Result<WorkerId, WireError> {
        let raw = self
            .worker_id
            .clone()
            .ok_or(WireError::MissingField { msg, field: "workerId" })?;
        Ok(WorkerId::new(raw)?)
    }

    fn require_waybill(&self, msg: &'static str) -> Result<WaybillId, WireError> {
        let raw = self
            .waybill_id
            .clone()
            .ok_or(WireError::MissingField { msg, field: "waybillId" })?;
        Ok(WaybillId::new(raw)?)
    }

    fn operator(&self) -> Option<Operator> {
        self.operator_id.map(|id| Operator {
            id,
            name: self.operator_name.clone().unwrap_or_default(),
        })
    }
}

/// Decode a JSON message into a typed event.
pub fn decode(json: &str) -> Result<SimEvent, WireError> {
    serde_json::from_str::<SimEvent>(json).map_err(|e| WireError::Json(e.to_string()))
}

/// Decode an inbound JSON message and publish it on `channel`.
///
/// A message that does not decode is logged and dropped; nothing is
/// delivered. Returns whether the event was published.
pub fn publish_wire<B>(bus: &B, channel: &ChannelName, sequence_number: u64, json: &str) -> bool
where
    B: EventBus<EventEnvelope<SimEvent>> + ?Sized,
{
    let event = match decode(json) {
        Ok(event) => event,
        Err(err) => {
            warn!(channel = %channel, seq = sequence_number, error = %err, "malformed event dropped");
            return false;
        }
    };
    match bus.publish(channel, EventEnvelope::new(channel.clone(), sequence_number, event)) {
        Ok(()) => true,
        Err(err) => {
            warn!(channel = %channel, seq = sequence_number, error = ?err, "publish failed");
            false
        }
    }
}

/// Encode a typed event into its JSON message.
pub fn encode(event: &SimEvent) -> Result<String, WireError> {
    serde_json::to_string(event).map_err(|e| WireError::Json(e.to_string()))
}

impl TryFrom<WireEvent> for SimEvent {
    type Error = WireError;

    fn try_from(wire: WireEvent) -> Result<Self, Self::Error> {
        let at = Timestamp::from_millis(wire.ts);
        let event = match wire.msg.as_str() {
            MSG_UNLOADED => SimEvent::Unloaded {
                waybill_id: wire.require_waybill(MSG_UNLOADED)?,
                at,
            },
            MSG_PROCESSED | MSG_ACCIDENT => {
                let (msg, outcome) = if wire.msg == MSG_ACCIDENT {
                    (MSG_ACCIDENT, ProcessOutcome::Accident)
                } else {
                    (MSG_PROCESSED, ProcessOutcome::Normal)
                };
                SimEvent::Processed {
                    waybill_id: wire.require_waybill(msg)?,
                    worker_id: wire.require_worker(msg)?,
                    outcome,
                    operator: wire.operator(),
                    at,
                }
            }
            MSG_BROKEN => SimEvent::Broken {
                worker_id: wire.require_worker(MSG_BROKEN)?,
                broken_until: wire
                    .broken_until
                    .map(Timestamp::from_millis)
                    .unwrap_or_else(|| at.plus_millis(DEFAULT_RECOVERY_MS)),
                at,
            },
            MSG_COOLDOWN_ENDED => SimEvent::CooldownEnded {
                worker_id: wire.require_worker(MSG_COOLDOWN_ENDED)?,
                at,
            },
            MSG_RECOVERED => SimEvent::Recovered {
                worker_id: wire.require_worker(MSG_RECOVERED)?,
                at,
            },
            MSG_RESET => SimEvent::Reset {
                parcels: wire.count.unwrap_or(0),
                at,
            },
            other => return Err(WireError::UnknownMessage(other.to_string())),
        };
        Ok(event)
    }
}

impl From<SimEvent> for WireEvent {
    fn from(event: SimEvent) -> Self {
        let category = event.category();
        match event {
            SimEvent::Unloaded { waybill_id, at } => WireEvent {
                waybill_id: Some(waybill_id.into()),
                ..WireEvent::bare(MSG_UNLOADED, category, at)
            },
            SimEvent::Processed {
                waybill_id,
                worker_id,
                outcome,
                operator,
                at,
            } => {
                let (msg, severity) = match outcome {
                    ProcessOutcome::Normal => (MSG_PROCESSED, None),
                    ProcessOutcome::Accident => (MSG_ACCIDENT, Some("WARNING".to_string())),
                };
                let (operator_id, operator_name) = match operator {
                    Some(op) => (Some(op.id), Some(op.name)),
                    None => (None, None),
                };
                WireEvent {
                    severity,
                    waybill_id: Some(waybill_id.into()),
                    worker_id: Some(worker_id.into()),
                    operator_id,
                    operator_name,
                    ..WireEvent::bare(msg, category, at)
                }
            }
            SimEvent::Broken {
                worker_id,
                broken_until,
                at,
            } => WireEvent {
                severity: Some("CRITICAL".to_string()),
                worker_id: Some(worker_id.into()),
                broken_until: Some(broken_until.as_millis()),
                ..WireEvent::bare(MSG_BROKEN, category, at)
            },
            SimEvent::CooldownEnded { worker_id, at } => WireEvent {
                worker_id: Some(worker_id.into()),
                ..WireEvent::bare(MSG_COOLDOWN_ENDED, category, at)
            },
            SimEvent::Recovered { worker_id, at } => WireEvent {
                severity: Some("INFO".to_string()),
                worker_id: Some(worker_id.into()),
                ..WireEvent::bare(MSG_RECOVERED, category, at)
            },
            SimEvent::Reset { parcels, at } => WireEvent {
                count: Some(parcels),
                ..WireEvent::bare(MSG_RESET, category, at)
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use crate::InMemoryEventBus;

    use super::*;

    fn recording_bus() -> (InMemoryEventBus<EventEnvelope<SimEvent>>, Arc<Mutex<Vec<u64>>>) {
        let bus = InMemoryEventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _sub = bus.subscribe(
            &ChannelName::warehouse(),
            Arc::new(move |env: &EventEnvelope<SimEvent>| -> anyhow::Result<()> {
                sink.lock().unwrap().push(env.sequence_number());
                Ok(())
            }),
        );
        (bus, seen)
    }

    #[test]
    fn publish_wire_delivers_decoded_messages() {
        let (bus, seen) = recording_bus();
        let channel = ChannelName::warehouse();
        assert!(publish_wire(&bus, &channel, 4, r#"{"msg":"하차된 물건","waybillId":"W1","ts":10}"#));
        assert_eq!(*seen.lock().unwrap(), vec![4]);
    }

    #[test]
    fn publish_wire_drops_malformed_messages() {
        let (bus, seen) = recording_bus();
        let channel = ChannelName::warehouse();
        assert!(!publish_wire(&bus, &channel, 1, "not json"));
        assert!(!publish_wire(&bus, &channel, 2, r#"{"msg":"점심 시간"}"#));
        assert!(!publish_wire(&bus, &channel, 3, r#"{"msg":"작업자 처리","workerId":"A1"}"#));
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn decodes_minimal_unloaded_message() {
        let ev = decode(r#"{"msg":"하차된 물건","waybillId":"W1"}"#).unwrap();
        assert_eq!(
            ev,
            SimEvent::Unloaded {
                waybill_id: WaybillId::new("W1").unwrap(),
                at: Timestamp::EPOCH,
            }
        );
    }

    #[test]
    fn processed_without_waybill_is_malformed() {
        let err = decode(r#"{"msg":"작업자 처리","workerId":"A1","category":"PROCESS"}"#);
        assert!(matches!(err, Err(WireError::Json(m)) if m.contains("waybillId")));
    }

    #[test]
    fn unknown_message_is_rejected() {
        let wire = WireEvent::bare("점심 시간", Category::Other, Timestamp::EPOCH);
        assert_eq!(
            SimEvent::try_from(wire),
            Err(WireError::UnknownMessage("점심 시간".to_string()))
        );
    }

    #[test]
    fn breakdown_without_deadline_gets_default_window() {
        let ev = decode(r#"{"msg":"작업자 고장","workerId":"A2","ts":1000}"#).unwrap();
        match ev {
            SimEvent::Broken { broken_until, .. } => {
                assert_eq!(broken_until, Timestamp::from_millis(11_000));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn encoded_breakdown_carries_alarm_fields() {
        let ev = SimEvent::Broken {
            worker_id: WorkerId::new("B3").unwrap(),
            broken_until: Timestamp::from_millis(9_000),
            at: Timestamp::from_millis(4_000),
        };
        let json: serde_json::Value = serde_json::from_str(&encode(&ev).unwrap()).unwrap();
        assert_eq!(json["msg"], MSG_BROKEN);
        assert_eq!(json["category"], "ALARM");
        assert_eq!(json["severity"], "CRITICAL");
        assert_eq!(json["workerId"], "B3");
        assert_eq!(json["brokenUntil"], 9_000);
        assert!(json.get("waybillId").is_none());
    }

    #[test]
    fn accident_message_maps_to_accident_outcome() {
        let ev = decode(
            r#"{"msg":"사고 발생","category":"ALARM","waybillId":"W9","workerId":"A1","operatorId":7,"operatorName":"kim"}"#,
        )
        .unwrap();
        match ev {
            SimEvent::Processed {
                outcome, operator, ..
            } => {
                assert_eq!(outcome, ProcessOutcome::Accident);
                assert_eq!(
                    operator,
                    Some(Operator {
                        id: 7,
                        name: "kim".to_string()
                    })
                );
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
