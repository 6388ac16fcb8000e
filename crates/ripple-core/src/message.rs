//! Wire message types
//!
//! Inbound messages are JSON envelopes tagged by a `kind` field. Decoding
//! is two-stage: parse to a `serde_json::Value`, then normalize the
//! kind-specific payload. The normalization layer is also where producer
//! schema drift is absorbed: payloads wrapped in `log`/`entry`/`data`/
//! `payload` and legacy identity keys are accepted here and nowhere else.
//!
//! Unrecognized kinds decode to [`Message::Unknown`] and are ignored by
//! the reducer, so newer servers can ship new kinds without breaking old
//! clients.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{SyncError, SyncResult};
use crate::models::{identity_key, LogEntry, LogPatch};
use crate::state::{ActivationSnapshot, ExternalResourceSnapshot, SpatialSnapshot, TimelinePoint};

/// Payload wrapper keys accepted from drifted producers, tried in order.
const PAYLOAD_WRAPPERS: [&str; 4] = ["log", "entry", "data", "payload"];

/// A decoded inbound message
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Full bootstrap: replaces any subtree it carries
    InitialState {
        spatial: Option<SpatialSnapshot>,
        activation: Option<ActivationSnapshot>,
        controls: Option<BTreeMap<String, Value>>,
    },
    /// Replace the spatial subtree
    SpatialSnapshot(SpatialSnapshot),
    /// Replace the activation subtree
    ActivationSnapshot(ActivationSnapshot),
    /// Partial merge into controls and activation regions
    StateDelta {
        controls: BTreeMap<String, Value>,
        regions: Map<String, Value>,
    },
    /// Append a raw event to the event history
    Event(Value),
    /// Append a log entry to the log-event history
    LogEvent(LogEntry),
    /// Append a point to the timeline history
    TimelinePoint(TimelinePoint),
    /// Authoritative resync of the whole logs page
    LogsInitial { items: Vec<LogEntry>, total: usize },
    /// A log entry was created or updated
    LogUpsert { entry: LogEntry, patch: LogPatch },
    /// A log entry was removed
    LogDelete { id: String },
    /// Replace the external-resource snapshot
    ResourceStatus(ExternalResourceSnapshot),
    /// Server keepalive; no state change
    Keepalive,
    /// Forward compatibility: unrecognized kinds are ignored, not rejected
    Unknown { kind: String },
}

impl Message {
    /// Decode a text frame.
    pub fn decode(raw: &str) -> SyncResult<Self> {
        let value: Value =
            serde_json::from_str(raw).map_err(|e| SyncError::Parse(e.to_string()))?;
        Self::from_value(&value)
    }

    /// Decode a binary frame carrying UTF-8 JSON.
    pub fn decode_bytes(raw: &[u8]) -> SyncResult<Self> {
        let value: Value =
            serde_json::from_slice(raw).map_err(|e| SyncError::Parse(e.to_string()))?;
        Self::from_value(&value)
    }

    /// Normalize a parsed envelope into a typed message.
    pub fn from_value(value: &Value) -> SyncResult<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| SyncError::Parse("message envelope is not an object".to_string()))?;
        let kind = obj
            .get("kind")
            .and_then(Value::as_str)
            .ok_or_else(|| SyncError::Parse("message envelope has no kind".to_string()))?;

        match kind {
            "initial_state" => Ok(Message::InitialState {
                spatial: optional_subtree(value, &["spatial", "brain_space"])?,
                activation: optional_subtree(value, &["activation"])?,
                controls: optional_subtree(value, &["controls"])?,
            }),
            "spatial_snapshot" => Ok(Message::SpatialSnapshot(subtree(unwrap_payload(value))?)),
            "activation_snapshot" => {
                Ok(Message::ActivationSnapshot(subtree(unwrap_payload(value))?))
            }
            "state_delta" => Ok(Message::StateDelta {
                controls: optional_subtree(value, &["controls"])?.unwrap_or_default(),
                regions: optional_subtree(value, &["regions"])?.unwrap_or_default(),
            }),
            "event" => {
                let payload = value
                    .get("event")
                    .filter(|v| v.is_object())
                    .unwrap_or_else(|| unwrap_payload(value));
                Ok(Message::Event(payload.clone()))
            }
            "log_event" => Ok(Message::LogEvent(LogEntry::from_value(unwrap_payload(
                value,
            ))?)),
            "timeline_point" => Ok(Message::TimelinePoint(subtree(unwrap_payload(value))?)),
            "logs_initial" => {
                let (items, total) = decode_log_list(value)?;
                Ok(Message::LogsInitial { items, total })
            }
            "log_created" | "log_updated" => {
                let payload = unwrap_payload(value);
                Ok(Message::LogUpsert {
                    entry: LogEntry::from_value(payload)?,
                    patch: LogPatch::from_value(payload),
                })
            }
            "log_deleted" => {
                let id = identity_key(unwrap_payload(value))
                    .or_else(|| identity_key(value))
                    .ok_or_else(|| {
                        SyncError::Parse("log_deleted message has no identity key".to_string())
                    })?;
                Ok(Message::LogDelete { id })
            }
            "resource_status" => Ok(Message::ResourceStatus(subtree(unwrap_payload(value))?)),
            "ping" | "ack" => Ok(Message::Keepalive),
            other => Ok(Message::Unknown {
                kind: other.to_string(),
            }),
        }
    }
}

/// Messages this client sends. Fire-and-forget; there is no
/// acknowledgment contract.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Invoke a server-side command
    Command {
        name: String,
        #[serde(skip_serializing_if = "Value::is_null")]
        args: Value,
    },
    /// Push a settings change to the server
    UpdateSetting { key: String, value: Value },
}

impl ClientMessage {
    pub fn command(name: impl Into<String>) -> Self {
        ClientMessage::Command {
            name: name.into(),
            args: Value::Null,
        }
    }

    pub fn update_setting(key: impl Into<String>, value: Value) -> Self {
        ClientMessage::UpdateSetting {
            key: key.into(),
            value,
        }
    }

    /// Encode to a JSON text frame.
    pub fn encode(&self) -> String {
        serde_json::to_string(self).expect("JSON encoding failed")
    }
}

/// Peel one level of payload wrapping if present; otherwise the envelope
/// itself carries the fields.
fn unwrap_payload(value: &Value) -> &Value {
    for key in PAYLOAD_WRAPPERS {
        if let Some(inner) = value.get(key) {
            if inner.is_object() {
                return inner;
            }
        }
    }
    value
}

fn subtree<T: serde::de::DeserializeOwned>(value: &Value) -> SyncResult<T> {
    serde_json::from_value(value.clone()).map_err(|e| SyncError::Parse(e.to_string()))
}

fn optional_subtree<T: serde::de::DeserializeOwned>(
    value: &Value,
    keys: &[&str],
) -> SyncResult<Option<T>> {
    for key in keys {
        if let Some(inner) = value.get(*key) {
            if !inner.is_null() {
                return subtree(inner).map(Some);
            }
        }
    }
    Ok(None)
}

fn decode_log_list(value: &Value) -> SyncResult<(Vec<LogEntry>, usize)> {
    let raw_items = value
        .get("logs")
        .or_else(|| value.get("items"))
        .and_then(Value::as_array)
        .ok_or_else(|| SyncError::Parse("logs_initial message has no log list".to_string()))?;

    let mut items = Vec::with_capacity(raw_items.len());
    for raw in raw_items {
        match LogEntry::from_value(raw) {
            Ok(entry) => items.push(entry),
            Err(e) => tracing::debug!("skipping unparseable log entry in resync: {e}"),
        }
    }

    let total = value
        .get("total")
        .or_else(|| value.get("total_count"))
        .and_then(Value::as_u64)
        .map(|n| n as usize)
        .unwrap_or(items.len());

    Ok((items, total))
}
