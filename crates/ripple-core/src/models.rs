//! Log entry data model
//!
//! `LogEntry` is the canonical shape for a log record regardless of whether
//! it arrived over the push channel or the REST collection. Producers have
//! drifted on field names over time (`id` vs `log_id` vs `logId`, `level`
//! vs `type`, `metadata` vs `payload`), so parsing normalizes everything
//! here at the ingestion boundary; the rest of the crate only ever sees the
//! canonical keys.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{SyncError, SyncResult};

/// Accepted identity keys, canonical first.
const IDENTITY_KEYS: [&str; 3] = ["id", "log_id", "logId"];

/// Per-entry synchronization status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Matches server truth
    #[default]
    Synced,
    /// Created locally, REST create in flight
    PendingCreate,
    /// Patched locally, REST update in flight
    PendingUpdate,
    /// Removed locally, REST delete in flight
    PendingDelete,
}

impl SyncStatus {
    pub fn is_synced(&self) -> bool {
        matches!(self, SyncStatus::Synced)
    }

    pub fn is_pending(&self) -> bool {
        !self.is_synced()
    }
}

/// A single log record
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    /// Stable identity key used for upsert/delete matching
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    /// Severity or category ("info", "warning", ...)
    pub level: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    #[serde(skip_serializing_if = "SyncStatus::is_synced")]
    pub sync_status: SyncStatus,
}

impl LogEntry {
    /// Build an entry from a JSON object, tolerating legacy field names.
    ///
    /// Fails only when no identity key can be found; every other field
    /// falls back to a default.
    pub fn from_value(value: &Value) -> SyncResult<Self> {
        let id = identity_key(value).ok_or_else(|| {
            SyncError::Parse("log entry payload has no identity key".to_string())
        })?;

        Ok(Self {
            id,
            timestamp: value
                .get("timestamp")
                .and_then(Value::as_str)
                .and_then(parse_timestamp),
            level: string_field(value, &["level", "type"]).unwrap_or_else(|| "info".to_string()),
            source: string_field(value, &["source"]),
            message: string_field(value, &["message"]).unwrap_or_default(),
            metadata: value
                .get("metadata")
                .or_else(|| value.get("payload"))
                .filter(|v| !v.is_null())
                .cloned(),
            sync_status: SyncStatus::Synced,
        })
    }
}

/// Fields for creating a new log entry
#[derive(Debug, Clone, Default, Serialize)]
pub struct LogDraft {
    pub level: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl LogDraft {
    pub fn new(level: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level: level.into(),
            message: message.into(),
            ..Default::default()
        }
    }
}

/// A partial update: only the fields that are `Some` are applied
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LogPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl LogPatch {
    pub fn is_empty(&self) -> bool {
        self.level.is_none()
            && self.source.is_none()
            && self.message.is_none()
            && self.metadata.is_none()
    }

    /// Extract the patchable fields present in a JSON object.
    pub fn from_value(value: &Value) -> Self {
        Self {
            level: string_field(value, &["level", "type"]),
            source: string_field(value, &["source"]),
            message: string_field(value, &["message"]),
            metadata: value
                .get("metadata")
                .or_else(|| value.get("payload"))
                .filter(|v| !v.is_null())
                .cloned(),
        }
    }

    /// Shallow-merge into an existing entry. Absent fields keep their
    /// current values (last-field-wins across successive patches).
    pub fn apply(&self, entry: &mut LogEntry) {
        if let Some(level) = &self.level {
            entry.level = level.clone();
        }
        if let Some(source) = &self.source {
            entry.source = Some(source.clone());
        }
        if let Some(message) = &self.message {
            entry.message = message.clone();
        }
        if let Some(metadata) = &self.metadata {
            entry.metadata = Some(metadata.clone());
        }
    }
}

/// Resolve the canonical identity key from a JSON object.
///
/// Numeric ids are stringified so REST (integer ids) and push (sometimes
/// string ids) sources match on the same key.
pub(crate) fn identity_key(value: &Value) -> Option<String> {
    for key in IDENTITY_KEYS {
        match value.get(key) {
            Some(Value::String(s)) if !s.is_empty() => return Some(s.clone()),
            Some(Value::Number(n)) => return Some(n.to_string()),
            _ => {}
        }
    }
    None
}

fn string_field(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| value.get(*key))
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
