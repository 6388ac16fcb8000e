//! Canonical application snapshot
//!
//! `AppState` is the single observable state the channels and the mutation
//! controller converge on. Rendering, persistence and any UI live outside
//! this crate and only ever see clones of the snapshot.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::history::BoundedHistory;
use crate::pages::Page;

/// Capacity of the raw event history
pub const EVENTS_CAPACITY: usize = 100;
/// Capacity of the log-event history
pub const LOG_EVENTS_CAPACITY: usize = 200;
/// Capacity of the timeline history
pub const TIMELINE_CAPACITY: usize = 200;
/// Default logs page size when none is configured
pub const DEFAULT_PAGE_SIZE: usize = 50;

/// Spatial scene snapshot. Cluster payloads are opaque to this crate;
/// rendering them is someone else's job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpatialSnapshot {
    #[serde(default)]
    pub clusters: Vec<Value>,
    #[serde(default)]
    pub revision: u64,
}

/// Activation levels keyed by region name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivationSnapshot {
    #[serde(default)]
    pub regions: Map<String, Value>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// A single point on the activity timeline
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimelinePoint {
    pub t: f64,
    pub value: f64,
}

/// Status of the external resource backing the stream
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExternalResourceSnapshot {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub detail: Value,
}

/// The full observable snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppState {
    pub spatial: SpatialSnapshot,
    pub activation: ActivationSnapshot,
    pub controls: BTreeMap<String, Value>,
    pub events: BoundedHistory<Value>,
    pub log_events: BoundedHistory<crate::models::LogEntry>,
    pub timeline: BoundedHistory<TimelinePoint>,
    pub logs: Page,
    pub resource: ExternalResourceSnapshot,
}

impl AppState {
    pub fn new(page_size: usize) -> Self {
        Self {
            spatial: SpatialSnapshot::default(),
            activation: ActivationSnapshot::default(),
            controls: BTreeMap::new(),
            events: BoundedHistory::new(EVENTS_CAPACITY),
            log_events: BoundedHistory::new(LOG_EVENTS_CAPACITY),
            timeline: BoundedHistory::new(TIMELINE_CAPACITY),
            logs: Page::new(page_size),
            resource: ExternalResourceSnapshot::default(),
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_SIZE)
    }
}
