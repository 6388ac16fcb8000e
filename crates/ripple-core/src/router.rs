//! Message reducer
//!
//! Pure fold of one inbound message into the snapshot. Takes the state by
//! value and returns the next state plus whether anything changed; only the
//! subtree a message addresses is touched. All snapshot mutation driven by
//! the push channels funnels through here.

use chrono::Utc;
use tracing::debug;

use crate::message::Message;
use crate::state::AppState;

/// Fold `message` into `state`.
///
/// The returned flag is false for keepalives, unknown kinds and deletes of
/// already-absent entries, so observers are only woken for real changes.
pub fn reduce(state: AppState, message: &Message) -> (AppState, bool) {
    let mut state = state;
    match message {
        Message::InitialState {
            spatial,
            activation,
            controls,
        } => {
            let mut changed = false;
            if let Some(spatial) = spatial {
                state.spatial = spatial.clone();
                changed = true;
            }
            if let Some(activation) = activation {
                state.activation = activation.clone();
                changed = true;
            }
            if let Some(controls) = controls {
                state.controls = controls.clone();
                changed = true;
            }
            (state, changed)
        }
        Message::SpatialSnapshot(spatial) => {
            state.spatial = spatial.clone();
            (state, true)
        }
        Message::ActivationSnapshot(activation) => {
            state.activation = activation.clone();
            (state, true)
        }
        Message::StateDelta { controls, regions } => {
            let changed = !controls.is_empty() || !regions.is_empty();
            for (key, value) in controls {
                state.controls.insert(key.clone(), value.clone());
            }
            for (key, value) in regions {
                state.activation.regions.insert(key.clone(), value.clone());
            }
            if !regions.is_empty() {
                state.activation.updated_at = Some(Utc::now());
            }
            (state, changed)
        }
        Message::Event(payload) => {
            state.events.append(payload.clone());
            (state, true)
        }
        Message::LogEvent(entry) => {
            state.log_events.append(entry.clone());
            (state, true)
        }
        Message::TimelinePoint(point) => {
            state.timeline.append(*point);
            (state, true)
        }
        Message::LogsInitial { items, total } => {
            state.logs.apply_replace(items.clone(), *total);
            (state, true)
        }
        Message::LogUpsert { entry, patch } => {
            state.logs.apply_upsert(entry, patch);
            (state, true)
        }
        Message::LogDelete { id } => {
            let changed = state.logs.apply_delete(id);
            (state, changed)
        }
        Message::ResourceStatus(resource) => {
            state.resource = resource.clone();
            (state, true)
        }
        Message::Keepalive => (state, false),
        Message::Unknown { kind } => {
            debug!(kind, "ignoring message of unknown kind");
            (state, false)
        }
    }
}
