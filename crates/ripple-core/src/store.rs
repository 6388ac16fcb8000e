//! Shared snapshot store
//!
//! An explicit, dependency-injected store instance; there is no global.
//! Consumers read clones of the current snapshot and watch a change
//! generation to learn when to read again; no reactive framework on this
//! side of the boundary. Tests can spin up as many isolated stores as they
//! like.

use tokio::sync::{watch, Mutex};

use crate::message::Message;
use crate::router::reduce;
use crate::state::AppState;

/// Owns the canonical [`AppState`] and notifies observers of changes
pub struct Store {
    state: Mutex<AppState>,
    changed: watch::Sender<u64>,
}

impl Store {
    pub fn new(page_size: usize) -> Self {
        let (changed, _) = watch::channel(0);
        Self {
            state: Mutex::new(AppState::new(page_size)),
            changed,
        }
    }

    /// Clone of the current snapshot.
    pub async fn snapshot(&self) -> AppState {
        self.state.lock().await.clone()
    }

    /// Watch the change generation; it increments once per observable
    /// change. Pair with [`Store::snapshot`] to read the new state.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.changed.subscribe()
    }

    /// Fold one inbound message through the reducer. Observers are only
    /// notified when the reducer reports a change.
    pub async fn apply(&self, message: &Message) {
        let changed = {
            let mut guard = self.state.lock().await;
            let current = std::mem::take(&mut *guard);
            let (next, changed) = reduce(current, message);
            *guard = next;
            changed
        };
        if changed {
            self.bump();
        }
    }

    /// Run a closure against the state. Used by the mutation controller
    /// and the page driver; always notifies observers.
    pub async fn update_with<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut AppState) -> R,
    {
        let result = {
            let mut guard = self.state.lock().await;
            f(&mut guard)
        };
        self.bump();
        result
    }

    fn bump(&self) {
        self.changed.send_modify(|generation| *generation += 1);
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new(crate::state::DEFAULT_PAGE_SIZE)
    }
}
