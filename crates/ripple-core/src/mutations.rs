//! Optimistic log mutations
//!
//! Create/update/delete are applied to the local page first, then sent to
//! the REST collection; a failed call rolls the page back to exactly the
//! state it had before the mutation, and the error (with the server's
//! detail) is returned to the caller.
//!
//! Concurrency rule: at most one in-flight mutation per identity. A second
//! request for the same entry fails fast with `Busy` rather than being
//! queued, which also makes a late REST response harmless: nothing newer
//! can have touched that entry in the meantime.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::warn;
use uuid::Uuid;

use crate::error::{SyncError, SyncResult};
use crate::models::{LogDraft, LogEntry, LogPatch, SyncStatus};
use crate::rest::LogApi;
use crate::store::Store;

/// Applies local-first mutations with rollback on failure
pub struct MutationController {
    store: Arc<Store>,
    api: Arc<dyn LogApi>,
    pending: Mutex<HashSet<String>>,
}

impl MutationController {
    pub fn new(store: Arc<Store>, api: Arc<dyn LogApi>) -> Self {
        Self {
            store,
            api,
            pending: Mutex::new(HashSet::new()),
        }
    }

    /// Create an entry: visible immediately under a temporary id, swapped
    /// for the server entry on success, removed again on failure.
    pub async fn create(&self, draft: LogDraft) -> SyncResult<LogEntry> {
        let temp_id = format!("temp-{}", Uuid::new_v4());
        self.begin(&temp_id).await?;
        let result = self.create_inner(&temp_id, draft).await;
        self.finish(&temp_id).await;
        result
    }

    /// Patch an entry in place, restoring the prior value on failure.
    pub async fn update(&self, id: &str, patch: LogPatch) -> SyncResult<LogEntry> {
        self.begin(id).await?;
        let result = self.update_inner(id, patch).await;
        self.finish(id).await;
        result
    }

    /// Remove an entry immediately, re-inserting it at its prior position
    /// on failure.
    pub async fn delete(&self, id: &str) -> SyncResult<()> {
        self.begin(id).await?;
        let result = self.delete_inner(id).await;
        self.finish(id).await;
        result
    }

    /// Whether a mutation is currently in flight for this identity.
    pub async fn is_pending(&self, id: &str) -> bool {
        self.pending.lock().await.contains(id)
    }

    async fn create_inner(&self, temp_id: &str, draft: LogDraft) -> SyncResult<LogEntry> {
        let optimistic = LogEntry {
            id: temp_id.to_string(),
            timestamp: Some(Utc::now()),
            level: if draft.level.is_empty() {
                "info".to_string()
            } else {
                draft.level.clone()
            },
            source: draft.source.clone(),
            message: draft.message.clone(),
            metadata: draft.metadata.clone(),
            sync_status: SyncStatus::PendingCreate,
        };

        self.store
            .update_with(|state| state.logs.apply_upsert(&optimistic, &LogPatch::default()))
            .await;

        match self.api.create(&draft).await {
            Ok(server_entry) => {
                self.store
                    .update_with(|state| {
                        let logs = &mut state.logs;
                        let echoed = logs.contains(&server_entry.id);
                        if echoed {
                            // A push event already delivered the server
                            // entry; the optimistic copy is now a duplicate.
                            if let Some(pos) =
                                logs.items.iter().position(|e| e.id == temp_id)
                            {
                                logs.items.remove(pos);
                                logs.total_count = logs.total_count.saturating_sub(1);
                            }
                        } else if let Some(slot) =
                            logs.items.iter_mut().find(|e| e.id == temp_id)
                        {
                            *slot = server_entry.clone();
                        } else if logs.page_index == 0 {
                            // Optimistic copy was evicted by pushes in the
                            // meantime; the entry is still the newest row.
                            logs.items.insert(0, server_entry.clone());
                            logs.items.truncate(logs.page_size);
                        } else {
                            // Confirmed but not visible on this page:
                            // re-attribute the optimistic count from the
                            // temporary id to the server id, folding out
                            // any echo that already counted it.
                            logs.forget_off_page(temp_id);
                            logs.count_created_off_page(&server_entry.id);
                        }
                    })
                    .await;
                Ok(server_entry)
            }
            Err(err) => {
                warn!("log create failed, rolling back: {err}");
                self.store
                    .update_with(|state| {
                        let logs = &mut state.logs;
                        if let Some(pos) = logs.items.iter().position(|e| e.id == temp_id) {
                            logs.items.remove(pos);
                        }
                        logs.forget_off_page(temp_id);
                        logs.total_count = logs.total_count.saturating_sub(1);
                    })
                    .await;
                Err(err)
            }
        }
    }

    async fn update_inner(&self, id: &str, patch: LogPatch) -> SyncResult<LogEntry> {
        let prior = self
            .store
            .update_with(|state| {
                state.logs.items.iter_mut().find(|e| e.id == id).map(|e| {
                    let prior = e.clone();
                    patch.apply(e);
                    e.sync_status = SyncStatus::PendingUpdate;
                    prior
                })
            })
            .await;

        let Some(prior) = prior else {
            return Err(SyncError::NotFound { id: id.to_string() });
        };

        match self.api.update(id, &patch).await {
            Ok(server_entry) => {
                self.store
                    .update_with(|state| {
                        if let Some(slot) = state.logs.items.iter_mut().find(|e| e.id == id) {
                            *slot = server_entry.clone();
                        }
                    })
                    .await;
                Ok(server_entry)
            }
            Err(err) => {
                warn!("log update failed, rolling back '{id}': {err}");
                self.store
                    .update_with(|state| {
                        if let Some(slot) = state.logs.items.iter_mut().find(|e| e.id == id) {
                            *slot = prior;
                        }
                    })
                    .await;
                Err(err)
            }
        }
    }

    async fn delete_inner(&self, id: &str) -> SyncResult<()> {
        let removed = self
            .store
            .update_with(|state| {
                state.logs.items.iter().position(|e| e.id == id).map(|pos| {
                    let entry = state.logs.items.remove(pos);
                    state.logs.total_count = state.logs.total_count.saturating_sub(1);
                    (entry, pos)
                })
            })
            .await;

        let Some((entry, position)) = removed else {
            return Err(SyncError::NotFound { id: id.to_string() });
        };

        match self.api.delete(id).await {
            Ok(()) => Ok(()),
            Err(err @ SyncError::NotFound { .. }) => {
                // Server already lost the entry; the local removal is
                // the reconciled state, but the caller still hears it.
                Err(err)
            }
            Err(err) => {
                warn!("log delete failed, restoring '{id}': {err}");
                self.store
                    .update_with(|state| {
                        let logs = &mut state.logs;
                        let position = position.min(logs.items.len());
                        logs.items.insert(position, entry);
                        logs.total_count += 1;
                    })
                    .await;
                Err(err)
            }
        }
    }

    async fn begin(&self, id: &str) -> SyncResult<()> {
        let mut pending = self.pending.lock().await;
        if !pending.insert(id.to_string()) {
            return Err(SyncError::Busy { id: id.to_string() });
        }
        Ok(())
    }

    async fn finish(&self, id: &str) {
        self.pending.lock().await.remove(id);
    }
}
