//! Paginated log collection reconciliation
//!
//! The logs page is fetched from the REST collection but kept fresh by push
//! events. Reconciliation rules keep the visible page within `page_size`
//! while the total count tracks the whole collection:
//!
//! - an upsert for an entry already on the page merges in place
//! - a new entry prepends on page 0, evicting past the page size (the
//!   evicted row is still reachable by fetching the next page)
//! - on a later page only the total moves; visible rows stay put
//! - a bulk resync replaces the page wholesale
//!
//! Page navigation always goes back to REST; push only maintains the page
//! currently on display.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::error::SyncResult;
use crate::models::{LogEntry, LogPatch, SyncStatus};
use crate::rest::LogApi;
use crate::store::Store;

/// One materialized page of the log collection
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page {
    pub items: Vec<LogEntry>,
    pub page_index: usize,
    pub page_size: usize,
    pub total_count: usize,
    /// Identities counted into `total_count` without being visible on the
    /// current page. A creation confirmed over REST and echoed over push
    /// must settle on a single increment no matter which lands first.
    #[serde(skip)]
    counted_off_page: HashSet<String>,
}

impl Page {
    pub fn new(page_size: usize) -> Self {
        Self {
            items: Vec::new(),
            page_index: 0,
            page_size,
            total_count: 0,
            counted_off_page: HashSet::new(),
        }
    }

    /// Install freshly fetched page contents.
    pub fn apply_fetched(&mut self, page_index: usize, items: Vec<LogEntry>, total: usize) {
        self.page_index = page_index;
        self.items = items;
        self.items.truncate(self.page_size);
        self.total_count = total;
        self.counted_off_page.clear();
    }

    /// Authoritative resync: replaces the page wholesale.
    pub fn apply_replace(&mut self, items: Vec<LogEntry>, total: usize) {
        self.items = items;
        self.items.truncate(self.page_size);
        self.total_count = total;
        self.counted_off_page.clear();
    }

    /// Merge a pushed entry into the page.
    ///
    /// `patch` carries only the fields the producer actually sent, so an
    /// in-place merge never clobbers fields the event omitted.
    pub fn apply_upsert(&mut self, entry: &LogEntry, patch: &LogPatch) {
        if let Some(existing) = self.items.iter_mut().find(|e| e.id == entry.id) {
            patch.apply(existing);
            if let Some(ts) = entry.timestamp {
                existing.timestamp = Some(ts);
            }
            existing.sync_status = SyncStatus::Synced;
        } else if self.page_index == 0 {
            self.items.insert(0, entry.clone());
            if self.items.len() > self.page_size {
                // Evicted row stays reachable via the next page
                self.items.truncate(self.page_size);
            }
            self.total_count += 1;
        } else {
            // Entry belongs to an earlier page; only the count moves,
            // and only once per identity
            if self.counted_off_page.insert(entry.id.clone()) {
                self.total_count += 1;
            }
        }
    }

    /// Remove a pushed deletion from the page. Idempotent: deleting an
    /// entry this page never accounted for changes nothing, including
    /// the total.
    pub fn apply_delete(&mut self, id: &str) -> bool {
        if let Some(pos) = self.items.iter().position(|e| e.id == id) {
            self.counted_off_page.remove(id);
            self.items.remove(pos);
            self.total_count = self.total_count.saturating_sub(1);
            true
        } else if self.counted_off_page.remove(id) {
            self.total_count = self.total_count.saturating_sub(1);
            true
        } else {
            false
        }
    }

    /// Account a creation confirmed over REST whose entry is not visible
    /// on the current page. If the push echo already counted the identity
    /// the optimistic increment is folded back out.
    pub fn count_created_off_page(&mut self, id: &str) {
        if !self.counted_off_page.insert(id.to_string()) {
            self.total_count = self.total_count.saturating_sub(1);
        }
    }

    /// Drop the accounting for an identity that never became real, such
    /// as the temporary id of a rejected optimistic create.
    pub fn forget_off_page(&mut self, id: &str) {
        self.counted_off_page.remove(id);
    }

    pub fn contains(&self, id: &str) -> bool {
        self.items.iter().any(|e| e.id == id)
    }
}

/// Drives page navigation against the REST collection and installs the
/// results into the shared store.
pub struct PageSync {
    store: Arc<Store>,
    api: Arc<dyn LogApi>,
}

impl PageSync {
    pub fn new(store: Arc<Store>, api: Arc<dyn LogApi>) -> Self {
        Self { store, api }
    }

    /// Fetch the given page and replace the visible page with the result.
    pub async fn goto_page(&self, page_index: usize) -> SyncResult<()> {
        let page_size = self.store.snapshot().await.logs.page_size;
        debug!(page_index, page_size, "fetching log page");

        let response = self.api.list(page_index, page_size).await?;
        self.store
            .update_with(|state| {
                state
                    .logs
                    .apply_fetched(page_index, response.items, response.total)
            })
            .await;
        Ok(())
    }

    /// Re-fetch the page currently on display.
    pub async fn refresh(&self) -> SyncResult<()> {
        let page_index = self.store.snapshot().await.logs.page_index;
        self.goto_page(page_index).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::error::SyncError;
    use crate::rest::PageResponse;
    use crate::LogDraft;

    fn entry(id: &str, message: &str) -> LogEntry {
        LogEntry::from_value(&json!({"id": id, "message": message})).unwrap()
    }

    fn message_patch(message: &str) -> LogPatch {
        LogPatch {
            message: Some(message.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_upsert_merges_in_place() {
        // page=[{1,"x"},{2,"y"}], size 2, total 5; upsert {2,"y2"}
        let mut page = Page::new(2);
        page.apply_fetched(0, vec![entry("1", "x"), entry("2", "y")], 5);

        page.apply_upsert(&entry("2", "y2"), &message_patch("y2"));

        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0].message, "x");
        assert_eq!(page.items[1].message, "y2");
        assert_eq!(page.total_count, 5);
    }

    #[test]
    fn test_upsert_prepends_and_evicts_on_page_zero() {
        // page 0=[{2},{1}], size 2, total 2; create id 3
        let mut page = Page::new(2);
        page.apply_fetched(0, vec![entry("2", "b"), entry("1", "a")], 2);

        let created = entry("3", "c");
        page.apply_upsert(&created, &message_patch("c"));

        let ids: Vec<&str> = page.items.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["3", "2"]);
        assert_eq!(page.total_count, 3);
    }

    #[test]
    fn test_upsert_on_later_page_only_moves_total() {
        let mut page = Page::new(2);
        page.apply_fetched(1, vec![entry("5", "e"), entry("4", "d")], 6);

        page.apply_upsert(&entry("9", "new"), &message_patch("new"));

        let ids: Vec<&str> = page.items.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["5", "4"]);
        assert_eq!(page.total_count, 7);
    }

    #[test]
    fn test_delete_is_idempotent() {
        let mut page = Page::new(3);
        page.apply_fetched(0, vec![entry("1", "a"), entry("2", "b")], 2);

        assert!(page.apply_delete("1"));
        let after_first = page.clone();

        assert!(!page.apply_delete("1"));
        assert_eq!(page, after_first);
        assert_eq!(page.total_count, 1);
    }

    #[test]
    fn test_page_size_invariant_under_push_storm() {
        let mut page = Page::new(3);
        page.apply_fetched(0, vec![], 0);

        for i in 0..50 {
            let id = i.to_string();
            page.apply_upsert(&entry(&id, "m"), &message_patch("m"));
            if i % 7 == 0 {
                page.apply_delete(&(i / 2).to_string());
            }
            assert!(page.items.len() <= page.page_size);
        }
    }

    #[test]
    fn test_replace_wins_wholesale() {
        let mut page = Page::new(2);
        page.apply_fetched(0, vec![entry("1", "a")], 1);

        page.apply_replace(vec![entry("9", "z"), entry("8", "y"), entry("7", "x")], 10);

        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0].id, "9");
        assert_eq!(page.total_count, 10);
    }

    #[test]
    fn test_off_page_upsert_counts_each_identity_once() {
        let mut page = Page::new(2);
        page.apply_fetched(1, vec![entry("5", "e"), entry("4", "d")], 6);

        page.apply_upsert(&entry("9", "new"), &message_patch("new"));
        page.apply_upsert(&entry("9", "edited"), &message_patch("edited"));

        assert_eq!(page.total_count, 7);
    }

    #[test]
    fn test_off_page_delete_of_counted_identity_moves_total() {
        let mut page = Page::new(2);
        page.apply_fetched(1, vec![entry("5", "e"), entry("4", "d")], 6);
        page.apply_upsert(&entry("9", "new"), &message_patch("new"));
        assert_eq!(page.total_count, 7);

        assert!(page.apply_delete("9"));
        assert_eq!(page.total_count, 6);
        // Second delete of the same identity is a no-op
        assert!(!page.apply_delete("9"));
        assert_eq!(page.total_count, 6);
    }

    #[test]
    fn test_count_created_off_page_folds_out_echo() {
        let mut page = Page::new(2);
        page.apply_fetched(1, vec![entry("5", "e"), entry("4", "d")], 5);

        // Echo counted the creation first; the confirmation folds its own
        // optimistic increment back out
        page.apply_upsert(&entry("9", "new"), &message_patch("new"));
        assert_eq!(page.total_count, 6);
        page.count_created_off_page("9");
        assert_eq!(page.total_count, 5);

        // Confirmation first: the count holds and a later echo is absorbed
        page.count_created_off_page("10");
        assert_eq!(page.total_count, 5);
        page.apply_upsert(&entry("10", "new"), &message_patch("new"));
        assert_eq!(page.total_count, 5);
    }

    #[test]
    fn test_fetch_resets_off_page_accounting() {
        let mut page = Page::new(2);
        page.apply_fetched(1, vec![entry("5", "e")], 6);
        page.apply_upsert(&entry("9", "new"), &message_patch("new"));

        page.apply_fetched(1, vec![entry("9", "new"), entry("5", "e")], 7);

        // The fetched total is authoritative; the old accounting is gone
        assert!(page.apply_delete("9"));
        assert_eq!(page.total_count, 6);
        assert!(!page.apply_delete("9"));
    }

    #[test]
    fn test_upsert_merge_resets_pending_status() {
        let mut page = Page::new(2);
        let mut pending = entry("1", "a");
        pending.sync_status = SyncStatus::PendingUpdate;
        page.apply_fetched(0, vec![pending], 1);

        page.apply_upsert(&entry("1", "a2"), &message_patch("a2"));
        assert_eq!(page.items[0].sync_status, SyncStatus::Synced);
    }

    /// Records `list` calls and serves one canned page.
    struct RecordingApi {
        calls: std::sync::Mutex<Vec<(usize, usize)>>,
    }

    #[async_trait::async_trait]
    impl LogApi for RecordingApi {
        async fn list(&self, page: usize, page_size: usize) -> SyncResult<PageResponse> {
            self.calls.lock().unwrap().push((page, page_size));
            Ok(PageResponse {
                items: vec![entry("9", "i"), entry("8", "h")],
                total: 12,
            })
        }

        async fn get(&self, _id: &str) -> SyncResult<LogEntry> {
            Err(SyncError::Transport("unused".to_string()))
        }

        async fn create(&self, _draft: &LogDraft) -> SyncResult<LogEntry> {
            Err(SyncError::Transport("unused".to_string()))
        }

        async fn update(&self, _id: &str, _patch: &LogPatch) -> SyncResult<LogEntry> {
            Err(SyncError::Transport("unused".to_string()))
        }

        async fn delete(&self, _id: &str) -> SyncResult<()> {
            Err(SyncError::Transport("unused".to_string()))
        }
    }

    #[tokio::test]
    async fn test_goto_page_fetches_and_installs() {
        let store = Arc::new(Store::new(2));
        let api = Arc::new(RecordingApi {
            calls: std::sync::Mutex::new(Vec::new()),
        });
        let sync = PageSync::new(store.clone(), api.clone());

        sync.goto_page(3).await.unwrap();

        assert_eq!(*api.calls.lock().unwrap(), vec![(3, 2)]);
        let snapshot = store.snapshot().await;
        assert_eq!(snapshot.logs.page_index, 3);
        assert_eq!(snapshot.logs.total_count, 12);
        let ids: Vec<&str> = snapshot.logs.items.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["9", "8"]);
    }

    #[tokio::test]
    async fn test_refresh_refetches_current_page() {
        let store = Arc::new(Store::new(2));
        let api = Arc::new(RecordingApi {
            calls: std::sync::Mutex::new(Vec::new()),
        });
        let sync = PageSync::new(store.clone(), api.clone());

        sync.goto_page(3).await.unwrap();
        sync.refresh().await.unwrap();

        // Every navigation goes back to REST, including staying in place
        assert_eq!(*api.calls.lock().unwrap(), vec![(3, 2), (3, 2)]);
        assert_eq!(store.snapshot().await.logs.page_index, 3);
    }
}
