// src/store.rs
// Persistence ports and the in-memory reference implementations.
//
// The item store's uniqueness guarantee is the one cross-worker
// synchronization primitive the pipeline relies on: `upsert_if_absent` is a
// single atomic insert-and-detect-conflict, never a lookup followed by an
// insert. Concurrent pollers racing on the same key get exactly one
// `Inserted`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use chrono::Utc;

use crate::error::PersistenceError;
use crate::model::{Alert, Cursor, FeedbackItem, ItemKey, NewAlert, SentimentLabel, Source};

/// Outcome of an idempotent insert. `AlreadyExists` is expected traffic, not
/// an error: it short-circuits metric and alert side effects for the item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    AlreadyExists,
}

#[async_trait::async_trait]
pub trait ItemStore: Send + Sync {
    /// Atomic insert keyed by `(source, source_id)`.
    async fn upsert_if_absent(&self, item: FeedbackItem)
        -> Result<UpsertOutcome, PersistenceError>;

    async fn get(&self, key: &ItemKey) -> Result<Option<FeedbackItem>, PersistenceError>;

    /// Count of stored items for `source` whose label is known. Used by the
    /// counter-consistency audit, never by the ingest path itself.
    async fn count_labeled(&self, source: Source) -> Result<u64, PersistenceError>;
}

#[async_trait::async_trait]
pub trait AlertStore: Send + Sync {
    /// Persist an alert unless one already exists for the same trigger item.
    /// Returns the stored alert on first insert, `None` on the duplicate
    /// path. Backstops the upstream per-item dedup.
    async fn insert_if_absent(&self, alert: NewAlert) -> Result<Option<Alert>, PersistenceError>;

    /// Idempotent: acknowledging an acknowledged (or unknown) alert is a
    /// no-op.
    async fn acknowledge(&self, id: u64) -> Result<(), PersistenceError>;

    async fn list(&self) -> Result<Vec<Alert>, PersistenceError>;
}

#[async_trait::async_trait]
pub trait CursorStore: Send + Sync {
    async fn load(&self, source: Source) -> Result<Cursor, PersistenceError>;

    /// Called only after a batch completed cleanly.
    async fn advance(&self, source: Source, cursor: Cursor) -> Result<(), PersistenceError>;
}

// ---------------------------------------------------------------------------
// In-memory implementations
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryItemStore {
    inner: Mutex<HashMap<ItemKey, FeedbackItem>>,
}

impl MemoryItemStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl ItemStore for MemoryItemStore {
    async fn upsert_if_absent(
        &self,
        item: FeedbackItem,
    ) -> Result<UpsertOutcome, PersistenceError> {
        let mut map = self.inner.lock().expect("item store mutex poisoned");
        match map.entry(item.key()) {
            std::collections::hash_map::Entry::Occupied(_) => Ok(UpsertOutcome::AlreadyExists),
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(item);
                Ok(UpsertOutcome::Inserted)
            }
        }
    }

    async fn get(&self, key: &ItemKey) -> Result<Option<FeedbackItem>, PersistenceError> {
        let map = self.inner.lock().expect("item store mutex poisoned");
        Ok(map.get(key).cloned())
    }

    async fn count_labeled(&self, source: Source) -> Result<u64, PersistenceError> {
        let map = self.inner.lock().expect("item store mutex poisoned");
        Ok(map
            .values()
            .filter(|it| it.source == source && it.sentiment != SentimentLabel::Unknown)
            .count() as u64)
    }
}

pub struct MemoryAlertStore {
    inner: Mutex<MemoryAlertInner>,
    next_id: AtomicU64,
}

#[derive(Default)]
struct MemoryAlertInner {
    by_id: HashMap<u64, Alert>,
    by_trigger: HashMap<ItemKey, u64>,
}

impl MemoryAlertStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MemoryAlertInner::default()),
            next_id: AtomicU64::new(1),
        }
    }
}

impl Default for MemoryAlertStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl AlertStore for MemoryAlertStore {
    async fn insert_if_absent(&self, alert: NewAlert) -> Result<Option<Alert>, PersistenceError> {
        let mut inner = self.inner.lock().expect("alert store mutex poisoned");
        if inner.by_trigger.contains_key(&alert.trigger) {
            return Ok(None);
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let stored = Alert {
            id,
            trigger: alert.trigger.clone(),
            severity: alert.severity,
            category: alert.category,
            message: alert.message,
            source_url: alert.source_url,
            acknowledged: false,
            created_at: Utc::now(),
        };
        inner.by_trigger.insert(alert.trigger, id);
        inner.by_id.insert(id, stored.clone());
        Ok(Some(stored))
    }

    async fn acknowledge(&self, id: u64) -> Result<(), PersistenceError> {
        let mut inner = self.inner.lock().expect("alert store mutex poisoned");
        if let Some(a) = inner.by_id.get_mut(&id) {
            a.acknowledged = true;
        }
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Alert>, PersistenceError> {
        let inner = self.inner.lock().expect("alert store mutex poisoned");
        let mut all: Vec<Alert> = inner.by_id.values().cloned().collect();
        all.sort_by_key(|a| a.id);
        Ok(all)
    }
}

#[derive(Default)]
pub struct MemoryCursorStore {
    inner: Mutex<HashMap<Source, Cursor>>,
}

impl MemoryCursorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl CursorStore for MemoryCursorStore {
    async fn load(&self, source: Source) -> Result<Cursor, PersistenceError> {
        let map = self.inner.lock().expect("cursor store mutex poisoned");
        Ok(map.get(&source).cloned().unwrap_or_default())
    }

    async fn advance(&self, source: Source, cursor: Cursor) -> Result<(), PersistenceError> {
        let mut map = self.inner.lock().expect("cursor store mutex poisoned");
        map.insert(source, cursor);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Severity;
    use chrono::Utc;
    use std::sync::Arc;

    fn item(source: Source, id: &str, label: SentimentLabel) -> FeedbackItem {
        FeedbackItem {
            source,
            source_id: id.to_string(),
            text: "text".into(),
            sentiment: label,
            confidence: 0.9,
            urgent: false,
            created_at: Utc::now(),
            ingested_at: Utc::now(),
            cross_reference: None,
        }
    }

    #[tokio::test]
    async fn second_upsert_of_same_key_is_already_exists() {
        let store = MemoryItemStore::new();
        let a = item(Source::TwitterPost, "t1", SentimentLabel::Positive);
        assert_eq!(
            store.upsert_if_absent(a.clone()).await.unwrap(),
            UpsertOutcome::Inserted
        );
        assert_eq!(
            store.upsert_if_absent(a).await.unwrap(),
            UpsertOutcome::AlreadyExists
        );
    }

    #[tokio::test]
    async fn same_id_different_source_are_distinct_items() {
        let store = MemoryItemStore::new();
        let a = item(Source::TwitterPost, "42", SentimentLabel::Positive);
        let b = item(Source::YoutubeComment, "42", SentimentLabel::Negative);
        assert_eq!(
            store.upsert_if_absent(a).await.unwrap(),
            UpsertOutcome::Inserted
        );
        assert_eq!(
            store.upsert_if_absent(b).await.unwrap(),
            UpsertOutcome::Inserted
        );
    }

    #[tokio::test]
    async fn count_labeled_skips_unknown() {
        let store = MemoryItemStore::new();
        for (id, label) in [
            ("a", SentimentLabel::Positive),
            ("b", SentimentLabel::Unknown),
            ("c", SentimentLabel::Negative),
        ] {
            store
                .upsert_if_absent(item(Source::FormResponse, id, label))
                .await
                .unwrap();
        }
        assert_eq!(store.count_labeled(Source::FormResponse).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn concurrent_upserts_of_one_key_yield_exactly_one_insert() {
        let store = Arc::new(MemoryItemStore::new());
        let mut handles = Vec::new();
        for _ in 0..32 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store
                    .upsert_if_absent(item(Source::InstagramComment, "dup", SentimentLabel::Neutral))
                    .await
                    .unwrap()
            }));
        }
        let mut inserted = 0;
        for h in handles {
            if h.await.unwrap() == UpsertOutcome::Inserted {
                inserted += 1;
            }
        }
        assert_eq!(inserted, 1);
    }

    #[tokio::test]
    async fn alert_store_debounces_per_trigger_and_acks_idempotently() {
        let store = MemoryAlertStore::new();
        let mk = || NewAlert {
            trigger: ItemKey::new(Source::TwitterPost, "t2"),
            severity: Severity::Critical,
            category: "safety".into(),
            message: "Immediate attention required".into(),
            source_url: None,
        };
        let first = store.insert_if_absent(mk()).await.unwrap();
        assert!(first.is_some());
        assert!(store.insert_if_absent(mk()).await.unwrap().is_none());

        let id = first.unwrap().id;
        store.acknowledge(id).await.unwrap();
        store.acknowledge(id).await.unwrap();
        store.acknowledge(9999).await.unwrap();
        let all = store.list().await.unwrap();
        assert_eq!(all.len(), 1);
        assert!(all[0].acknowledged);
    }

    #[tokio::test]
    async fn cursor_store_round_trips_per_source() {
        let store = MemoryCursorStore::new();
        assert_eq!(store.load(Source::TwitterPost).await.unwrap(), Cursor::start());
        store
            .advance(Source::TwitterPost, Cursor::at("t9"))
            .await
            .unwrap();
        assert_eq!(store.load(Source::TwitterPost).await.unwrap(), Cursor::at("t9"));
        assert_eq!(store.load(Source::FormResponse).await.unwrap(), Cursor::start());
    }
}
