//! Abstract remote document store.
//!
//! The reconciler consumes this trait and nothing vendor-specific: an
//! adapter may be the HTTP store in [`crate::remote_http`], an in-process
//! [`MemoryDocStore`], or anything else that can fail. Failures never
//! propagate past the reconciler boundary; they degrade to the cache tier.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::types::Identity;
use crate::week::WeekKey;

/// Errors from remote store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Request failed: {0}")]
    Request(String),

    #[error("Failed to parse store response: {0}")]
    Parse(String),
}

/// Callback invoked with the new document when a subscribed path changes.
pub type ChangeCallback = Arc<dyn Fn(Value) + Send + Sync>;

/// Handle returned by [`DocumentStore::subscribe`]. Call [`cancel`] (or just
/// drop the handle after calling it) to stop receiving change callbacks.
///
/// [`cancel`]: UnsubscribeHandle::cancel
pub struct UnsubscribeHandle(Box<dyn FnOnce() + Send>);

impl UnsubscribeHandle {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self(Box::new(cancel))
    }

    pub fn cancel(self) {
        (self.0)()
    }
}

/// Networked per-identity document store.
///
/// All calls are asynchronous and may fail. `list_children` returns
/// `(child id, document)` pairs so callers can address children for
/// deletion.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Resolves once, to whether the store is reachable. Adapters bound
    /// this internally (retry/backoff); it never hangs the caller.
    async fn ready(&self) -> bool;

    /// Read a document. Absence is not an error.
    async fn get(&self, path: &str) -> Result<Option<Value>, StoreError>;

    /// Write a document in full (last-writer-wins, no merge).
    async fn set(&self, path: &str, doc: &Value) -> Result<(), StoreError>;

    /// Delete a document. Deleting an absent document is not an error.
    async fn delete(&self, path: &str) -> Result<(), StoreError>;

    /// List child documents of a collection path.
    async fn list_children(&self, path: &str) -> Result<Vec<(String, Value)>, StoreError>;

    /// Register a change callback for a document path. Returns `None` when
    /// the adapter does not support change feeds.
    fn subscribe(&self, path: &str, on_change: ChangeCallback) -> Option<UnsubscribeHandle>;
}

// ---------------------------------------------------------------------------
// Partition paths
// ---------------------------------------------------------------------------

/// Collection of week documents.
pub const PLANS_COLLECTION: &str = "weekly-plans";
/// Collection of review snapshots.
pub const REVIEWS_COLLECTION: &str = "weekly-reviews";
/// Path of the structure template inside a partition.
pub const TEMPLATE_DOC: &str = "templates/default-structure";

fn partition(identity: Option<&Identity>, suffix: &str) -> String {
    match identity {
        Some(id) => format!("users/{}/{}", id.uid, suffix),
        None => suffix.to_string(),
    }
}

/// `weekly-plans/{weekKey}`, scoped to `users/{uid}/` when signed in.
pub fn plan_path(identity: Option<&Identity>, week_key: &WeekKey) -> String {
    partition(identity, &format!("{}/{}", PLANS_COLLECTION, week_key))
}

/// `templates/default-structure`, scoped to `users/{uid}/` when signed in.
pub fn template_path(identity: Option<&Identity>) -> String {
    partition(identity, TEMPLATE_DOC)
}

/// `weekly-reviews/{weekKey}`, scoped to `users/{uid}/` when signed in.
pub fn review_path(identity: Option<&Identity>, week_key: &WeekKey) -> String {
    partition(identity, &format!("{}/{}", REVIEWS_COLLECTION, week_key))
}

/// The reviews collection path for listing.
pub fn reviews_collection(identity: Option<&Identity>) -> String {
    partition(identity, REVIEWS_COLLECTION)
}

/// The plans collection path for listing.
pub fn plans_collection(identity: Option<&Identity>) -> String {
    partition(identity, PLANS_COLLECTION)
}

// ---------------------------------------------------------------------------
// In-process store
// ---------------------------------------------------------------------------

type SubscriberMap = Mutex<HashMap<String, Vec<(u64, ChangeCallback)>>>;

/// In-process document store.
///
/// Backs tests and cache-only operation, with switches to force the
/// offline and write-failure paths the reconciler must degrade through.
/// `push` delivers a document to subscribers the way a remote change
/// feed would.
#[derive(Default)]
pub struct MemoryDocStore {
    docs: Mutex<HashMap<String, Value>>,
    subscribers: Arc<SubscriberMap>,
    next_subscriber_id: AtomicU64,
    offline: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemoryDocStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Force every call to fail as unreachable.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Force writes (set/delete) to fail while reads keep working.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Store a document and notify subscribers, as a remote peer would.
    pub fn push(&self, path: &str, doc: Value) {
        if let Ok(mut docs) = self.docs.lock() {
            docs.insert(path.to_string(), doc.clone());
        }
        let callbacks: Vec<ChangeCallback> = self
            .subscribers
            .lock()
            .map(|subs| {
                subs.get(path)
                    .map(|list| list.iter().map(|(_, cb)| cb.clone()).collect())
                    .unwrap_or_default()
            })
            .unwrap_or_default();
        for cb in callbacks {
            cb(doc.clone());
        }
    }

    /// Number of stored documents.
    pub fn len(&self) -> usize {
        self.docs.lock().map(|d| d.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_online(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("store offline".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryDocStore {
    async fn ready(&self) -> bool {
        !self.offline.load(Ordering::SeqCst)
    }

    async fn get(&self, path: &str) -> Result<Option<Value>, StoreError> {
        self.check_online()?;
        let docs = self
            .docs
            .lock()
            .map_err(|_| StoreError::Request("store lock poisoned".to_string()))?;
        Ok(docs.get(path).cloned())
    }

    async fn set(&self, path: &str, doc: &Value) -> Result<(), StoreError> {
        self.check_online()?;
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Request("write failure injected".to_string()));
        }
        let mut docs = self
            .docs
            .lock()
            .map_err(|_| StoreError::Request("store lock poisoned".to_string()))?;
        docs.insert(path.to_string(), doc.clone());
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<(), StoreError> {
        self.check_online()?;
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Request("write failure injected".to_string()));
        }
        let mut docs = self
            .docs
            .lock()
            .map_err(|_| StoreError::Request("store lock poisoned".to_string()))?;
        docs.remove(path);
        Ok(())
    }

    async fn list_children(&self, path: &str) -> Result<Vec<(String, Value)>, StoreError> {
        self.check_online()?;
        let docs = self
            .docs
            .lock()
            .map_err(|_| StoreError::Request("store lock poisoned".to_string()))?;
        let prefix = format!("{}/", path);
        let mut children: Vec<(String, Value)> = docs
            .iter()
            .filter_map(|(key, value)| {
                key.strip_prefix(&prefix)
                    .filter(|rest| !rest.contains('/'))
                    .map(|rest| (rest.to_string(), value.clone()))
            })
            .collect();
        children.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(children)
    }

    fn subscribe(&self, path: &str, on_change: ChangeCallback) -> Option<UnsubscribeHandle> {
        if self.offline.load(Ordering::SeqCst) {
            return None;
        }
        let id = self.next_subscriber_id.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut subs) = self.subscribers.lock() {
            subs.entry(path.to_string()).or_default().push((id, on_change));
        }
        let subscribers = Arc::clone(&self.subscribers);
        let path = path.to_string();
        Some(UnsubscribeHandle::new(move || {
            if let Ok(mut subs) = subscribers.lock() {
                if let Some(list) = subs.get_mut(&path) {
                    list.retain(|(entry_id, _)| *entry_id != id);
                }
            }
        }))
    }
}
