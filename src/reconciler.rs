//! Week document reconciliation.
//!
//! `WeekSync` owns the movement of planner state between the three tiers:
//! the in-memory grid (caller-side), the local durable cache, and the
//! remote document store.
//!
//! Read precedence: remote (identity present and store reachable) → cache →
//! structure template → empty. Every successful remote read is mirrored
//! into the cache; the cache is never pushed back over remote on read, so a
//! reconnect cannot resurrect stale state.
//!
//! Write order: cache first, unconditionally (that write is the
//! durability guarantee), then best-effort remote. Remote failures are
//! logged and downgraded; they never reach the caller. Conflicts are
//! last-writer-wins in full, with no merge and no version check.

use std::sync::Arc;

use chrono::{Duration, NaiveDate, Utc};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::watch;

use crate::auth::AuthService;
use crate::cache::{self, CacheError, PlannerCache};
use crate::normalize::{document_from_value, template_from_value};
use crate::remote::{self, DocumentStore, StoreError, UnsubscribeHandle};
use crate::template::{should_update_template, template_from_document};
use crate::types::{StructureTemplate, SyncStatus, WeekDocument, DOCUMENT_VERSION};
use crate::week::{week_start_of, WeekKey};

/// Weeks pulled on sign-in besides the current one.
pub const HYDRATE_RECENT_WEEKS: usize = 4;

/// Errors that reach the caller. Remote-tier failures never do; only the
/// durable cache can fail a reconciler operation.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Which tier satisfied a week read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadSource {
    Remote,
    Cache,
}

/// Outcome of the read path for one week key.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadedWeek {
    /// A week-specific document was found.
    Document {
        doc: WeekDocument,
        source: LoadSource,
    },
    /// No saved week; this is a shape with empty goals, not data.
    Template(StructureTemplate),
    /// Nothing anywhere; the caller renders the default board.
    Empty,
}

pub struct WeekSync {
    cache: Arc<PlannerCache>,
    remote: Arc<dyn DocumentStore>,
    auth: Arc<AuthService>,
    status_tx: watch::Sender<SyncStatus>,
}

impl WeekSync {
    pub fn new(
        cache: Arc<PlannerCache>,
        remote: Arc<dyn DocumentStore>,
        auth: Arc<AuthService>,
    ) -> Self {
        let (status_tx, _) = watch::channel(SyncStatus::Offline);
        Self {
            cache,
            remote,
            auth,
            status_tx,
        }
    }

    /// Observe the sync indicator. Purely informational; editing is never
    /// gated on it.
    pub fn status(&self) -> watch::Receiver<SyncStatus> {
        self.status_tx.subscribe()
    }

    fn set_status(&self, status: SyncStatus) {
        self.status_tx.send_replace(status);
    }

    /// The identity to address the remote partition with, if the remote
    /// tier is usable at all right now.
    async fn remote_identity(&self) -> Option<crate::types::Identity> {
        let identity = self.auth.current_identity()?;
        if self.remote.ready().await {
            Some(identity)
        } else {
            self.set_status(SyncStatus::Offline);
            None
        }
    }

    // -- read path ---------------------------------------------------------

    /// Load the document for a week, walking the tier precedence order.
    pub async fn load_week(&self, key: &WeekKey) -> Result<LoadedWeek, SyncError> {
        if let Some(identity) = self.remote_identity().await {
            self.set_status(SyncStatus::Syncing);
            match self
                .remote
                .get(&remote::plan_path(Some(&identity), key))
                .await
            {
                Ok(Some(value)) => {
                    if let Some(doc) = document_from_value(value) {
                        // Cache is refreshed from remote, never the inverse.
                        self.cache.set_json(&cache::plan_key(key), &doc)?;
                        self.set_status(SyncStatus::Synced);
                        return Ok(LoadedWeek::Document {
                            doc,
                            source: LoadSource::Remote,
                        });
                    }
                    self.set_status(SyncStatus::Synced);
                }
                Ok(None) => {
                    self.set_status(SyncStatus::Synced);
                }
                Err(e) => {
                    log::warn!("Remote read failed for {key}: {e}; using cache");
                    self.set_status(SyncStatus::Offline);
                }
            }
        }

        if let Some(value) = self.cache.get_json::<Value>(&cache::plan_key(key))? {
            if let Some(doc) = document_from_value(value) {
                return Ok(LoadedWeek::Document {
                    doc,
                    source: LoadSource::Cache,
                });
            }
        }

        match self.load_structure().await? {
            Some(template) => Ok(LoadedWeek::Template(template)),
            None => Ok(LoadedWeek::Empty),
        }
    }

    /// Load the structure template, remote first, cache fallback.
    pub async fn load_structure(&self) -> Result<Option<StructureTemplate>, SyncError> {
        if let Some(identity) = self.remote_identity().await {
            match self
                .remote
                .get(&remote::template_path(Some(&identity)))
                .await
            {
                Ok(Some(value)) => {
                    if let Some(template) = template_from_value(value) {
                        self.cache.set_json(cache::STRUCTURE_KEY, &template)?;
                        return Ok(Some(template));
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    log::warn!("Remote template read failed: {e}; using cache");
                }
            }
        }

        match self.cache.get_json::<Value>(cache::STRUCTURE_KEY)? {
            Some(value) => Ok(template_from_value(value)),
            None => Ok(None),
        }
    }

    // -- write path --------------------------------------------------------

    /// Persist a serialized week: cache first (fatal on failure), then
    /// best-effort remote, then the template update policy.
    pub async fn save_week(&self, key: &WeekKey, doc: &WeekDocument) -> Result<(), SyncError> {
        let mut stamped = doc.clone();
        stamped.last_modified = Some(Utc::now().to_rfc3339());
        stamped.version = Some(DOCUMENT_VERSION.to_string());

        // Durability guarantee: nothing below can lose this write.
        self.cache.set_json(&cache::plan_key(key), &stamped)?;

        if let Some(identity) = self.remote_identity().await {
            self.set_status(SyncStatus::Syncing);
            match serde_json::to_value(&stamped) {
                Ok(value) => match self
                    .remote
                    .set(&remote::plan_path(Some(&identity), key), &value)
                    .await
                {
                    Ok(()) => self.set_status(SyncStatus::Synced),
                    Err(e) => {
                        // Non-fatal: the cache write above already succeeded.
                        log::warn!("Remote save failed for {key}: {e}");
                        self.set_status(SyncStatus::Error);
                    }
                },
                Err(e) => {
                    log::warn!("Could not encode {key} for remote: {e}");
                    self.set_status(SyncStatus::Error);
                }
            }
        }

        self.update_template_if_needed(&stamped).await?;
        Ok(())
    }

    /// Replace the stored template only when the role cardinality changed,
    /// so goal edits never reshape other weeks.
    async fn update_template_if_needed(&self, doc: &WeekDocument) -> Result<(), SyncError> {
        let stored: Option<StructureTemplate> = self.cache.get_json(cache::STRUCTURE_KEY)?;
        if !should_update_template(&doc.roles, stored.as_ref()) {
            return Ok(());
        }
        let mut template = template_from_document(doc);
        template.last_modified = Some(Utc::now().to_rfc3339());
        self.save_structure(&template).await
    }

    /// Persist the structure template: cache first, best-effort remote.
    pub async fn save_structure(&self, template: &StructureTemplate) -> Result<(), SyncError> {
        self.cache.set_json(cache::STRUCTURE_KEY, template)?;

        if let Some(identity) = self.remote_identity().await {
            match serde_json::to_value(template) {
                Ok(value) => {
                    if let Err(e) = self
                        .remote
                        .set(&remote::template_path(Some(&identity)), &value)
                        .await
                    {
                        log::warn!("Remote template save failed: {e}");
                    }
                }
                Err(e) => log::warn!("Could not encode template for remote: {e}"),
            }
        }
        Ok(())
    }

    // -- identity transitions ----------------------------------------------

    /// One-time hydration after sign-in: pull the template plus the current
    /// and recent week documents into the cache. Returns how many documents
    /// were pulled; the caller re-renders from cache afterwards.
    pub async fn hydrate_after_sign_in(&self, today: NaiveDate) -> Result<usize, SyncError> {
        let Some(identity) = self.remote_identity().await else {
            return Ok(0);
        };
        self.set_status(SyncStatus::Syncing);
        let mut pulled = 0;

        match self
            .remote
            .get(&remote::template_path(Some(&identity)))
            .await
        {
            Ok(Some(value)) => {
                if let Some(template) = template_from_value(value) {
                    self.cache.set_json(cache::STRUCTURE_KEY, &template)?;
                    pulled += 1;
                }
            }
            Ok(None) => {}
            Err(e) => log::warn!("Hydration: template pull failed: {e}"),
        }

        let mut sunday = week_start_of(today);
        for _ in 0..=HYDRATE_RECENT_WEEKS {
            let key = WeekKey::for_date(sunday);
            match self
                .remote
                .get(&remote::plan_path(Some(&identity), &key))
                .await
            {
                Ok(Some(value)) => {
                    if let Some(doc) = document_from_value(value) {
                        self.cache.set_json(&cache::plan_key(&key), &doc)?;
                        pulled += 1;
                    }
                }
                Ok(None) => {}
                Err(e) => log::warn!("Hydration: pull failed for {key}: {e}"),
            }
            sunday -= Duration::days(7);
        }

        self.set_status(SyncStatus::Synced);
        log::info!("Sign-in hydration pulled {pulled} document(s)");
        Ok(pulled)
    }

    /// Sign-out cleanup: purge every planner entry from the local cache.
    /// With no identity the remote partition is unaddressable, so the next
    /// render shows the default empty view.
    pub fn purge_local(&self) -> Result<usize, SyncError> {
        let mut removed = self.cache.purge_prefix(cache::PLAN_KEY_PREFIX)?;
        removed += self.cache.purge_prefix(cache::REVIEW_KEY_PREFIX)?;
        self.set_status(SyncStatus::Offline);
        log::info!("Sign-out purge removed {removed} cache entr(ies)");
        Ok(removed)
    }

    // -- extras ------------------------------------------------------------

    /// Wipe every remote document in the current partition: weekly plans,
    /// the structure template, and weekly reviews. Explicit reset only.
    pub async fn delete_all_remote_data(&self) -> Result<usize, SyncError> {
        let identity = self.auth.current_identity();
        let id = identity.as_ref();
        let mut removed = 0;

        for collection in [
            remote::plans_collection(id),
            remote::reviews_collection(id),
        ] {
            for (child, _) in self.remote.list_children(&collection).await? {
                self.remote
                    .delete(&format!("{}/{}", collection, child))
                    .await?;
                removed += 1;
            }
        }
        self.remote.delete(&remote::template_path(id)).await?;
        Ok(removed)
    }

    /// Mirror remote pushes for a week into the cache and hand the
    /// normalized document to the caller. `None` when the adapter has no
    /// change feed.
    pub fn subscribe_week(
        &self,
        key: &WeekKey,
        on_change: impl Fn(WeekDocument) + Send + Sync + 'static,
    ) -> Option<UnsubscribeHandle> {
        let identity = self.auth.current_identity();
        let path = remote::plan_path(identity.as_ref(), key);
        let cache = Arc::clone(&self.cache);
        let cache_key = cache::plan_key(key);
        self.remote.subscribe(
            &path,
            Arc::new(move |value| {
                if let Some(doc) = document_from_value(value) {
                    if let Err(e) = cache.set_json(&cache_key, &doc) {
                        log::warn!("Could not mirror pushed document: {e}");
                    }
                    on_change(doc);
                }
            }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::MemoryDocStore;
    use crate::types::{GoalRecord, Identity, RoleEntry};
    use serde_json::json;

    fn temp_cache() -> Arc<PlannerCache> {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("cache.db");
        std::mem::forget(dir);
        Arc::new(PlannerCache::open_at(path).expect("Failed to open test cache"))
    }

    fn temp_auth() -> Arc<AuthService> {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("identity.json");
        std::mem::forget(dir);
        Arc::new(AuthService::with_token_path(path))
    }

    fn setup() -> (WeekSync, Arc<MemoryDocStore>, Arc<AuthService>, Arc<PlannerCache>) {
        let cache = temp_cache();
        let store = Arc::new(MemoryDocStore::new());
        let auth = temp_auth();
        let sync = WeekSync::new(
            Arc::clone(&cache),
            Arc::clone(&store) as Arc<dyn DocumentStore>,
            Arc::clone(&auth),
        );
        (sync, store, auth, cache)
    }

    fn identity() -> Identity {
        Identity {
            uid: "U1".to_string(),
            email: "u1@example.com".to_string(),
        }
    }

    fn week_key() -> WeekKey {
        WeekKey::for_date(chrono::NaiveDate::from_ymd_opt(2024, 6, 12).unwrap())
    }

    fn sample_doc(role_names: &[&str]) -> WeekDocument {
        WeekDocument {
            roles: role_names
                .iter()
                .map(|name| RoleEntry {
                    name: name.to_string(),
                    color: "#a8c8ec".to_string(),
                    goals: vec![
                        GoalRecord {
                            text: format!("{name} goal"),
                            completed: false,
                        },
                        GoalRecord::empty(),
                    ],
                })
                .collect(),
            sharpen_data: vec![GoalRecord::empty(), GoalRecord::empty()],
            goal_columns_count: 2,
            week_start: "2024-06-09T00:00:00Z".to_string(),
            last_modified: None,
            version: None,
        }
    }

    #[tokio::test]
    async fn test_save_survives_remote_write_failure() {
        let (sync, store, auth, cache) = setup();
        auth.sign_in(identity()).unwrap();
        store.set_fail_writes(true);

        let key = week_key();
        sync.save_week(&key, &sample_doc(&["Parent"])).await.unwrap();

        // Cache entry is intact despite the forced remote failure.
        let cached: Option<WeekDocument> = cache.get_json(&cache::plan_key(&key)).unwrap();
        let cached = cached.expect("cache write is the durability guarantee");
        assert_eq!(cached.roles[0].name, "Parent");
        assert_eq!(cached.version.as_deref(), Some("1.0"));
        assert!(cached.last_modified.is_some());

        // Remote got nothing (template writes also failed, which is fine).
        assert!(store
            .get("users/U1/weekly-plans/week-2024-06-09")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_read_prefers_remote_and_mirrors_to_cache() {
        let (sync, store, auth, cache) = setup();
        auth.sign_in(identity()).unwrap();
        let key = week_key();

        // Stale local copy vs newer remote copy.
        cache
            .set_json(&cache::plan_key(&key), &sample_doc(&["Stale"]))
            .unwrap();
        store.push(
            "users/U1/weekly-plans/week-2024-06-09",
            serde_json::to_value(sample_doc(&["Fresh"])).unwrap(),
        );

        let loaded = sync.load_week(&key).await.unwrap();
        match loaded {
            LoadedWeek::Document { doc, source } => {
                assert_eq!(source, LoadSource::Remote);
                assert_eq!(doc.roles[0].name, "Fresh");
            }
            other => panic!("expected remote document, got {other:?}"),
        }

        // Mirror: the stale cache copy was overwritten.
        let mirrored: WeekDocument = cache
            .get_json(&cache::plan_key(&key))
            .unwrap()
            .expect("remote read mirrors into cache");
        assert_eq!(mirrored.roles[0].name, "Fresh");
    }

    #[tokio::test]
    async fn test_read_falls_back_to_cache_when_offline() {
        let (sync, store, auth, cache) = setup();
        auth.sign_in(identity()).unwrap();
        store.set_offline(true);

        let key = week_key();
        cache
            .set_json(&cache::plan_key(&key), &sample_doc(&["Local"]))
            .unwrap();

        match sync.load_week(&key).await.unwrap() {
            LoadedWeek::Document { doc, source } => {
                assert_eq!(source, LoadSource::Cache);
                assert_eq!(doc.roles[0].name, "Local");
            }
            other => panic!("expected cached document, got {other:?}"),
        }
        assert_eq!(*sync.status().borrow(), SyncStatus::Offline);
    }

    #[tokio::test]
    async fn test_read_falls_back_to_template_then_empty() {
        let (sync, _store, _auth, cache) = setup();
        let key = week_key();

        assert_eq!(sync.load_week(&key).await.unwrap(), LoadedWeek::Empty);

        let template = template_from_document(&sample_doc(&["A", "B"]));
        cache.set_json(cache::STRUCTURE_KEY, &template).unwrap();

        match sync.load_week(&key).await.unwrap() {
            LoadedWeek::Template(t) => {
                assert_eq!(t.roles.len(), 2);
                assert!(t.roles.iter().all(|r| r.goals.is_empty()));
            }
            other => panic!("expected template, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_legacy_cached_document_is_normalized_on_read() {
        let (sync, _store, _auth, cache) = setup();
        let key = week_key();
        cache
            .set_raw(
                &cache::plan_key(&key),
                r#"{"roles":[{"name":"R","color":"","goals":["Buy milk"]}],
                    "sharpenData":[],"goalColumnsCount":2,
                    "weekStart":"2024-06-09T00:00:00Z"}"#,
            )
            .unwrap();

        match sync.load_week(&key).await.unwrap() {
            LoadedWeek::Document { doc, .. } => {
                assert_eq!(doc.roles[0].goals[0].text, "Buy milk");
                assert!(!doc.roles[0].goals[0].completed);
                assert_eq!(doc.roles[0].goals.len(), 2);
            }
            other => panic!("expected document, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_template_stable_under_goal_edits() {
        let (sync, _store, _auth, cache) = setup();
        let key = week_key();

        sync.save_week(&key, &sample_doc(&["A", "B"])).await.unwrap();
        let first = cache.get_raw(cache::STRUCTURE_KEY).unwrap().unwrap();

        // Edit goal text and completion without touching the role list.
        let mut edited = sample_doc(&["A", "B"]);
        edited.roles[0].goals[0].text = "changed".to_string();
        edited.roles[1].goals[0].completed = true;
        sync.save_week(&key, &edited).await.unwrap();

        let second = cache.get_raw(cache::STRUCTURE_KEY).unwrap().unwrap();
        assert_eq!(first, second, "goal edits must not rewrite the template");

        // Adding a role is structural and does propagate.
        sync.save_week(&key, &sample_doc(&["A", "B", "C"])).await.unwrap();
        let template: StructureTemplate = cache.get_json(cache::STRUCTURE_KEY).unwrap().unwrap();
        assert_eq!(template.roles.len(), 3);
    }

    #[tokio::test]
    async fn test_sign_in_hydration_overwrites_stale_cache_and_sign_out_purges() {
        let (sync, store, auth, cache) = setup();
        let key = week_key();

        // Stale unauthenticated-era copy in the cache.
        cache
            .set_json(&cache::plan_key(&key), &sample_doc(&["Stale"]))
            .unwrap();

        // Remote partition for U1 holds the real data.
        store.push(
            "users/U1/weekly-plans/week-2024-06-09",
            serde_json::to_value(sample_doc(&["Synced"])).unwrap(),
        );
        store.push(
            "users/U1/templates/default-structure",
            serde_json::to_value(template_from_document(&sample_doc(&["Synced"]))).unwrap(),
        );

        auth.sign_in(identity()).unwrap();
        let today = chrono::NaiveDate::from_ymd_opt(2024, 6, 12).unwrap();
        let pulled = sync.hydrate_after_sign_in(today).await.unwrap();
        assert_eq!(pulled, 2); // template + one week document

        let hydrated: WeekDocument = cache.get_json(&cache::plan_key(&key)).unwrap().unwrap();
        assert_eq!(hydrated.roles[0].name, "Synced");

        auth.sign_out().unwrap();
        sync.purge_local().unwrap();
        assert!(cache.get_raw(&cache::plan_key(&key)).unwrap().is_none());
        assert!(cache.get_raw(cache::STRUCTURE_KEY).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_all_remote_data() {
        let (sync, store, auth, _cache) = setup();
        auth.sign_in(identity()).unwrap();

        store.push(
            "users/U1/weekly-plans/week-2024-06-09",
            json!({"weekStart": "2024-06-09T00:00:00Z"}),
        );
        store.push(
            "users/U1/weekly-plans/week-2024-06-16",
            json!({"weekStart": "2024-06-16T00:00:00Z"}),
        );
        store.push("users/U1/weekly-reviews/week-2024-06-09", json!({}));
        store.push("users/U1/templates/default-structure", json!({"roles": []}));

        let removed = sync.delete_all_remote_data().await.unwrap();
        assert_eq!(removed, 3);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_subscribe_week_mirrors_pushes() {
        let (sync, store, auth, cache) = setup();
        auth.sign_in(identity()).unwrap();
        let key = week_key();

        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _handle = sync
            .subscribe_week(&key, move |doc| sink.lock().unwrap().push(doc))
            .expect("memory store supports subscriptions");

        store.push(
            "users/U1/weekly-plans/week-2024-06-09",
            serde_json::to_value(sample_doc(&["Pushed"])).unwrap(),
        );

        assert_eq!(seen.lock().unwrap().len(), 1);
        let mirrored: WeekDocument = cache.get_json(&cache::plan_key(&key)).unwrap().unwrap();
        assert_eq!(mirrored.roles[0].name, "Pushed");
    }
}
