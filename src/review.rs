//! Review snapshots.
//!
//! A snapshot is a point-in-time tally of the live grid: totals, per-role
//! completion rates, and threshold-derived insights. Snapshots are saved
//! explicitly and never regenerated behind the user's back: editing a
//! week after reviewing it leaves the stored review untouched until the
//! next explicit save.
//!
//! Persistence follows the reconciler's ladder: cache first on write,
//! remote preferred on read, every remote hit mirrored into the cache.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

use crate::auth::AuthService;
use crate::cache::{self, PlannerCache};
use crate::grid::PlannerGrid;
use crate::reconciler::SyncError;
use crate::remote::{self, DocumentStore};
use crate::types::{
    Insight, InsightLevel, ReviewAnalytics, ReviewSnapshot, RolePerformance, DOCUMENT_VERSION,
};
use crate::week::WeekKey;

/// Name used for the reflection row in per-role analytics.
const SHARPEN_ROLE_NAME: &str = "Sharpen the Saw";

/// Map a completion rate to its qualitative band.
pub fn level_for_rate(rate: u32) -> InsightLevel {
    match rate {
        80.. => InsightLevel::Excellent,
        60..=79 => InsightLevel::Good,
        40..=59 => InsightLevel::Average,
        _ => InsightLevel::NeedsAttention,
    }
}

fn rate_of(completed: usize, total: usize) -> u32 {
    if total == 0 {
        0
    } else {
        ((completed as f64 / total as f64) * 100.0).round() as u32
    }
}

fn tally(cells: &[crate::types::GoalRecord]) -> (usize, usize) {
    let mut total = 0;
    let mut completed = 0;
    for cell in cells {
        if cell.is_blank() {
            continue;
        }
        total += 1;
        if cell.completed {
            completed += 1;
        }
    }
    (total, completed)
}

/// Compute a snapshot of the live grid for a week.
///
/// Scans every non-empty goal cell across role rows and the reflection
/// row; per-role performance is ranked descending by completion rate.
pub fn compute_snapshot(grid: &PlannerGrid, week_key: &WeekKey) -> ReviewSnapshot {
    let mut total_goals = 0;
    let mut completed_goals = 0;
    let mut role_performance = Vec::with_capacity(grid.roles().len() + 1);

    for row in grid.roles() {
        let (total, completed) = tally(&row.cells);
        total_goals += total;
        completed_goals += completed;
        role_performance.push(RolePerformance {
            role: row.name.clone(),
            total_goals: total,
            completed_goals: completed,
            completion_rate: rate_of(completed, total),
        });
    }

    let (sharpen_total, sharpen_completed) = tally(grid.sharpen_row());
    total_goals += sharpen_total;
    completed_goals += sharpen_completed;
    role_performance.push(RolePerformance {
        role: SHARPEN_ROLE_NAME.to_string(),
        total_goals: sharpen_total,
        completed_goals: sharpen_completed,
        completion_rate: rate_of(sharpen_completed, sharpen_total),
    });

    role_performance.sort_by(|a, b| b.completion_rate.cmp(&a.completion_rate));

    let completion_rate = rate_of(completed_goals, total_goals);
    let mut insights = vec![Insight {
        level: level_for_rate(completion_rate),
        subject: "week".to_string(),
        message: format!(
            "{completed_goals} of {total_goals} goals completed ({completion_rate}%)"
        ),
    }];

    // Extremal roles, among those that actually carried goals.
    let scored: Vec<&RolePerformance> = role_performance
        .iter()
        .filter(|p| p.total_goals > 0)
        .collect();
    if let Some(best) = scored.first() {
        insights.push(Insight {
            level: level_for_rate(best.completion_rate),
            subject: best.role.clone(),
            message: format!(
                "Strongest role: {} at {}%",
                best.role, best.completion_rate
            ),
        });
    }
    if scored.len() > 1 {
        if let Some(worst) = scored.last() {
            insights.push(Insight {
                level: level_for_rate(worst.completion_rate),
                subject: worst.role.clone(),
                message: format!(
                    "Needs the most attention: {} at {}%",
                    worst.role, worst.completion_rate
                ),
            });
        }
    }

    ReviewSnapshot {
        id: Uuid::new_v4().to_string(),
        week_key: week_key.to_string(),
        week_start: key_week_start_iso(week_key),
        saved_at: Utc::now().to_rfc3339(),
        analytics: ReviewAnalytics {
            total_goals,
            completed_goals,
            in_progress_goals: total_goals - completed_goals,
            completion_rate,
            role_performance,
            insights,
        },
        version: Some(DOCUMENT_VERSION.to_string()),
    }
}

fn key_week_start_iso(week_key: &WeekKey) -> String {
    week_key
        .week_start()
        .map(crate::week::week_start_iso)
        .unwrap_or_default()
}

/// Cache-first persistence for review snapshots, keyed by week under the
/// `weekly-reviews` partition.
pub struct ReviewStore {
    cache: Arc<PlannerCache>,
    remote: Arc<dyn DocumentStore>,
    auth: Arc<AuthService>,
}

impl ReviewStore {
    pub fn new(
        cache: Arc<PlannerCache>,
        remote: Arc<dyn DocumentStore>,
        auth: Arc<AuthService>,
    ) -> Self {
        Self {
            cache,
            remote,
            auth,
        }
    }

    async fn remote_identity(&self) -> Option<crate::types::Identity> {
        let identity = self.auth.current_identity()?;
        if self.remote.ready().await {
            Some(identity)
        } else {
            None
        }
    }

    /// Persist a snapshot: cache first, best-effort remote.
    pub async fn save_snapshot(
        &self,
        key: &WeekKey,
        snapshot: &ReviewSnapshot,
    ) -> Result<(), SyncError> {
        self.cache.set_json(&cache::review_key(key), snapshot)?;

        if let Some(identity) = self.remote_identity().await {
            match serde_json::to_value(snapshot) {
                Ok(value) => {
                    if let Err(e) = self
                        .remote
                        .set(&remote::review_path(Some(&identity), key), &value)
                        .await
                    {
                        log::warn!("Remote review save failed for {key}: {e}");
                    }
                }
                Err(e) => log::warn!("Could not encode review {key} for remote: {e}"),
            }
        }
        Ok(())
    }

    /// Load the snapshot for a week, remote preferred, mirrored into cache.
    pub async fn load_snapshot(&self, key: &WeekKey) -> Result<Option<ReviewSnapshot>, SyncError> {
        if let Some(identity) = self.remote_identity().await {
            match self
                .remote
                .get(&remote::review_path(Some(&identity), key))
                .await
            {
                Ok(Some(value)) => match serde_json::from_value::<ReviewSnapshot>(value) {
                    Ok(snapshot) => {
                        self.cache.set_json(&cache::review_key(key), &snapshot)?;
                        return Ok(Some(snapshot));
                    }
                    Err(e) => log::warn!("Discarding malformed remote review {key}: {e}"),
                },
                Ok(None) => {}
                Err(e) => log::warn!("Remote review read failed for {key}: {e}; using cache"),
            }
        }
        Ok(self.cache.get_json(&cache::review_key(key))?)
    }

    /// All snapshots, newest week first. Remote listing when reachable,
    /// cache prefix scan otherwise.
    pub async fn list_snapshots(&self) -> Result<Vec<ReviewSnapshot>, SyncError> {
        let mut snapshots: Vec<ReviewSnapshot> = Vec::new();

        if let Some(identity) = self.remote_identity().await {
            match self
                .remote
                .list_children(&remote::reviews_collection(Some(&identity)))
                .await
            {
                Ok(children) => {
                    for (id, value) in children {
                        match serde_json::from_value::<ReviewSnapshot>(value) {
                            Ok(snapshot) => snapshots.push(snapshot),
                            Err(e) => log::warn!("Skipping malformed remote review {id}: {e}"),
                        }
                    }
                }
                Err(e) => log::warn!("Remote review listing failed: {e}; using cache"),
            }
        }

        if snapshots.is_empty() {
            for key in self.cache.keys_with_prefix(cache::REVIEW_KEY_PREFIX)? {
                if let Some(value) = self.cache.get_json::<Value>(&key)? {
                    match serde_json::from_value::<ReviewSnapshot>(value) {
                        Ok(snapshot) => snapshots.push(snapshot),
                        Err(e) => log::warn!("Skipping malformed cached review {key}: {e}"),
                    }
                }
            }
        }

        snapshots.sort_by(|a, b| b.week_start.cmp(&a.week_start));
        Ok(snapshots)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::MemoryDocStore;
    use crate::types::Identity;

    fn grid_with_goals() -> PlannerGrid {
        let mut grid = PlannerGrid::new(2);
        grid.add_role_with_color("Parent", "#f4d1a4");
        grid.add_role_with_color("Professional", "#b8d4b8");
        // Parent: 2 goals, both done.
        grid.edit_goal(0, 0, "Call school");
        grid.toggle_completion(0, 0);
        grid.edit_goal(0, 1, "Plan trip");
        grid.toggle_completion(0, 1);
        // Professional: 2 goals, one done.
        grid.edit_goal(1, 0, "Ship release");
        grid.toggle_completion(1, 0);
        grid.edit_goal(1, 1, "Write review");
        // Sharpen: 1 goal, not done.
        grid.edit_sharpen_goal(0, "Morning run");
        grid
    }

    fn week_key() -> WeekKey {
        WeekKey::for_date(chrono::NaiveDate::from_ymd_opt(2024, 6, 12).unwrap())
    }

    #[test]
    fn test_compute_snapshot_tallies_and_ranks() {
        let snapshot = compute_snapshot(&grid_with_goals(), &week_key());
        let analytics = &snapshot.analytics;

        assert_eq!(analytics.total_goals, 5);
        assert_eq!(analytics.completed_goals, 3);
        assert_eq!(analytics.in_progress_goals, 2);
        assert_eq!(analytics.completion_rate, 60);

        // Ranked descending: Parent 100, Professional 50, Sharpen 0.
        let ranked: Vec<(&str, u32)> = analytics
            .role_performance
            .iter()
            .map(|p| (p.role.as_str(), p.completion_rate))
            .collect();
        assert_eq!(
            ranked,
            vec![("Parent", 100), ("Professional", 50), ("Sharpen the Saw", 0)]
        );

        assert_eq!(snapshot.week_key, "week-2024-06-09");
        assert_eq!(snapshot.week_start, "2024-06-09T00:00:00Z");
    }

    #[test]
    fn test_insight_levels() {
        assert_eq!(level_for_rate(100), InsightLevel::Excellent);
        assert_eq!(level_for_rate(80), InsightLevel::Excellent);
        assert_eq!(level_for_rate(79), InsightLevel::Good);
        assert_eq!(level_for_rate(60), InsightLevel::Good);
        assert_eq!(level_for_rate(40), InsightLevel::Average);
        assert_eq!(level_for_rate(39), InsightLevel::NeedsAttention);
        assert_eq!(level_for_rate(0), InsightLevel::NeedsAttention);
    }

    #[test]
    fn test_insights_cover_aggregate_and_extremes() {
        let snapshot = compute_snapshot(&grid_with_goals(), &week_key());
        let insights = &snapshot.analytics.insights;

        assert_eq!(insights[0].subject, "week");
        assert_eq!(insights[0].level, InsightLevel::Good);
        assert_eq!(insights[1].subject, "Parent");
        assert_eq!(insights[1].level, InsightLevel::Excellent);
        assert_eq!(insights[2].subject, "Sharpen the Saw");
        assert_eq!(insights[2].level, InsightLevel::NeedsAttention);
    }

    #[test]
    fn test_empty_grid_rates_zero() {
        let snapshot = compute_snapshot(&PlannerGrid::new(3), &week_key());
        assert_eq!(snapshot.analytics.total_goals, 0);
        assert_eq!(snapshot.analytics.completion_rate, 0);
        // Aggregate insight only; no roles carried goals.
        assert_eq!(snapshot.analytics.insights.len(), 1);
    }

    fn setup_store() -> (ReviewStore, Arc<MemoryDocStore>, Arc<AuthService>) {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let cache_path = dir.path().join("cache.db");
        let token_path = dir.path().join("identity.json");
        std::mem::forget(dir);
        let cache = Arc::new(PlannerCache::open_at(cache_path).unwrap());
        let store = Arc::new(MemoryDocStore::new());
        let auth = Arc::new(AuthService::with_token_path(token_path));
        let reviews = ReviewStore::new(
            cache,
            Arc::clone(&store) as Arc<dyn DocumentStore>,
            Arc::clone(&auth),
        );
        (reviews, store, auth)
    }

    #[tokio::test]
    async fn test_saved_snapshot_survives_later_grid_edits() {
        let (reviews, _store, _auth) = setup_store();
        let key = week_key();

        let mut grid = grid_with_goals();
        let snapshot = compute_snapshot(&grid, &key);
        let saved_rate = snapshot.analytics.completion_rate;
        reviews.save_snapshot(&key, &snapshot).await.unwrap();

        // Editing the week afterwards must not touch the stored review.
        grid.toggle_completion(1, 1);
        grid.edit_goal(0, 0, "");

        let loaded = reviews.load_snapshot(&key).await.unwrap().unwrap();
        assert_eq!(loaded.analytics.completion_rate, saved_rate);
        assert_eq!(loaded.id, snapshot.id);
    }

    #[tokio::test]
    async fn test_list_snapshots_newest_first_from_cache() {
        let (reviews, _store, _auth) = setup_store();

        let early = WeekKey::for_date(chrono::NaiveDate::from_ymd_opt(2024, 6, 2).unwrap());
        let late = week_key();
        let grid = grid_with_goals();
        reviews
            .save_snapshot(&early, &compute_snapshot(&grid, &early))
            .await
            .unwrap();
        reviews
            .save_snapshot(&late, &compute_snapshot(&grid, &late))
            .await
            .unwrap();

        let listed = reviews.list_snapshots().await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].week_key, "week-2024-06-09");
        assert_eq!(listed[1].week_key, "week-2024-06-02");
    }

    #[tokio::test]
    async fn test_remote_snapshot_preferred_and_mirrored() {
        let (reviews, store, auth) = setup_store();
        auth.sign_in(Identity {
            uid: "U1".to_string(),
            email: "u1@example.com".to_string(),
        })
        .unwrap();
        let key = week_key();

        let remote_snapshot = compute_snapshot(&grid_with_goals(), &key);
        store.push(
            "users/U1/weekly-reviews/week-2024-06-09",
            serde_json::to_value(&remote_snapshot).unwrap(),
        );

        let loaded = reviews.load_snapshot(&key).await.unwrap().unwrap();
        assert_eq!(loaded.id, remote_snapshot.id);

        // Mirrored: going offline still serves the snapshot from cache.
        store.set_offline(true);
        let offline = reviews.load_snapshot(&key).await.unwrap().unwrap();
        assert_eq!(offline.id, remote_snapshot.id);
    }
}
