use serde::{Deserialize, Serialize};

/// A single goal cell in its canonical form.
///
/// Legacy documents stored goals as bare strings; those arrive through
/// [`RawGoal`] and are normalized before they reach this type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalRecord {
    pub text: String,
    #[serde(default)]
    pub completed: bool,
}

impl GoalRecord {
    pub fn empty() -> Self {
        Self {
            text: String::new(),
            completed: false,
        }
    }

    /// A cell counts toward analytics only when it holds trimmed text.
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Wire form of a goal as read from any tier.
///
/// Older documents stored `"Buy milk"` where current ones store
/// `{"text": "Buy milk", "completed": false}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawGoal {
    Legacy(String),
    Structured(GoalRecord),
}

/// A role row: name, background color, and one goal per column.
///
/// Order is significant (position maps to grid row / column index).
/// Names are not unique; [`crate::grid::role_slug`] is used only for
/// display addressing, never as a key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleEntry {
    pub name: String,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub goals: Vec<GoalRecord>,
}

/// Wire form of a role row, tolerant of legacy goal shapes.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawRoleEntry {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub goals: Vec<RawGoal>,
}

/// A full week of planner data in canonical form.
///
/// Invariant (after normalization): `goal_columns_count >= 1` and every
/// role's `goals` plus `sharpen_data` have exactly that length.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeekDocument {
    pub roles: Vec<RoleEntry>,
    #[serde(default)]
    pub sharpen_data: Vec<GoalRecord>,
    pub goal_columns_count: usize,
    /// ISO timestamp of the week's Sunday start.
    pub week_start: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Wire form of a week document as read from cache or remote.
///
/// Every field is defaulted so schema drift degrades to an empty shape
/// instead of a parse failure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawWeekDocument {
    #[serde(default)]
    pub roles: Vec<RawRoleEntry>,
    #[serde(default)]
    pub sharpen_data: Vec<RawGoal>,
    #[serde(default)]
    pub goal_columns_count: Option<usize>,
    #[serde(default)]
    pub week_start: Option<String>,
    #[serde(default)]
    pub last_modified: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
}

/// Week-independent reusable shape: role list with empty goals plus the
/// default goal-column count. Seeds weeks that have no saved document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructureTemplate {
    pub roles: Vec<RoleEntry>,
    pub goal_columns_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
}

/// The authenticated principal, or absent when signed out.
///
/// Gates which remote partition (`users/{uid}/...`) is addressed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub uid: String,
    pub email: String,
}

/// Non-blocking sync indicator state. Never gates editing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Synced,
    Syncing,
    Offline,
    Error,
}

/// Point-in-time completion analytics for one week.
///
/// Independent lifecycle from [`WeekDocument`]: a snapshot survives later
/// edits to the live week until it is explicitly saved again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewSnapshot {
    pub id: String,
    pub week_key: String,
    pub week_start: String,
    pub saved_at: String,
    pub analytics: ReviewAnalytics,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewAnalytics {
    pub total_goals: usize,
    pub completed_goals: usize,
    pub in_progress_goals: usize,
    /// Percentage, rounded; 0 when no goals exist.
    pub completion_rate: u32,
    /// Ranked descending by completion rate.
    pub role_performance: Vec<RolePerformance>,
    pub insights: Vec<Insight>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RolePerformance {
    pub role: String,
    pub total_goals: usize,
    pub completed_goals: usize,
    pub completion_rate: u32,
}

/// Qualitative rating derived from fixed completion-rate thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InsightLevel {
    Excellent,
    Good,
    Average,
    NeedsAttention,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Insight {
    pub level: InsightLevel,
    /// "week" for the aggregate, otherwise a role name.
    pub subject: String,
    pub message: String,
}

/// Reminder preferences persisted under the `reminderSettings` cache key.
/// Scheduling and display of the reminders themselves is UI territory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderSettings {
    /// 24h "HH:MM".
    pub time: String,
    pub enabled: bool,
    #[serde(default)]
    pub days: ReminderDays,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderDays {
    pub mon: bool,
    pub tue: bool,
    pub wed: bool,
    pub thu: bool,
    pub fri: bool,
    pub sat: bool,
    pub sun: bool,
}

impl Default for ReminderSettings {
    fn default() -> Self {
        Self {
            time: "09:00".to_string(),
            enabled: false,
            days: ReminderDays::default(),
        }
    }
}

impl Default for ReminderDays {
    fn default() -> Self {
        // Weekdays on, weekend off.
        Self {
            mon: true,
            tue: true,
            wed: true,
            thu: true,
            fri: true,
            sat: false,
            sun: false,
        }
    }
}

/// Configuration stored in ~/.weekplan/config.json
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Base URL of the remote document store. None means cache-only operation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_base_url: Option<String>,
    /// Quiet period before a debounced edit save fires.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            remote_base_url: None,
            debounce_ms: default_debounce_ms(),
        }
    }
}

fn default_debounce_ms() -> u64 {
    1000
}

/// Stamp applied to documents on every write.
pub const DOCUMENT_VERSION: &str = "1.0";
