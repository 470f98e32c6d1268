//! Session wiring: configuration, the storage tiers, and week navigation.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::{Duration, Local, NaiveDate};

use crate::auth::AuthService;
use crate::cache::{self, PlannerCache};
use crate::reconciler::{SyncError, WeekSync};
use crate::remote::DocumentStore;
use crate::review::ReviewStore;
use crate::types::{Config, Identity, ReminderSettings};
use crate::week::{self, WeekKey};

pub fn config_path() -> Result<PathBuf, String> {
    let home = dirs::home_dir().ok_or("Could not find home directory")?;
    Ok(home.join(".weekplan").join("config.json"))
}

/// Load configuration, falling back to defaults when the file is absent.
pub fn load_config() -> Result<Config, String> {
    let path = config_path()?;
    if !path.exists() {
        return Ok(Config::default());
    }
    let contents =
        std::fs::read_to_string(&path).map_err(|e| format!("Failed to read config: {}", e))?;
    serde_json::from_str(&contents).map_err(|e| format!("Failed to parse config: {}", e))
}

pub fn save_config(config: &Config) -> Result<(), String> {
    let path = config_path()?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
    }
    let contents = serde_json::to_string_pretty(config)
        .map_err(|e| format!("Failed to serialize config: {}", e))?;
    std::fs::write(&path, contents).map_err(|e| format!("Failed to write config: {}", e))
}

/// One running planner session: the tiers, the reconciler over them, and
/// which week the user is looking at.
pub struct Session {
    pub config: Config,
    pub cache: Arc<PlannerCache>,
    pub auth: Arc<AuthService>,
    pub sync: WeekSync,
    pub reviews: ReviewStore,
    current_week_start: Mutex<NaiveDate>,
}

impl Session {
    pub fn new(
        config: Config,
        cache: Arc<PlannerCache>,
        remote: Arc<dyn DocumentStore>,
        auth: Arc<AuthService>,
    ) -> Self {
        let sync = WeekSync::new(Arc::clone(&cache), Arc::clone(&remote), Arc::clone(&auth));
        let reviews = ReviewStore::new(Arc::clone(&cache), remote, Arc::clone(&auth));
        let today = Local::now().date_naive();
        Self {
            config,
            cache,
            auth,
            sync,
            reviews,
            current_week_start: Mutex::new(week::week_start_of(today)),
        }
    }

    fn week_start(&self) -> Result<NaiveDate, String> {
        self.current_week_start
            .lock()
            .map(|d| *d)
            .map_err(|_| "Week navigation state poisoned".to_string())
    }

    /// Key of the week currently in view.
    pub fn current_week_key(&self) -> Result<WeekKey, String> {
        Ok(WeekKey::for_date(self.week_start()?))
    }

    pub fn current_week_start(&self) -> Result<NaiveDate, String> {
        self.week_start()
    }

    /// Step the view by whole weeks; negative steps back.
    pub fn navigate_week(&self, delta_weeks: i64) -> Result<WeekKey, String> {
        let mut start = self
            .current_week_start
            .lock()
            .map_err(|_| "Week navigation state poisoned".to_string())?;
        *start += Duration::weeks(delta_weeks);
        Ok(WeekKey::for_date(*start))
    }

    /// Jump back to the week containing today.
    pub fn go_to_today(&self) -> Result<WeekKey, String> {
        let mut start = self
            .current_week_start
            .lock()
            .map_err(|_| "Week navigation state poisoned".to_string())?;
        *start = week::week_start_of(Local::now().date_naive());
        Ok(WeekKey::for_date(*start))
    }

    /// Record the identity and pull the template plus recent weeks so the
    /// cache reflects the account's data. Returns how many remote
    /// documents were pulled.
    pub async fn sign_in(&self, identity: Identity) -> Result<usize, String> {
        self.auth.sign_in(identity)?;
        let today = Local::now().date_naive();
        self.sync
            .hydrate_after_sign_in(today)
            .await
            .map_err(|e| format!("Post-sign-in hydration failed: {}", e))
    }

    /// Drop the identity and purge account-scoped cached data. Reminder
    /// settings are device-local and survive. Returns how many cache
    /// entries were removed.
    pub async fn sign_out(&self) -> Result<usize, String> {
        self.auth.sign_out()?;
        self.sync
            .purge_local()
            .map_err(|e| format!("Cache purge failed: {}", e))
    }

    /// Build a save debouncer with the configured quiet period.
    pub fn save_debouncer(&self, save: crate::debounce::SaveFn) -> crate::debounce::SaveDebouncer {
        crate::debounce::SaveDebouncer::spawn(
            std::time::Duration::from_millis(self.config.debounce_ms),
            save,
        )
    }

    pub fn reminder_settings(&self) -> Result<ReminderSettings, SyncError> {
        Ok(self
            .cache
            .get_json(cache::REMINDER_SETTINGS_KEY)?
            .unwrap_or_default())
    }

    pub fn set_reminder_settings(&self, settings: &ReminderSettings) -> Result<(), SyncError> {
        Ok(self.cache.set_json(cache::REMINDER_SETTINGS_KEY, settings)?)
    }
}
