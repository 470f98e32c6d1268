use std::sync::Arc;

use weekplan::auth::AuthService;
use weekplan::cache::PlannerCache;
use weekplan::grid::PlannerGrid;
use weekplan::reconciler::LoadedWeek;
use weekplan::remote::{DocumentStore, MemoryDocStore};
use weekplan::remote_http::HttpDocStore;
use weekplan::state::{self, Session};

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run().await {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), String> {
    let config = state::load_config()?;

    let cache =
        Arc::new(PlannerCache::open().map_err(|e| format!("Failed to open cache: {}", e))?);
    let remote: Arc<dyn DocumentStore> = match config.remote_base_url.as_deref() {
        Some(base) => Arc::new(
            HttpDocStore::new(base).map_err(|e| format!("Invalid remote base URL: {}", e))?,
        ),
        None => {
            log::info!("No remote configured; running cache-only");
            Arc::new(MemoryDocStore::new())
        }
    };
    let auth = Arc::new(AuthService::new());
    if let Some(identity) = auth.current_identity() {
        log::info!("Signed in as {}", identity.email);
    } else {
        log::info!("Not signed in; remote sync disabled");
    }

    let session = Session::new(config, cache, remote, auth);
    let key = session.current_week_key()?;

    let loaded = session
        .sync
        .load_week(&key)
        .await
        .map_err(|e| format!("Failed to load week {}: {}", key, e))?;

    let mut grid;
    match loaded {
        LoadedWeek::Document { doc, source } => {
            log::info!("Loaded {} from {:?}", key, source);
            grid = PlannerGrid::new(doc.goal_columns_count);
            grid.hydrate(&doc);
        }
        LoadedWeek::Template(template) => {
            log::info!("No saved plan for {}; starting from the structure template", key);
            grid = PlannerGrid::from_template(&template);
        }
        LoadedWeek::Empty => {
            log::info!("No saved plan or template for {}; starting from the default board", key);
            grid = PlannerGrid::default_board();
        }
    }

    let snapshot = weekplan::review::compute_snapshot(&grid, &key);
    log::info!(
        "Week {}: {} roles, {} goals, {}% complete, sync status {:?}",
        key,
        grid.roles().len(),
        snapshot.analytics.total_goals,
        snapshot.analytics.completion_rate,
        *session.sync.status().borrow()
    );

    // Write-through keeps the cache warm even when the week was empty.
    let week_start = key
        .week_start()
        .ok_or_else(|| format!("Malformed week key {}", key))?;
    let doc = grid.serialize(&weekplan::week::week_start_iso(week_start));
    session
        .sync
        .save_week(&key, &doc)
        .await
        .map_err(|e| format!("Failed to save week {}: {}", key, e))?;

    Ok(())
}
