// Small dev utility: expand schedule entries and exam rows for one building
// without touching the BAS command queue.
//
// Usage:
//   cargo run --bin manual_expand -- <campus_db_path> <building_id>
//
// This is intentionally lightweight and reuses the run config (active_term,
// expansion ceiling, debounce window) from config_kv.

use campus_dcv_sync::config::ConfigManager;
use campus_dcv_sync::db::open_campus_connection;
use campus_dcv_sync::engine::{OccurrenceExpander, SyncSettings};
use campus_dcv_sync::repository::{OccurrenceRepository, ScheduleSourceRepository};
use std::sync::{Arc, Mutex};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    campus_dcv_sync::logging::init();

    let mut args = std::env::args().skip(1);
    let campus_db = args.next().ok_or("missing campus_db_path")?;
    let building_id = args.next().ok_or("missing building_id")?;

    let conn = Arc::new(Mutex::new(open_campus_connection(&campus_db)?));
    let config = ConfigManager::from_connection(conn.clone())?;

    let settings = SyncSettings::resolve(&config)
        .await?
        .ok_or("active_term 未配置")?;

    let expander = OccurrenceExpander::new(
        Arc::new(ScheduleSourceRepository::from_connection(conn.clone())),
        Arc::new(OccurrenceRepository::from_connection(conn)),
    );

    let now = chrono::Utc::now();
    let mut outcome = expander
        .expand_due_entries(&settings, &building_id, now)
        .await?;
    outcome.absorb(&expander.expand_exam_rows(&settings, &building_id, now).await?);

    println!(
        "entries_seen={} dates_expanded={} dates_failed={} debounced={} malformed={} exam_written={} exam_unchanged={}",
        outcome.entries_seen,
        outcome.dates_expanded,
        outcome.dates_failed,
        outcome.entries_skipped_debounce,
        outcome.entries_skipped_malformed,
        outcome.exam_rows_written,
        outcome.exam_rows_unchanged
    );

    Ok(())
}
