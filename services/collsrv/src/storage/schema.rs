//! SQLite schema, created on startup

use errors::PlantResult;
use sqlx::SqlitePool;
use tracing::debug;

const STATEMENTS: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS raw_samples (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        device_id TEXT NOT NULL,
        device_name TEXT NOT NULL,
        point TEXT NOT NULL,
        value REAL NOT NULL,
        timestamp_ms INTEGER NOT NULL
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_raw_samples_ts ON raw_samples(timestamp_ms)",
    "CREATE INDEX IF NOT EXISTS idx_raw_samples_point ON raw_samples(device_id, point, timestamp_ms)",
    r#"CREATE TABLE IF NOT EXISTS aggregate_windows (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        device_id TEXT NOT NULL,
        point TEXT NOT NULL,
        window_start_ms INTEGER NOT NULL,
        window_end_ms INTEGER NOT NULL,
        mean_value REAL NOT NULL,
        sample_count INTEGER NOT NULL,
        UNIQUE(device_id, point, window_start_ms)
    )"#,
    r#"CREATE TABLE IF NOT EXISTS aggregator_watermark (
        id INTEGER PRIMARY KEY CHECK (id = 1),
        window_end_ms INTEGER NOT NULL,
        updated_at_ms INTEGER NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS alarm_events (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        device_id TEXT NOT NULL,
        point TEXT NOT NULL,
        kind TEXT NOT NULL CHECK (kind IN ('activate', 'resolve')),
        direction TEXT NOT NULL CHECK (direction IN ('HIGH', 'LOW')),
        value REAL NOT NULL,
        threshold REAL NOT NULL,
        timestamp_ms INTEGER NOT NULL
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_alarm_events_ts ON alarm_events(timestamp_ms)",
];

/// Create every table and index that does not exist yet
pub async fn init_schema(pool: &SqlitePool) -> PlantResult<()> {
    for statement in STATEMENTS {
        sqlx::query(statement).execute(pool).await?;
    }
    debug!("collsrv schema ready ({} statements)", STATEMENTS.len());
    Ok(())
}
