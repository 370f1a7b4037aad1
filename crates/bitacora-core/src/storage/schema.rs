//! SQLite schema for the logbook database
//!
//! A single `log_entries` table. The resource id column keeps the name used
//! by earlier releases so existing `logbook.db` files open unchanged.

use rusqlite::{Connection, OptionalExtension, Result};

/// Current schema version for migrations
///
/// Version 2 switched `log_entries.id` to `AUTOINCREMENT` so ids of deleted
/// entries are never handed out again.
pub const SCHEMA_VERSION: i32 = 2;

const LOG_ENTRIES_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS log_entries (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        timestamp_utc TEXT NOT NULL,
        latitude REAL,
        longitude REAL,
        navigation_state TEXT,
        text TEXT,
        media_path TEXT,
        source TEXT DEFAULT 'manual',
        entry_type TEXT DEFAULT 'log',
        signalK_resource_id TEXT,
        metadata TEXT
    );
"#;

const LOG_ENTRY_COLUMNS: &str = "id, timestamp_utc, latitude, longitude, navigation_state, text, \
     media_path, source, entry_type, signalK_resource_id, metadata";

/// Initialize the database schema
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Schema version tracking
        CREATE TABLE IF NOT EXISTS schema_info (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );
        "#,
    )?;

    if has_reusable_ids(conn)? {
        migrate_to_autoincrement(conn)?;
    } else {
        conn.execute_batch(LOG_ENTRIES_TABLE)?;
    }

    conn.execute_batch(
        r#"
        -- Listing is always newest first
        CREATE INDEX IF NOT EXISTS idx_log_entries_timestamp ON log_entries(timestamp_utc);
        CREATE INDEX IF NOT EXISTS idx_log_entries_type ON log_entries(entry_type);
        "#,
    )?;

    conn.execute(
        "INSERT OR REPLACE INTO schema_info (key, value) VALUES ('version', ?)",
        [SCHEMA_VERSION.to_string()],
    )?;

    Ok(())
}

/// Whether an existing `log_entries` table was created without `AUTOINCREMENT`
fn has_reusable_ids(conn: &Connection) -> Result<bool> {
    let sql: Option<String> = conn
        .query_row(
            "SELECT sql FROM sqlite_master WHERE type='table' AND name='log_entries'",
            [],
            |row| row.get(0),
        )
        .optional()?;

    Ok(sql.is_some_and(|sql| !sql.to_ascii_uppercase().contains("AUTOINCREMENT")))
}

/// Rebuild `log_entries` with `AUTOINCREMENT`, keeping every row and its id
///
/// Ids freed before the migration above the highest surviving id cannot be
/// known, so only ids handed out afterwards are guaranteed fresh.
fn migrate_to_autoincrement(conn: &Connection) -> Result<()> {
    tracing::info!("Migrating log_entries to non-reusable ids");
    conn.execute_batch(&format!(
        r#"
        BEGIN;
        ALTER TABLE log_entries RENAME TO log_entries_legacy;
        {table}
        INSERT INTO log_entries ({cols}) SELECT {cols} FROM log_entries_legacy;
        DROP TABLE log_entries_legacy;
        COMMIT;
        "#,
        table = LOG_ENTRIES_TABLE,
        cols = LOG_ENTRY_COLUMNS,
    ))
}

/// Get the current schema version from the database
pub fn get_schema_version(conn: &Connection) -> Result<Option<i32>> {
    let mut stmt = conn.prepare("SELECT value FROM schema_info WHERE key = 'version'")?;
    let result: Result<String> = stmt.query_row([], |row| row.get(0));

    match result {
        Ok(version_str) => Ok(version_str.parse().ok()),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Check if schema needs initialization or migration
pub fn needs_init(conn: &Connection) -> bool {
    let table_exists: bool = conn
        .prepare("SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_info'")
        .and_then(|mut stmt| stmt.exists([]))
        .unwrap_or(false);

    if !table_exists {
        return true;
    }

    match get_schema_version(conn) {
        Ok(Some(v)) => v < SCHEMA_VERSION,
        _ => true,
    }
}
