//! SQLite-backed entry store
//!
//! Every operation opens its own connection to `logbook.db`; the store
//! itself only remembers the path. Listings are ordered by `timestamp_utc`
//! descending, which is chronological because timestamps are stored as
//! fixed-width UTC strings.

use std::path::{Path, PathBuf};

use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

use super::error::{StorageError, StorageResult};
use super::schema::{init_schema, needs_init};
use crate::models::{
    EntryChanges, EntryFilter, EntrySource, EntryType, LogEntry, Metadata, NewEntry, Position,
    SourceClass,
};

/// Rows per page for `/api/entries`
pub const PAGE_SIZE: u32 = 20;

/// Rows shown by the home view
pub const HOME_LIMIT: u32 = 50;

const ENTRY_COLUMNS: &str = "id, timestamp_utc, latitude, longitude, navigation_state, text, \
     media_path, source, entry_type, signalK_resource_id, metadata";

/// Persistent store of log entries
#[derive(Debug, Clone)]
pub struct EntryStore {
    path: PathBuf,
}

impl EntryStore {
    /// Open the store, creating the database and schema if needed
    pub fn open(path: impl Into<PathBuf>) -> StorageResult<Self> {
        let store = Self { path: path.into() };

        if let Some(parent) = store.path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| StorageError::CreateDirectory {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let conn = store.connect()?;
        if needs_init(&conn) {
            init_schema(&conn)?;
        }

        Ok(store)
    }

    /// Path of the database file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&self) -> StorageResult<Connection> {
        Ok(Connection::open(&self.path)?)
    }

    /// Insert a new entry and return its id
    ///
    /// New rows never carry an external resource id.
    pub fn insert(&self, entry: &NewEntry) -> StorageResult<i64> {
        let conn = self.connect()?;
        let metadata = encode_metadata(entry.metadata.as_ref())?;

        conn.execute(
            r#"
            INSERT INTO log_entries (
                timestamp_utc, latitude, longitude, navigation_state, text,
                media_path, source, entry_type, signalK_resource_id, metadata
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, NULL, ?9)
            "#,
            params![
                entry.timestamp_utc,
                entry.position.map(|p| p.latitude),
                entry.position.map(|p| p.longitude),
                entry.navigation_state,
                entry.text,
                entry.media_path,
                entry.source.as_str(),
                entry.entry_type.as_str(),
                metadata,
            ],
        )?;

        Ok(conn.last_insert_rowid())
    }

    /// Replace the editable fields of an entry
    ///
    /// Returns `false` if no row has this id.
    pub fn update(&self, id: i64, changes: &EntryChanges) -> StorageResult<bool> {
        let conn = self.connect()?;
        let metadata = encode_metadata(changes.metadata.as_ref())?;

        let updated = conn.execute(
            r#"
            UPDATE log_entries SET
                timestamp_utc = ?1,
                navigation_state = ?2,
                text = ?3,
                media_path = ?4,
                entry_type = ?5,
                metadata = ?6
            WHERE id = ?7
            "#,
            params![
                changes.timestamp_utc,
                changes.navigation_state,
                changes.text,
                changes.media_path,
                changes.entry_type.as_str(),
                metadata,
                id,
            ],
        )?;

        Ok(updated > 0)
    }

    /// Record the id of the published Signal K note
    pub fn set_external_resource_id(&self, id: i64, resource_id: &str) -> StorageResult<bool> {
        let conn = self.connect()?;
        let updated = conn.execute(
            "UPDATE log_entries SET signalK_resource_id = ?1 WHERE id = ?2",
            params![resource_id, id],
        )?;
        Ok(updated > 0)
    }

    /// Delete an entry; `false` means it did not exist
    pub fn delete(&self, id: i64) -> StorageResult<bool> {
        let conn = self.connect()?;
        let deleted = conn.execute("DELETE FROM log_entries WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }

    /// Fetch a single entry
    pub fn get(&self, id: i64) -> StorageResult<Option<LogEntry>> {
        let conn = self.connect()?;
        let sql = format!("SELECT {} FROM log_entries WHERE id = ?1", ENTRY_COLUMNS);

        let row = conn
            .query_row(&sql, params![id], RawEntry::from_row)
            .optional()?;

        row.map(RawEntry::into_entry).transpose()
    }

    /// One page of entries, newest first (`page` starts at 1)
    pub fn list(&self, filter: &EntryFilter, page: u32, page_size: u32) -> StorageResult<Vec<LogEntry>> {
        let offset = page.max(1).saturating_sub(1).saturating_mul(page_size);
        self.query(filter, page_size, offset)
    }

    /// Entries shown on the home view, newest first
    pub fn home(&self, filter: &EntryFilter) -> StorageResult<Vec<LogEntry>> {
        self.query(filter, HOME_LIMIT, 0)
    }

    /// Number of stored entries
    pub fn count(&self) -> StorageResult<u64> {
        let conn = self.connect()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM log_entries", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn query(&self, filter: &EntryFilter, limit: u32, offset: u32) -> StorageResult<Vec<LogEntry>> {
        let conn = self.connect()?;

        let mut clauses = Vec::new();
        let mut values: Vec<SqlValue> = Vec::new();

        if let Some(entry_type) = filter.entry_type {
            clauses.push("entry_type = ?");
            values.push(SqlValue::Text(entry_type.as_str().to_string()));
        }

        match filter.source {
            Some(SourceClass::Manual) => clauses.push("source IN ('manual', 'quick-note')"),
            Some(SourceClass::Auto) => clauses.push("source NOT IN ('manual', 'quick-note')"),
            None => {}
        }

        let where_sql = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };

        let sql = format!(
            "SELECT {} FROM log_entries {} ORDER BY timestamp_utc DESC LIMIT ? OFFSET ?",
            ENTRY_COLUMNS, where_sql
        );
        values.push(SqlValue::Integer(limit as i64));
        values.push(SqlValue::Integer(offset as i64));

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values), RawEntry::from_row)?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?.into_entry()?);
        }
        Ok(entries)
    }
}

/// Row as read from SQLite, before validation
struct RawEntry {
    id: i64,
    timestamp_utc: String,
    latitude: Option<f64>,
    longitude: Option<f64>,
    navigation_state: Option<String>,
    text: Option<String>,
    media_path: Option<String>,
    source: Option<String>,
    entry_type: Option<String>,
    resource_id: Option<String>,
    metadata: Option<String>,
}

impl RawEntry {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            timestamp_utc: row.get(1)?,
            latitude: row.get(2)?,
            longitude: row.get(3)?,
            navigation_state: row.get(4)?,
            text: row.get(5)?,
            media_path: row.get(6)?,
            source: row.get(7)?,
            entry_type: row.get(8)?,
            resource_id: row.get(9)?,
            metadata: row.get(10)?,
        })
    }

    fn into_entry(self) -> StorageResult<LogEntry> {
        let position = match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => Some(Position::new(lat, lon)),
            _ => None,
        };

        let entry_type = match self.entry_type.as_deref() {
            Some(raw) => raw.parse().unwrap_or_else(|_| {
                tracing::warn!(id = self.id, entry_type = raw, "Unknown stored entry type");
                EntryType::Other
            }),
            None => EntryType::Log,
        };

        let metadata = self.metadata.as_deref().and_then(|raw| decode_metadata(self.id, raw));

        Ok(LogEntry {
            id: self.id,
            timestamp_utc: self.timestamp_utc,
            position,
            navigation_state: self.navigation_state,
            text: self.text.unwrap_or_default(),
            media_path: self.media_path,
            source: EntrySource::from_label(self.source.unwrap_or_else(|| "manual".to_string())),
            entry_type,
            external_resource_id: self.resource_id,
            metadata,
        })
    }
}

/// Stored metadata, `None` unless it is a JSON object
fn decode_metadata(id: i64, raw: &str) -> Option<Metadata> {
    if raw.trim().is_empty() {
        return None;
    }
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(serde_json::Value::Object(map)) => Some(map),
        Ok(_) => {
            tracing::warn!(id, "Ignoring stored metadata that is not a JSON object");
            None
        }
        Err(e) => {
            tracing::warn!(id, error = %e, "Ignoring unreadable stored metadata");
            None
        }
    }
}

/// Empty metadata is stored as NULL
fn encode_metadata(metadata: Option<&Metadata>) -> StorageResult<Option<String>> {
    match metadata {
        Some(map) if !map.is_empty() => Ok(Some(serde_json::to_string(map)?)),
        _ => Ok(None),
    }
}
