//! Data models for the logbook
//!
//! Defines `LogEntry` and the closed vocabularies it is tagged with
//! (`EntryType`, `EntrySource`), plus the shapes used to write entries and
//! to filter listings.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// Auxiliary data captured alongside an entry (telemetry, weather, form extras)
pub type Metadata = Map<String, Value>;

/// Storage format for `timestamp_utc`
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Category of a log entry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    #[default]
    Log,
    Maintenance,
    Weather,
    Navigation,
    Fuel,
    Radio,
    Provision,
    Other,
    Experience,
}

impl EntryType {
    pub const ALL: [EntryType; 9] = [
        EntryType::Log,
        EntryType::Maintenance,
        EntryType::Weather,
        EntryType::Navigation,
        EntryType::Fuel,
        EntryType::Radio,
        EntryType::Provision,
        EntryType::Other,
        EntryType::Experience,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntryType::Log => "log",
            EntryType::Maintenance => "maintenance",
            EntryType::Weather => "weather",
            EntryType::Navigation => "navigation",
            EntryType::Fuel => "fuel",
            EntryType::Radio => "radio",
            EntryType::Provision => "provision",
            EntryType::Other => "other",
            EntryType::Experience => "experience",
        }
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown entry type
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown entry type: '{0}'")]
pub struct UnknownEntryType(pub String);

impl FromStr for EntryType {
    type Err = UnknownEntryType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntryType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownEntryType(s.to_string()))
    }
}

/// Who created an entry
///
/// `Manual` and `QuickNote` are user-initiated; any other label identifies
/// an automated source.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntrySource {
    Manual,
    QuickNote,
    Automated(String),
}

impl EntrySource {
    pub fn as_str(&self) -> &str {
        match self {
            EntrySource::Manual => "manual",
            EntrySource::QuickNote => "quick-note",
            EntrySource::Automated(label) => label,
        }
    }

    /// Interpret a stored `source` column value
    pub fn from_label(label: impl Into<String>) -> Self {
        let label = label.into();
        match label.as_str() {
            "manual" => EntrySource::Manual,
            "quick-note" => EntrySource::QuickNote,
            _ => EntrySource::Automated(label),
        }
    }

    pub fn is_user_initiated(&self) -> bool {
        matches!(self, EntrySource::Manual | EntrySource::QuickNote)
    }
}

impl fmt::Display for EntrySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for EntrySource {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EntrySource {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(EntrySource::from_label)
    }
}

/// Source filter for listings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceClass {
    /// `manual` and `quick-note` rows
    Manual,
    /// Everything else
    Auto,
}

impl SourceClass {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "manual" => Some(SourceClass::Manual),
            "auto" => Some(SourceClass::Auto),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceClass::Manual => "manual",
            SourceClass::Auto => "auto",
        }
    }
}

/// Geographic position in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
}

impl Position {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// A stored logbook entry
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    /// Row id assigned by the store
    pub id: i64,
    /// ISO-8601 UTC timestamp with trailing `Z`
    pub timestamp_utc: String,
    pub position: Option<Position>,
    /// Vessel state token such as "anchored"
    pub navigation_state: Option<String>,
    /// Raw markdown text, never empty
    pub text: String,
    /// Path relative to the data directory, e.g. `uploads/20250101_120000_a1b2c3.jpg`
    pub media_path: Option<String>,
    pub source: EntrySource,
    pub entry_type: EntryType,
    /// Id of the mirrored note on the Signal K server
    pub external_resource_id: Option<String>,
    pub metadata: Option<Metadata>,
}

/// Column values for a new row
#[derive(Debug, Clone, PartialEq)]
pub struct NewEntry {
    pub timestamp_utc: String,
    pub position: Option<Position>,
    pub navigation_state: Option<String>,
    pub text: String,
    pub media_path: Option<String>,
    pub source: EntrySource,
    pub entry_type: EntryType,
    pub metadata: Option<Metadata>,
}

/// Fields replaced in place when an entry is edited
///
/// Position, source and the external resource id are never touched by an edit.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryChanges {
    pub timestamp_utc: String,
    pub navigation_state: Option<String>,
    pub text: String,
    pub media_path: Option<String>,
    pub entry_type: EntryType,
    pub metadata: Option<Metadata>,
}

/// Listing filter; `None` means "don't filter on this column"
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EntryFilter {
    pub entry_type: Option<EntryType>,
    pub source: Option<SourceClass>,
}

impl EntryFilter {
    /// Build a filter from raw query values, ignoring unrecognized ones
    pub fn from_query(entry_type: Option<&str>, source: Option<&str>) -> Self {
        Self {
            entry_type: entry_type.and_then(|t| t.trim().parse().ok()),
            source: source.and_then(|s| SourceClass::parse(s.trim())),
        }
    }
}

/// Current UTC time in storage format
pub fn now_timestamp() -> String {
    Utc::now().format(TIMESTAMP_FORMAT).to_string()
}

/// Normalize a client-supplied timestamp to storage format
///
/// Accepts RFC 3339 values and `datetime-local` values (`YYYY-MM-DDTHH:MM`,
/// optionally with seconds), the latter taken as UTC.
pub fn normalize_timestamp(raw: &str) -> Option<String> {
    let raw = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc).format(TIMESTAMP_FORMAT).to_string());
    }

    let naive = raw.strip_suffix('Z').unwrap_or(raw);
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(naive, fmt).ok())
        .map(|dt| dt.and_utc().format(TIMESTAMP_FORMAT).to_string())
}
