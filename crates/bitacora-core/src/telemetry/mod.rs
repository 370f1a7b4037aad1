//! Vessel telemetry
//!
//! The lifecycle service talks to the telemetry provider through the
//! [`Telemetry`] trait; [`SignalKClient`] is the production implementation.
//! Provider failures never surface as errors: a failed read is missing
//! data, a failed publish is `None`.

mod signalk;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::models::{Metadata, Position};

pub use signalk::{AccessPoll, AccessRequest, ConnectionTest, SignalKClient, ACCESS_DESCRIPTION};

/// Data path holding the vessel position
pub const POSITION_PATH: &str = "navigation.position";

/// Data path holding the vessel state
pub const STATE_PATH: &str = "navigation.state";

/// Origin tag attached to published notes
pub const NOTE_ORIGIN: &str = "logbook";

/// Longest note description sent to the provider, in characters
pub const MAX_DESCRIPTION_CHARS: usize = 200;

/// Telemetry provider as seen by the entry lifecycle
#[async_trait]
pub trait Telemetry: Send + Sync {
    /// Whether the provider is configured and switched on
    fn is_enabled(&self) -> bool;

    /// Read the given data paths; paths that fail are absent from the result
    async fn fetch(&self, paths: &[String]) -> TelemetrySnapshot;

    /// Publish a note, returning the provider-assigned id
    async fn publish(&self, note: &NoteResource) -> Option<String>;

    /// Remove a published note (best effort)
    async fn retract(&self, resource_id: &str);
}

/// Values read from the provider, keyed by data path
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TelemetrySnapshot {
    values: Metadata,
}

impl TelemetrySnapshot {
    pub fn new(values: Metadata) -> Self {
        Self { values }
    }

    pub fn insert(&mut self, path: impl Into<String>, value: Value) {
        self.values.insert(path.into(), value);
    }

    pub fn get(&self, path: &str) -> Option<&Value> {
        self.values.get(path)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Position, if the snapshot holds a well-formed `[lat, lon]` pair
    pub fn position(&self) -> Option<Position> {
        match self.values.get(POSITION_PATH)? {
            Value::Array(pair) if pair.len() == 2 => {
                Some(Position::new(pair[0].as_f64()?, pair[1].as_f64()?))
            }
            _ => None,
        }
    }

    /// Navigation state, if the snapshot holds a string for it
    pub fn navigation_state(&self) -> Option<String> {
        self.values.get(STATE_PATH)?.as_str().map(str::to_string)
    }

    /// All raw values, for merging into entry metadata
    pub fn into_metadata(self) -> Metadata {
        self.values
    }
}

/// A note to mirror on the provider
#[derive(Debug, Clone, PartialEq)]
pub struct NoteResource {
    pub text: String,
    pub timestamp_utc: String,
    pub position: Option<Position>,
    pub navigation_state: Option<String>,
}

impl NoteResource {
    /// JSON body for the notes endpoint
    pub fn payload(&self) -> Value {
        let description: String = self.text.chars().take(MAX_DESCRIPTION_CHARS).collect();

        let mut resource = json!({
            "description": description,
            "timestamp": self.timestamp_utc,
            "origin": NOTE_ORIGIN,
        });

        if let Some(position) = self.position {
            resource["position"] = json!({
                "latitude": position.latitude,
                "longitude": position.longitude,
            });
        }

        if let Some(state) = self.navigation_state.as_deref().filter(|s| !s.is_empty()) {
            resource["navigationState"] = json!(state);
        }

        resource
    }
}

/// Provider that is never enabled
///
/// Used when no telemetry is wanted at all, e.g. for one-off CLI commands.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledTelemetry;

#[async_trait]
impl Telemetry for DisabledTelemetry {
    fn is_enabled(&self) -> bool {
        false
    }

    async fn fetch(&self, _paths: &[String]) -> TelemetrySnapshot {
        TelemetrySnapshot::default()
    }

    async fn publish(&self, _note: &NoteResource) -> Option<String> {
        None
    }

    async fn retract(&self, _resource_id: &str) {}
}
