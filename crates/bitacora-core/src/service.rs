//! Entry lifecycle
//!
//! `LogbookService` creates, edits and deletes entries. Creation runs
//! through a fixed sequence:
//!
//! 1. validate the submission
//! 2. enrich it with a telemetry snapshot (when Signal K is enabled)
//! 3. insert the row
//! 4. decide whether the entry should be mirrored as a Signal K note
//! 5. publish it and record the returned resource id
//!
//! Steps 4 and 5 never fail the request: a note that cannot be published is
//! logged and the entry simply stays unpublished.

use std::path::Path;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::{ConfigStore, DataPaths, SignalKSettings};
use crate::error::{LogbookError, LogbookResult};
use crate::media::{MediaStore, MediaUpload, StagedMedia};
use crate::models::{
    normalize_timestamp, now_timestamp, EntryChanges, EntryFilter, EntrySource, EntryType,
    LogEntry, Metadata, NewEntry, Position,
};
use crate::storage::{EntryStore, PAGE_SIZE};
use crate::telemetry::{NoteResource, Telemetry};

/// A full-form submission, as received from the client
#[derive(Debug, Clone, Default)]
pub struct EntryForm {
    pub text: String,
    pub timestamp_utc: Option<String>,
    pub entry_type: Option<String>,
    pub navigation_state: Option<String>,
    /// JSON object encoded as a string
    pub metadata: Option<String>,
    pub media: Option<MediaUpload>,
    /// Edit only: drop the current photo
    pub remove_image: bool,
}

/// An `EntryForm` that passed validation
#[derive(Debug, Clone)]
struct ValidForm {
    text: String,
    timestamp_utc: String,
    entry_type: EntryType,
    navigation_state: Option<String>,
    metadata: Metadata,
}

impl EntryForm {
    fn validate(&self) -> LogbookResult<ValidForm> {
        let text = validate_text(&self.text)?;

        let timestamp_utc = match non_blank(self.timestamp_utc.as_deref()) {
            Some(raw) => normalize_timestamp(raw)
                .ok_or_else(|| LogbookError::validation(format!("Invalid timestamp: {}", raw)))?,
            None => now_timestamp(),
        };

        let entry_type = match non_blank(self.entry_type.as_deref()) {
            Some(raw) => raw
                .parse()
                .map_err(|e: crate::models::UnknownEntryType| LogbookError::validation(e.to_string()))?,
            None => EntryType::Log,
        };

        Ok(ValidForm {
            text,
            timestamp_utc,
            entry_type,
            navigation_state: non_blank(self.navigation_state.as_deref()).map(str::to_string),
            metadata: parse_metadata(self.metadata.as_deref()),
        })
    }
}

/// Telemetry captured for a new entry
#[derive(Debug, Default)]
struct Enrichment {
    position: Option<Position>,
    navigation_state: Option<String>,
    metadata: Metadata,
}

/// Orchestrates entry creation, editing and deletion
pub struct LogbookService {
    entries: EntryStore,
    media: MediaStore,
    config: Arc<ConfigStore>,
    telemetry: Arc<dyn Telemetry>,
}

impl LogbookService {
    pub fn new(
        entries: EntryStore,
        media: MediaStore,
        config: Arc<ConfigStore>,
        telemetry: Arc<dyn Telemetry>,
    ) -> Self {
        Self {
            entries,
            media,
            config,
            telemetry,
        }
    }

    /// Open the database and uploads directory under `paths`
    pub fn open(
        paths: &DataPaths,
        config: Arc<ConfigStore>,
        telemetry: Arc<dyn Telemetry>,
    ) -> LogbookResult<Self> {
        let entries = EntryStore::open(paths.database_path())?;
        let media = MediaStore::new(paths.clone());
        Ok(Self::new(entries, media, config, telemetry))
    }

    pub fn entries(&self) -> &EntryStore {
        &self.entries
    }

    pub fn media_root(&self) -> &Path {
        self.media.data_dir()
    }

    /// Record a one-line note stamped with the current time
    pub async fn quick_note(&self, text: &str) -> LogbookResult<i64> {
        let text = validate_text(text)?;
        let settings = self.config.load()?.signalk;

        let enrichment = self.enrich(&settings).await;
        let new = NewEntry {
            timestamp_utc: now_timestamp(),
            position: enrichment.position,
            navigation_state: enrichment.navigation_state,
            text,
            media_path: None,
            source: EntrySource::QuickNote,
            entry_type: EntryType::Log,
            metadata: non_empty(enrichment.metadata),
        };

        let id = self.entries.insert(&new)?;
        info!(id, "Created quick note");

        self.publish_if_eligible(id, &new, &settings).await;
        Ok(id)
    }

    /// Create an entry from the full form
    pub async fn create_entry(&self, form: EntryForm) -> LogbookResult<i64> {
        let valid = form.validate()?;
        let settings = self.config.load()?.signalk;

        let staged = match &form.media {
            Some(upload) => self.media.stage(upload)?,
            None => None,
        };

        let enrichment = self.enrich(&settings).await;

        // Telemetry values win over form values with the same key
        let mut metadata = valid.metadata;
        metadata.extend(enrichment.metadata);

        let new = NewEntry {
            timestamp_utc: valid.timestamp_utc,
            position: enrichment.position,
            navigation_state: valid.navigation_state.or(enrichment.navigation_state),
            text: valid.text,
            media_path: staged.as_ref().map(|s| s.relative_path().to_string()),
            source: EntrySource::Manual,
            entry_type: valid.entry_type,
            metadata: non_empty(metadata),
        };

        let id = match self.entries.insert(&new) {
            Ok(id) => id,
            Err(e) => {
                self.discard_staged(staged);
                return Err(e.into());
            }
        };
        info!(id, entry_type = %new.entry_type, "Created entry");

        self.publish_if_eligible(id, &new, &settings).await;
        Ok(id)
    }

    /// Edit an entry in place
    ///
    /// Position, source and any published resource id are left as they are;
    /// edits are not re-published.
    pub async fn update_entry(&self, id: i64, form: EntryForm) -> LogbookResult<i64> {
        let existing = self.entries.get(id)?.ok_or(LogbookError::NotFound(id))?;
        let valid = form.validate()?;

        let staged = match &form.media {
            Some(upload) => self.media.stage(upload)?,
            None => None,
        };

        let old_media = existing.media_path;
        let new_media = match &staged {
            Some(staged) => Some(staged.relative_path().to_string()),
            None if form.remove_image => None,
            None => old_media.clone(),
        };

        let changes = EntryChanges {
            timestamp_utc: valid.timestamp_utc,
            navigation_state: valid.navigation_state,
            text: valid.text,
            media_path: new_media.clone(),
            entry_type: valid.entry_type,
            metadata: non_empty(valid.metadata),
        };

        match self.entries.update(id, &changes) {
            Ok(true) => {}
            Ok(false) => {
                self.discard_staged(staged);
                return Err(LogbookError::NotFound(id));
            }
            Err(e) => {
                self.discard_staged(staged);
                return Err(e.into());
            }
        }

        // The row now points at the new photo (or none); retire the old one
        if let Some(old) = old_media.filter(|old| new_media.as_deref() != Some(old.as_str())) {
            self.media.soft_delete_logged(&old);
        }

        info!(id, "Updated entry");
        Ok(id)
    }

    /// Delete an entry, its Signal K note and its photo
    ///
    /// Steps run as: retract the note, remove the row, move the photo to
    /// `uploads/deleted/`. The photo is moved only once no row references
    /// it, so a failed row removal never leaves an entry pointing at a
    /// missing file. Only the row removal can fail the call; the note and
    /// the photo are handled best effort.
    pub async fn delete_entry(&self, id: i64) -> LogbookResult<()> {
        let existing = self.entries.get(id)?.ok_or(LogbookError::NotFound(id))?;

        if let Some(resource_id) = &existing.external_resource_id {
            if self.telemetry.is_enabled() {
                self.telemetry.retract(resource_id).await;
            }
        }

        if !self.entries.delete(id)? {
            return Err(LogbookError::DeleteFailed(id));
        }

        if let Some(media_path) = &existing.media_path {
            self.media.soft_delete_logged(media_path);
        }

        info!(id, "Deleted entry");
        Ok(())
    }

    pub fn get_entry(&self, id: i64) -> LogbookResult<LogEntry> {
        self.entries.get(id)?.ok_or(LogbookError::NotFound(id))
    }

    /// One page of the entry list (`page` starts at 1)
    pub fn list_entries(&self, filter: &EntryFilter, page: u32) -> LogbookResult<Vec<LogEntry>> {
        Ok(self.entries.list(filter, page, PAGE_SIZE)?)
    }

    /// Entries for the home view
    pub fn home_entries(&self, filter: &EntryFilter) -> LogbookResult<Vec<LogEntry>> {
        Ok(self.entries.home(filter)?)
    }

    async fn enrich(&self, settings: &SignalKSettings) -> Enrichment {
        if !self.telemetry.is_enabled() {
            return Enrichment::default();
        }

        let snapshot = self.telemetry.fetch(&settings.selected_paths).await;
        debug!(?snapshot, "Telemetry snapshot");

        Enrichment {
            position: snapshot.position(),
            navigation_state: snapshot.navigation_state(),
            metadata: snapshot.into_metadata(),
        }
    }

    async fn publish_if_eligible(&self, id: i64, entry: &NewEntry, settings: &SignalKSettings) {
        if !should_publish(
            self.telemetry.is_enabled(),
            entry.position,
            settings,
            entry.entry_type,
        ) {
            return;
        }

        let note = NoteResource {
            text: entry.text.clone(),
            timestamp_utc: entry.timestamp_utc.clone(),
            position: entry.position,
            navigation_state: entry.navigation_state.clone(),
        };

        let Some(resource_id) = self.telemetry.publish(&note).await else {
            warn!(id, "Entry was not published to Signal K");
            return;
        };

        if let Err(e) = self.entries.set_external_resource_id(id, &resource_id) {
            warn!(id, %resource_id, error = %e, "Could not record Signal K resource id");
        }
    }

    fn discard_staged(&self, staged: Option<StagedMedia>) {
        if let Some(staged) = staged {
            self.media.discard(staged);
        }
    }
}

/// Publishing needs telemetry, a position, sync switched on and a syncable type
pub fn should_publish(
    telemetry_enabled: bool,
    position: Option<Position>,
    settings: &SignalKSettings,
    entry_type: EntryType,
) -> bool {
    telemetry_enabled && position.is_some() && settings.syncs(entry_type)
}

/// Trimmed text, rejecting empty submissions
fn validate_text(raw: &str) -> LogbookResult<String> {
    let text = raw.trim();
    if text.is_empty() {
        return Err(LogbookError::validation("Text is required"));
    }
    Ok(text.to_string())
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn non_empty(metadata: Metadata) -> Option<Metadata> {
    (!metadata.is_empty()).then_some(metadata)
}

/// Form metadata; anything but a JSON object counts as empty
fn parse_metadata(raw: Option<&str>) -> Metadata {
    let Some(raw) = non_blank(raw) else {
        return Metadata::new();
    };
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => map,
        Ok(_) | Err(_) => {
            debug!("Ignoring form metadata that is not a JSON object");
            Metadata::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::telemetry::{TelemetrySnapshot, POSITION_PATH, STATE_PATH};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Telemetry double that records every call
    #[derive(Default)]
    struct FakeTelemetry {
        enabled: bool,
        snapshot: TelemetrySnapshot,
        publish_id: Option<String>,
        fetched: Mutex<Vec<Vec<String>>>,
        published: Mutex<Vec<NoteResource>>,
        retracted: Mutex<Vec<String>>,
    }

    impl FakeTelemetry {
        fn disabled() -> Self {
            Self::default()
        }

        fn at(lat: f64, lon: f64) -> Self {
            let mut snapshot = TelemetrySnapshot::default();
            snapshot.insert(POSITION_PATH, json!([lat, lon]));
            snapshot.insert(STATE_PATH, json!("sailing"));
            Self {
                enabled: true,
                snapshot,
                publish_id: Some("note-1".to_string()),
                ..Default::default()
            }
        }

        fn published(&self) -> Vec<NoteResource> {
            self.published.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Telemetry for FakeTelemetry {
        fn is_enabled(&self) -> bool {
            self.enabled
        }

        async fn fetch(&self, paths: &[String]) -> TelemetrySnapshot {
            self.fetched.lock().unwrap().push(paths.to_vec());
            self.snapshot.clone()
        }

        async fn publish(&self, note: &NoteResource) -> Option<String> {
            self.published.lock().unwrap().push(note.clone());
            self.publish_id.clone()
        }

        async fn retract(&self, resource_id: &str) {
            self.retracted.lock().unwrap().push(resource_id.to_string());
        }
    }

    struct Harness {
        _dir: TempDir,
        paths: DataPaths,
        service: LogbookService,
        telemetry: Arc<FakeTelemetry>,
    }

    fn harness_with(telemetry: FakeTelemetry, config: Config) -> Harness {
        let dir = TempDir::new().unwrap();
        let paths = DataPaths::new(dir.path());
        let telemetry = Arc::new(telemetry);
        let service = LogbookService::open(
            &paths,
            Arc::new(ConfigStore::in_memory(config)),
            telemetry.clone(),
        )
        .unwrap();
        Harness {
            _dir: dir,
            paths,
            service,
            telemetry,
        }
    }

    fn harness(telemetry: FakeTelemetry) -> Harness {
        harness_with(telemetry, Config::default())
    }

    fn form(text: &str) -> EntryForm {
        EntryForm {
            text: text.to_string(),
            ..Default::default()
        }
    }

    fn photo(name: &str) -> MediaUpload {
        MediaUpload {
            file_name: name.to_string(),
            bytes: b"\x89PNG fake image".to_vec(),
        }
    }

    #[tokio::test]
    async fn test_quick_note_rejects_blank_text() {
        let h = harness(FakeTelemetry::disabled());

        let err = h.service.quick_note("   \n ").await.unwrap_err();
        assert!(matches!(err, LogbookError::Validation(_)));
        assert_eq!(h.service.entries().count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_quick_note_without_telemetry() {
        let h = harness(FakeTelemetry::disabled());

        let id = h.service.quick_note("  Land ho  ").await.unwrap();
        let entry = h.service.get_entry(id).unwrap();

        assert_eq!(entry.text, "Land ho");
        assert_eq!(entry.source, EntrySource::QuickNote);
        assert_eq!(entry.entry_type, EntryType::Log);
        assert_eq!(entry.position, None);
        assert_eq!(entry.navigation_state, None);
        assert_eq!(entry.metadata, None);
        assert!(entry.timestamp_utc.ends_with('Z'));
        assert!(h.telemetry.fetched.lock().unwrap().is_empty());
        assert!(h.telemetry.published().is_empty());
    }

    #[tokio::test]
    async fn test_quick_note_with_telemetry_populates_position() {
        let h = harness(FakeTelemetry::at(39.57, 2.65));

        let id = h.service.quick_note("Leaving Palma").await.unwrap();
        let entry = h.service.get_entry(id).unwrap();

        assert_eq!(entry.position, Some(Position::new(39.57, 2.65)));
        assert_eq!(entry.navigation_state.as_deref(), Some("sailing"));
        let metadata = entry.metadata.unwrap();
        assert_eq!(metadata[POSITION_PATH], json!([39.57, 2.65]));
        assert_eq!(
            h.telemetry.fetched.lock().unwrap()[0],
            vec!["navigation.position".to_string(), "navigation.state".to_string()]
        );
    }

    #[tokio::test]
    async fn test_quick_note_publishes_and_records_resource_id() {
        let h = harness(FakeTelemetry::at(39.57, 2.65));

        let id = h.service.quick_note("Leaving Palma").await.unwrap();

        let published = h.telemetry.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].text, "Leaving Palma");
        assert_eq!(published[0].position, Some(Position::new(39.57, 2.65)));
        assert_eq!(
            h.service.get_entry(id).unwrap().external_resource_id.as_deref(),
            Some("note-1")
        );
    }

    #[tokio::test]
    async fn test_publish_failure_still_succeeds() {
        let mut telemetry = FakeTelemetry::at(39.57, 2.65);
        telemetry.publish_id = None;
        let h = harness(telemetry);

        let id = h.service.quick_note("Leaving Palma").await.unwrap();

        assert_eq!(h.telemetry.published().len(), 1);
        assert_eq!(h.service.get_entry(id).unwrap().external_resource_id, None);
    }

    #[tokio::test]
    async fn test_publish_decision_matrix() {
        for enabled in [false, true] {
            for has_position in [false, true] {
                for sync in [false, true] {
                    for syncable in [false, true] {
                        let mut telemetry = if has_position {
                            FakeTelemetry::at(1.0, 2.0)
                        } else {
                            FakeTelemetry {
                                publish_id: Some("n".into()),
                                ..Default::default()
                            }
                        };
                        telemetry.enabled = enabled;

                        let mut config = Config::default();
                        config.signalk.sync_resources = sync;
                        config.signalk.sync_entry_types = if syncable {
                            vec![EntryType::Weather]
                        } else {
                            vec![EntryType::Log]
                        };

                        let h = harness_with(telemetry, config);
                        let mut f = form("Wind backing SW");
                        f.entry_type = Some("weather".to_string());
                        h.service.create_entry(f).await.unwrap();

                        let expected = enabled && has_position && sync && syncable;
                        assert_eq!(
                            h.telemetry.published().len(),
                            usize::from(expected),
                            "enabled={enabled} position={has_position} sync={sync} syncable={syncable}"
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn test_should_publish() {
        let settings = SignalKSettings::default();
        let pos = Some(Position::new(0.0, 0.0));

        assert!(should_publish(true, pos, &settings, EntryType::Log));
        assert!(!should_publish(false, pos, &settings, EntryType::Log));
        assert!(!should_publish(true, None, &settings, EntryType::Log));
        assert!(!should_publish(true, pos, &settings, EntryType::Fuel));
    }

    #[tokio::test]
    async fn test_create_entry_fields() {
        let h = harness(FakeTelemetry::disabled());

        let id = h
            .service
            .create_entry(EntryForm {
                text: "Changed the impeller".to_string(),
                timestamp_utc: Some("2025-05-30T16:45".to_string()),
                entry_type: Some("maintenance".to_string()),
                navigation_state: Some("moored".to_string()),
                metadata: Some(r#"{"engine_hours": 1234}"#.to_string()),
                ..Default::default()
            })
            .await
            .unwrap();

        let entry = h.service.get_entry(id).unwrap();
        assert_eq!(entry.timestamp_utc, "2025-05-30T16:45:00Z");
        assert_eq!(entry.entry_type, EntryType::Maintenance);
        assert_eq!(entry.source, EntrySource::Manual);
        assert_eq!(entry.navigation_state.as_deref(), Some("moored"));
        assert_eq!(entry.position, None);
        assert_eq!(entry.metadata.unwrap()["engine_hours"], json!(1234));
    }

    #[tokio::test]
    async fn test_create_entry_telemetry_overrides_form_metadata() {
        let h = harness(FakeTelemetry::at(43.0, -9.0));

        let id = h
            .service
            .create_entry(EntryForm {
                text: "Rounding Finisterre".to_string(),
                metadata: Some(
                    r#"{"navigation.position": "typed by hand", "sea_state": "rough"}"#.to_string(),
                ),
                ..Default::default()
            })
            .await
            .unwrap();

        let metadata = h.service.get_entry(id).unwrap().metadata.unwrap();
        assert_eq!(metadata["navigation.position"], json!([43.0, -9.0]));
        assert_eq!(metadata["sea_state"], json!("rough"));
    }

    #[tokio::test]
    async fn test_create_entry_form_state_wins_over_telemetry() {
        let h = harness(FakeTelemetry::at(43.0, -9.0));

        let mut f = form("Hove to");
        f.navigation_state = Some("hove-to".to_string());
        let id = h.service.create_entry(f).await.unwrap();

        assert_eq!(
            h.service.get_entry(id).unwrap().navigation_state.as_deref(),
            Some("hove-to")
        );
    }

    #[tokio::test]
    async fn test_create_entry_validation() {
        let h = harness(FakeTelemetry::disabled());

        let mut f = form("x");
        f.entry_type = Some("diary".to_string());
        assert!(matches!(
            h.service.create_entry(f).await,
            Err(LogbookError::Validation(_))
        ));

        let mut f = form("x");
        f.timestamp_utc = Some("last tuesday".to_string());
        assert!(matches!(
            h.service.create_entry(f).await,
            Err(LogbookError::Validation(_))
        ));

        let mut f = form(" ");
        f.media = Some(photo("a.png"));
        assert!(matches!(
            h.service.create_entry(f).await,
            Err(LogbookError::Validation(_))
        ));
        assert!(!h.paths.uploads_dir().exists());
        assert_eq!(h.service.entries().count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_create_entry_ignores_bad_metadata() {
        let h = harness(FakeTelemetry::disabled());

        let mut f = form("x");
        f.metadata = Some("{not json".to_string());
        let id = h.service.create_entry(f).await.unwrap();
        assert_eq!(h.service.get_entry(id).unwrap().metadata, None);

        let mut f = form("y");
        f.metadata = Some("[1, 2]".to_string());
        let id = h.service.create_entry(f).await.unwrap();
        assert_eq!(h.service.get_entry(id).unwrap().metadata, None);
    }

    #[tokio::test]
    async fn test_create_entry_with_photo() {
        let h = harness(FakeTelemetry::disabled());

        let mut f = form("Dolphins at the bow");
        f.media = Some(photo("IMG_0001.PNG"));
        let id = h.service.create_entry(f).await.unwrap();

        let media_path = h.service.get_entry(id).unwrap().media_path.unwrap();
        assert!(media_path.starts_with("uploads/"));
        assert!(h.paths.data_dir().join(&media_path).exists());
    }

    #[tokio::test]
    async fn test_create_entry_ignores_unsupported_attachment() {
        let h = harness(FakeTelemetry::disabled());

        let mut f = form("Passage plan");
        f.media = Some(photo("plan.gpx"));
        let id = h.service.create_entry(f).await.unwrap();

        assert_eq!(h.service.get_entry(id).unwrap().media_path, None);
    }

    #[tokio::test]
    async fn test_update_entry_missing() {
        let h = harness(FakeTelemetry::disabled());
        assert!(matches!(
            h.service.update_entry(7, form("x")).await,
            Err(LogbookError::NotFound(7))
        ));
    }

    #[tokio::test]
    async fn test_update_entry_rejects_blank_text() {
        let h = harness(FakeTelemetry::disabled());
        let id = h.service.quick_note("original").await.unwrap();

        assert!(matches!(
            h.service.update_entry(id, form("")).await,
            Err(LogbookError::Validation(_))
        ));
        assert_eq!(h.service.get_entry(id).unwrap().text, "original");
    }

    #[tokio::test]
    async fn test_update_keeps_position_and_resource_id_and_does_not_publish() {
        let h = harness(FakeTelemetry::at(39.57, 2.65));
        let id = h.service.quick_note("Leaving Palma").await.unwrap();
        assert_eq!(h.telemetry.published().len(), 1);

        let mut f = form("Leaving Palma, wind NE 12kn");
        f.entry_type = Some("navigation".to_string());
        f.timestamp_utc = Some("2025-06-01T09:00:00Z".to_string());
        h.service.update_entry(id, f).await.unwrap();

        let entry = h.service.get_entry(id).unwrap();
        assert_eq!(entry.text, "Leaving Palma, wind NE 12kn");
        assert_eq!(entry.entry_type, EntryType::Navigation);
        assert_eq!(entry.timestamp_utc, "2025-06-01T09:00:00Z");
        assert_eq!(entry.position, Some(Position::new(39.57, 2.65)));
        assert_eq!(entry.external_resource_id.as_deref(), Some("note-1"));
        assert_eq!(entry.source, EntrySource::QuickNote);
        assert_eq!(h.telemetry.published().len(), 1);
    }

    #[tokio::test]
    async fn test_update_keeps_photo_by_default() {
        let h = harness(FakeTelemetry::disabled());
        let mut f = form("with photo");
        f.media = Some(photo("a.jpg"));
        let id = h.service.create_entry(f).await.unwrap();
        let before = h.service.get_entry(id).unwrap().media_path;

        h.service.update_entry(id, form("edited")).await.unwrap();

        let after = h.service.get_entry(id).unwrap().media_path;
        assert_eq!(before, after);
        assert!(h.paths.data_dir().join(after.unwrap()).exists());
    }

    #[tokio::test]
    async fn test_update_remove_image_moves_file_aside() {
        let h = harness(FakeTelemetry::disabled());
        let mut f = form("with photo");
        f.media = Some(photo("a.jpg"));
        let id = h.service.create_entry(f).await.unwrap();
        let media_path = h.service.get_entry(id).unwrap().media_path.unwrap();
        let file_name = Path::new(&media_path).file_name().unwrap().to_owned();

        let mut f = form("photo removed");
        f.remove_image = true;
        h.service.update_entry(id, f).await.unwrap();

        assert_eq!(h.service.get_entry(id).unwrap().media_path, None);
        assert!(!h.paths.data_dir().join(&media_path).exists());
        assert!(h.paths.deleted_dir().join(file_name).exists());
    }

    #[tokio::test]
    async fn test_update_replaces_photo() {
        let h = harness(FakeTelemetry::disabled());
        let mut f = form("with photo");
        f.media = Some(photo("a.jpg"));
        let id = h.service.create_entry(f).await.unwrap();
        let old = h.service.get_entry(id).unwrap().media_path.unwrap();

        let mut f = form("better photo");
        f.media = Some(photo("b.png"));
        h.service.update_entry(id, f).await.unwrap();

        let new = h.service.get_entry(id).unwrap().media_path.unwrap();
        assert_ne!(old, new);
        assert!(new.ends_with(".png"));
        assert!(h.paths.data_dir().join(&new).exists());
        assert!(!h.paths.data_dir().join(&old).exists());
        assert!(h
            .paths
            .deleted_dir()
            .join(Path::new(&old).file_name().unwrap())
            .exists());
    }

    #[tokio::test]
    async fn test_delete_entry_moves_photo_and_retracts_note() {
        let h = harness(FakeTelemetry::at(39.57, 2.65));
        let mut f = form("Anchored");
        f.media = Some(photo("anchor.jpg"));
        let id = h.service.create_entry(f).await.unwrap();
        let media_path = h.service.get_entry(id).unwrap().media_path.unwrap();

        h.service.delete_entry(id).await.unwrap();

        assert!(matches!(h.service.get_entry(id), Err(LogbookError::NotFound(_))));
        assert!(!h.paths.data_dir().join(&media_path).exists());
        assert!(h
            .paths
            .deleted_dir()
            .join(Path::new(&media_path).file_name().unwrap())
            .exists());
        assert_eq!(*h.telemetry.retracted.lock().unwrap(), vec!["note-1".to_string()]);
    }

    #[tokio::test]
    async fn test_delete_skips_retract_when_disabled() {
        let h = harness(FakeTelemetry::at(39.57, 2.65));
        let id = h.service.quick_note("x").await.unwrap();

        // Simulate Signal K being switched off later
        let disabled = LogbookService::open(
            &h.paths,
            Arc::new(ConfigStore::in_memory(Config::default())),
            Arc::new(FakeTelemetry::disabled()),
        )
        .unwrap();
        disabled.delete_entry(id).await.unwrap();

        assert!(h.telemetry.retracted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_missing_entry() {
        let h = harness(FakeTelemetry::disabled());
        h.service.quick_note("keep me").await.unwrap();

        assert!(matches!(
            h.service.delete_entry(404).await,
            Err(LogbookError::NotFound(404))
        ));
        assert_eq!(h.service.entries().count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_list_and_home() {
        let h = harness(FakeTelemetry::disabled());
        h.service.quick_note("one").await.unwrap();
        let mut f = form("two");
        f.entry_type = Some("fuel".to_string());
        f.timestamp_utc = Some("2020-01-01T00:00:00Z".to_string());
        h.service.create_entry(f).await.unwrap();

        let fuel = h
            .service
            .list_entries(&EntryFilter::from_query(Some("fuel"), None), 1)
            .unwrap();
        assert_eq!(fuel.len(), 1);
        assert_eq!(fuel[0].text, "two");

        let home = h.service.home_entries(&EntryFilter::default()).unwrap();
        assert_eq!(home.len(), 2);
        assert_eq!(home[0].text, "one");
    }
}
