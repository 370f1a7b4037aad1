//! Entry endpoints

use axum::extract::{Multipart, Path, Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use bitacora_core::{create_backup, EntryFilter, EntryForm, MediaUpload};

use super::extractors::ApiJson;
use super::types::{ApiError, EntryAck, EntryDetail, EntrySummary};
use super::AppState;

#[derive(Debug, Deserialize)]
pub struct QuickNoteRequest {
    #[serde(default)]
    text: String,
}

/// `type`, `source` and `page` query parameters
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    page: Option<String>,
    #[serde(rename = "type")]
    entry_type: Option<String>,
    source: Option<String>,
}

impl ListQuery {
    fn filter(&self) -> EntryFilter {
        EntryFilter::from_query(self.entry_type.as_deref(), self.source.as_deref())
    }

    /// Page number; anything unparsable is page 1
    fn page(&self) -> u32 {
        self.page
            .as_deref()
            .and_then(|p| p.trim().parse().ok())
            .filter(|p| *p >= 1)
            .unwrap_or(1)
    }
}

pub async fn quick_note(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<QuickNoteRequest>,
) -> Result<Json<EntryAck>, ApiError> {
    let id = state.service.quick_note(&request.text).await?;
    Ok(Json(EntryAck::ok(id)))
}

pub async fn create(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<EntryAck>, ApiError> {
    let form = read_entry_form(multipart).await?;
    let id = state.service.create_entry(form).await?;
    Ok(Json(EntryAck::ok(id)))
}

pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    multipart: Multipart,
) -> Result<Json<EntryAck>, ApiError> {
    let form = read_entry_form(multipart).await?;
    let id = state.service.update_entry(id, form).await?;
    Ok(Json(EntryAck::ok(id)))
}

pub async fn delete(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    state.service.delete_entry(id).await?;
    Ok(Json(json!({ "status": "ok" })))
}

pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<EntryDetail>, ApiError> {
    let entry = state.service.get_entry(id)?;
    Ok(Json(entry.into()))
}

pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<EntrySummary>>, ApiError> {
    let entries = state.service.list_entries(&query.filter(), query.page())?;
    Ok(Json(entries.into_iter().map(EntrySummary::from).collect()))
}

/// Home view: the most recent entries in full
pub async fn home(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<EntryDetail>>, ApiError> {
    let entries = state.service.home_entries(&query.filter())?;
    Ok(Json(entries.into_iter().map(EntryDetail::from).collect()))
}

pub async fn backup(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let config = state.config.load().map_err(ApiError::from_config)?;
    let paths = state.paths.clone();

    let archive = tokio::task::spawn_blocking(move || create_backup(&config, &paths))
        .await
        .map_err(|e| ApiError::internal(format!("Backup task failed: {}", e)))??;

    Ok(Json(json!({
        "status": "ok",
        "file": archive.display().to_string(),
    })))
}

/// Collect the multipart fields of the entry form
///
/// Unknown fields are ignored, as is a file part without a file name.
async fn read_entry_form(mut multipart: Multipart) -> Result<EntryForm, ApiError> {
    let mut form = EntryForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request("INVALID_FORM", e.body_text()))?
    {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };

        if name == "media_file" {
            let file_name = field.file_name().unwrap_or_default().to_string();
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::bad_request("INVALID_FORM", e.body_text()))?;
            if !file_name.is_empty() {
                form.media = Some(MediaUpload {
                    file_name,
                    bytes: bytes.to_vec(),
                });
            }
            continue;
        }

        let value = field
            .text()
            .await
            .map_err(|e| ApiError::bad_request("INVALID_FORM", e.body_text()))?;

        match name.as_str() {
            "text" => form.text = value,
            "timestamp_utc" => form.timestamp_utc = Some(value),
            "entry_type" => form.entry_type = Some(value),
            "navigation_state" => form.navigation_state = Some(value),
            "metadata" => form.metadata = Some(value),
            "remove_image" => form.remove_image = is_truthy(&value),
            _ => tracing::debug!(field = %name, "Ignoring unknown form field"),
        }
    }

    Ok(form)
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "on" | "yes"
    )
}
