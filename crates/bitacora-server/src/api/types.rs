//! Shared API types
//!
//! Error responses and the JSON shapes of entries.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use bitacora_core::models::Metadata;
use bitacora_core::{BackupError, LogEntry, LogbookError};

/// Standard API error response
#[derive(Debug)]
pub enum ApiError {
    BadRequest { code: String, message: String },
    NotFound { code: String, message: String },
    Internal { message: String },
}

impl ApiError {
    pub fn bad_request(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::BadRequest {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn not_found(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::NotFound {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    pub fn from_config(e: anyhow::Error) -> Self {
        tracing::error!(error = %format!("{:#}", e), "Configuration error");
        Self::internal("Configuration could not be read")
    }
}

impl From<LogbookError> for ApiError {
    fn from(e: LogbookError) -> Self {
        match e {
            LogbookError::Validation(message) => Self::bad_request("VALIDATION", message),
            LogbookError::NotFound(id) => {
                Self::not_found("ENTRY_NOT_FOUND", format!("Entry {} not found", id))
            }
            LogbookError::DeleteFailed(id) => {
                tracing::error!(id, "Entry row could not be deleted");
                Self::internal("Entry could not be deleted")
            }
            LogbookError::Storage(e) => {
                tracing::error!(error = %e, "Storage error");
                Self::internal("Database operation failed")
            }
            LogbookError::Config(e) => Self::from_config(e),
        }
    }
}

impl From<BackupError> for ApiError {
    fn from(e: BackupError) -> Self {
        match e {
            BackupError::NotEnabled => Self::bad_request("BACKUP_DISABLED", e.to_string()),
            BackupError::InvalidDestination { .. } => {
                Self::bad_request("BACKUP_DESTINATION", e.to_string())
            }
            BackupError::Io(_) | BackupError::Archive(_) => {
                tracing::error!(error = %e, "Backup failed");
                Self::internal(e.to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, code, message) = match self {
            Self::BadRequest { code, message } => {
                (StatusCode::BAD_REQUEST, "bad_request", code, message)
            }
            Self::NotFound { code, message } => (StatusCode::NOT_FOUND, "not_found", code, message),
            Self::Internal { message } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "INTERNAL".to_string(),
                message,
            ),
        };
        (
            status,
            Json(serde_json::json!({
                "error": error_type,
                "code": code,
                "message": message
            })),
        )
            .into_response()
    }
}

/// `{status: "ok", id}` returned by the write endpoints
#[derive(Debug, Serialize)]
pub struct EntryAck {
    pub status: &'static str,
    pub id: i64,
}

impl EntryAck {
    pub fn ok(id: i64) -> Self {
        Self { status: "ok", id }
    }
}

/// Row shape of `GET /api/entries`
#[derive(Debug, Serialize)]
pub struct EntrySummary {
    pub id: i64,
    pub timestamp_utc: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub navigation_state: Option<String>,
    pub text: String,
    pub media_path: Option<String>,
    pub source: String,
    pub entry_type: String,
}

impl From<LogEntry> for EntrySummary {
    fn from(entry: LogEntry) -> Self {
        Self {
            id: entry.id,
            timestamp_utc: entry.timestamp_utc,
            latitude: entry.position.map(|p| p.latitude),
            longitude: entry.position.map(|p| p.longitude),
            navigation_state: entry.navigation_state,
            text: entry.text,
            media_path: entry.media_path,
            source: entry.source.as_str().to_string(),
            entry_type: entry.entry_type.as_str().to_string(),
        }
    }
}

/// Full row, as returned by `GET /api/entry/{id}` and the home view
#[derive(Debug, Serialize)]
pub struct EntryDetail {
    #[serde(flatten)]
    pub summary: EntrySummary,
    #[serde(rename = "signalK_resource_id")]
    pub external_resource_id: Option<String>,
    pub metadata: Option<Metadata>,
}

impl From<LogEntry> for EntryDetail {
    fn from(mut entry: LogEntry) -> Self {
        let external_resource_id = entry.external_resource_id.take();
        let metadata = entry.metadata.take();
        Self {
            summary: entry.into(),
            external_resource_id,
            metadata,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitacora_core::models::Position;
    use bitacora_core::{EntrySource, EntryType};

    fn entry() -> LogEntry {
        LogEntry {
            id: 3,
            timestamp_utc: "2025-06-01T08:15:00Z".to_string(),
            position: Some(Position::new(39.5, 2.6)),
            navigation_state: None,
            text: "Reefed".to_string(),
            media_path: None,
            source: EntrySource::QuickNote,
            entry_type: EntryType::Log,
            external_resource_id: Some("n-1".to_string()),
            metadata: None,
        }
    }

    #[test]
    fn test_summary_shape() {
        let json = serde_json::to_value(EntrySummary::from(entry())).unwrap();
        assert_eq!(json["latitude"], 39.5);
        assert_eq!(json["longitude"], 2.6);
        assert_eq!(json["source"], "quick-note");
        assert_eq!(json["entry_type"], "log");
        assert!(json.get("signalK_resource_id").is_none());
    }

    #[test]
    fn test_detail_shape() {
        let json = serde_json::to_value(EntryDetail::from(entry())).unwrap();
        assert_eq!(json["id"], 3);
        assert_eq!(json["signalK_resource_id"], "n-1");
        assert!(json["metadata"].is_null());
    }

    #[test]
    fn test_error_status_codes() {
        let response = ApiError::from(LogbookError::NotFound(1)).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = ApiError::from(LogbookError::validation("Text is required")).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = ApiError::from(BackupError::NotEnabled).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = ApiError::from(LogbookError::DeleteFailed(1)).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
