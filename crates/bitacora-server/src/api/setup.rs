//! Setup endpoints
//!
//! The Signal K helpers always answer 200 with a `success` flag; failures
//! are reported in the body so the setup page can show them.

use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use bitacora_core::setup::{self as flow, SetupForm};
use bitacora_core::telemetry::{AccessPoll, AccessRequest, ConnectionTest};
use bitacora_core::Config;

use super::extractors::ApiJson;
use super::types::ApiError;
use super::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SignalKTarget {
    url: String,
    href: String,
    token: String,
}

impl SignalKTarget {
    fn url(&self) -> Option<&str> {
        non_blank(&self.url)
    }
}

fn non_blank(value: &str) -> Option<&str> {
    let value = value.trim();
    (!value.is_empty()).then_some(value)
}

fn failure(message: impl Into<String>) -> Json<Value> {
    Json(json!({ "success": false, "error": message.into() }))
}

/// Current configuration, token masked
pub async fn show(State(state): State<AppState>) -> Result<Json<Config>, ApiError> {
    let config = state.config.load().map_err(ApiError::from_config)?;
    Ok(Json(config.redacted()))
}

pub async fn save(
    State(state): State<AppState>,
    ApiJson(form): ApiJson<SetupForm>,
) -> Result<Json<Value>, ApiError> {
    flow::save_settings(&state.config, form).map_err(ApiError::from_config)?;
    Ok(Json(json!({ "status": "ok" })))
}

pub async fn request_access(
    State(state): State<AppState>,
    ApiJson(target): ApiJson<SignalKTarget>,
) -> Result<Json<Value>, ApiError> {
    let Some(url) = target.url() else {
        return Ok(failure("URL is required"));
    };

    let outcome = flow::begin_access_request(&state.config, &state.signalk, url)
        .await
        .map_err(ApiError::from_config)?;

    Ok(match outcome {
        AccessRequest::Submitted { href, .. } => Json(json!({ "success": true, "href": href })),
        AccessRequest::Failed(message) => failure(message),
    })
}

pub async fn check_access(
    State(state): State<AppState>,
    ApiJson(target): ApiJson<SignalKTarget>,
) -> Result<Json<Value>, ApiError> {
    let (Some(url), Some(href)) = (target.url(), non_blank(&target.href)) else {
        return Ok(failure("Missing parameters"));
    };

    let outcome = flow::check_access_request(&state.config, &state.signalk, url, href)
        .await
        .map_err(ApiError::from_config)?;

    Ok(match outcome {
        AccessPoll::Approved { token } => Json(json!({ "success": true, "token": token })),
        AccessPoll::Denied => failure("Access denied"),
        AccessPoll::MissingToken => failure("No token received"),
        AccessPoll::Pending { state } => Json(json!({ "success": false, "state": state })),
        AccessPoll::Failed(message) => failure(message),
    })
}

pub async fn test_connection(
    State(state): State<AppState>,
    ApiJson(target): ApiJson<SignalKTarget>,
) -> Json<Value> {
    let Some(url) = target.url() else {
        return failure("URL is required");
    };
    connection_result(state.signalk.test_connection(url, target.token.trim()).await)
}

pub async fn test_path(
    State(state): State<AppState>,
    ApiJson(target): ApiJson<SignalKTarget>,
) -> Json<Value> {
    let (Some(url), Some(token)) = (target.url(), non_blank(&target.token)) else {
        return failure("Missing parameters");
    };
    connection_result(state.signalk.test_path(url, token).await)
}

fn connection_result(outcome: ConnectionTest) -> Json<Value> {
    match outcome {
        ConnectionTest::Ok => Json(json!({ "success": true })),
        ConnectionTest::InvalidCredentials => failure("Invalid token or insufficient permissions"),
        ConnectionTest::Failed(message) => failure(message),
    }
}
