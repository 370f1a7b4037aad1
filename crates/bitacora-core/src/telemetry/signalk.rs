//! Signal K HTTP client
//!
//! Reads vessel data from `/signalk/v1/api/vessels/self/...`, mirrors notes
//! to `/signalk/v2/api/resources/notes` and runs the device access request
//! flow used to obtain a token.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::{NoteResource, Telemetry, TelemetrySnapshot, POSITION_PATH, STATE_PATH};
use crate::config::{ConfigStore, SignalKSettings};

/// Timeout for data reads and the access request flow
const READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Timeout for publishing and deleting notes
const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Shown to the Signal K administrator when approving access
pub const ACCESS_DESCRIPTION: &str = "Diario de a Bordo";

const VESSEL_API: &str = "/signalk/v1/api/vessels/self";
const NOTES_API: &str = "/signalk/v2/api/resources/notes";
const ACCESS_API: &str = "/signalk/v1/access/requests";

/// Result of submitting an access request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessRequest {
    /// Accepted by the server; poll `href` for the decision
    Submitted { client_id: String, href: String },
    Failed(String),
}

/// Result of polling an access request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessPoll {
    Approved { token: String },
    Denied,
    /// Approved but the response carried no token
    MissingToken,
    /// Not completed yet; the state is reported as sent by the server
    Pending { state: Option<String> },
    Failed(String),
}

/// Result of a connection check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionTest {
    Ok,
    /// The server answered 401
    InvalidCredentials,
    Failed(String),
}

/// Client for a Signal K server
///
/// Settings are read from the [`ConfigStore`] on every call so that
/// changes saved through the setup page apply immediately.
pub struct SignalKClient {
    http: reqwest::Client,
    config: Arc<ConfigStore>,
}

impl SignalKClient {
    pub fn new(config: Arc<ConfigStore>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("bitacora/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http, config })
    }

    fn settings(&self) -> Option<SignalKSettings> {
        match self.config.load() {
            Ok(config) => Some(config.signalk),
            Err(e) => {
                warn!("Could not load Signal K settings: {:#}", e);
                None
            }
        }
    }

    /// Read one data path, `None` on any failure
    async fn fetch_path(&self, settings: &SignalKSettings, path: &str) -> Option<Value> {
        let url = format!(
            "{}{}/{}",
            settings.base_url(),
            VESSEL_API,
            path.replace('.', "/")
        );

        let mut request = self.http.get(&url).timeout(READ_TIMEOUT);
        if !settings.token.is_empty() {
            request = request.bearer_auth(&settings.token);
        }

        let response = match request.send().await {
            Ok(r) => r,
            Err(e) => {
                warn!(path, "Signal K request failed: {}", e);
                return None;
            }
        };

        if response.status() != StatusCode::OK {
            debug!(path, status = %response.status(), "Signal K path unavailable");
            return None;
        }

        match response.json::<Value>().await {
            Ok(body) => Some(decode_path(path, body)),
            Err(e) => {
                warn!(path, "Malformed Signal K response: {}", e);
                None
            }
        }
    }

    /// Submit a new access request to the server at `url`
    pub async fn request_access(&self, url: &str) -> AccessRequest {
        let client_id = uuid::Uuid::new_v4().to_string();
        let endpoint = format!("{}{}", url.trim_end_matches('/'), ACCESS_API);
        let body = json!({ "clientId": client_id, "description": ACCESS_DESCRIPTION });

        let response = match self
            .http
            .post(&endpoint)
            .json(&body)
            .timeout(READ_TIMEOUT)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => return AccessRequest::Failed(e.to_string()),
        };

        let status = response.status();
        if status != StatusCode::ACCEPTED {
            let text = response.text().await.unwrap_or_default();
            return AccessRequest::Failed(format!("HTTP {}: {}", status.as_u16(), text));
        }

        let href = match response.json::<Value>().await {
            Ok(body) => body.get("href").and_then(Value::as_str).map(str::to_string),
            Err(e) => return AccessRequest::Failed(e.to_string()),
        };

        match href {
            Some(href) => {
                info!(%client_id, "Signal K access request submitted");
                AccessRequest::Submitted { client_id, href }
            }
            None => AccessRequest::Failed("Response without href".to_string()),
        }
    }

    /// Poll an access request once
    pub async fn poll_access(&self, url: &str, href: &str) -> AccessPoll {
        let endpoint = format!("{}{}", url.trim_end_matches('/'), href);

        let response = match self.http.get(&endpoint).timeout(READ_TIMEOUT).send().await {
            Ok(r) => r,
            Err(e) => return AccessPoll::Failed(e.to_string()),
        };

        if response.status() != StatusCode::OK {
            return AccessPoll::Failed(format!("HTTP {}", response.status().as_u16()));
        }

        let body: Value = match response.json().await {
            Ok(body) => body,
            Err(e) => return AccessPoll::Failed(e.to_string()),
        };

        let state = body.get("state").and_then(Value::as_str);
        if state != Some("COMPLETED") {
            return AccessPoll::Pending {
                state: state.map(str::to_string),
            };
        }

        let request = body.get("accessRequest");
        let permission = request
            .and_then(|r| r.get("permission"))
            .and_then(Value::as_str);
        if permission != Some("APPROVED") {
            return AccessPoll::Denied;
        }

        match request
            .and_then(|r| r.get("token"))
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
        {
            Some(token) => AccessPoll::Approved {
                token: token.to_string(),
            },
            None => AccessPoll::MissingToken,
        }
    }

    /// Check that `url` answers a position read with `token`
    pub async fn test_connection(&self, url: &str, token: &str) -> ConnectionTest {
        let endpoint = format!("{}{}/navigation/position", url.trim_end_matches('/'), VESSEL_API);
        self.check_endpoint(&endpoint, token).await
    }

    /// GET an arbitrary provider URL with bearer auth
    pub async fn test_path(&self, url: &str, token: &str) -> ConnectionTest {
        self.check_endpoint(url, token).await
    }

    async fn check_endpoint(&self, endpoint: &str, token: &str) -> ConnectionTest {
        let mut request = self.http.get(endpoint).timeout(READ_TIMEOUT);
        if !token.is_empty() {
            request = request.bearer_auth(token);
        }

        match request.send().await {
            Ok(r) if r.status() == StatusCode::OK => ConnectionTest::Ok,
            Ok(r) if r.status() == StatusCode::UNAUTHORIZED => ConnectionTest::InvalidCredentials,
            Ok(r) => ConnectionTest::Failed(format!("Error {}", r.status().as_u16())),
            Err(e) => ConnectionTest::Failed(format!("No connection: {}", e)),
        }
    }
}

#[async_trait]
impl Telemetry for SignalKClient {
    fn is_enabled(&self) -> bool {
        self.settings().is_some_and(|s| s.is_active())
    }

    async fn fetch(&self, paths: &[String]) -> TelemetrySnapshot {
        let mut snapshot = TelemetrySnapshot::default();
        let Some(settings) = self.settings().filter(|s| s.is_active()) else {
            return snapshot;
        };

        // Each path succeeds or fails on its own
        for path in paths {
            if let Some(value) = self.fetch_path(&settings, path).await {
                snapshot.insert(path.clone(), value);
            }
        }

        snapshot
    }

    async fn publish(&self, note: &NoteResource) -> Option<String> {
        let settings = self.settings().filter(|s| s.is_active())?;
        if settings.token.is_empty() {
            debug!("No Signal K token, skipping publish");
            return None;
        }

        let url = format!("{}{}", settings.base_url(), NOTES_API);
        let payload = note.payload();
        debug!(%url, %payload, "Publishing note");

        let response = match self
            .http
            .post(&url)
            .bearer_auth(&settings.token)
            .json(&payload)
            .timeout(WRITE_TIMEOUT)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                warn!("Publishing note failed: {}", e);
                return None;
            }
        };

        let status = response.status();
        if status != StatusCode::OK && status != StatusCode::CREATED {
            let text = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), body = %text, "Signal K rejected note");
            return None;
        }

        let id = match response.json::<Value>().await {
            Ok(body) => match body.get("id") {
                Some(Value::String(id)) => Some(id.clone()),
                Some(Value::Number(n)) => Some(n.to_string()),
                _ => None,
            },
            Err(e) => {
                warn!("Malformed publish response: {}", e);
                None
            }
        };

        if let Some(id) = &id {
            info!(resource_id = %id, "Published note");
        }
        id
    }

    async fn retract(&self, resource_id: &str) {
        let Some(settings) = self.settings().filter(|s| s.is_active()) else {
            return;
        };

        let url = format!("{}{}/{}", settings.base_url(), NOTES_API, resource_id);
        let result = self
            .http
            .delete(&url)
            .bearer_auth(&settings.token)
            .timeout(WRITE_TIMEOUT)
            .send()
            .await;

        match result {
            Ok(r) if r.status().is_success() => info!(resource_id, "Deleted Signal K note"),
            Ok(r) => warn!(resource_id, status = r.status().as_u16(), "Signal K note not deleted"),
            Err(e) => warn!(resource_id, "Deleting Signal K note failed: {}", e),
        }
    }
}

/// Decode a data path response body
///
/// `navigation.position` becomes `[lat, lon]` or null, `navigation.state`
/// a string or null; other paths pass through unchanged.
fn decode_path(path: &str, body: Value) -> Value {
    match path {
        POSITION_PATH => decode_position(&body)
            .map(|(lat, lon)| json!([lat, lon]))
            .unwrap_or(Value::Null),
        STATE_PATH => match body {
            Value::Object(mut map) => match map.remove("value") {
                Some(Value::String(s)) => Value::String(s),
                _ => Value::Null,
            },
            Value::String(s) => Value::String(s),
            _ => Value::Null,
        },
        _ => body,
    }
}

fn decode_position(body: &Value) -> Option<(f64, f64)> {
    let value = body.get("value")?;
    Some((number(value.get("latitude")?)?, number(value.get("longitude")?)?))
}

/// Numbers, or strings holding numbers
fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
