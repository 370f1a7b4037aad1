//! First-run setup and the Signal K access request flow
//!
//! The setup page posts the whole configuration at once; saving it marks
//! setup as complete. Obtaining a token is a two-step dance with the
//! Signal K server: submit an access request, then poll it until an
//! administrator approves or denies it. The pending request and the final
//! token are kept in the configuration.

use anyhow::Result;
use serde::{de, Deserialize, Deserializer};
use tracing::{info, warn};

use crate::config::{
    default_selected_paths, default_sync_entry_types, Config, ConfigStore, DEFAULT_PORT,
    REDACTED_TOKEN,
};
use crate::models::EntryType;
use crate::telemetry::{AccessPoll, AccessRequest, SignalKClient};

/// Body of `POST /setup/save`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SetupForm {
    /// Accepted as a number or a numeric string
    #[serde(deserialize_with = "lenient_port")]
    pub port: Option<u16>,
    pub language: Option<String>,
    pub signalk_enabled: bool,
    pub signalk_url: String,
    pub signalk_token: String,
    pub signalk_sync_resources: bool,
    pub signalk_sync_entry_types: Option<Vec<String>>,
    pub signalk_selected_paths: Option<Vec<String>>,
    pub backup_enabled: bool,
    pub backup_path: String,
}

impl SetupForm {
    /// Overwrite the user-editable parts of `config`
    ///
    /// Pending access request details are left untouched.
    pub fn apply(self, config: &mut Config) {
        config.port = self.port.unwrap_or(DEFAULT_PORT);
        config.language = self
            .language
            .filter(|l| !l.trim().is_empty())
            .unwrap_or_else(|| "es".to_string());
        config.setup_completed = true;
        config.backup_enabled = self.backup_enabled;
        config.backup_path = self.backup_path.trim().to_string();

        let signalk = &mut config.signalk;
        signalk.enabled = self.signalk_enabled;
        signalk.url = self.signalk_url.trim().trim_end_matches('/').to_string();
        // The setup page echoes back the masked token it was shown
        let token = self.signalk_token.trim();
        if token != REDACTED_TOKEN {
            signalk.token = token.to_string();
        }
        signalk.sync_resources = self.signalk_sync_resources;
        signalk.sync_entry_types = match self.signalk_sync_entry_types {
            Some(types) => parse_entry_types(&types),
            None => default_sync_entry_types(),
        };
        signalk.selected_paths = match self.signalk_selected_paths {
            Some(paths) => paths
                .into_iter()
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect(),
            None => default_selected_paths(),
        };
    }
}

fn lenient_port<'de, D>(deserializer: D) -> std::result::Result<Option<u16>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawPort {
        Number(u16),
        Text(String),
    }

    match Option::<RawPort>::deserialize(deserializer)? {
        None => Ok(None),
        Some(RawPort::Number(port)) => Ok(Some(port)),
        Some(RawPort::Text(text)) if text.trim().is_empty() => Ok(None),
        Some(RawPort::Text(text)) => text
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| de::Error::custom(format!("invalid port: {:?}", text))),
    }
}

/// Known entry types from a list of labels, unknown labels dropped
fn parse_entry_types(labels: &[String]) -> Vec<EntryType> {
    let mut types = Vec::new();
    for label in labels {
        match label.parse::<EntryType>() {
            Ok(t) if !types.contains(&t) => types.push(t),
            Ok(_) => {}
            Err(e) => warn!("Ignoring sync entry type: {}", e),
        }
    }
    types
}

/// Save the setup form, returning the stored configuration
pub fn save_settings(store: &ConfigStore, form: SetupForm) -> Result<Config> {
    let mut config = store.load()?;
    form.apply(&mut config);
    store.save(&config)?;
    info!(
        signalk_enabled = config.signalk.enabled,
        backup_enabled = config.backup_enabled,
        "Setup saved"
    );
    Ok(config)
}

/// Submit an access request and remember it as pending
pub async fn begin_access_request(
    store: &ConfigStore,
    client: &SignalKClient,
    url: &str,
) -> Result<AccessRequest> {
    let outcome = client.request_access(url).await;

    if let AccessRequest::Submitted { client_id, href } = &outcome {
        let mut config = store.load()?;
        config.signalk.client_id = client_id.clone();
        config.signalk.request_href = href.clone();
        store.save(&config)?;
    }

    Ok(outcome)
}

/// Poll a pending access request; an approval stores the token
///
/// Approval also switches Signal K on and clears the pending request.
pub async fn check_access_request(
    store: &ConfigStore,
    client: &SignalKClient,
    url: &str,
    href: &str,
) -> Result<AccessPoll> {
    let outcome = client.poll_access(url, href).await;

    if let AccessPoll::Approved { token } = &outcome {
        let mut config = store.load()?;
        config.signalk.token = token.clone();
        config.signalk.enabled = true;
        config.signalk.client_id.clear();
        config.signalk.request_href.clear();
        store.save(&config)?;
        info!("Signal K access approved");
    }

    Ok(outcome)
}
