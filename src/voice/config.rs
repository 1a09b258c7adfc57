//! Voice Configuration
//!
//! Configuration for the SignalWire RELAY connection

use serde::{Deserialize, Serialize};
use url::Url;

pub const DEFAULT_RELAY_HOST: &str = "relay.signalwire.com";

/// Voice configuration
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VoiceConfig {
    /// SignalWire project ID
    pub project_id: String,
    /// SignalWire API token
    pub token: String,
    /// Routing contexts to receive inbound calls for
    pub contexts: Vec<String>,
    /// RELAY host, or a full `ws://`/`wss://` URL
    pub host: String,
    /// Seconds to wait for a RELAY command response
    pub request_timeout_secs: u64,
}

impl std::fmt::Debug for VoiceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoiceConfig")
            .field("project_id", &self.project_id)
            .field("token", &"***")
            .field("contexts", &self.contexts)
            .field("host", &self.host)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            project_id: String::new(),
            token: String::new(),
            contexts: vec!["office".to_string()],
            host: DEFAULT_RELAY_HOST.to_string(),
            request_timeout_secs: 30,
        }
    }
}

impl VoiceConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.project_id.is_empty() {
            return Err("SignalWire project ID is required".to_string());
        }

        if self.token.is_empty() {
            return Err("SignalWire API token is required".to_string());
        }

        if self.contexts.iter().all(|c| c.trim().is_empty()) {
            return Err("At least one RELAY context is required".to_string());
        }

        self.relay_url()?;
        Ok(())
    }

    /// Websocket URL of the RELAY endpoint
    pub fn relay_url(&self) -> Result<Url, String> {
        let host = self.host.trim();
        if host.is_empty() {
            return Err("RELAY host is required".to_string());
        }
        let raw = if host.starts_with("ws://") || host.starts_with("wss://") {
            host.to_string()
        } else {
            format!("wss://{}", host)
        };
        Url::parse(&raw).map_err(|e| format!("Invalid RELAY host {:?}: {}", host, e))
    }
}
