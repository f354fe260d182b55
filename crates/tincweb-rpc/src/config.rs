//! Client configuration.
//!
//! Stored as JSON (`client.json` in the user config directory). A missing
//! file yields the defaults, which point at a daemon on localhost.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, Result};

pub const DEFAULT_ENDPOINT: &str = "ws://127.0.0.1:8686/api/";
pub const DEFAULT_RECONNECT_INTERVAL_MS: u64 = 1000;

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_reconnect_interval() -> u64 {
    DEFAULT_RECONNECT_INTERVAL_MS
}

/// Connection settings shared by the RPC client and the event subscriber
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    /// RPC endpoint; the scheme selects the transport
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Event stream endpoint, derived from `endpoint` when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub events_endpoint: Option<String>,

    #[serde(default = "default_reconnect_interval")]
    pub reconnect_interval_ms: u64,

    /// Per-call timeout; calls wait indefinitely when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout_ms: Option<u64>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            events_endpoint: None,
            reconnect_interval_ms: DEFAULT_RECONNECT_INTERVAL_MS,
            request_timeout_ms: None,
        }
    }
}

impl ClientConfig {
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Self::default()
        }
    }

    /// Load config from file, falling back to defaults if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save config to file, creating the parent directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails or the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    #[must_use]
    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }

    #[must_use]
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }

    /// Event stream URL: the explicit one, or one derived from the RPC endpoint.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidEndpoint` if the endpoint is not a valid URL.
    pub fn events_url(&self) -> Result<String> {
        match &self.events_endpoint {
            Some(url) => Ok(url.clone()),
            None => events_url_for(&self.endpoint),
        }
    }
}

/// Default location of the client config file.
///
/// # Errors
///
/// Returns `Error::Config` if the user config directory cannot be determined.
pub fn default_config_path() -> Result<PathBuf> {
    let project = ProjectDirs::from("", "", "tincweb")
        .ok_or_else(|| Error::Config("Failed to determine config directory".to_string()))?;
    Ok(project.config_dir().join("client.json"))
}

/// Derive the event stream URL from an RPC endpoint.
///
/// The daemon serves events at `<api path>/events` over WebSocket, so HTTP
/// schemes are mapped to their WebSocket counterparts.
///
/// # Errors
///
/// Returns `Error::InvalidEndpoint` if the endpoint is not a valid URL or
/// uses a scheme with no WebSocket counterpart.
pub fn events_url_for(endpoint: &str) -> Result<String> {
    let mut url =
        Url::parse(endpoint).map_err(|e| Error::InvalidEndpoint(format!("{endpoint}: {e}")))?;

    let scheme = match url.scheme() {
        "ws" | "http" => "ws",
        "wss" | "https" => "wss",
        other => {
            return Err(Error::InvalidEndpoint(format!(
                "{endpoint}: unsupported scheme {other}"
            )));
        }
    };
    url.set_scheme(scheme)
        .map_err(|()| Error::InvalidEndpoint(endpoint.to_string()))?;

    let path = url.path().trim_end_matches('/').to_string();
    url.set_path(&format!("{path}/events"));
    url.set_query(None);
    url.set_fragment(None);

    Ok(url.to_string())
}
