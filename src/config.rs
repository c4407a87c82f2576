//! Configuration management for the homelink gateway

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use url::Url;

use crate::{Error, Result};

/// Default port the gateway listens on
pub const DEFAULT_PORT: u16 = 42770;

/// Seconds to wait for a device reply before reporting "did not respond"
const DEFAULT_REPLY_TIMEOUT_SECS: u64 = 15;

/// Agent transport keepalive: ping period and how long silence is tolerated
/// before the link is declared dead. The silence timeout must stay shorter
/// than the health-check period so a hung connection is torn down before the
/// backstop would attempt a parallel one.
const DEFAULT_PING_INTERVAL_SECS: u64 = 60;
const DEFAULT_PING_TIMEOUT_SECS: u64 = 180;

/// Agent health-check backstop period
const DEFAULT_HEALTH_CHECK_SECS: u64 = 300;

/// Gateway (server) configuration, loaded from a TOML file
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Seconds to wait for a device reply
    #[serde(default = "default_reply_timeout")]
    pub reply_timeout_secs: u64,

    /// Public IP of the home network; a device connecting from it is
    /// reported as "at home" instead of geo-located
    #[serde(default)]
    pub home_ip: Option<IpAddr>,

    /// Base URL of the geo-IP lookup service; omit to disable location
    /// answers beyond the home-IP check
    #[serde(default)]
    pub geo_url: Option<String>,

    /// Known owners and their credentials
    #[serde(default)]
    pub users: Vec<UserConfig>,
}

/// One owner's credentials and per-device settings
#[derive(Debug, Clone, Deserialize)]
pub struct UserConfig {
    /// Owner identity, matched against the device handshake `id` parameter
    pub id: String,

    /// Access token the voice platform presents on webhook calls
    pub access_token: String,

    /// Connection token for the laptop slot
    #[serde(default)]
    pub laptop_token: Option<String>,

    /// Connection token for the desktop slot
    #[serde(default)]
    pub desktop_token: Option<String>,

    /// Wake-on-LAN MAC for the laptop slot
    #[serde(default)]
    pub laptop_mac: Option<String>,

    /// Wake-on-LAN MAC for the desktop slot
    #[serde(default)]
    pub desktop_mac: Option<String>,
}

const fn default_port() -> u16 {
    DEFAULT_PORT
}

const fn default_reply_timeout() -> u64 {
    DEFAULT_REPLY_TIMEOUT_SECS
}

impl ServerConfig {
    /// Load configuration from `path`, or from the default location
    /// (`<config dir>/homelink/homelink.toml`) when no path is given
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing or not valid TOML.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::default_path()?,
        };

        let raw = std::fs::read_to_string(&path).map_err(|e| {
            Error::Config(format!("cannot read config {}: {e}", path.display()))
        })?;
        let config: Self = toml::from_str(&raw)?;

        tracing::debug!(path = %path.display(), users = config.users.len(), "loaded config");
        Ok(config)
    }

    /// Default config file location under the platform config directory
    ///
    /// # Errors
    ///
    /// Returns an error if no home directory can be determined.
    pub fn default_path() -> Result<PathBuf> {
        directories::ProjectDirs::from("", "", "homelink")
            .map(|dirs| dirs.config_dir().join("homelink.toml"))
            .ok_or_else(|| Error::Config("cannot determine config directory".to_string()))
    }

    /// Reply deadline for webhook-initiated requests
    #[must_use]
    pub const fn reply_timeout(&self) -> Duration {
        Duration::from_secs(self.reply_timeout_secs)
    }
}

/// Agent (device-side) configuration
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Gateway WebSocket endpoint, e.g. `wss://example.net:42770/ws`
    pub server_url: String,

    /// Owner identity this device belongs to
    pub owner_id: String,

    /// This device's connection token
    pub token: String,

    /// Transport keepalive ping period
    pub ping_interval: Duration,

    /// Silence tolerated before the transport is declared dead
    pub ping_timeout: Duration,

    /// Health-check backstop period for reconnection attempts
    pub health_check_period: Duration,
}

impl AgentConfig {
    /// Build an agent config with the default timer periods
    #[must_use]
    pub fn new(server_url: &str, owner_id: &str, token: &str) -> Self {
        Self {
            server_url: server_url.to_string(),
            owner_id: owner_id.to_string(),
            token: token.to_string(),
            ping_interval: Duration::from_secs(DEFAULT_PING_INTERVAL_SECS),
            ping_timeout: Duration::from_secs(DEFAULT_PING_TIMEOUT_SECS),
            health_check_period: Duration::from_secs(DEFAULT_HEALTH_CHECK_SECS),
        }
    }

    /// Full connection URL with the credentials in the query string
    ///
    /// # Errors
    ///
    /// Returns an error if `server_url` is not a valid URL.
    pub fn connect_url(&self) -> Result<Url> {
        let mut url = Url::parse(&self.server_url)
            .map_err(|e| Error::Config(format!("invalid server url {}: {e}", self.server_url)))?;
        url.query_pairs_mut()
            .append_pair("id", &self.owner_id)
            .append_pair("token", &self.token);
        Ok(url)
    }
}
