//! On-disk client settings (TOML).
//!
//! A missing file is created with the defaults on first run, so the user
//! has something to edit.

use crate::tunnel::{SessionConfig, TunnelTimeouts};
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    pub client: LocalSettings,
    pub server: ServerSettings,
    pub timeouts: TimeoutSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalSettings {
    /// Local SOCKS5 port.
    pub port: u16,
    /// Shared secret for the Login handshake.
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// PEM file with the trust root(s) for the server certificate.
    pub ca_cert: PathBuf,
}

/// All values in seconds. `idle_timeout_secs = 0` disables the relay
/// deadline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutSettings {
    pub heartbeat_interval_secs: u64,
    pub connect_timeout_secs: u64,
    pub handshake_timeout_secs: u64,
    pub socks_handshake_timeout_secs: u64,
    pub probe_timeout_secs: u64,
    pub idle_timeout_secs: u64,
}

impl Default for LocalSettings {
    fn default() -> Self {
        Self {
            port: 7071,
            key: "eGauUecvzS05U5DIsxAN4n2hadmRTZGBqNd2zsCkrvwEBbqoITj36mAMk4Unw6Pr".to_string(),
        }
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8081,
            ca_cert: PathBuf::from("cert.pem"),
        }
    }
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: 60,
            connect_timeout_secs: 10,
            handshake_timeout_secs: 30,
            socks_handshake_timeout_secs: 30,
            probe_timeout_secs: 10,
            idle_timeout_secs: 300,
        }
    }
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            client: LocalSettings::default(),
            server: ServerSettings::default(),
            timeouts: TimeoutSettings::default(),
        }
    }
}

impl ClientSettings {
    /// Reads `path`, or writes the defaults there if it does not exist yet.
    /// Keys missing from an existing file take their default value.
    pub fn load_or_init(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            let settings = Self::default();
            settings.save(path)?;
            info!("wrote default configuration to {}", path.display());
            return Ok(settings);
        }

        let content = std::fs::read_to_string(path)?;
        let settings: Self = toml::from_str(&content)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.client.key.is_empty() {
            return Err(ConfigError::Invalid("client.key must not be empty".into()));
        }
        if self.server.host.is_empty() {
            return Err(ConfigError::Invalid("server.host must not be empty".into()));
        }
        if self.server.port == 0 {
            return Err(ConfigError::Invalid("server.port must not be 0".into()));
        }
        if self.timeouts.heartbeat_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "timeouts.heartbeat_interval_secs must be > 0".into(),
            ));
        }
        Ok(())
    }

    /// Listens on every interface.
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.client.port))
    }

    pub fn session_config(&self) -> Result<SessionConfig, ConfigError> {
        let t = &self.timeouts;
        let handshake = Duration::from_secs(t.handshake_timeout_secs);
        let timeouts = TunnelTimeouts::builder()
            .connect_timeout(Duration::from_secs(t.connect_timeout_secs))
            .handshake_request_timeout(handshake)
            .handshake_response_timeout(handshake)
            .socks_handshake_timeout(Duration::from_secs(t.socks_handshake_timeout_secs))
            .probe_timeout(Duration::from_secs(t.probe_timeout_secs))
            .idle_timeout(match t.idle_timeout_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            })
            .build()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        SessionConfig::builder()
            .server_host(self.server.host.as_str())
            .server_port(self.server.port)
            .key(self.client.key.as_str())
            .timeouts(timeouts)
            .heartbeat_interval(Duration::from_secs(t.heartbeat_interval_secs))
            .build()
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }
}
