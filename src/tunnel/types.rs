use derive_builder::Builder;
use std::time::Duration;

#[derive(Debug, Clone, Builder)]
#[builder(setter(into))]
pub struct SessionConfig {
    pub server_host: String,
    pub server_port: u16,
    /// Shared secret presented in the Login handshake.
    pub key: String,
    #[builder(default)]
    pub timeouts: TunnelTimeouts,
    #[builder(default = "Duration::from_secs(60)")]
    pub heartbeat_interval: Duration,
}

impl SessionConfig {
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder::default()
    }
}

#[derive(Debug, Clone, Builder)]
#[builder(setter(into))]
pub struct TunnelTimeouts {
    #[builder(default = "Duration::from_secs(10)")]
    pub connect_timeout: Duration,
    #[builder(default = "Duration::from_secs(10)")]
    pub handshake_request_timeout: Duration,
    #[builder(default = "Duration::from_secs(30)")]
    pub handshake_response_timeout: Duration,
    #[builder(default = "Duration::from_secs(30)")]
    pub socks_handshake_timeout: Duration,
    #[builder(default = "Duration::from_secs(10)")]
    pub probe_timeout: Duration,
    /// Per-direction relay deadline. `None` lets a stalled peer hold the
    /// stream open forever.
    #[builder(default = "Some(Duration::from_secs(300))")]
    pub idle_timeout: Option<Duration>,
}

impl TunnelTimeouts {
    pub fn builder() -> TunnelTimeoutsBuilder {
        TunnelTimeoutsBuilder::default()
    }
}

impl Default for TunnelTimeouts {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            handshake_request_timeout: Duration::from_secs(10),
            handshake_response_timeout: Duration::from_secs(30),
            socks_handshake_timeout: Duration::from_secs(30),
            probe_timeout: Duration::from_secs(10),
            idle_timeout: Some(Duration::from_secs(300)),
        }
    }
}

/// Where the session stands with respect to the relay server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// A control connection is up and its heartbeat monitor is running.
    Connected,
    /// A login attempt is in flight.
    Reconnecting,
    /// No control connection.
    Disconnected,
}

/// What happened when a heartbeat monitor reported a dead control channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatVerdict {
    /// A newer login already replaced the monitor's connection.
    Superseded,
    /// The connection was current; it was closed and a re-login was invoked.
    Relogin,
}
