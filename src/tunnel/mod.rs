mod client;
mod error;
mod heartbeat;
mod listener;
mod relay;
mod session;
mod socks5;
mod transport;
mod types;

pub use client::{TunnelClient, TunnelClientBuilder};
pub use error::TunnelError;
pub use listener::{handle_connection, serve};
pub use relay::{relay, RelayStats};
pub use session::Session;
pub use socks5::Socks5Handshake;
pub use transport::{Dialer, TlsDialer};
pub use types::{
    HeartbeatVerdict, SessionConfig, SessionConfigBuilder, SessionState, TunnelTimeouts,
    TunnelTimeoutsBuilder,
};
