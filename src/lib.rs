pub mod codec;
pub mod config;
pub mod message_types;
pub mod tls;
pub mod tunnel;
pub mod tunnel_stream;

// Re-export commonly used items for convenience
pub use codec::{CodecError, HandshakeCodec, HandshakeStatusCodec, Socks5Codec, Socks5Request};
pub use message_types::{
    AddressType, Command, Greeting, GreetingReply, HandshakeKind, HandshakeMessage,
    HandshakeStatus, Host, ProxyReply, ProxyRequest, ReplyStatus, RequestType,
};
pub use tunnel::{
    Dialer, HeartbeatVerdict, Session, SessionConfig, SessionState, TlsDialer, TunnelClient,
    TunnelError, TunnelTimeouts,
};
pub use tunnel_stream::TunnelStream;
