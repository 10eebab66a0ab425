use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

pub const SOCKS5_VERSION: u8 = 0x05;
pub const METHOD_NO_AUTH: u8 = 0x00;
pub const RESERVED: u8 = 0x00;

/// Byte written on the control connection to keep the login alive.
pub const HEARTBEAT_PROBE: u8 = 0x00;

/// Client greeting: version plus the offered authentication methods.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Greeting {
    pub version: u8,
    pub methods: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GreetingReply {
    pub version: u8,
    pub method: u8,
}

impl GreetingReply {
    pub fn no_auth() -> Self {
        Self {
            version: SOCKS5_VERSION,
            method: METHOD_NO_AUTH,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Connect,
    Bind,
    UdpAssociate,
    Other(u8),
}

impl From<u8> for Command {
    fn from(value: u8) -> Self {
        match value {
            0x01 => Command::Connect,
            0x02 => Command::Bind,
            0x03 => Command::UdpAssociate,
            other => Command::Other(other),
        }
    }
}

impl From<Command> for u8 {
    fn from(value: Command) -> Self {
        match value {
            Command::Connect => 0x01,
            Command::Bind => 0x02,
            Command::UdpAssociate => 0x03,
            Command::Other(code) => code,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AddressType {
    IPv4 = 0x01,
    Domain = 0x03,
    IPv6 = 0x04,
}

impl AddressType {
    pub fn from_byte(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(AddressType::IPv4),
            0x03 => Some(AddressType::Domain),
            0x04 => Some(AddressType::IPv6),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Host {
    IPv4(Ipv4Addr),
    IPv6(Ipv6Addr),
    Domain(String),
}

impl Host {
    pub fn address_type(&self) -> AddressType {
        match self {
            Host::IPv4(_) => AddressType::IPv4,
            Host::IPv6(_) => AddressType::IPv6,
            Host::Domain(_) => AddressType::Domain,
        }
    }
}

/// Transport requested from the relay for one proxied stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestType {
    Tcp,
    Udp,
}

impl RequestType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestType::Tcp => "tcp",
            RequestType::Udp => "udp",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "tcp" => Some(RequestType::Tcp),
            "udp" => Some(RequestType::Udp),
            _ => None,
        }
    }
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A SOCKS5 command frame as sent by the local application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyRequest {
    pub version: u8,
    pub command: Command,
    pub destination: Host,
    pub port: u16,
}

impl ProxyRequest {
    pub fn address_type(&self) -> AddressType {
        self.destination.address_type()
    }

    /// CONNECT maps to a TCP tunnel and UDP ASSOCIATE to a UDP one. Anything
    /// else cannot be tunnelled.
    pub fn request_type(&self) -> Option<RequestType> {
        match self.command {
            Command::Connect => Some(RequestType::Tcp),
            Command::UdpAssociate => Some(RequestType::Udp),
            Command::Bind | Command::Other(_) => None,
        }
    }

    /// `host:port` form sent as the `url` of a Connection handshake. IPv6
    /// literals are bracketed.
    pub fn destination_string(&self) -> String {
        match &self.destination {
            Host::IPv4(ip) => SocketAddr::from((*ip, self.port)).to_string(),
            Host::IPv6(ip) => SocketAddr::from((*ip, self.port)).to_string(),
            Host::Domain(domain) => format!("{}:{}", domain, self.port),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReplyStatus {
    Succeeded = 0x00,
    GeneralFailure = 0x01,
    ConnectionNotAllowed = 0x02,
    NetworkUnreachable = 0x03,
    HostUnreachable = 0x04,
    ConnectionRefused = 0x05,
    TTLExpired = 0x06,
    CommandNotSupported = 0x07,
    AddressTypeNotSupported = 0x08,
}

/// SOCKS5 reply frame. The bound address is kept as raw bytes so that the
/// encoder can reject malformed replies instead of silently truncating them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyReply {
    pub version: u8,
    pub status: ReplyStatus,
    pub reserved: u8,
    pub address_type: AddressType,
    pub bound_address: Vec<u8>,
    pub bound_port: u16,
}

impl ProxyReply {
    /// Success reply advertising `bound` (the local end of the tunnel
    /// connection). IPv4-mapped IPv6 addresses are reported as IPv4.
    pub fn succeeded(bound: SocketAddr) -> Self {
        let (address_type, bound_address) = match bound.ip().to_canonical() {
            IpAddr::V4(ip) => (AddressType::IPv4, ip.octets().to_vec()),
            IpAddr::V6(ip) => (AddressType::IPv6, ip.octets().to_vec()),
        };

        Self {
            version: SOCKS5_VERSION,
            status: ReplyStatus::Succeeded,
            reserved: RESERVED,
            address_type,
            bound_address,
            bound_port: bound.port(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum HandshakeKind {
    Login = 0,
    Connection = 1,
}

impl HandshakeKind {
    pub fn from_byte(value: u8) -> Option<Self> {
        match value {
            0 => Some(HandshakeKind::Login),
            1 => Some(HandshakeKind::Connection),
            _ => None,
        }
    }
}

/// First payload on every freshly dialed relay connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeMessage {
    Login { key: String },
    Connection { reqtype: RequestType, url: String },
}

impl HandshakeMessage {
    pub fn login(key: impl Into<String>) -> Self {
        Self::Login { key: key.into() }
    }

    pub fn connection(reqtype: RequestType, url: impl Into<String>) -> Self {
        Self::Connection {
            reqtype,
            url: url.into(),
        }
    }

    pub fn kind(&self) -> HandshakeKind {
        match self {
            HandshakeMessage::Login { .. } => HandshakeKind::Login,
            HandshakeMessage::Connection { .. } => HandshakeKind::Connection,
        }
    }

    /// Key/value pairs in wire order.
    pub fn fields(&self) -> Vec<(&'static str, &str)> {
        match self {
            HandshakeMessage::Login { key } => vec![("key", key.as_str())],
            HandshakeMessage::Connection { reqtype, url } => {
                vec![("reqtype", reqtype.as_str()), ("url", url.as_str())]
            }
        }
    }
}

/// The single status byte the relay answers a handshake with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandshakeStatus(pub u8);

impl HandshakeStatus {
    pub const SUCCESS: HandshakeStatus = HandshakeStatus(0);

    pub fn is_success(&self) -> bool {
        self.0 == 0
    }

    pub fn code(&self) -> u8 {
        self.0
    }
}
