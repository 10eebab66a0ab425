/// Server side of the local SOCKS5 exchange. Decodes the greeting, then the
/// command frame, then stops producing frames so the remaining bytes can be
/// handed to the relay untouched.
#[derive(Debug, Default)]
pub struct Socks5Codec {
    pub(super) phase: Socks5Phase,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(super) enum Socks5Phase {
    #[default]
    Greeting,
    Command,
    Established,
}

impl Socks5Codec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_established(&self) -> bool {
        self.phase == Socks5Phase::Established
    }
}

/// Relay handshake messages (`Login` / `Connection`).
#[derive(Debug, Default)]
pub struct HandshakeCodec;

/// The one-byte answer to a handshake message.
#[derive(Debug, Default)]
pub struct HandshakeStatusCodec;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid address type: {0}")]
    InvalidAddressType(u8),

    #[error("Invalid domain name encoding")]
    InvalidDomainEncoding,

    #[error("Unsupported SOCKS version: {0}")]
    UnsupportedVersion(u8),

    #[error("Bound address too short: {actual} bytes (need {expected})")]
    AddressTooShort { expected: usize, actual: usize },

    #[error("Bound address too large: {0} bytes (max 255)")]
    AddressTooLarge(usize),

    #[error("Invalid handshake kind: {0}")]
    InvalidHandshakeKind(u8),

    #[error("Handshake field missing: {0}")]
    MissingField(&'static str),

    #[error("Invalid request type: {0}")]
    InvalidRequestType(String),

    #[error("Invalid handshake field encoding")]
    InvalidFieldEncoding,

    #[error("Handshake field {0} too long")]
    FieldTooLong(String),

    #[error("Too many handshake fields: {0} (max 255)")]
    TooManyFields(usize),

    #[error("Unexpected frame: expected {0}")]
    UnexpectedFrame(&'static str),
}

impl CodecError {
    /// True for failures building an outbound frame, as opposed to parsing
    /// an inbound one.
    pub fn is_encoding(&self) -> bool {
        matches!(
            self,
            CodecError::UnsupportedVersion(_)
                | CodecError::AddressTooShort { .. }
                | CodecError::AddressTooLarge(_)
                | CodecError::FieldTooLong(_)
                | CodecError::TooManyFields(_)
        )
    }
}
