use crate::codec::CodecError;
use crate::message_types::Command;
use std::io;

#[derive(Debug, thiserror::Error)]
pub enum TunnelError {
    #[error("Transport error: {0}")]
    Transport(#[from] io::Error),

    #[error("Protocol error: {0}")]
    Protocol(CodecError),

    #[error("Encoding error: {0}")]
    Encoding(CodecError),

    #[error("Login rejected by server (status {status})")]
    Authentication { status: u8 },

    #[error("Connection to {url} rejected by server (status {status})")]
    ConnectionRejected { url: String, status: u8 },

    #[error("Unsupported SOCKS5 command: {0:?}")]
    UnsupportedCommand(Command),
}

impl TunnelError {
    pub(crate) fn timed_out(what: &str) -> Self {
        TunnelError::Transport(io::Error::new(
            io::ErrorKind::TimedOut,
            format!("{} timed out", what),
        ))
    }

    pub(crate) fn unexpected_eof(what: &str) -> Self {
        TunnelError::Transport(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("stream ended during {}", what),
        ))
    }
}

impl From<CodecError> for TunnelError {
    fn from(value: CodecError) -> Self {
        match value {
            CodecError::Io(error) => TunnelError::Transport(error),
            error if error.is_encoding() => TunnelError::Encoding(error),
            error => TunnelError::Protocol(error),
        }
    }
}
