mod decoder;
mod encoder;
mod types;

pub use decoder::Socks5Request;
pub use types::{CodecError, HandshakeCodec, HandshakeStatusCodec, Socks5Codec};
