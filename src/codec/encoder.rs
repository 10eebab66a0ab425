use crate::codec::types::{CodecError, HandshakeCodec, HandshakeStatusCodec, Socks5Codec};
use crate::message_types::{
    AddressType, GreetingReply, HandshakeMessage, HandshakeStatus, ProxyReply, SOCKS5_VERSION,
};
use bytes::{BufMut, BytesMut};
use tokio_util::codec::Encoder;

const IPV4_LEN: usize = 4;
const IPV6_LEN: usize = 16;

impl Encoder<GreetingReply> for Socks5Codec {
    type Error = CodecError;

    fn encode(&mut self, reply: GreetingReply, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.put_u8(reply.version);
        dst.put_u8(reply.method);
        Ok(())
    }
}

impl Encoder<ProxyReply> for Socks5Codec {
    type Error = CodecError;

    fn encode(&mut self, reply: ProxyReply, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if reply.version != SOCKS5_VERSION {
            return Err(CodecError::UnsupportedVersion(reply.version));
        }

        let address = Self::serialize_bound_address(&reply)?;

        dst.reserve(4 + address.len() + 2);
        dst.put_u8(reply.version);
        dst.put_u8(reply.status as u8);
        dst.put_u8(reply.reserved);
        dst.put_u8(reply.address_type as u8);
        dst.put_slice(&address);
        dst.put_u16(reply.bound_port);

        Ok(())
    }
}

impl Socks5Codec {
    /// Validates the bound address against its type. Nothing is written to
    /// the destination buffer when this fails.
    fn serialize_bound_address(reply: &ProxyReply) -> Result<Vec<u8>, CodecError> {
        let address = &reply.bound_address;
        match reply.address_type {
            AddressType::IPv4 => Self::fixed_width(address, IPV4_LEN),
            AddressType::IPv6 => Self::fixed_width(address, IPV6_LEN),
            AddressType::Domain => {
                if address.len() > u8::MAX as usize {
                    return Err(CodecError::AddressTooLarge(address.len()));
                }
                let mut out = Vec::with_capacity(1 + address.len());
                out.push(address.len() as u8);
                out.extend_from_slice(address);
                Ok(out)
            }
        }
    }

    fn fixed_width(address: &[u8], expected: usize) -> Result<Vec<u8>, CodecError> {
        if address.len() < expected {
            return Err(CodecError::AddressTooShort {
                expected,
                actual: address.len(),
            });
        }
        Ok(address[..expected].to_vec())
    }
}

impl Encoder<HandshakeMessage> for HandshakeCodec {
    type Error = CodecError;

    fn encode(&mut self, msg: HandshakeMessage, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let fields = msg.fields();
        if fields.len() > u8::MAX as usize {
            return Err(CodecError::TooManyFields(fields.len()));
        }

        for (key, value) in &fields {
            if key.len() > u8::MAX as usize || value.len() > u16::MAX as usize {
                return Err(CodecError::FieldTooLong((*key).to_string()));
            }
        }

        dst.put_u8(msg.kind() as u8);
        dst.put_u8(fields.len() as u8);
        for (key, value) in fields {
            dst.put_u8(key.len() as u8);
            dst.put_slice(key.as_bytes());
            dst.put_u16(value.len() as u16);
            dst.put_slice(value.as_bytes());
        }

        Ok(())
    }
}

impl Encoder<HandshakeStatus> for HandshakeStatusCodec {
    type Error = CodecError;

    fn encode(&mut self, status: HandshakeStatus, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.put_u8(status.code());
        Ok(())
    }
}
