use crate::codec::types::{
    CodecError, HandshakeCodec, HandshakeStatusCodec, Socks5Codec, Socks5Phase,
};
use crate::message_types::{
    AddressType, Command, Greeting, HandshakeKind, HandshakeMessage, HandshakeStatus, Host,
    ProxyRequest, RequestType,
};
use bytes::{Buf, BytesMut};
use std::net::{Ipv4Addr, Ipv6Addr};
use tokio_util::codec::Decoder;

/// Frames a SOCKS5 client sends before the tunnel is up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Socks5Request {
    Greeting(Greeting),
    Command(ProxyRequest),
}

impl Decoder for Socks5Codec {
    type Item = Socks5Request;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.phase {
            Socks5Phase::Greeting => {
                let Some(greeting) = Self::decode_greeting(src) else {
                    return Ok(None);
                };
                self.phase = Socks5Phase::Command;
                Ok(Some(Socks5Request::Greeting(greeting)))
            }
            Socks5Phase::Command => {
                let Some(request) = Self::decode_command(src)? else {
                    return Ok(None);
                };
                self.phase = Socks5Phase::Established;
                Ok(Some(Socks5Request::Command(request)))
            }
            // Anything after the command frame is payload for the tunnel.
            Socks5Phase::Established => Ok(None),
        }
    }
}

impl Socks5Codec {
    fn decode_greeting(src: &mut BytesMut) -> Option<Greeting> {
        if src.len() < 2 {
            return None;
        }

        let method_count = src[1] as usize;
        if src.len() < 2 + method_count {
            return None;
        }

        let mut data = src.split_to(2 + method_count);
        let version = data.get_u8();
        data.advance(1);

        Some(Greeting {
            version,
            methods: data.to_vec(),
        })
    }

    fn decode_command(src: &mut BytesMut) -> Result<Option<ProxyRequest>, CodecError> {
        if src.len() < 4 {
            return Ok(None);
        }

        let atyp = src[3];
        let address_type =
            AddressType::from_byte(atyp).ok_or(CodecError::InvalidAddressType(atyp))?;

        let required_len = match address_type {
            AddressType::IPv4 => 4 + 4 + 2,
            AddressType::IPv6 => 4 + 16 + 2,
            AddressType::Domain => {
                if src.len() < 5 {
                    return Ok(None);
                }
                4 + 1 + src[4] as usize + 2
            }
        };
        if src.len() < required_len {
            return Ok(None);
        }

        let mut data = src.split_to(required_len);
        let version = data.get_u8();
        let command = Command::from(data.get_u8());
        data.advance(2); // reserved, address type

        let destination = Self::parse_host(&mut data, address_type)?;
        let port = data.get_u16();

        Ok(Some(ProxyRequest {
            version,
            command,
            destination,
            port,
        }))
    }

    fn parse_host(data: &mut BytesMut, address_type: AddressType) -> Result<Host, CodecError> {
        match address_type {
            AddressType::IPv4 => {
                let mut octets = [0u8; 4];
                data.copy_to_slice(&mut octets);
                Ok(Host::IPv4(Ipv4Addr::from(octets)))
            }
            AddressType::IPv6 => {
                let mut octets = [0u8; 16];
                data.copy_to_slice(&mut octets);
                Ok(Host::IPv6(Ipv6Addr::from(octets)))
            }
            AddressType::Domain => {
                let len = data.get_u8() as usize;
                let mut domain_bytes = vec![0u8; len];
                data.copy_to_slice(&mut domain_bytes);
                let domain = String::from_utf8(domain_bytes)
                    .map_err(|_| CodecError::InvalidDomainEncoding)?;
                Ok(Host::Domain(domain))
            }
        }
    }
}

impl Decoder for HandshakeCodec {
    type Item = HandshakeMessage;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }

        let kind = HandshakeKind::from_byte(src[0])
            .ok_or(CodecError::InvalidHandshakeKind(src[0]))?;

        let Some(required_len) = Self::calculate_required_length(src) else {
            return Ok(None);
        };
        if src.len() < required_len {
            return Ok(None);
        }

        let mut data = src.split_to(required_len);
        data.advance(1);
        let field_count = data.get_u8() as usize;

        let mut fields = Vec::with_capacity(field_count);
        for _ in 0..field_count {
            let key_len = data.get_u8() as usize;
            let key = Self::read_utf8(&mut data, key_len)?;
            let value_len = data.get_u16() as usize;
            let value = Self::read_utf8(&mut data, value_len)?;
            fields.push((key, value));
        }

        Self::build_message(kind, fields).map(Some)
    }
}

impl HandshakeCodec {
    /// Total frame length, or `None` while the length prefixes themselves
    /// are still incomplete.
    fn calculate_required_length(src: &BytesMut) -> Option<usize> {
        if src.len() < 2 {
            return None;
        }

        let field_count = src[1] as usize;
        let mut offset = 2;
        for _ in 0..field_count {
            let key_len = *src.get(offset)? as usize;
            offset += 1 + key_len;
            let value_len = u16::from_be_bytes([*src.get(offset)?, *src.get(offset + 1)?]);
            offset += 2 + value_len as usize;
        }

        Some(offset)
    }

    fn read_utf8(data: &mut BytesMut, len: usize) -> Result<String, CodecError> {
        let bytes = data.split_to(len);
        String::from_utf8(bytes.to_vec()).map_err(|_| CodecError::InvalidFieldEncoding)
    }

    fn build_message(
        kind: HandshakeKind,
        fields: Vec<(String, String)>,
    ) -> Result<HandshakeMessage, CodecError> {
        let take = |name: &'static str| {
            fields
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.clone())
                .ok_or(CodecError::MissingField(name))
        };

        match kind {
            HandshakeKind::Login => Ok(HandshakeMessage::Login { key: take("key")? }),
            HandshakeKind::Connection => {
                let reqtype = take("reqtype")?;
                let reqtype = RequestType::parse(&reqtype)
                    .ok_or(CodecError::InvalidRequestType(reqtype))?;
                Ok(HandshakeMessage::Connection {
                    reqtype,
                    url: take("url")?,
                })
            }
        }
    }
}

impl Decoder for HandshakeStatusCodec {
    type Item = HandshakeStatus;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }

        let status = HandshakeStatus(src.get_u8());
        Ok(Some(status))
    }
}
