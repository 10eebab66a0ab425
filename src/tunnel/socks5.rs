use crate::codec::{CodecError, Socks5Codec, Socks5Request};
use crate::message_types::{Greeting, GreetingReply, ProxyReply, ProxyRequest};
use crate::tunnel::error::TunnelError;
use bytes::BytesMut;
use n0_future::SinkExt;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::timeout;
use tokio_stream::StreamExt;
use tokio_util::codec::Framed;
use tracing::debug;

/// Server side of the SOCKS5 exchange with a local application. No
/// authentication method is ever negotiated: the reply always selects
/// "no authentication".
pub struct Socks5Handshake<S> {
    framed: Framed<S, Socks5Codec>,
    step_timeout: Duration,
}

impl<S: AsyncRead + AsyncWrite + Unpin> Socks5Handshake<S> {
    pub fn new(stream: S, step_timeout: Duration) -> Self {
        Self {
            framed: Framed::new(stream, Socks5Codec::new()),
            step_timeout,
        }
    }

    pub async fn read_greeting(&mut self) -> Result<Greeting, TunnelError> {
        match self.read_frame("greeting").await? {
            Socks5Request::Greeting(greeting) => {
                debug!(
                    version = greeting.version,
                    methods = ?greeting.methods,
                    "SOCKS5 greeting"
                );
                Ok(greeting)
            }
            Socks5Request::Command(_) => Err(CodecError::UnexpectedFrame("greeting").into()),
        }
    }

    pub async fn write_greeting_reply(&mut self) -> Result<(), TunnelError> {
        timeout(self.step_timeout, self.framed.send(GreetingReply::no_auth()))
            .await
            .map_err(|_| TunnelError::timed_out("SOCKS5 greeting reply"))??;
        Ok(())
    }

    pub async fn read_command(&mut self) -> Result<ProxyRequest, TunnelError> {
        match self.read_frame("command").await? {
            Socks5Request::Command(request) => Ok(request),
            Socks5Request::Greeting(_) => Err(CodecError::UnexpectedFrame("command").into()),
        }
    }

    pub async fn write_reply(&mut self, reply: ProxyReply) -> Result<(), TunnelError> {
        timeout(self.step_timeout, self.framed.send(reply))
            .await
            .map_err(|_| TunnelError::timed_out("SOCKS5 reply"))??;
        Ok(())
    }

    /// The local stream plus any bytes the application sent after its
    /// command frame.
    pub fn into_parts(self) -> (S, BytesMut) {
        let parts = self.framed.into_parts();
        (parts.io, parts.read_buf)
    }

    async fn read_frame(&mut self, what: &'static str) -> Result<Socks5Request, TunnelError> {
        match timeout(self.step_timeout, self.framed.next()).await {
            Ok(Some(Ok(frame))) => Ok(frame),
            Ok(Some(Err(e))) => Err(e.into()),
            Ok(None) => Err(TunnelError::unexpected_eof(what)),
            Err(_) => Err(TunnelError::timed_out(what)),
        }
    }
}
