use bytes::{Buf, BytesMut};
use pin_project::pin_project;
use std::fmt;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf, Result};

/// Any byte stream a [`Dialer`](crate::tunnel::Dialer) can hand back.
pub trait AsyncIo: AsyncRead + AsyncWrite + Send {}

impl<T: AsyncRead + AsyncWrite + Send> AsyncIo for T {}

/// One transport connection to the relay server.
///
/// Remembers the local address of the underlying socket, which is what the
/// SOCKS5 reply advertises, and replays bytes that were read ahead while the
/// handshake status was being decoded.
#[pin_project]
pub struct TunnelStream {
    #[pin]
    inner: Pin<Box<dyn AsyncIo>>,
    local_addr: SocketAddr,
    read_ahead: BytesMut,
}

impl TunnelStream {
    pub fn new<S>(stream: S, local_addr: SocketAddr) -> Self
    where
        S: AsyncIo + 'static,
    {
        Self {
            inner: Box::pin(stream),
            local_addr,
            read_ahead: BytesMut::new(),
        }
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Bytes in `buf` are returned by the next reads, ahead of the stream.
    pub(crate) fn with_read_ahead(mut self, buf: BytesMut) -> Self {
        if self.read_ahead.is_empty() {
            self.read_ahead = buf;
        } else {
            self.read_ahead.extend_from_slice(&buf);
        }
        self
    }
}

impl fmt::Debug for TunnelStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TunnelStream")
            .field("local_addr", &self.local_addr)
            .field("read_ahead", &self.read_ahead.len())
            .finish_non_exhaustive()
    }
}

impl AsyncRead for TunnelStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<Result<()>> {
        let this = self.project();
        if !this.read_ahead.is_empty() && buf.remaining() > 0 {
            let n = this.read_ahead.len().min(buf.remaining());
            buf.put_slice(&this.read_ahead[..n]);
            this.read_ahead.advance(n);
            return Poll::Ready(Ok(()));
        }
        AsyncRead::poll_read(this.inner, cx, buf)
    }
}

impl AsyncWrite for TunnelStream {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<Result<usize>> {
        AsyncWrite::poll_write(self.project().inner, cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<()>> {
        AsyncWrite::poll_flush(self.project().inner, cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<()>> {
        AsyncWrite::poll_shutdown(self.project().inner, cx)
    }
}
