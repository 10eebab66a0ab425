#![allow(dead_code)]

//! In-memory relay server for driving a `Session` without TLS or sockets.

use n0_future::SinkExt;
use sockstun::{
    Dialer, HandshakeCodec, HandshakeMessage, HandshakeStatus, HandshakeStatusCodec,
    SessionConfig, TunnelStream,
};
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, DuplexStream, ReadBuf};
use tokio::time::{sleep, Instant};
use tokio_stream::StreamExt;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

pub fn session_config(heartbeat_interval: Duration) -> SessionConfig {
    SessionConfig::builder()
        .server_host("relay.test")
        .server_port(8081u16)
        .key("test-key")
        .heartbeat_interval(heartbeat_interval)
        .build()
        .unwrap()
}

/// Plays the relay server: records every handshake, answers with the
/// configured status, keeps logins open as control channels and echoes
/// data on accepted connections.
#[derive(Debug, Clone)]
pub struct MockRelay {
    state: Arc<RelayState>,
}

#[derive(Debug)]
struct RelayState {
    local_addr: SocketAddr,
    handshakes: Mutex<Vec<HandshakeMessage>>,
    login_status: AtomicU8,
    connect_status: AtomicU8,
    login_delay: Mutex<Duration>,
    controls: Mutex<CancellationToken>,
    control_bytes: Mutex<Vec<u8>>,
    fail_next_heartbeat: AtomicBool,
    failed_heartbeats: AtomicUsize,
}

impl MockRelay {
    /// `local_addr` is what every dialed connection reports as its local end.
    pub fn new(local_addr: &str) -> Self {
        Self {
            state: Arc::new(RelayState {
                local_addr: local_addr.parse().unwrap(),
                handshakes: Mutex::new(Vec::new()),
                login_status: AtomicU8::new(0),
                connect_status: AtomicU8::new(0),
                login_delay: Mutex::new(Duration::ZERO),
                controls: Mutex::new(CancellationToken::new()),
                control_bytes: Mutex::new(Vec::new()),
                fail_next_heartbeat: AtomicBool::new(false),
                failed_heartbeats: AtomicUsize::new(0),
            }),
        }
    }

    pub fn dialer(&self) -> Arc<dyn Dialer> {
        Arc::new(self.clone())
    }

    pub fn handshakes(&self) -> Vec<HandshakeMessage> {
        self.state.handshakes.lock().unwrap().clone()
    }

    pub fn login_count(&self) -> usize {
        self.handshakes()
            .iter()
            .filter(|m| matches!(m, HandshakeMessage::Login { .. }))
            .count()
    }

    pub fn set_login_status(&self, status: u8) {
        self.state.login_status.store(status, Ordering::SeqCst);
    }

    pub fn set_connect_status(&self, status: u8) {
        self.state.connect_status.store(status, Ordering::SeqCst);
    }

    pub fn set_login_delay(&self, delay: Duration) {
        *self.state.login_delay.lock().unwrap() = delay;
    }

    /// The next dialed connection fails its first one-byte write, once.
    pub fn fail_one_heartbeat(&self) {
        self.state.fail_next_heartbeat.store(true, Ordering::SeqCst);
    }

    pub fn failed_heartbeats(&self) -> usize {
        self.state.failed_heartbeats.load(Ordering::SeqCst)
    }

    /// Every byte received on control channels, in order.
    pub fn control_bytes(&self) -> Vec<u8> {
        self.state.control_bytes.lock().unwrap().clone()
    }

    /// Server-side close of every control channel opened so far.
    pub fn drop_controls(&self) {
        let mut controls = self.state.controls.lock().unwrap();
        controls.cancel();
        *controls = CancellationToken::new();
    }

    pub async fn wait_for_logins(&self, count: usize, within: Duration) -> bool {
        eventually(within, || self.login_count() >= count).await
    }
}

pub async fn eventually(within: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + within;
    loop {
        if check() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        sleep(Duration::from_millis(10)).await;
    }
}

impl Dialer for MockRelay {
    fn dial<'a>(
        &'a self,
        _host: &'a str,
        _port: u16,
    ) -> Pin<Box<dyn Future<Output = io::Result<TunnelStream>> + Send + 'a>> {
        let state = Arc::clone(&self.state);
        Box::pin(async move {
            let (client, server) = tokio::io::duplex(64 * 1024);
            let local_addr = state.local_addr;
            let flaky = state.fail_next_heartbeat.swap(false, Ordering::SeqCst);
            tokio::spawn(serve_one(Arc::clone(&state), server));
            if flaky {
                let client = FlakyHeartbeat {
                    inner: client,
                    state,
                    failed: false,
                };
                Ok(TunnelStream::new(client, local_addr))
            } else {
                Ok(TunnelStream::new(client, local_addr))
            }
        })
    }
}

async fn serve_one(state: Arc<RelayState>, io: DuplexStream) {
    let mut framed = Framed::new(io, HandshakeCodec);
    let Some(Ok(message)) = framed.next().await else {
        return;
    };
    state.handshakes.lock().unwrap().push(message.clone());

    let status = match message {
        HandshakeMessage::Login { .. } => {
            let delay = *state.login_delay.lock().unwrap();
            if !delay.is_zero() {
                sleep(delay).await;
            }
            state.login_status.load(Ordering::SeqCst)
        }
        HandshakeMessage::Connection { .. } => state.connect_status.load(Ordering::SeqCst),
    };

    let mut framed = framed.map_codec(|_| HandshakeStatusCodec);
    if framed.send(HandshakeStatus(status)).await.is_err() || status != 0 {
        return;
    }
    let mut io = framed.into_inner();

    match message {
        HandshakeMessage::Login { .. } => {
            let closed = state.controls.lock().unwrap().clone();
            let mut beat = [0u8; 16];
            loop {
                tokio::select! {
                    _ = closed.cancelled() => return,
                    read = io.read(&mut beat) => match read {
                        Ok(0) | Err(_) => return,
                        Ok(n) => state.control_bytes.lock().unwrap().extend_from_slice(&beat[..n]),
                    },
                }
            }
        }
        HandshakeMessage::Connection { .. } => {
            let (mut reader, mut writer) = tokio::io::split(io);
            let _ = tokio::io::copy(&mut reader, &mut writer).await;
        }
    }
}

/// Client stream that rejects its first single-byte write.
struct FlakyHeartbeat {
    inner: DuplexStream,
    state: Arc<RelayState>,
    failed: bool,
}

impl AsyncRead for FlakyHeartbeat {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for FlakyHeartbeat {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        if !self.failed && buf.len() == 1 {
            self.failed = true;
            self.state.failed_heartbeats.fetch_add(1, Ordering::SeqCst);
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "injected heartbeat failure",
            )));
        }
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}
