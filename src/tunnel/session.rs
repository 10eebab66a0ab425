use crate::codec::{HandshakeCodec, HandshakeStatusCodec};
use crate::message_types::{HandshakeMessage, HandshakeStatus, RequestType};
use crate::tunnel::error::TunnelError;
use crate::tunnel::heartbeat::HeartbeatMonitor;
use crate::tunnel::transport::Dialer;
use crate::tunnel::types::{HeartbeatVerdict, SessionConfig, SessionState};
use crate::tunnel_stream::TunnelStream;
use n0_future::boxed::BoxFuture;
use n0_future::SinkExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tokio_stream::StreamExt;
use tokio_util::codec::Framed;
use tracing::{debug, error, info, warn};

/// The authenticated control connection, shared with its heartbeat monitor.
pub(crate) type ControlConnection = Arc<Mutex<TunnelStream>>;

#[derive(Debug, Default)]
struct ControlState {
    /// Bumped on every successful login; identifies the current connection.
    epoch: u64,
    connection: Option<ControlConnection>,
}

/// Login state with the relay server.
///
/// Owns the single control connection and hands out one data connection per
/// proxied stream. Cheap to share behind an `Arc`; all mutable state is
/// synchronized internally.
#[derive(Debug)]
pub struct Session {
    config: SessionConfig,
    dialer: Arc<dyn Dialer>,
    control: Mutex<ControlState>,
    relogin_in_flight: AtomicBool,
}

impl Session {
    pub fn new(config: SessionConfig, dialer: Arc<dyn Dialer>) -> Arc<Self> {
        Arc::new(Self {
            config,
            dialer,
            control: Mutex::new(ControlState::default()),
            relogin_in_flight: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub async fn epoch(&self) -> u64 {
        self.control.lock().await.epoch
    }

    /// `Disconnected` only once the control connection itself is gone. A
    /// failed re-login scheduled after a rejected connection leaves the
    /// previous control connection, and so `Connected`, in place; its
    /// monitor still reports when that connection dies.
    pub async fn state(&self) -> SessionState {
        if self.relogin_in_flight.load(Ordering::Acquire) {
            return SessionState::Reconnecting;
        }
        match self.control.lock().await.connection {
            Some(_) => SessionState::Connected,
            None => SessionState::Disconnected,
        }
    }

    /// Dials a new relay connection, writes `message` as its first payload
    /// and reads the one-byte status.
    ///
    /// The connection is returned whatever the status says; callers decide
    /// whether to keep it. On a transport or encoding error it is dropped.
    pub async fn send_handshake(
        &self,
        message: HandshakeMessage,
    ) -> Result<(TunnelStream, HandshakeStatus), TunnelError> {
        let timeouts = &self.config.timeouts;
        let host = self.config.server_host.as_str();
        let port = self.config.server_port;

        let stream = timeout(timeouts.connect_timeout, self.dialer.dial(host, port))
            .await
            .map_err(|_| TunnelError::timed_out("connecting to server"))??;

        let mut framed = Framed::new(stream, HandshakeCodec);
        timeout(timeouts.handshake_request_timeout, framed.send(message))
            .await
            .map_err(|_| TunnelError::timed_out("handshake request"))??;

        let mut framed = framed.map_codec(|_| HandshakeStatusCodec);
        let status = match timeout(timeouts.handshake_response_timeout, framed.next()).await {
            Ok(Some(Ok(status))) => status,
            Ok(Some(Err(e))) => return Err(e.into()),
            Ok(None) => return Err(TunnelError::unexpected_eof("handshake response")),
            Err(_) => return Err(TunnelError::timed_out("handshake response")),
        };

        let parts = framed.into_parts();
        Ok((parts.io.with_read_ahead(parts.read_buf), status))
    }

    /// Login handshake. On success the new connection replaces the control
    /// connection, the epoch advances and a heartbeat monitor bound to that
    /// epoch is spawned. Returns the new epoch.
    pub async fn login(self: &Arc<Self>) -> Result<u64, TunnelError> {
        let (stream, status) = self
            .send_handshake(HandshakeMessage::login(self.config.key.as_str()))
            .await?;

        if !status.is_success() {
            warn!(status = status.code(), "server rejected login, check the key");
            return Err(TunnelError::Authentication {
                status: status.code(),
            });
        }

        let control: ControlConnection = Arc::new(Mutex::new(stream));
        let (epoch, previous) = {
            let mut state = self.control.lock().await;
            state.epoch += 1;
            let previous = state.connection.replace(Arc::clone(&control));
            HeartbeatMonitor::new(self, state.epoch, control).spawn();
            (state.epoch, previous)
        };

        if let Some(previous) = previous {
            debug!(epoch, "closing superseded control connection");
            self.close_control(previous);
        }

        info!(
            epoch,
            "logged in to {}:{}", self.config.server_host, self.config.server_port
        );
        Ok(epoch)
    }

    /// Connection handshake for one proxied stream. A rejection closes the
    /// relay connection and schedules a re-login, since the server may have
    /// expired the control session.
    pub async fn connect(
        self: &Arc<Self>,
        reqtype: RequestType,
        url: &str,
    ) -> Result<TunnelStream, TunnelError> {
        let (stream, status) = self
            .send_handshake(HandshakeMessage::connection(reqtype, url))
            .await?;

        if status.is_success() {
            return Ok(stream);
        }

        drop(stream);
        warn!(%url, status = status.code(), "server rejected connection, scheduling re-login");
        let session = Arc::clone(self);
        tokio::spawn(async move {
            session.relogin().await;
        });

        Err(TunnelError::ConnectionRejected {
            url: url.to_string(),
            status: status.code(),
        })
    }

    /// Single-flight re-login. Returns `false` without waiting when another
    /// attempt is already running. A failed attempt leaves the session
    /// disconnected until the next trigger.
    pub async fn relogin(self: &Arc<Self>) -> bool {
        if self
            .relogin_in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("re-login already in flight");
            return false;
        }
        let _guard = InFlight(&self.relogin_in_flight);

        info!("re-logging in");
        match self.login().await {
            Ok(epoch) => info!(epoch, "re-login succeeded"),
            Err(e) => error!(error = %e, "re-login failed"),
        }
        true
    }

    /// Called by the monitor bound to `epoch` after a probe and its retry
    /// both failed. Stale monitors are told to stand down; the current one
    /// gets its connection closed and a re-login.
    ///
    /// Boxed because it sits on the login -> monitor -> login cycle.
    pub fn handle_heartbeat_failure(self: &Arc<Self>, epoch: u64) -> BoxFuture<HeartbeatVerdict> {
        let session = Arc::clone(self);
        Box::pin(async move {
            let connection = {
                let mut state = session.control.lock().await;
                if state.epoch != epoch {
                    debug!(
                        epoch,
                        current = state.epoch,
                        "heartbeat failure on superseded connection"
                    );
                    return HeartbeatVerdict::Superseded;
                }
                state.connection.take()
            };

            warn!(epoch, "lost control connection to server");
            if let Some(connection) = connection {
                session.close_control(connection);
            }
            session.relogin().await;
            HeartbeatVerdict::Relogin
        })
    }

    fn close_control(&self, connection: ControlConnection) {
        let deadline = self.config.timeouts.probe_timeout;
        tokio::spawn(async move {
            let mut stream = connection.lock().await;
            let _ = timeout(deadline, stream.shutdown()).await;
        });
    }
}

/// Clears the re-login flag however the attempt ends.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
