use crate::message_types::ProxyReply;
use crate::tunnel::error::TunnelError;
use crate::tunnel::relay::relay;
use crate::tunnel::session::Session;
use crate::tunnel::socks5::Socks5Handshake;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Accept loop. Every local connection gets its own task, and a failure on
/// one of them never stops the listener.
pub async fn serve(session: Arc<Session>, listener: TcpListener) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                debug!(%peer, "[+] accepted local connection");
                let session = Arc::clone(&session);
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(session, stream, peer).await {
                        log_failure(peer, &e);
                    }
                });
            }
            Err(e) => {
                warn!(error = %e, "accept failed");
                sleep(ACCEPT_BACKOFF).await;
            }
        }
    }
}

/// Drives one local SOCKS5 connection: greeting, command, Connection
/// handshake, success reply, then relay until either side closes.
///
/// BIND and unknown commands, and a rejected handshake, all close the local
/// connection without a SOCKS5 error reply.
pub async fn handle_connection<S>(
    session: Arc<Session>,
    local: S,
    peer: SocketAddr,
) -> Result<(), TunnelError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let timeouts = session.config().timeouts.clone();
    let mut handshake = Socks5Handshake::new(local, timeouts.socks_handshake_timeout);

    handshake.read_greeting().await?;
    handshake.write_greeting_reply().await?;
    let request = handshake.read_command().await?;

    let Some(reqtype) = request.request_type() else {
        warn!(%peer, command = ?request.command, "unsupported SOCKS5 command, check that the client speaks SOCKS5 CONNECT");
        return Err(TunnelError::UnsupportedCommand(request.command));
    };

    let url = request.destination_string();
    info!(%peer, %reqtype, %url, "proxy request");

    let mut tunnel = session.connect(reqtype, &url).await?;

    handshake
        .write_reply(ProxyReply::succeeded(tunnel.local_addr()))
        .await?;

    let (local, early_data) = handshake.into_parts();
    if !early_data.is_empty() {
        timeout(timeouts.handshake_request_timeout, tunnel.write_all(&early_data))
            .await
            .map_err(|_| TunnelError::timed_out("forwarding early data"))??;
    }

    let stats = relay(local, tunnel, timeouts.idle_timeout).await;
    info!(
        %peer,
        %reqtype,
        %url,
        sent = stats.sent,
        received = stats.received,
        "proxy stream closed"
    );
    Ok(())
}

fn log_failure(peer: SocketAddr, error: &TunnelError) {
    match error {
        TunnelError::Transport(e) => debug!(%peer, error = %e, "local connection ended"),
        TunnelError::Protocol(e) => warn!(%peer, error = %e, "malformed SOCKS5 request"),
        TunnelError::Encoding(e) => warn!(%peer, error = %e, "failed to build SOCKS5 reply"),
        TunnelError::ConnectionRejected { .. } | TunnelError::Authentication { .. } => {
            warn!(%peer, error = %error, "tunnel not established")
        }
        TunnelError::UnsupportedCommand(_) => {}
    }
}
