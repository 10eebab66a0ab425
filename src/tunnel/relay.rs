use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

const RELAY_BUFFER_SIZE: usize = 16 * 1024;
/// Bound on closing a writer when the relay runs without an idle timeout.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Bytes moved in each direction by one relay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    /// Local application to tunnel.
    pub sent: u64,
    /// Tunnel to local application.
    pub received: u64,
}

/// Copies bytes between `local` and `tunnel` until either side reaches EOF,
/// errors, or stays silent longer than `idle_timeout`. Each direction runs
/// on its own task; whichever finishes first tears the whole pair down.
/// There is no half-close.
pub async fn relay<L, T>(local: L, tunnel: T, idle_timeout: Option<Duration>) -> RelayStats
where
    L: AsyncRead + AsyncWrite + Send + 'static,
    T: AsyncRead + AsyncWrite + Send + 'static,
{
    let (local_reader, local_writer) = tokio::io::split(local);
    let (tunnel_reader, tunnel_writer) = tokio::io::split(tunnel);
    let shutdown = CancellationToken::new();

    let upstream = tokio::spawn(pipe(
        local_reader,
        tunnel_writer,
        shutdown.clone(),
        idle_timeout,
        "local->tunnel",
    ));
    let downstream = tokio::spawn(pipe(
        tunnel_reader,
        local_writer,
        shutdown,
        idle_timeout,
        "tunnel->local",
    ));

    let (sent, received) = tokio::join!(upstream, downstream);
    RelayStats {
        sent: sent.unwrap_or_default(),
        received: received.unwrap_or_default(),
    }
}

async fn pipe<R, W>(
    mut reader: ReadHalf<R>,
    mut writer: WriteHalf<W>,
    shutdown: CancellationToken,
    idle_timeout: Option<Duration>,
    direction: &'static str,
) -> u64
where
    R: AsyncRead,
    W: AsyncWrite,
{
    let mut buf = vec![0u8; RELAY_BUFFER_SIZE];
    let mut total = 0u64;

    loop {
        let n = tokio::select! {
            _ = shutdown.cancelled() => break,
            read = with_deadline(idle_timeout, reader.read(&mut buf)) => match read {
                Ok(0) => {
                    trace!(direction, "EOF");
                    break;
                }
                Ok(n) => n,
                Err(e) => {
                    debug!(direction, error = %e, "relay read ended");
                    break;
                }
            },
        };

        let written = tokio::select! {
            _ = shutdown.cancelled() => break,
            written = with_deadline(idle_timeout, writer.write_all(&buf[..n])) => written,
        };
        if let Err(e) = written {
            debug!(direction, error = %e, "relay write ended");
            break;
        }
        total += n as u64;
    }

    shutdown.cancel();
    // A TLS close_notify can stall behind a peer that stopped reading.
    let grace = idle_timeout.unwrap_or(SHUTDOWN_GRACE);
    if let Err(e) = with_deadline(Some(grace), writer.shutdown()).await {
        debug!(direction, error = %e, "writer shutdown abandoned");
    }
    total
}

async fn with_deadline<F, O>(deadline: Option<Duration>, fut: F) -> io::Result<O>
where
    F: std::future::Future<Output = io::Result<O>>,
{
    match deadline {
        Some(deadline) => timeout(deadline, fut)
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "relay idle timeout"))?,
        None => fut.await,
    }
}
