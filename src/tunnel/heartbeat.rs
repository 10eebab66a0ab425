use crate::message_types::HEARTBEAT_PROBE;
use crate::tunnel::session::{ControlConnection, Session};
use std::io;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, trace, warn};

/// Keeps one login alive by writing a probe byte on its control connection
/// every `interval`. Bound to the epoch of that login: once a newer login
/// exists, a failing monitor just exits.
pub(crate) struct HeartbeatMonitor {
    session: Weak<Session>,
    epoch: u64,
    control: ControlConnection,
    interval: Duration,
    probe_timeout: Duration,
}

impl HeartbeatMonitor {
    pub(crate) fn new(session: &Arc<Session>, epoch: u64, control: ControlConnection) -> Self {
        let config = session.config();
        Self {
            session: Arc::downgrade(session),
            epoch,
            control,
            interval: config.heartbeat_interval,
            probe_timeout: config.timeouts.probe_timeout,
        }
    }

    pub(crate) fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(self) {
        debug!(epoch = self.epoch, "heartbeat monitor started");
        loop {
            sleep(self.interval).await;

            if self.session.strong_count() == 0 {
                debug!(epoch = self.epoch, "session dropped, heartbeat monitor exiting");
                return;
            }

            match self.probe().await {
                Ok(()) => {
                    trace!(epoch = self.epoch, "heartbeat sent");
                    continue;
                }
                Err(e) => {
                    debug!(epoch = self.epoch, error = %e, "heartbeat failed, retrying once");
                }
            }

            if let Err(e) = self.probe().await {
                warn!(epoch = self.epoch, error = %e, "heartbeat retry failed");
                if let Some(session) = self.session.upgrade() {
                    session.handle_heartbeat_failure(self.epoch).await;
                }
                return;
            }
        }
    }

    async fn probe(&self) -> io::Result<()> {
        let mut control = self.control.lock().await;
        let write = async {
            control.write_all(&[HEARTBEAT_PROBE]).await?;
            control.flush().await
        };
        timeout(self.probe_timeout, write)
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "heartbeat probe timed out"))?
    }
}
