use crate::tunnel::error::TunnelError;
use crate::tunnel::listener::serve;
use crate::tunnel::session::Session;
use crate::tunnel::transport::Dialer;
use crate::tunnel::types::SessionConfig;
use derive_builder::Builder;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

/// Local SOCKS5 endpoint bound to one relay session.
#[derive(Debug, Clone, Builder)]
#[builder(setter(into))]
pub struct TunnelClient {
    pub listen_addr: SocketAddr,
    pub session: SessionConfig,
    pub dialer: Arc<dyn Dialer>,
}

impl TunnelClient {
    pub fn builder() -> TunnelClientBuilder {
        TunnelClientBuilder::default()
    }

    /// Binds the listener, logs in, then serves forever. Only returns on a
    /// bind failure or when the first login fails: no local connection is
    /// accepted before the server has accepted the key.
    pub async fn run(self) -> Result<(), TunnelError> {
        let listener = TcpListener::bind(self.listen_addr).await?;
        info!("SOCKS5 listening on {}", listener.local_addr()?);

        let session = Session::new(self.session, self.dialer);
        session.login().await?;
        info!("logged in, accepting connections");

        serve(session, listener).await;
        Ok(())
    }
}
