use crate::tunnel_stream::TunnelStream;
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, RootCertStore};
use std::fmt;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use tokio::net::TcpStream;
use tracing::debug;

/// Opens a fresh encrypted connection to the relay server. Every handshake,
/// login or per-stream connect, gets its own connection.
pub trait Dialer: Send + Sync + fmt::Debug {
    fn dial<'a>(
        &'a self,
        host: &'a str,
        port: u16,
    ) -> Pin<Box<dyn Future<Output = io::Result<TunnelStream>> + Send + 'a>>;
}

/// TCP + TLS, verifying the server against a fixed set of trust roots.
#[derive(Clone)]
pub struct TlsDialer {
    connector: tokio_rustls::TlsConnector,
}

impl TlsDialer {
    pub fn new(roots: RootCertStore) -> Result<Self, rustls::Error> {
        let provider = rustls::crypto::ring::default_provider();
        let config = ClientConfig::builder_with_provider(Arc::new(provider))
            .with_safe_default_protocol_versions()?
            .with_root_certificates(roots)
            .with_no_client_auth();

        Ok(Self {
            connector: tokio_rustls::TlsConnector::from(Arc::new(config)),
        })
    }

    pub fn arc(roots: RootCertStore) -> Result<Arc<dyn Dialer>, rustls::Error> {
        Ok(Arc::new(Self::new(roots)?))
    }

    async fn connect(&self, host: &str, port: u16) -> io::Result<TunnelStream> {
        let server_name = ServerName::try_from(host.to_string()).map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid server name: {}", host),
            )
        })?;

        let tcp = TcpStream::connect((host, port)).await?;
        let local_addr = tcp.local_addr()?;
        debug!(%local_addr, "TCP connected to {}:{}, starting TLS", host, port);

        let tls = self.connector.connect(server_name, tcp).await?;
        Ok(TunnelStream::new(tls, local_addr))
    }
}

impl fmt::Debug for TlsDialer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsDialer").finish_non_exhaustive()
    }
}

impl Dialer for TlsDialer {
    fn dial<'a>(
        &'a self,
        host: &'a str,
        port: u16,
    ) -> Pin<Box<dyn Future<Output = io::Result<TunnelStream>> + Send + 'a>> {
        Box::pin(self.connect(host, port))
    }
}
