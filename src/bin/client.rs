use clap::Parser;
use sockstun::config::ClientSettings;
use sockstun::tls::load_root_store;
use sockstun::{TlsDialer, TunnelClient};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(version, about = "Local SOCKS5 endpoint tunnelling through a TLS relay")]
struct Args {
    /// Configuration file; created with defaults if missing
    #[arg(short, long, default_value = "client.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let settings = ClientSettings::load_or_init(&args.config)?;
    let roots = load_root_store(&settings.server.ca_cert).map_err(|e| {
        error!("failed to load trust roots, check that the certificate file exists: {}", e);
        e
    })?;

    let client = TunnelClient::builder()
        .listen_addr(settings.listen_addr())
        .session(settings.session_config()?)
        .dialer(TlsDialer::arc(roots)?)
        .build()?;

    info!("|>>>>>>>>>>>>>>>|<<<<<<<<<<<<<<<|");
    info!("version: {}", env!("CARGO_PKG_VERSION"));
    info!("proxy port: {}", settings.client.port);
    info!("server: {}:{}", settings.server.host, settings.server.port);
    info!("|>>>>>>>>>>>>>>>|<<<<<<<<<<<<<<<|");

    if let Err(e) = client.run().await {
        error!("failed to connect to server: {}", e);
        return Err(e.into());
    }
    Ok(())
}
