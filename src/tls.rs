//! Trust roots for verifying the relay server.

use rustls::pki_types::CertificateDer;
use rustls::RootCertStore;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("No certificates found in {0}")]
    NoCertificates(PathBuf),

    #[error("Invalid certificate in {path}: {source}")]
    InvalidCertificate {
        path: PathBuf,
        #[source]
        source: rustls::Error,
    },

    #[error("TLS configuration error: {0}")]
    Config(#[from] rustls::Error),
}

/// Loads every PEM certificate in `path` as a trust root. A file that holds
/// no certificate at all is an error.
pub fn load_root_store(path: &Path) -> Result<RootCertStore, TlsError> {
    let file = File::open(path).map_err(|source| TlsError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    root_store_from_pem(&mut BufReader::new(file), path)
}

fn root_store_from_pem(reader: &mut dyn BufRead, path: &Path) -> Result<RootCertStore, TlsError> {
    let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| TlsError::Io {
            path: path.to_path_buf(),
            source,
        })?;

    if certs.is_empty() {
        return Err(TlsError::NoCertificates(path.to_path_buf()));
    }

    let mut roots = RootCertStore::empty();
    for cert in certs {
        roots
            .add(cert)
            .map_err(|source| TlsError::InvalidCertificate {
                path: path.to_path_buf(),
                source,
            })?;
    }
    Ok(roots)
}
