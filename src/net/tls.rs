//! TLS termination for the public HTTPS listener.
//!
//! Certificate material lives at fixed paths under the data directory
//! (typically symlinks into a certbot live directory). The HTTPS listener
//! only starts when both files exist; otherwise the proxy runs HTTP-only.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustls::pki_types::CertificateDer;
use thiserror::Error;

/// Errors raised while loading TLS material.
#[derive(Debug, Error)]
pub enum TlsError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no certificates found in {path}")]
    NoCertificates { path: PathBuf },

    #[error("no private key found in {path}")]
    NoPrivateKey { path: PathBuf },

    #[error("invalid certificate or key: {0}")]
    Rustls(#[from] rustls::Error),
}

/// Whether both PEM files exist, gating the HTTPS listener.
pub fn certs_present(cert_path: &Path, key_path: &Path) -> bool {
    cert_path.exists() && key_path.exists()
}

/// Load the server TLS configuration from PEM files.
pub fn load_server_config(
    cert_path: &Path,
    key_path: &Path,
) -> Result<Arc<rustls::ServerConfig>, TlsError> {
    // Pin the process-wide provider before the first config is built.
    let _ = rustls::crypto::ring::default_provider().install_default();

    let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut open(cert_path)?)
        .collect::<Result<_, _>>()
        .map_err(|source| TlsError::Io {
            path: cert_path.to_path_buf(),
            source,
        })?;
    if certs.is_empty() {
        return Err(TlsError::NoCertificates {
            path: cert_path.to_path_buf(),
        });
    }

    let key = rustls_pemfile::private_key(&mut open(key_path)?)
        .map_err(|source| TlsError::Io {
            path: key_path.to_path_buf(),
            source,
        })?
        .ok_or_else(|| TlsError::NoPrivateKey {
            path: key_path.to_path_buf(),
        })?;

    let mut config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)?;
    config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

    Ok(Arc::new(config))
}

fn open(path: &Path) -> Result<BufReader<File>, TlsError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|source| TlsError::Io {
            path: path.to_path_buf(),
            source,
        })
}
