use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;

use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::rustls::ServerConfig;
use tokio_rustls::TlsAcceptor;

use crate::{AppError, AppResult};

/// Builds the acceptor both listeners share from PEM-encoded cert and key
/// files. Missing or unparseable material is a startup error.
pub fn build_tls_acceptor(cert_path: &str, key_path: &str) -> AppResult<TlsAcceptor> {
    let certs = load_certs(cert_path)?;
    let key = load_key(key_path)?;

    let config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| AppError::Tls(format!("invalid certificate or key: {}", e)))?;

    Ok(TlsAcceptor::from(Arc::new(config)))
}

fn load_certs(path: &str) -> AppResult<Vec<CertificateDer<'static>>> {
    let file = File::open(path)
        .map_err(|e| AppError::Tls(format!("could not open certificate {}: {}", path, e)))?;
    let certs = rustls_pemfile::certs(&mut BufReader::new(file))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| AppError::Tls(format!("could not parse certificate {}: {}", path, e)))?;
    if certs.is_empty() {
        return Err(AppError::Tls(format!("no certificate found in {}", path)));
    }
    Ok(certs)
}

fn load_key(path: &str) -> AppResult<PrivateKeyDer<'static>> {
    let file = File::open(path)
        .map_err(|e| AppError::Tls(format!("could not open private key {}: {}", path, e)))?;
    rustls_pemfile::private_key(&mut BufReader::new(file))
        .map_err(|e| AppError::Tls(format!("could not parse private key {}: {}", path, e)))?
        .ok_or_else(|| AppError::Tls(format!("no private key found in {}", path)))
}
