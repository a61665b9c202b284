//! TLS material and rustls configuration.
//!
//! Every process loads a PEM certificate chain and private key. Servers
//! require client certificates only when a CA file is configured; clients
//! verify the server against that CA, or skip verification when none is set.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{self, CryptoProvider};
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use rustls::server::WebPkiClientVerifier;
use rustls::{DigitallySignedStruct, RootCertStore, SignatureScheme};
use tracing::warn;

use crate::protocol::error::{MxrpcError, Result};

/// Default certificate file, matching the working-directory layout of a
/// freshly generated pair.
pub const DEFAULT_CERT_PATH: &str = "server.crt";
/// Default private key file.
pub const DEFAULT_KEY_PATH: &str = "server.key";

/// Paths to the TLS material of one process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsConfig {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
    /// Trust anchor for the peer. `None` disables peer verification.
    pub ca_path: Option<PathBuf>,
    /// Name checked against the server certificate. Defaults to the host
    /// part of the endpoint being dialled.
    pub server_name: Option<String>,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self::new(DEFAULT_CERT_PATH, DEFAULT_KEY_PATH)
    }
}

impl TlsConfig {
    pub fn new(cert_path: impl Into<PathBuf>, key_path: impl Into<PathBuf>) -> Self {
        Self {
            cert_path: cert_path.into(),
            key_path: key_path.into(),
            ca_path: None,
            server_name: None,
        }
    }

    pub fn with_ca(mut self, ca_path: impl Into<PathBuf>) -> Self {
        self.ca_path = Some(ca_path.into());
        self
    }

    pub fn with_server_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = Some(name.into());
        self
    }

    /// Builds the acceptor used by [`TlsServer`](super::TlsServer).
    pub fn acceptor(&self) -> Result<tokio_rustls::TlsAcceptor> {
        Ok(tokio_rustls::TlsAcceptor::from(self.server_config()?))
    }

    /// Builds the connector used by [`TlsConnector`](super::TlsConnector).
    pub fn connector(&self) -> Result<tokio_rustls::TlsConnector> {
        Ok(tokio_rustls::TlsConnector::from(self.client_config()?))
    }

    pub fn server_config(&self) -> Result<Arc<rustls::ServerConfig>> {
        let provider = provider();
        let builder = rustls::ServerConfig::builder_with_provider(provider.clone())
            .with_safe_default_protocol_versions()?;

        let builder = match &self.ca_path {
            Some(ca) => {
                let roots = Arc::new(load_roots(ca)?);
                let verifier = WebPkiClientVerifier::builder_with_provider(roots, provider)
                    .build()
                    .map_err(|e| MxrpcError::Certificate(format!("Invalid client CA: {}", e)))?;
                builder.with_client_cert_verifier(verifier)
            }
            None => builder.with_no_client_auth(),
        };

        let config = builder.with_single_cert(self.load_certs()?, self.load_key()?)?;
        Ok(Arc::new(config))
    }

    pub fn client_config(&self) -> Result<Arc<rustls::ClientConfig>> {
        let provider = provider();
        let builder = rustls::ClientConfig::builder_with_provider(provider.clone())
            .with_safe_default_protocol_versions()?;

        let builder = match &self.ca_path {
            Some(ca) => builder.with_root_certificates(load_roots(ca)?),
            None => {
                warn!("No CA configured, server certificates will not be verified");
                builder
                    .dangerous()
                    .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert(provider)))
            }
        };

        let config = builder.with_client_auth_cert(self.load_certs()?, self.load_key()?)?;
        Ok(Arc::new(config))
    }

    /// Name to present in SNI and check the server certificate against.
    pub fn server_name_for(&self, endpoint: &str) -> Result<ServerName<'static>> {
        let name = match &self.server_name {
            Some(name) => name.clone(),
            None => endpoint_host(endpoint).to_string(),
        };
        ServerName::try_from(name.clone())
            .map_err(|e| MxrpcError::Connection(format!("Invalid server name '{}': {}", name, e)))
    }

    pub fn load_certs(&self) -> Result<Vec<CertificateDer<'static>>> {
        load_certs(&self.cert_path)
    }

    pub fn load_key(&self) -> Result<PrivateKeyDer<'static>> {
        PrivateKeyDer::from_pem_file(&self.key_path).map_err(|e| {
            MxrpcError::Certificate(format!(
                "Failed to load key {}: {}",
                self.key_path.display(),
                e
            ))
        })
    }
}

fn provider() -> Arc<CryptoProvider> {
    Arc::new(crypto::ring::default_provider())
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let certs = CertificateDer::pem_file_iter(path)
        .and_then(|iter| iter.collect::<std::result::Result<Vec<_>, _>>())
        .map_err(|e| {
            MxrpcError::Certificate(format!("Failed to load {}: {}", path.display(), e))
        })?;

    if certs.is_empty() {
        return Err(MxrpcError::Certificate(format!(
            "No certificates found in {}",
            path.display()
        )));
    }
    Ok(certs)
}

fn load_roots(path: &Path) -> Result<RootCertStore> {
    let mut roots = RootCertStore::empty();
    for cert in load_certs(path)? {
        roots.add(cert)?;
    }
    Ok(roots)
}

/// Host part of `host:port`, without IPv6 brackets.
fn endpoint_host(endpoint: &str) -> &str {
    let host = match endpoint.rsplit_once(':') {
        Some((host, port)) if !port.contains(']') => host,
        _ => endpoint,
    };
    host.trim_start_matches('[').trim_end_matches(']')
}

/// Accepts any server certificate while still checking handshake signatures.
#[derive(Debug)]
struct AcceptAnyServerCert(Arc<CryptoProvider>);

impl ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        crypto::verify_tls12_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        crypto::verify_tls13_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_host() {
        assert_eq!(endpoint_host("localhost:5001"), "localhost");
        assert_eq!(endpoint_host("127.0.0.1:5001"), "127.0.0.1");
        assert_eq!(endpoint_host("[::1]:5001"), "::1");
        assert_eq!(endpoint_host("worker-a"), "worker-a");
    }

    #[test]
    fn test_server_name_override() {
        let config = TlsConfig::default().with_server_name("localhost");
        let name = config.server_name_for("10.0.0.7:5001").unwrap();
        assert_eq!(name, ServerName::try_from("localhost").unwrap());
    }

    #[test]
    fn test_server_name_from_ip_endpoint() {
        let name = TlsConfig::default().server_name_for("127.0.0.1:5001").unwrap();
        assert!(matches!(name, ServerName::IpAddress(_)));
    }

    #[test]
    fn test_missing_files_are_certificate_errors() {
        let config = TlsConfig::new("/nonexistent/server.crt", "/nonexistent/server.key");
        assert!(matches!(config.load_certs(), Err(MxrpcError::Certificate(_))));
        assert!(matches!(config.server_config(), Err(MxrpcError::Certificate(_))));
        assert!(matches!(config.client_config(), Err(MxrpcError::Certificate(_))));
    }
}
