//! TLS client that accepts any server certificate.
//!
//! Electrum-style servers commonly present self-signed certificates, so the
//! chain is never validated. Handshake signatures are still checked against
//! the presented key.

use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{self, CryptoProvider};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, SignatureScheme};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;
use tracing::{debug, warn};

use crate::domain::ClientError;

/// Certificate verifier for the accept-any trust policy.
#[derive(Debug)]
struct AcceptAnyCertificate {
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for AcceptAnyCertificate {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        debug!(server = ?server_name, "Accepting server certificate without validation");
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

fn accept_any_config() -> Result<ClientConfig, ClientError> {
    let provider = Arc::new(crypto::ring::default_provider());
    let config = ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()
        .map_err(|e| ClientError::Tls(e.to_string()))?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate { provider }))
        .with_no_client_auth();
    Ok(config)
}

/// Run the TLS handshake over `tcp`.
pub(super) async fn connect_accept_any(
    tcp: TcpStream,
    host: &str,
) -> Result<TlsStream<TcpStream>, ClientError> {
    warn!(host, "TLS certificate validation is disabled for this connection");
    let connector = TlsConnector::from(Arc::new(accept_any_config()?));
    let server_name = ServerName::try_from(host.to_string())
        .map_err(|e| ClientError::Tls(format!("invalid server name {}: {}", host, e)))?;
    connector
        .connect(server_name, tcp)
        .await
        .map_err(|e| ClientError::Tls(format!("handshake with {}: {}", host, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builds() {
        let config = accept_any_config().unwrap();
        assert!(config.alpn_protocols.is_empty());
    }

    #[test]
    fn test_verifier_offers_provider_schemes() {
        let verifier = AcceptAnyCertificate {
            provider: Arc::new(crypto::ring::default_provider()),
        };
        let schemes = verifier.supported_verify_schemes();
        assert!(schemes.contains(&SignatureScheme::ECDSA_NISTP256_SHA256));
        assert!(schemes.contains(&SignatureScheme::RSA_PSS_SHA256));
    }
}
