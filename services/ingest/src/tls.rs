//! TLS certificate pinning for venue WebSocket endpoints.
//!
//! The pin is the hex SHA-256 of the peer certificate's DER encoding.
//! Verification runs inside the rustls handshake: the standard WebPKI
//! checks first, then the pin comparison, so a pinned endpoint must present
//! both a valid chain and the expected leaf.

use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::client::WebPkiServerVerifier;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use sha2::{Digest, Sha256};
use tokio_tungstenite::Connector;

use crate::error::IngestError;

#[derive(Debug)]
struct PinnedCertVerifier {
    inner: Arc<WebPkiServerVerifier>,
    pin: [u8; 32],
}

impl ServerCertVerifier for PinnedCertVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        self.inner
            .verify_server_cert(end_entity, intermediates, server_name, ocsp_response, now)?;
        let fingerprint: [u8; 32] = Sha256::digest(end_entity.as_ref()).into();
        if fingerprint != self.pin {
            return Err(rustls::Error::General(format!(
                "certificate pin mismatch; got {}",
                hex::encode(fingerprint)
            )));
        }
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.inner.supported_verify_schemes()
    }
}

/// Parse a 64-hex pin into its raw digest.
pub fn parse_pin(pin_hex: &str) -> Result<[u8; 32], IngestError> {
    let bytes = hex::decode(pin_hex.trim())
        .map_err(|e| IngestError::Tls(format!("invalid pin hex: {e}")))?;
    bytes
        .try_into()
        .map_err(|_| IngestError::Tls("pin must be 32 bytes of hex".to_string()))
}

/// Build a WebSocket TLS connector enforcing the given certificate pin.
pub fn pinned_connector(pin_hex: &str) -> Result<Connector, IngestError> {
    let pin = parse_pin(pin_hex)?;

    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let inner = WebPkiServerVerifier::builder(Arc::new(roots))
        .build()
        .map_err(|e| IngestError::Tls(format!("verifier build failed: {e}")))?;

    let config = ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(PinnedCertVerifier { inner, pin }))
        .with_no_client_auth();
    Ok(Connector::Rustls(Arc::new(config)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_pin_accepts_64_hex() {
        let pin = "ab".repeat(32);
        assert_eq!(parse_pin(&pin).unwrap(), [0xabu8; 32]);
    }

    #[test]
    fn parse_pin_rejects_bad_input() {
        assert!(parse_pin("zz").is_err());
        assert!(parse_pin("abcd").is_err());
    }

    #[test]
    fn connector_builds_for_valid_pin() {
        let pin = "00".repeat(32);
        assert!(pinned_connector(&pin).is_ok());
    }
}
