//! TLS configuration and certificate generation
//!
//! Authenticated transport runs TLS 1.3 with self-signed certificates on
//! both sides. Certificate chains are deliberately not verified — each
//! side pins the remote's Ed25519 public key instead: the client checks
//! the server key against the `|publickey` endpoint suffix, the server
//! checks the client key against the trust store.

use crate::error::{Error, Result};
use crate::identity::{Identity, PublicKey};
use crate::network::DISCO_ALPN;
use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, UnixTime};
use rustls::{ClientConfig, ServerConfig};
use std::sync::Arc;
use time::OffsetDateTime;

/// TLS material for one node
///
/// Both the client and server roles present the same self-signed
/// certificate, generated from the node's identity key, so either side
/// of any handshake can be pinned to the identity it claims.
pub struct TlsConfig {
    certificates: Vec<CertificateDer<'static>>,
    private_key: PrivateKeyDer<'static>,
}

impl TlsConfig {
    /// Build TLS material from a node identity
    ///
    /// The certificate signs with (and therefore embeds) the identity's
    /// own Ed25519 key, valid for 1 year from creation.
    pub fn from_identity(identity: &Identity) -> Result<Self> {
        let pkcs8 = identity.pkcs8_der()?;
        let key_pair = KeyPair::try_from(pkcs8.as_slice())
            .map_err(|e| Error::Tls(format!("identity key unusable for TLS: {}", e)))?;

        let mut params = CertificateParams::default();
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, "meshdisco-node");
        params.distinguished_name = dn;

        let now = OffsetDateTime::now_utc();
        params.not_before = now;
        params.not_after = now + time::Duration::days(365);

        let cert = params
            .self_signed(&key_pair)
            .map_err(|e| Error::Tls(format!("certificate generation failed: {}", e)))?;

        let cert_der = CertificateDer::from(cert.der().to_vec());
        let key_der = PrivateKeyDer::try_from(key_pair.serialize_der())
            .map_err(|e| Error::Tls(format!("private key serialization failed: {}", e)))?;

        Ok(Self {
            certificates: vec![cert_der],
            private_key: key_der,
        })
    }

    /// rustls `ClientConfig` for outbound peer connections
    ///
    /// Accepts any server certificate; callers must pin the server's key
    /// with [`peer_public_key`] after the handshake.
    pub fn client_config(&self) -> Result<Arc<ClientConfig>> {
        let mut config = ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(NoServerVerify))
            .with_client_auth_cert(self.certificates.clone(), self.private_key.clone_key())
            .map_err(|e| Error::Tls(format!("client config rejected identity: {}", e)))?;

        config.alpn_protocols = vec![DISCO_ALPN.to_vec()];
        Ok(Arc::new(config))
    }

    /// rustls `ServerConfig` for the inbound endpoint
    ///
    /// Requires a client certificate but accepts any; the server checks
    /// the presented key against its trust store after the handshake.
    pub fn server_config(&self) -> Result<Arc<ServerConfig>> {
        let mut config = ServerConfig::builder()
            .with_client_cert_verifier(Arc::new(AcceptAnyClient))
            .with_single_cert(self.certificates.clone(), self.private_key.clone_key())
            .map_err(|e| Error::Tls(format!("server config rejected identity: {}", e)))?;

        config.alpn_protocols = vec![DISCO_ALPN.to_vec()];
        Ok(Arc::new(config))
    }
}

/// DER prefix of an Ed25519 SubjectPublicKeyInfo (RFC 8410): the 32 raw
/// key bytes always follow this exact 12-byte sequence
const ED25519_SPKI_PREFIX: [u8; 12] = [
    0x30, 0x2a, 0x30, 0x05, 0x06, 0x03, 0x2b, 0x65, 0x70, 0x03, 0x21, 0x00,
];

/// Extract the pinned Ed25519 public key from a presented certificate
/// chain
///
/// Returns `None` when no certificate was presented or the leaf does not
/// carry an Ed25519 key.
pub(crate) fn peer_public_key(certificates: Option<&[CertificateDer<'_>]>) -> Option<PublicKey> {
    let leaf = certificates?.first()?;
    let der = leaf.as_ref();

    let start = der
        .windows(ED25519_SPKI_PREFIX.len())
        .position(|w| w == ED25519_SPKI_PREFIX)?
        + ED25519_SPKI_PREFIX.len();
    let bytes: [u8; 32] = der.get(start..start + 32)?.try_into().ok()?;
    Some(PublicKey::from_bytes_unchecked(bytes))
}

/// Server certificate verifier that accepts all certificates
///
/// Peer identity is established by public-key pinning after the
/// handshake completes, not by chain validation.
#[derive(Debug)]
struct NoServerVerify;

impl rustls::client::danger::ServerCertVerifier for NoServerVerify {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        supported_schemes()
    }
}

/// Client certificate verifier that demands a certificate but accepts
/// any; the trust-store check happens against the pinned key
#[derive(Debug)]
struct AcceptAnyClient;

impl rustls::server::danger::ClientCertVerifier for AcceptAnyClient {
    fn root_hint_subjects(&self) -> &[rustls::DistinguishedName] {
        &[]
    }

    fn verify_client_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _now: UnixTime,
    ) -> std::result::Result<rustls::server::danger::ClientCertVerified, rustls::Error> {
        Ok(rustls::server::danger::ClientCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        supported_schemes()
    }
}

fn supported_schemes() -> Vec<rustls::SignatureScheme> {
    vec![
        rustls::SignatureScheme::ED25519,
        rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
        rustls::SignatureScheme::ECDSA_NISTP384_SHA384,
        rustls::SignatureScheme::RSA_PSS_SHA256,
        rustls::SignatureScheme::RSA_PSS_SHA384,
        rustls::SignatureScheme::RSA_PSS_SHA512,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tls_config_from_identity() {
        let identity = Identity::generate();
        let tls = TlsConfig::from_identity(&identity).unwrap();
        assert_eq!(tls.certificates.len(), 1);
    }

    #[test]
    fn test_certificate_embeds_identity_key() {
        let identity = Identity::from_seed(&[11u8; 32]);
        let tls = TlsConfig::from_identity(&identity).unwrap();

        let pinned = peer_public_key(Some(&tls.certificates)).unwrap();
        assert_eq!(pinned, identity.public_key());
    }

    #[test]
    fn test_peer_public_key_absent_chain() {
        assert!(peer_public_key(None).is_none());
        assert!(peer_public_key(Some(&[])).is_none());
    }

    #[test]
    fn test_client_config_sets_alpn() {
        let tls = TlsConfig::from_identity(&Identity::generate()).unwrap();
        let config = tls.client_config().unwrap();
        assert_eq!(config.alpn_protocols, vec![DISCO_ALPN.to_vec()]);
    }

    #[test]
    fn test_server_config_sets_alpn() {
        let tls = TlsConfig::from_identity(&Identity::generate()).unwrap();
        let config = tls.server_config().unwrap();
        assert_eq!(config.alpn_protocols, vec![DISCO_ALPN.to_vec()]);
    }
}
