//! Self-signed certificate generation and certificate-verification
//! bypass.
//!
//! The true identity check for a connection happens one layer up, in the
//! room's SSH host key verification carried over the resulting QUIC
//! stream — this TLS layer exists only to get an encrypted, ALPN-pinned
//! datagram channel running, not to authenticate anyone.
//!
//! Uses `rcgen`'s default ECDSA P-256 key rather than RSA: the `ring`
//! backend cannot generate RSA key material (only parse an externally
//! supplied one). The certificate is never checked against any CA either
//! way, so the key algorithm has no bearing on the transport's actual
//! security property.

use std::sync::{Arc, Once};
use std::time::Duration;

use quinn::crypto::rustls::{QuicClientConfig, QuicServerConfig};
use quinn::{ClientConfig, ServerConfig, TransportConfig};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};

use unn_common::UnnError;

/// ALPN identifying this protocol on the QUIC handshake.
pub const ALPN: &[u8] = b"unn-quic";

const KEEP_ALIVE: Duration = Duration::from_secs(15);
const IDLE_TIMEOUT: Duration = Duration::from_secs(60);
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Generate a fresh self-signed certificate and build the paired
/// server/client `quinn` configs that trust only it (for the server
/// side) and nothing at all (for the client side — see
/// `NoCertificateVerification`).
pub fn self_signed_configs() -> Result<(ServerConfig, ClientConfig), UnnError> {
    ensure_crypto_provider_installed();

    let cert = rcgen::generate_simple_self_signed(vec!["unn.local".to_string()])
        .map_err(|e| UnnError::Transport(format!("certificate generation failed: {e}")))?;
    let cert_der = CertificateDer::from(cert.cert.der().to_vec());
    let key_der = PrivateKeyDer::Pkcs8(cert.signing_key.serialize_der().into());

    let mut transport = TransportConfig::default();
    transport.keep_alive_interval(Some(KEEP_ALIVE));
    transport
        .max_idle_timeout(Some(
            IDLE_TIMEOUT
                .try_into()
                .map_err(|_| UnnError::Configuration("invalid idle timeout".into()))?,
        ));
    let transport = Arc::new(transport);

    let mut rustls_server = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(vec![cert_der.clone()], key_der)
        .map_err(|e| UnnError::Transport(format!("TLS server config failed: {e}")))?;
    rustls_server.alpn_protocols = vec![ALPN.to_vec()];
    rustls_server.max_early_data_size = u32::MAX;

    let quic_server = QuicServerConfig::try_from(rustls_server)
        .map_err(|e| UnnError::Transport(format!("QUIC server config failed: {e}")))?;
    let mut server_config = ServerConfig::with_crypto(Arc::new(quic_server));
    server_config.transport_config(transport.clone());

    let mut rustls_client = rustls::ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(NoCertificateVerification))
        .with_no_client_auth();
    rustls_client.alpn_protocols = vec![ALPN.to_vec()];

    let quic_client = QuicClientConfig::try_from(rustls_client)
        .map_err(|e| UnnError::Transport(format!("QUIC client config failed: {e}")))?;
    let mut client_config = ClientConfig::new(Arc::new(quic_client));
    client_config.transport_config(transport);

    Ok((server_config, client_config))
}

/// `rustls::ClientConfig::builder()`/`ServerConfig::builder()` need a
/// process-level default `CryptoProvider` installed before they can be
/// called; install `ring` once per process rather than relying on a
/// binary's `main` to remember it.
fn ensure_crypto_provider_installed() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// Handshake timeout applied by callers around `connect(...).await`.
pub fn handshake_timeout() -> Duration {
    HANDSHAKE_TIMEOUT
}

/// Accepts any server certificate. No CA is consulted and no hostname is
/// checked — identity is established one layer up over the SSH session
/// this QUIC stream carries.
#[derive(Debug)]
struct NoCertificateVerification;

impl rustls::client::danger::ServerCertVerifier for NoCertificateVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        rustls::crypto::ring::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}
