//! Outbound backend connections.
//!
//! # Responsibilities
//! - Open TLS-wrapped TCP connections to the fixed upstream
//! - Enforce the connect timeout (TCP + TLS handshake together)
//! - Hold the client TLS configuration, including the opt-in trust-all mode
//!
//! A connection attempt that fails is fatal for the calling session; there is
//! no retry policy and no fallback backend. The returned stream is not read
//! by anything until the owning session drives it, so no backend bytes can be
//! processed before the session's pipeline is in place.

use std::sync::Arc;
use std::time::Duration;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;

use crate::config::{TimeoutConfig, UpstreamConfig};
use crate::proxy::error::ProxyError;

/// Opens one TLS connection to the fixed upstream per call.
///
/// Connections are never pooled or reused; each frontend connection owns at
/// most one backend connection obtained here.
#[derive(Clone)]
pub struct BackendConnector {
    host: String,
    port: u16,
    server_name: ServerName<'static>,
    tls: TlsConnector,
    connect_timeout: Duration,
}

impl BackendConnector {
    pub fn new(upstream: &UpstreamConfig, timeouts: &TimeoutConfig) -> Result<Self, ProxyError> {
        let server_name = ServerName::try_from(upstream.host.clone())
            .map_err(|_| ProxyError::InvalidUpstreamHost(upstream.host.clone()))?;

        let config = if upstream.danger_accept_invalid_certs {
            tracing::warn!(
                host = %upstream.host,
                "Backend certificate verification is DISABLED (danger_accept_invalid_certs)"
            );
            ClientConfig::builder()
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(NoCertVerification::new()))
                .with_no_client_auth()
        } else {
            let mut roots = RootCertStore::empty();
            roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
            ClientConfig::builder()
                .with_root_certificates(roots)
                .with_no_client_auth()
        };

        Ok(Self {
            host: upstream.host.clone(),
            port: upstream.port,
            server_name,
            tls: TlsConnector::from(Arc::new(config)),
            connect_timeout: Duration::from_secs(timeouts.connect_secs),
        })
    }

    /// Open a new TLS connection to the upstream.
    pub async fn connect(&self) -> Result<TlsStream<TcpStream>, ProxyError> {
        let attempt = async {
            let tcp = TcpStream::connect((self.host.as_str(), self.port))
                .await
                .map_err(ProxyError::Connect)?;
            tcp.set_nodelay(true).map_err(ProxyError::Connect)?;
            self.tls
                .connect(self.server_name.clone(), tcp)
                .await
                .map_err(ProxyError::Connect)
        };

        match timeout(self.connect_timeout, attempt).await {
            Ok(result) => result,
            Err(_) => Err(ProxyError::ConnectTimeout),
        }
    }
}

/// Certificate verifier that accepts any backend certificate chain.
///
/// The upstream's certificate cannot currently be verified by the gateway, so
/// deployments opt into this verifier via `danger_accept_invalid_certs`. It
/// still verifies handshake signatures; only chain validation is skipped.
#[derive(Debug)]
pub struct NoCertVerification {
    provider: Arc<CryptoProvider>,
}

impl NoCertVerification {
    pub fn new() -> Self {
        Self {
            provider: Arc::new(rustls::crypto::aws_lc_rs::default_provider()),
        }
    }
}

impl Default for NoCertVerification {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerCertVerifier for NoCertVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
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
        rustls::crypto::verify_tls13_signature(
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
