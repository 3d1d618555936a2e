//! TLS configuration for the PostgreSQL target connection.

use std::sync::Arc;

use rustls::client::WantsClientCert;
use rustls::{ClientConfig, ConfigBuilder};
use tokio_postgres_rustls::MakeRustlsConnect;
use tracing::{info, warn};

use crate::config::TargetSslMode;
use crate::error::{MigrateError, Result};

/// Builder for PostgreSQL TLS connections.
pub struct TlsBuilder {
    ssl_mode: TargetSslMode,
}

impl TlsBuilder {
    pub fn new(ssl_mode: TargetSslMode) -> Self {
        Self { ssl_mode }
    }

    /// Build a connector for tokio-postgres.
    ///
    /// Returns None if TLS is disabled.
    pub fn build(&self) -> Result<Option<MakeRustlsConnect>> {
        if self.ssl_mode == TargetSslMode::Disable {
            return Ok(None);
        }

        let config = self.build_client_config()?;
        Ok(Some(MakeRustlsConnect::new(config)))
    }

    /// Build the underlying rustls ClientConfig.
    ///
    /// The crypto provider is chosen explicitly; more than one may be compiled
    /// in through the MySQL driver.
    pub fn build_client_config(&self) -> Result<ClientConfig> {
        let config = match self.ssl_mode {
            TargetSslMode::Disable => {
                return Err(MigrateError::Config(
                    "Cannot build TLS config for ssl_mode=disable".into(),
                ));
            }
            TargetSslMode::Require => {
                warn!(
                    "ssl_mode=require enables TLS but does NOT verify the server certificate. \
                     Use ssl_mode=verify-full to protect against man-in-the-middle attacks."
                );
                Self::builder()?
                    .dangerous()
                    .with_custom_certificate_verifier(Arc::new(NoVerifier))
                    .with_no_client_auth()
            }
            TargetSslMode::VerifyCa => {
                // rustls always checks the hostname
                warn!(
                    "ssl_mode=verify-ca: certificate and hostname verification enabled \
                     (same behavior as verify-full)"
                );
                Self::verified()?.with_no_client_auth()
            }
            TargetSslMode::VerifyFull => {
                info!("ssl_mode=verify-full: full certificate and hostname verification enabled");
                Self::verified()?.with_no_client_auth()
            }
        };

        Ok(config)
    }

    fn builder() -> Result<ConfigBuilder<ClientConfig, rustls::WantsVerifier>> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .map_err(|e| MigrateError::Config(format!("TLS setup failed: {}", e)))
    }

    fn verified() -> Result<ConfigBuilder<ClientConfig, WantsClientCert>> {
        let mut root_store = rustls::RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        Ok(Self::builder()?.with_root_certificates(root_store))
    }
}

/// Accepts any server certificate. Only used for `ssl_mode=require`.
#[derive(Debug)]
struct NoVerifier;

impl rustls::client::danger::ServerCertVerifier for NoVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> std::result::Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        rustls::crypto::ring::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}
