// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! TLS client setup for `ssl` endpoints.
//!
//! [`TlsOptions`] is always part of the transport configuration. Dialing an
//! `ssl` endpoint needs the `tls` cargo feature; without it the dial fails
//! with [`TransportError::Unsupported`].
//!
//! ```toml
//! [transport.tls]
//! ca_file = "/etc/tars/ca.pem"      # webpki roots when unset
//! cert_file = "/etc/tars/client.pem" # mutual TLS, together with key_file
//! key_file = "/etc/tars/client.key"
//! server_name = "hello.internal"     # endpoint host when unset
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[cfg(feature = "tls")]
use super::TransportError;
#[cfg(feature = "tls")]
use rustls::pki_types::pem::PemObject;
#[cfg(feature = "tls")]
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
#[cfg(feature = "tls")]
use rustls::ClientConfig;
#[cfg(feature = "tls")]
use std::path::Path;
#[cfg(feature = "tls")]
use std::sync::Arc;
#[cfg(feature = "tls")]
use tokio_rustls::TlsConnector;

/// Client-side TLS settings shared by every `ssl` connection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsOptions {
    /// PEM bundle of trusted roots.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ca_file: Option<PathBuf>,

    /// PEM client certificate chain.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cert_file: Option<PathBuf>,

    /// PEM client private key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_file: Option<PathBuf>,

    /// Name checked against the server certificate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_name: Option<String>,

    /// Accept any server certificate. Test setups only.
    pub insecure_skip_verify: bool,
}

#[cfg(feature = "tls")]
fn tls_err(path: &Path, e: impl std::fmt::Display) -> TransportError {
    TransportError::Tls(format!("{}: {}", path.display(), e))
}

#[cfg(feature = "tls")]
fn read_pem(path: &Path) -> Result<Vec<u8>, TransportError> {
    std::fs::read(path).map_err(|e| tls_err(path, e))
}

#[cfg(feature = "tls")]
fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, TransportError> {
    let pem = read_pem(path)?;
    let certs = CertificateDer::pem_slice_iter(&pem)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| tls_err(path, e))?;
    if certs.is_empty() {
        return Err(tls_err(path, "no certificate found"));
    }
    Ok(certs)
}

#[cfg(feature = "tls")]
fn load_key(path: &Path) -> Result<PrivateKeyDer<'static>, TransportError> {
    let pem = read_pem(path)?;
    PrivateKeyDer::from_pem_slice(&pem).map_err(|e| tls_err(path, e))
}

#[cfg(feature = "tls")]
fn root_store(options: &TlsOptions) -> Result<rustls::RootCertStore, TransportError> {
    let mut roots = rustls::RootCertStore::empty();
    match &options.ca_file {
        Some(path) => {
            for cert in load_certs(path)? {
                roots.add(cert).map_err(|e| tls_err(path, e))?;
            }
        }
        None => roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned()),
    }
    Ok(roots)
}

/// Build the connector for `options`. Certificate files are read once here.
#[cfg(feature = "tls")]
pub(crate) fn connector(options: &TlsOptions) -> Result<TlsConnector, TransportError> {
    let builder = if options.insecure_skip_verify {
        log::warn!("[transport] tls server certificate verification is disabled");
        ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(NoVerifier::new()))
    } else {
        ClientConfig::builder().with_root_certificates(root_store(options)?)
    };

    let config = match (&options.cert_file, &options.key_file) {
        (Some(cert), Some(key)) => builder
            .with_client_auth_cert(load_certs(cert)?, load_key(key)?)
            .map_err(|e| tls_err(key, e))?,
        (None, None) => builder.with_no_client_auth(),
        _ => {
            return Err(TransportError::Tls(
                "cert_file and key_file must be set together".into(),
            ))
        }
    };
    Ok(TlsConnector::from(Arc::new(config)))
}

/// Name presented for SNI and checked against the certificate.
#[cfg(feature = "tls")]
pub(crate) fn server_name(
    options: &TlsOptions,
    host: &str,
) -> Result<ServerName<'static>, TransportError> {
    let name = options.server_name.as_deref().unwrap_or(host);
    ServerName::try_from(name.to_owned())
        .map_err(|e| TransportError::Tls(format!("invalid server name {:?}: {}", name, e)))
}

/// Verifier that accepts every server certificate.
#[cfg(feature = "tls")]
#[derive(Debug)]
struct NoVerifier {
    schemes: Vec<rustls::SignatureScheme>,
}

#[cfg(feature = "tls")]
impl NoVerifier {
    fn new() -> Self {
        let schemes = rustls::crypto::ring::default_provider()
            .signature_verification_algorithms
            .supported_schemes();
        Self { schemes }
    }
}

#[cfg(feature = "tls")]
impl rustls::client::danger::ServerCertVerifier for NoVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
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
        self.schemes.clone()
    }
}
