//! TLS configuration and certificate loading.
//!
//! # Policy
//! - TLS 1.2 minimum, TLS 1.3 preferred
//! - AEAD cipher suites with forward secrecy only (ECDHE for TLS 1.2)
//! - Key exchange restricted to X25519 and P-256
//! - The client's cipher preference is honored
//! - A configured CA bundle turns on mandatory client certificate verification

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use rustls::crypto::ring::{cipher_suite, default_provider, kx_group};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::RootCertStore;

use crate::net::ListenerError;

/// Certificate material loaded from PEM files.
#[derive(Debug)]
pub struct TlsMaterial {
    certs: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
    client_roots: Option<Arc<RootCertStore>>,
}

impl TlsMaterial {
    /// Load a certificate chain, private key and optional client CA bundle.
    pub fn load(
        cert_path: &Path,
        key_path: &Path,
        ca_path: Option<&Path>,
    ) -> Result<Self, ListenerError> {
        let certs = read_certs(cert_path)?;
        let key = read_key(key_path)?;

        let client_roots = match ca_path {
            Some(path) => {
                let mut roots = RootCertStore::empty();
                for cert in read_certs(path)? {
                    roots.add(cert).map_err(|e| {
                        tls_error(format!("bad CA certificate in {}: {e}", path.display()))
                    })?;
                }
                Some(Arc::new(roots))
            }
            None => None,
        };

        Ok(Self {
            certs,
            key,
            client_roots,
        })
    }

    /// Whether client certificates are required.
    pub fn requires_client_auth(&self) -> bool {
        self.client_roots.is_some()
    }

    /// Build a fresh server policy from this material.
    ///
    /// Each call returns an independent value, so hooks can mutate it freely.
    pub fn server_config(&self) -> Result<rustls::ServerConfig, ListenerError> {
        let provider = Arc::new(policy_provider());

        let builder = rustls::ServerConfig::builder_with_provider(provider.clone())
            .with_protocol_versions(&[&rustls::version::TLS13, &rustls::version::TLS12])
            .map_err(|e| tls_error(e.to_string()))?;

        let builder = match &self.client_roots {
            Some(roots) => {
                let verifier = WebPkiClientVerifier::builder_with_provider(roots.clone(), provider)
                    .build()
                    .map_err(|e| tls_error(format!("client verifier: {e}")))?;
                builder.with_client_cert_verifier(verifier)
            }
            None => builder.with_no_client_auth(),
        };

        let mut config = builder
            .with_single_cert(self.certs.clone(), self.key.clone_key())
            .map_err(|e| tls_error(format!("certificate and key do not match: {e}")))?;

        config.ignore_client_order = false;
        config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];
        Ok(config)
    }
}

fn policy_provider() -> CryptoProvider {
    CryptoProvider {
        cipher_suites: vec![
            cipher_suite::TLS13_AES_256_GCM_SHA384,
            cipher_suite::TLS13_AES_128_GCM_SHA256,
            cipher_suite::TLS13_CHACHA20_POLY1305_SHA256,
            cipher_suite::TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384,
            cipher_suite::TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256,
            cipher_suite::TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256,
            cipher_suite::TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384,
            cipher_suite::TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256,
            cipher_suite::TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256,
        ],
        kx_groups: vec![kx_group::X25519, kx_group::SECP256R1],
        ..default_provider()
    }
}

fn read_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, ListenerError> {
    let file = File::open(path)
        .map_err(|e| tls_error(format!("cannot open {}: {e}", path.display())))?;

    let certs = rustls_pemfile::certs(&mut BufReader::new(file))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| tls_error(format!("cannot parse {}: {e}", path.display())))?;

    if certs.is_empty() {
        return Err(tls_error(format!("no certificates in {}", path.display())));
    }
    Ok(certs)
}

fn read_key(path: &Path) -> Result<PrivateKeyDer<'static>, ListenerError> {
    let file = File::open(path)
        .map_err(|e| tls_error(format!("cannot open {}: {e}", path.display())))?;

    rustls_pemfile::private_key(&mut BufReader::new(file))
        .map_err(|e| tls_error(format!("cannot parse {}: {e}", path.display())))?
        .ok_or_else(|| tls_error(format!("no private key in {}", path.display())))
}

fn tls_error(reason: String) -> ListenerError {
    ListenerError::TlsConfig(reason)
}
