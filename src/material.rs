//! Trust material — private key, leaf certificate chain, trusted issuers.
//!
//! [`TrustMaterial`] is the immutable holder both transport roles are built
//! from: the client presents the leaf chain and trusts the issuer set for
//! server validation; the server presents the leaf chain and validates client
//! certificates against the issuer set.
//!
//! Loading is "bytes in, parsed material or error out": any parse failure is a
//! hard construction error and no partial object is ever returned. Once
//! constructed the material is never mutated; share it as `&TrustMaterial` or
//! `Arc<TrustMaterial>` across connections.
//!
//! # File format
//!
//! All certificate and key inputs are expected in **PEM format**. DER is not
//! supported to keep operator tooling simple (openssl, cfssl, cert-manager all
//! default to PEM).

use std::fs;
use std::path::Path;

use rustls::RootCertStore;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tracing::debug;

use crate::identity::{PeerIdentity, SubjectAttribute};
use crate::{Error, Result};

/// Immutable key/certificate/trust bundle for one process role.
///
/// Construct once per role (client material, server material) with
/// [`TrustMaterial::from_pem`] or [`TrustMaterial::from_files`]. The private
/// key never leaves the holder except into the TLS context that consumes it.
pub struct TrustMaterial {
    key: PrivateKeyDer<'static>,
    chain: Vec<CertificateDer<'static>>,
    subject: String,
    issuers: Vec<CertificateDer<'static>>,
}

impl std::fmt::Debug for TrustMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The private key is deliberately omitted.
        f.debug_struct("TrustMaterial")
            .field("subject", &self.subject)
            .field("chain_len", &self.chain.len())
            .field("issuers_len", &self.issuers.len())
            .finish_non_exhaustive()
    }
}

impl TrustMaterial {
    /// Parse trust material from PEM byte sources.
    ///
    /// `key_pem` must contain one private key (RSA, PKCS#8 or EC);
    /// `cert_pem` the leaf certificate followed by any intermediates;
    /// `issuers_pem` the set of trusted issuer certificates.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Material`] if any input is empty or malformed, or if
    /// the leaf certificate carries no Common Name to use as the subject.
    pub fn from_pem(key_pem: &[u8], cert_pem: &[u8], issuers_pem: &[u8]) -> Result<Self> {
        let key = parse_private_key(key_pem, "key material")?;
        let chain = parse_certs(cert_pem, "certificate chain")?;
        let issuers = parse_certs(issuers_pem, "trusted issuers")?;

        // Subject of the leaf, used as this role's own identity label.
        let subject = PeerIdentity::from_der(&chain[0], SubjectAttribute::CommonName)
            .map_err(|e| Error::Material(format!("Leaf certificate has no usable subject: {e}")))?
            .subject;

        debug!(
            subject = %subject,
            chain_len = chain.len(),
            issuers = issuers.len(),
            "Trust material loaded"
        );

        Ok(Self {
            key,
            chain,
            subject,
            issuers,
        })
    }

    /// Load trust material from PEM files on disk.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Material`] if a file cannot be read or parsed.
    pub fn from_files(
        key_path: impl AsRef<Path>,
        cert_path: impl AsRef<Path>,
        issuers_path: impl AsRef<Path>,
    ) -> Result<Self> {
        let key_pem = read_file(key_path.as_ref())?;
        let cert_pem = read_file(cert_path.as_ref())?;
        let issuers_pem = read_file(issuers_path.as_ref())?;
        Self::from_pem(&key_pem, &cert_pem, &issuers_pem)
    }

    /// Subject identifier parsed from the leaf certificate.
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// The leaf certificate chain presented during handshakes.
    #[must_use]
    pub fn chain(&self) -> &[CertificateDer<'static>] {
        &self.chain
    }

    /// The trusted issuer certificates.
    #[must_use]
    pub fn issuers(&self) -> &[CertificateDer<'static>] {
        &self.issuers
    }

    /// Clone the chain for handing to a TLS context builder.
    pub(crate) fn chain_owned(&self) -> Vec<CertificateDer<'static>> {
        self.chain.clone()
    }

    /// Clone the private key for handing to a TLS context builder.
    pub(crate) fn key_owned(&self) -> PrivateKeyDer<'static> {
        self.key.clone_key()
    }

    /// Build a rustls root store from the trusted issuer set.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Material`] if an issuer certificate is rejected by
    /// rustls (e.g. not a CA certificate).
    pub(crate) fn issuer_store(&self) -> Result<RootCertStore> {
        let mut store = RootCertStore::empty();
        for cert in &self.issuers {
            store
                .add(cert.clone())
                .map_err(|e| Error::Material(format!("Failed to add issuer to trust store: {e}")))?;
        }
        Ok(store)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// PEM parsing helpers
// ─────────────────────────────────────────────────────────────────────────────

fn read_file(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| Error::Material(format!("Cannot read '{}': {e}", path.display())))
}

fn parse_certs(pem: &[u8], what: &str) -> Result<Vec<CertificateDer<'static>>> {
    let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut &pem[..])
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::Material(format!("Failed to parse {what}: {e}")))?;

    if certs.is_empty() {
        return Err(Error::Material(format!("No certificates found in {what}")));
    }

    Ok(certs)
}

fn parse_private_key(pem: &[u8], what: &str) -> Result<PrivateKeyDer<'static>> {
    rustls_pemfile::private_key(&mut &pem[..])
        .map_err(|e| Error::Material(format!("Failed to parse {what}: {e}")))?
        .ok_or_else(|| Error::Material(format!("No private key found in {what}")))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
