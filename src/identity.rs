//! Peer identity extraction from validated client certificates.
//!
//! After the TLS handshake has validated a client certificate against the
//! trusted issuer set, the server derives the request's identity from the
//! certificate's distinguished name. Which DN attribute carries the subject is
//! configurable via [`SubjectAttribute`]; `CN` is the default.
//!
//! The identity is not attacker-controlled: it only exists for certificates
//! the handshake already accepted.

use rustls::pki_types::CertificateDer;
use x509_parser::certificate::X509Certificate;
use x509_parser::prelude::FromDer;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Which distinguished-name attribute the subject identifier is read from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubjectAttribute {
    /// Common Name (`CN`). The default.
    #[default]
    CommonName,
    /// Organizational Unit (`OU`).
    OrganizationalUnit,
    /// Organization (`O`).
    Organization,
}

/// Identity extracted from a handshake-validated client certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerIdentity {
    /// Subject identifier bound to the configured [`SubjectAttribute`].
    pub subject: String,
    /// Certificate Common Name, if present.
    pub common_name: Option<String>,
    /// First Organizational Unit in the subject, if present.
    pub organizational_unit: Option<String>,
}

impl PeerIdentity {
    /// Parse a DER-encoded certificate and extract its identity.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Identity`] if the certificate cannot be parsed or the
    /// configured attribute is absent from the subject DN. A certificate
    /// without a subject yields no identity and no tier upgrade.
    pub fn from_der(der: &[u8], attribute: SubjectAttribute) -> Result<Self> {
        let (_, cert) = X509Certificate::from_der(der)
            .map_err(|e| Error::Identity(format!("Failed to parse client certificate: {e}")))?;

        let common_name = extract_cn(&cert);
        let organizational_unit = extract_ou(&cert);
        let organization = extract_o(&cert);

        let subject = match attribute {
            SubjectAttribute::CommonName => common_name.clone(),
            SubjectAttribute::OrganizationalUnit => organizational_unit.clone(),
            SubjectAttribute::Organization => organization,
        }
        .ok_or_else(|| {
            Error::Identity(format!(
                "Client certificate subject has no {attribute:?} attribute"
            ))
        })?;

        Ok(Self {
            subject,
            common_name,
            organizational_unit,
        })
    }

    /// Extract the identity from the peer certificates of a completed
    /// server-side handshake.
    ///
    /// `certs` is what `rustls::ServerConnection::peer_certificates` returns;
    /// the first entry is the leaf. With a client-certificate-requiring
    /// verifier the handshake cannot complete without one, so `None` here
    /// indicates a misconfigured acceptor.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Identity`] if no peer certificate is available or the
    /// leaf has no usable subject.
    pub fn from_peer_certificates(
        certs: Option<&[CertificateDer<'static>]>,
        attribute: SubjectAttribute,
    ) -> Result<Self> {
        let leaf = certs
            .and_then(<[_]>::first)
            .ok_or_else(|| Error::Identity("No client certificate on connection".to_string()))?;
        Self::from_der(leaf, attribute)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Extraction helpers
// ─────────────────────────────────────────────────────────────────────────────

fn extract_cn(cert: &X509Certificate<'_>) -> Option<String> {
    cert.subject()
        .iter_common_name()
        .next()
        .and_then(|attr| attr.as_str().ok())
        .map(str::to_owned)
}

fn extract_ou(cert: &X509Certificate<'_>) -> Option<String> {
    cert.subject()
        .iter_organizational_unit()
        .next()
        .and_then(|attr| attr.as_str().ok())
        .map(str::to_owned)
}

fn extract_o(cert: &X509Certificate<'_>) -> Option<String> {
    cert.subject()
        .iter_organization()
        .next()
        .and_then(|attr| attr.as_str().ok())
        .map(str::to_owned)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
