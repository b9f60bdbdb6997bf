//! Secure transport contexts built from trust material.
//!
//! [`TransportFactory`] turns a [`TrustMaterial`] into a rustls context for
//! exactly one role:
//!
//! - **client** — presents the held leaf chain when the server requests it and
//!   validates the server against the material's own trusted-issuer set;
//! - **server** — requires an incoming client certificate and validates it
//!   against the trusted-issuer set before the handshake completes. A client
//!   presenting no certificate, an expired one, or one signed by an untrusted
//!   issuer is rejected at the handshake; the connection never reaches
//!   application code.
//!
//! Context construction performs no network I/O. Malformed material is a
//! construction error; no degraded context is ever returned.

use std::sync::Arc;

use rustls::server::WebPkiClientVerifier;
use rustls::{ClientConfig, ServerConfig};
use tokio_rustls::TlsAcceptor;
use tracing::debug;

use crate::material::TrustMaterial;
use crate::{Error, Result};

/// Builds TLS contexts from [`TrustMaterial`].
pub struct TransportFactory;

impl TransportFactory {
    /// Build a rustls client config that presents the material's leaf chain
    /// and trusts the material's issuer set for server validation.
    ///
    /// The issuer set here is the *client's own* trust list — logically
    /// distinct from whatever list the server uses to validate clients, even
    /// when both happen to hold the same CA.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] on a cert/key mismatch or unusable issuer
    /// set.
    pub fn client_config(material: &TrustMaterial) -> Result<ClientConfig> {
        let roots = material.issuer_store()?;

        let config = ClientConfig::builder()
            .with_root_certificates(roots)
            .with_client_auth_cert(material.chain_owned(), material.key_owned())
            .map_err(|e| Error::Transport(format!("TLS client config error: {e}")))?;

        debug!(subject = %material.subject(), "TLS client config built");
        Ok(config)
    }

    /// Build a rustls server config that requires and validates client
    /// certificates against the material's trusted-issuer set.
    ///
    /// There is deliberately no "request but don't require" mode: an
    /// unauthenticated connection must fail the handshake, not surface to the
    /// access pipeline as a lower tier.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] if the client verifier or the server
    /// certificate cannot be assembled.
    pub fn server_config(material: &TrustMaterial) -> Result<ServerConfig> {
        let roots = material.issuer_store()?;

        let verifier = WebPkiClientVerifier::builder(Arc::new(roots))
            .build()
            .map_err(|e| Error::Transport(format!("Failed to build client verifier: {e}")))?;

        let mut config = ServerConfig::builder()
            .with_client_cert_verifier(verifier)
            .with_single_cert(material.chain_owned(), material.key_owned())
            .map_err(|e| Error::Transport(format!("TLS config error (cert/key mismatch?): {e}")))?;

        // Prefer HTTP/2, fall back to HTTP/1.1
        config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

        debug!(subject = %material.subject(), "TLS server config built");
        Ok(config)
    }

    /// Build an async TLS acceptor for the server role.
    ///
    /// A failed handshake (no/invalid/untrusted client certificate) surfaces
    /// as an `accept` error and yields no stream, so an aborted handshake can
    /// never leave a connection in an identified state.
    ///
    /// # Errors
    ///
    /// Same conditions as [`TransportFactory::server_config`].
    pub fn acceptor(material: &TrustMaterial) -> Result<TlsAcceptor> {
        let config = Self::server_config(material)?;
        Ok(TlsAcceptor::from(Arc::new(config)))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
