//! Client-side connection strategies and strategy selection.
//!
//! A [`ConnectionStrategy`] is a closed set of three roles with a two-phase
//! contract:
//!
//! - [`configure`](ConnectionStrategy::configure) runs **once per client** and
//!   installs transport security (client certificate, peer trust list);
//! - [`decorate`](ConnectionStrategy::decorate) runs **once per request** and
//!   attaches the per-request credential, if any.
//!
//! Transport configuration is expensive and connection-scoped; credential
//! attachment is cheap and fresh per request. Keeping the phases apart means
//! no TLS renegotiation per request and no stale request state on the
//! connection.
//!
//! Strategies raise no errors at send time themselves; a rejected handshake
//! surfaces from the transport as a connection failure.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::material::TrustMaterial;
use crate::tier::TrustTier;
use crate::transport::TransportFactory;
use crate::{Error, Result};

/// Role names understood by [`StrategySelector::select`].
pub mod roles {
    /// No credentials, no claims.
    pub const UNAUTHENTICATED: &str = "unauthenticated";
    /// Client certificate identity only.
    pub const IDENTIFIED: &str = "identified";
    /// Client certificate identity plus bearer-token escalation.
    pub const PRIVILEGED: &str = "privileged";
}

/// Parameter keys resolved through a [`ParamSource`].
pub mod params {
    /// Path to the PEM private key file.
    pub const KEY_MATERIAL: &str = "key_material";
    /// Path to the PEM leaf certificate chain file.
    pub const CERT_MATERIAL: &str = "cert_material";
    /// Path to the PEM trusted-issuer set used to validate the server.
    pub const TRUST_MATERIAL: &str = "trust_material";
    /// Pre-shared escalation token value.
    pub const TOKEN: &str = "token";
}

/// Key→value lookup abstraction for strategy parameters.
///
/// Decouples selection from any specific configuration mechanism: process
/// environment, config files, and secret stores all fit behind this.
pub trait ParamSource {
    /// Resolve a parameter by key. `None` means "not configured".
    fn get(&self, key: &str) -> Option<String>;
}

impl ParamSource for HashMap<String, String> {
    fn get(&self, key: &str) -> Option<String> {
        HashMap::get(self, key).cloned()
    }
}

/// [`ParamSource`] backed by process environment variables.
///
/// Keys are upper-cased and prefixed, e.g. `key_material` resolves through
/// `TIERGATE_KEY_MATERIAL`.
#[derive(Debug, Clone, Default)]
pub struct EnvSource {
    prefix: String,
}

impl EnvSource {
    /// Environment source with the standard `TIERGATE_` prefix.
    #[must_use]
    pub fn new() -> Self {
        Self::with_prefix("TIERGATE")
    }

    /// Environment source with a custom prefix.
    #[must_use]
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl EnvSource {
    fn env_key(&self, key: &str) -> String {
        format!("{}_{}", self.prefix, key.to_uppercase())
    }
}

impl ParamSource for EnvSource {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(self.env_key(key)).ok()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Connection strategy
// ─────────────────────────────────────────────────────────────────────────────

/// How a client authenticates: one of three closed roles.
pub enum ConnectionStrategy {
    /// Plain TLS-less or server-authenticated-only connection; nothing is
    /// presented and nothing is attached.
    Unauthenticated,
    /// Presents a client certificate during the handshake.
    Identified {
        /// Key, leaf chain, and server trust list for this client.
        material: TrustMaterial,
    },
    /// Presents a client certificate and attaches a bearer token per request.
    Privileged {
        /// Key, leaf chain, and server trust list for this client.
        material: TrustMaterial,
        /// Pre-shared escalation token.
        token: String,
    },
}

impl std::fmt::Debug for ConnectionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The token value is deliberately omitted.
        match self {
            Self::Unauthenticated => f.write_str("ConnectionStrategy::Unauthenticated"),
            Self::Identified { material } => f
                .debug_struct("ConnectionStrategy::Identified")
                .field("subject", &material.subject())
                .finish(),
            Self::Privileged { material, .. } => f
                .debug_struct("ConnectionStrategy::Privileged")
                .field("subject", &material.subject())
                .finish_non_exhaustive(),
        }
    }
}

impl ConnectionStrategy {
    /// The tier this strategy can prove, assuming the server accepts it.
    #[must_use]
    pub fn tier(&self) -> TrustTier {
        match self {
            Self::Unauthenticated => TrustTier::Unauthenticated,
            Self::Identified { .. } => TrustTier::Identified,
            Self::Privileged { .. } => TrustTier::Privileged,
        }
    }

    /// Phase one: install transport security on a client builder.
    ///
    /// Invoked once per logical client. A no-op for `Unauthenticated`;
    /// `Identified` and `Privileged` install a preconfigured rustls context
    /// carrying the client certificate and the peer trust list. Never touches
    /// per-request state.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] if the TLS context cannot be built from
    /// the held material.
    pub fn configure(&self, builder: reqwest::ClientBuilder) -> Result<reqwest::ClientBuilder> {
        match self {
            Self::Unauthenticated => Ok(builder),
            Self::Identified { material } | Self::Privileged { material, .. } => {
                let tls = TransportFactory::client_config(material)?;
                debug!(subject = %material.subject(), "Client transport configured");
                Ok(builder.use_preconfigured_tls(tls))
            }
        }
    }

    /// Phase two: decorate one outgoing request with credentials.
    ///
    /// Invoked once per request. A no-op for `Unauthenticated` and
    /// `Identified`; `Privileged` attaches `Authorization: Bearer <token>`.
    #[must_use]
    pub fn decorate(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self {
            Self::Unauthenticated | Self::Identified { .. } => request,
            Self::Privileged { token, .. } => request.bearer_auth(token),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Strategy selection
// ─────────────────────────────────────────────────────────────────────────────

/// Builds a fully configured [`ConnectionStrategy`] from a role name and a
/// parameter source.
pub struct StrategySelector;

impl StrategySelector {
    /// Select and fully configure a strategy for `role`.
    ///
    /// - `identified` requires `key_material`, `cert_material` and
    ///   `trust_material`; `privileged` additionally requires `token`. A
    ///   missing or empty required parameter fails selection with a
    ///   configuration error naming the key — never a silent fallback to a
    ///   lower tier.
    /// - An unrecognized role selects `Unauthenticated`, the explicit
    ///   "no credentials, no claims" default. It can never select a
    ///   partially-configured privileged state.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for missing parameters and
    /// [`Error::Material`] if the referenced material fails to load.
    pub fn select(role: &str, source: &impl ParamSource) -> Result<ConnectionStrategy> {
        match role {
            roles::IDENTIFIED => {
                let material = load_material(roles::IDENTIFIED, source)?;
                Ok(ConnectionStrategy::Identified { material })
            }
            roles::PRIVILEGED => {
                let material = load_material(roles::PRIVILEGED, source)?;
                let token = require_param(roles::PRIVILEGED, params::TOKEN, source)?;
                Ok(ConnectionStrategy::Privileged { material, token })
            }
            roles::UNAUTHENTICATED => Ok(ConnectionStrategy::Unauthenticated),
            other => {
                warn!(role = %other, "Unrecognized role, selecting unauthenticated strategy");
                Ok(ConnectionStrategy::Unauthenticated)
            }
        }
    }
}

/// Resolve a required parameter to a non-empty value or fail closed.
fn require_param(role: &str, key: &str, source: &impl ParamSource) -> Result<String> {
    match source.get(key) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(Error::missing_param(role, key)),
    }
}

fn load_material(role: &str, source: &impl ParamSource) -> Result<TrustMaterial> {
    let key_path = require_param(role, params::KEY_MATERIAL, source)?;
    let cert_path = require_param(role, params::CERT_MATERIAL, source)?;
    let trust_path = require_param(role, params::TRUST_MATERIAL, source)?;
    TrustMaterial::from_files(&key_path, &cert_path, &trust_path)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    use std::fs;

    use rcgen::{
        BasicConstraints, CertificateParams, DistinguishedName, DnType, IsCa, KeyPair,
    };
    use tempfile::TempDir;

    // ── helpers ──────────────────────────────────────────────────────────────

    /// Write a CA + leaf to disk and return param map pointing at the files.
    fn material_params(dir: &TempDir) -> HashMap<String, String> {
        let ca_key = KeyPair::generate().unwrap();
        let mut ca_params = CertificateParams::default();
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, "Strategy Test CA");
        ca_params.distinguished_name = dn;
        ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        let ca_cert = ca_params.self_signed(&ca_key).unwrap();

        let leaf_key = KeyPair::generate().unwrap();
        let mut leaf_params = CertificateParams::default();
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, "strategy-agent");
        leaf_params.distinguished_name = dn;
        let leaf_cert = leaf_params.signed_by(&leaf_key, &ca_cert, &ca_key).unwrap();

        let key_path = dir.path().join("client.key");
        let cert_path = dir.path().join("client.crt");
        let ca_path = dir.path().join("ca.crt");
        fs::write(&key_path, leaf_key.serialize_pem()).unwrap();
        fs::write(&cert_path, leaf_cert.pem()).unwrap();
        fs::write(&ca_path, ca_cert.pem()).unwrap();

        HashMap::from([
            (
                params::KEY_MATERIAL.to_string(),
                key_path.to_string_lossy().into_owned(),
            ),
            (
                params::CERT_MATERIAL.to_string(),
                cert_path.to_string_lossy().into_owned(),
            ),
            (
                params::TRUST_MATERIAL.to_string(),
                ca_path.to_string_lossy().into_owned(),
            ),
        ])
    }

    // ── role selection ───────────────────────────────────────────────────────

    #[test]
    fn unauthenticated_role_needs_no_params() {
        let strategy =
            StrategySelector::select(roles::UNAUTHENTICATED, &HashMap::new()).unwrap();
        assert_eq!(strategy.tier(), TrustTier::Unauthenticated);
    }

    #[test]
    fn unrecognized_role_falls_back_to_unauthenticated() {
        // GIVEN: a role name nobody registered, with privileged params present
        let dir = TempDir::new().unwrap();
        let mut source = material_params(&dir);
        source.insert(params::TOKEN.to_string(), "secret".to_string());
        // WHEN: selecting
        let strategy = StrategySelector::select("superuser", &source).unwrap();
        // THEN: the explicit no-claims default, never the privileged strategy
        assert_eq!(strategy.tier(), TrustTier::Unauthenticated);
    }

    #[test]
    fn identified_role_builds_from_complete_params() {
        let dir = TempDir::new().unwrap();
        let source = material_params(&dir);
        let strategy = StrategySelector::select(roles::IDENTIFIED, &source).unwrap();
        assert_eq!(strategy.tier(), TrustTier::Identified);
        match strategy {
            ConnectionStrategy::Identified { material } => {
                assert_eq!(material.subject(), "strategy-agent");
            }
            other => panic!("expected Identified, got {other:?}"),
        }
    }

    #[test]
    fn privileged_role_builds_from_complete_params() {
        let dir = TempDir::new().unwrap();
        let mut source = material_params(&dir);
        source.insert(params::TOKEN.to_string(), "escalate-me".to_string());
        let strategy = StrategySelector::select(roles::PRIVILEGED, &source).unwrap();
        assert_eq!(strategy.tier(), TrustTier::Privileged);
    }

    // ── fail-closed selection ────────────────────────────────────────────────

    #[test]
    fn identified_role_fails_when_any_param_missing() {
        let dir = TempDir::new().unwrap();
        let complete = material_params(&dir);

        for missing in [
            params::KEY_MATERIAL,
            params::CERT_MATERIAL,
            params::TRUST_MATERIAL,
        ] {
            let mut source = complete.clone();
            source.remove(missing);
            let err = StrategySelector::select(roles::IDENTIFIED, &source).unwrap_err();
            assert!(
                err.to_string().contains(missing),
                "error should name the missing key '{missing}': {err}"
            );
        }
    }

    #[test]
    fn privileged_role_fails_without_token() {
        // GIVEN: complete material params but no token
        let dir = TempDir::new().unwrap();
        let source = material_params(&dir);
        // THEN: no fallback to identified — selection fails
        let err = StrategySelector::select(roles::PRIVILEGED, &source).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains(params::TOKEN));
    }

    #[test]
    fn empty_param_value_counts_as_missing() {
        let dir = TempDir::new().unwrap();
        let mut source = material_params(&dir);
        source.insert(params::TOKEN.to_string(), String::new());
        let err = StrategySelector::select(roles::PRIVILEGED, &source).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn unreadable_material_ref_fails_selection() {
        let mut source = HashMap::new();
        source.insert(params::KEY_MATERIAL.to_string(), "/nope/client.key".to_string());
        source.insert(params::CERT_MATERIAL.to_string(), "/nope/client.crt".to_string());
        source.insert(params::TRUST_MATERIAL.to_string(), "/nope/ca.crt".to_string());
        let err = StrategySelector::select(roles::IDENTIFIED, &source).unwrap_err();
        assert!(matches!(err, Error::Material(_)));
    }

    // ── two-phase contract ───────────────────────────────────────────────────

    #[tokio::test]
    async fn unauthenticated_configure_is_a_no_op() {
        let strategy = ConnectionStrategy::Unauthenticated;
        // Builder passes through; building the client still succeeds.
        let builder = strategy.configure(reqwest::Client::builder()).unwrap();
        assert!(builder.build().is_ok());
    }

    #[tokio::test]
    async fn identified_configure_installs_tls() {
        let dir = TempDir::new().unwrap();
        let source = material_params(&dir);
        let strategy = StrategySelector::select(roles::IDENTIFIED, &source).unwrap();
        let builder = strategy.configure(reqwest::Client::builder()).unwrap();
        assert!(builder.build().is_ok());
    }

    #[tokio::test]
    async fn only_privileged_decorate_attaches_bearer_header() {
        let dir = TempDir::new().unwrap();
        let mut source = material_params(&dir);
        source.insert(params::TOKEN.to_string(), "escalate-me".to_string());

        let client = reqwest::Client::new();

        for (strategy, expect_header) in [
            (ConnectionStrategy::Unauthenticated, false),
            (
                StrategySelector::select(roles::IDENTIFIED, &source).unwrap(),
                false,
            ),
            (
                StrategySelector::select(roles::PRIVILEGED, &source).unwrap(),
                true,
            ),
        ] {
            let request = strategy
                .decorate(client.get("https://gate.invalid/status"))
                .build()
                .unwrap();
            let auth = request.headers().get(reqwest::header::AUTHORIZATION);
            if expect_header {
                assert_eq!(auth.unwrap().to_str().unwrap(), "Bearer escalate-me");
            } else {
                assert!(auth.is_none(), "{strategy:?} must not attach credentials");
            }
        }
    }

    #[tokio::test]
    async fn decorate_is_fresh_per_request() {
        // Two decorated requests from one strategy carry the same independent
        // header value; no state leaks between them.
        let strategy = ConnectionStrategy::Privileged {
            material: {
                let dir = TempDir::new().unwrap();
                let source = material_params(&dir);
                match StrategySelector::select(roles::IDENTIFIED, &source).unwrap() {
                    ConnectionStrategy::Identified { material } => material,
                    _ => unreachable!(),
                }
            },
            token: "tok".to_string(),
        };
        let client = reqwest::Client::new();
        let a = strategy.decorate(client.get("https://gate.invalid/a")).build().unwrap();
        let b = strategy.decorate(client.get("https://gate.invalid/b")).build().unwrap();
        assert_eq!(
            a.headers().get(reqwest::header::AUTHORIZATION),
            b.headers().get(reqwest::header::AUTHORIZATION)
        );
    }

    // ── env source ───────────────────────────────────────────────────────────

    #[test]
    fn env_source_maps_keys_to_prefixed_uppercase() {
        let source = EnvSource::with_prefix("STRATTEST");
        assert_eq!(source.env_key("token"), "STRATTEST_TOKEN");
        assert_eq!(
            EnvSource::new().env_key("key_material"),
            "TIERGATE_KEY_MATERIAL"
        );
        // Nothing exported under this prefix, so lookup misses.
        assert_eq!(source.get("token"), None);
    }
}
