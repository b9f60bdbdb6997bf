//! Trust tiers and request credentials.
//!
//! A request's privilege level is one of three ordered tiers:
//!
//! ```text
//! Unauthenticated < Identified < Privileged
//! ```
//!
//! The ordering is what route gating compares against: a route requiring
//! [`TrustTier::Identified`] admits both `Identified` and `Privileged`
//! requests. Pipeline stages only ever *raise* a request's tier — identity
//! extraction raises `Unauthenticated` to `Identified`, a successful
//! escalation raises `Identified` to `Privileged`, and nothing lowers it.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Ordered classification of a request's proven privilege level.
///
/// The derived `Ord` follows declaration order, which is the tier ordering
/// used for route requirement checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrustTier {
    /// No proven identity. The "no credentials, no claims" tier.
    Unauthenticated,
    /// A trusted client certificate was validated during the TLS handshake.
    Identified,
    /// Identity established *and* the secondary bearer credential matched.
    Privileged,
}

impl TrustTier {
    /// Whether this tier satisfies a route's minimum requirement.
    #[must_use]
    pub fn satisfies(self, required: TrustTier) -> bool {
        self >= required
    }
}

impl fmt::Display for TrustTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unauthenticated => "unauthenticated",
            Self::Identified => "identified",
            Self::Privileged => "privileged",
        };
        f.write_str(name)
    }
}

/// A credential carried by (or derived for) a request.
///
/// A request carries at most one `CertificateIdentity` (derived from the TLS
/// layer, not attacker-controlled) and at most one `BearerToken`
/// (attacker-controlled; must be compared against the server-held secret in
/// constant time).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    /// No credential presented.
    None,
    /// Subject extracted from a handshake-validated client certificate.
    CertificateIdentity {
        /// Subject identifier from the certificate DN.
        subject: String,
    },
    /// Opaque pre-shared secret presented in a request header.
    BearerToken {
        /// The presented token value.
        value: String,
    },
}

impl Credential {
    /// Parse an `Authorization` header value into a credential.
    ///
    /// `Bearer <token>` (scheme matched case-insensitively the way servers
    /// commonly accept it) yields [`Credential::BearerToken`]; any other
    /// scheme — or a bare value — is [`Credential::None`]: an absent or
    /// unrecognized header means no escalation was attempted.
    #[must_use]
    pub fn from_authorization_header(value: &str) -> Self {
        match value
            .strip_prefix("Bearer ")
            .or_else(|| value.strip_prefix("bearer "))
        {
            Some(token) => Self::BearerToken {
                value: token.to_owned(),
            },
            None => Self::None,
        }
    }

    /// The bearer token value, if this credential carries one.
    #[must_use]
    pub fn bearer_value(&self) -> Option<&str> {
        match self {
            Self::BearerToken { value } => Some(value),
            _ => None,
        }
    }
}

impl From<&crate::identity::PeerIdentity> for Credential {
    /// The transport-derived credential for a handshake-proven identity.
    fn from(identity: &crate::identity::PeerIdentity) -> Self {
        Self::CertificateIdentity {
            subject: identity.subject.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiers_are_totally_ordered() {
        assert!(TrustTier::Unauthenticated < TrustTier::Identified);
        assert!(TrustTier::Identified < TrustTier::Privileged);
        assert!(TrustTier::Unauthenticated < TrustTier::Privileged);
    }

    #[test]
    fn satisfies_is_reflexive() {
        for tier in [
            TrustTier::Unauthenticated,
            TrustTier::Identified,
            TrustTier::Privileged,
        ] {
            assert!(tier.satisfies(tier));
        }
    }

    #[test]
    fn higher_tier_satisfies_lower_requirement() {
        assert!(TrustTier::Privileged.satisfies(TrustTier::Identified));
        assert!(TrustTier::Privileged.satisfies(TrustTier::Unauthenticated));
        assert!(TrustTier::Identified.satisfies(TrustTier::Unauthenticated));
    }

    #[test]
    fn lower_tier_does_not_satisfy_higher_requirement() {
        assert!(!TrustTier::Identified.satisfies(TrustTier::Privileged));
        assert!(!TrustTier::Unauthenticated.satisfies(TrustTier::Identified));
    }

    #[test]
    fn tier_serde_round_trips_as_lowercase() {
        let yaml = serde_yaml::to_string(&TrustTier::Privileged).unwrap();
        assert_eq!(yaml.trim(), "privileged");
        let tier: TrustTier = serde_yaml::from_str("identified").unwrap();
        assert_eq!(tier, TrustTier::Identified);
    }

    #[test]
    fn bearer_header_parses_to_bearer_token() {
        let cred = Credential::from_authorization_header("Bearer tok-123");
        assert_eq!(
            cred,
            Credential::BearerToken {
                value: "tok-123".to_string()
            }
        );
        assert_eq!(cred.bearer_value(), Some("tok-123"));
    }

    #[test]
    fn lowercase_bearer_scheme_is_accepted() {
        let cred = Credential::from_authorization_header("bearer tok");
        assert_eq!(cred.bearer_value(), Some("tok"));
    }

    #[test]
    fn non_bearer_schemes_carry_no_escalation() {
        for value in ["Basic dXNlcjpwYXNz", "tok-without-scheme", ""] {
            let cred = Credential::from_authorization_header(value);
            assert_eq!(cred, Credential::None, "value {value:?}");
            assert_eq!(cred.bearer_value(), None);
        }
    }

    #[test]
    fn certificate_credential_carries_the_subject() {
        let identity = crate::identity::PeerIdentity {
            subject: "agent".to_string(),
            common_name: Some("agent".to_string()),
            organizational_unit: None,
        };
        assert_eq!(
            Credential::from(&identity),
            Credential::CertificateIdentity {
                subject: "agent".to_string()
            }
        );
    }

    #[test]
    fn display_matches_serde_names() {
        assert_eq!(TrustTier::Unauthenticated.to_string(), "unauthenticated");
        assert_eq!(TrustTier::Identified.to_string(), "identified");
        assert_eq!(TrustTier::Privileged.to_string(), "privileged");
    }
}
