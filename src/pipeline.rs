//! Server-side access pipeline — tier assignment, escalation, route gating.
//!
//! Evaluation order per request:
//!
//! 1. the transport-proven identity (the handshake already validated the
//!    client certificate, or the connection never got here) assigns
//!    [`TrustTier::Identified`];
//! 2. a bearer token matching the server-held secret escalates to
//!    [`TrustTier::Privileged`]; a present-but-wrong token leaves the state at
//!    `Identified` — escalation attempts never downgrade a transport-proven
//!    identity;
//! 3. the route's minimum tier is compared against the current tier.
//!
//! Per-request state is an immutable [`RequestAuth`] value threaded through
//! the stages; each stage returns a new value. The outcome for a given
//! (identity, bearer, route) triple is pure and repeatable — no state
//! persists across requests.
//!
//! If **no route entry matches** the request path the outcome is
//! [`Denied`](AccessOutcome::Denied) (fail-closed): the policy is total and
//! explicit, and there is no implicit default that grants access.

use std::collections::HashMap;
use std::fmt;

use subtle::ConstantTimeEq;
use tracing::{debug, warn};

use crate::identity::PeerIdentity;
use crate::tier::TrustTier;

// ─────────────────────────────────────────────────────────────────────────────
// Per-request state
// ─────────────────────────────────────────────────────────────────────────────

/// Immutable per-request authentication state.
///
/// The tier is monotonically non-decreasing: constructors and transitions can
/// only raise it, never lower it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestAuth {
    tier: TrustTier,
    subject: Option<String>,
}

impl RequestAuth {
    /// Initial state: nothing proven.
    #[must_use]
    pub fn anonymous() -> Self {
        Self {
            tier: TrustTier::Unauthenticated,
            subject: None,
        }
    }

    /// State after a successful mTLS handshake identity extraction.
    #[must_use]
    pub fn identified(subject: impl Into<String>) -> Self {
        Self {
            tier: TrustTier::Identified,
            subject: Some(subject.into()),
        }
    }

    /// Raise an identified state to privileged. Identity is preserved.
    ///
    /// Only an `Identified` state can escalate; anything else is returned
    /// unchanged (there is no path from `Unauthenticated` straight to
    /// `Privileged`, and `Privileged` is already at the top).
    #[must_use]
    fn escalated(self) -> Self {
        match self.tier {
            TrustTier::Identified => Self {
                tier: TrustTier::Privileged,
                subject: self.subject,
            },
            _ => self,
        }
    }

    /// The tier proven so far.
    #[must_use]
    pub fn tier(&self) -> TrustTier {
        self.tier
    }

    /// The certificate subject, once identified.
    #[must_use]
    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Outcome types
// ─────────────────────────────────────────────────────────────────────────────

/// Terminal outcome of evaluating one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessOutcome {
    /// The request may proceed to its handler.
    Allowed(RequestAuth),
    /// The request is refused; the connection stays usable.
    Denied(DenialReason),
}

impl AccessOutcome {
    /// Whether this outcome permits the request.
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed(_))
    }
}

/// Why a request was denied.
///
/// Denials are structured and user-visible, distinct from transport-level
/// handshake rejections (which close the connection before any outcome
/// exists).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenialReason {
    /// Identity established but the route requires a higher tier.
    InsufficientTier {
        /// The route's minimum tier.
        required: TrustTier,
        /// The tier the request proved.
        granted: TrustTier,
    },
    /// The route has no policy entry. Fail-closed.
    UnknownRoute(String),
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InsufficientTier { required, granted } => write!(
                f,
                "insufficient tier: route requires '{required}', request proved '{granted}'"
            ),
            Self::UnknownRoute(route) => {
                write!(f, "no policy entry for route '{route}'")
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Route policy
// ─────────────────────────────────────────────────────────────────────────────

/// Total, explicit mapping from route identifier to minimum required tier.
///
/// Immutable after construction. A policy update means building a new
/// `RoutePolicy` and atomically swapping the reference (e.g. behind
/// `arc_swap`-style ownership in the embedding application), never in-place
/// mutation visible to in-flight requests.
#[derive(Debug, Clone, Default)]
pub struct RoutePolicy {
    routes: HashMap<String, TrustTier>,
}

impl RoutePolicy {
    /// Build a policy from explicit (route, minimum tier) entries.
    #[must_use]
    pub fn new(entries: impl IntoIterator<Item = (String, TrustTier)>) -> Self {
        Self {
            routes: entries.into_iter().collect(),
        }
    }

    /// Minimum tier for a route, or `None` for an unlisted route.
    #[must_use]
    pub fn required_tier(&self, route: &str) -> Option<TrustTier> {
        self.routes.get(route).copied()
    }

    /// Number of configured routes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Whether the policy lists no routes (everything denied).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Access pipeline
// ─────────────────────────────────────────────────────────────────────────────

/// Per-request ordered evaluation: tier assignment, escalation, route gating.
///
/// Build once at startup; share read-only across connections. Holds the
/// server-side escalation secret (pre-shared, opaque) and the route policy.
#[derive(Debug, Clone)]
pub struct AccessPipeline {
    escalation_secret: Option<String>,
    policy: RoutePolicy,
}

impl AccessPipeline {
    /// Assemble a pipeline from an optional escalation secret and a policy.
    ///
    /// With no secret configured, escalation is disabled and no request can
    /// reach `Privileged`.
    #[must_use]
    pub fn new(escalation_secret: Option<String>, policy: RoutePolicy) -> Self {
        Self {
            escalation_secret,
            policy,
        }
    }

    /// Evaluate one request.
    ///
    /// `identity` is the transport-proven peer identity — it exists only for
    /// connections whose handshake validated a trusted client certificate.
    /// `bearer` is the raw token from the escalation header, if any.
    pub fn evaluate(
        &self,
        identity: &PeerIdentity,
        bearer: Option<&str>,
        route: &str,
    ) -> AccessOutcome {
        let auth = RequestAuth::identified(&identity.subject);
        let auth = self.try_escalate(auth, bearer);

        let Some(required) = self.policy.required_tier(route) else {
            warn!(route = %route, subject = %identity.subject, "No policy entry for route");
            return AccessOutcome::Denied(DenialReason::UnknownRoute(route.to_string()));
        };

        if auth.tier().satisfies(required) {
            debug!(
                route = %route,
                subject = %identity.subject,
                tier = %auth.tier(),
                "Request allowed"
            );
            AccessOutcome::Allowed(auth)
        } else {
            debug!(
                route = %route,
                subject = %identity.subject,
                required = %required,
                granted = %auth.tier(),
                "Request denied: insufficient tier"
            );
            AccessOutcome::Denied(DenialReason::InsufficientTier {
                required,
                granted: auth.tier(),
            })
        }
    }

    /// Attempt bearer escalation. A wrong or absent token leaves the state
    /// unchanged; the comparison is constant-time.
    fn try_escalate(&self, auth: RequestAuth, bearer: Option<&str>) -> RequestAuth {
        let (Some(secret), Some(presented)) = (self.escalation_secret.as_deref(), bearer) else {
            return auth;
        };

        let matches: bool = presented.as_bytes().ct_eq(secret.as_bytes()).into();
        if matches {
            auth.escalated()
        } else {
            warn!(subject = ?auth.subject(), "Escalation attempt with invalid token");
            auth
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
