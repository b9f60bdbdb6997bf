//! Tiergate — layered trust-tier authentication.
//!
//! Pairs mutual-TLS machine identity with an optional bearer-token privilege
//! escalation:
//!
//! - **client side** — a [`ConnectionStrategy`] configures transport security
//!   once per client and decorates each outgoing request with credentials;
//!   [`StrategySelector`] builds one from a role name and a key→value
//!   parameter source, failing closed on incomplete configuration.
//! - **server side** — the TLS handshake validates the client certificate
//!   against the trusted-issuer set (or refuses the connection before any
//!   application code runs); the [`AccessPipeline`] derives a
//!   [`TrustTier`] from the proven identity, conditionally escalates it via a
//!   constant-time bearer check, and gates each route by its minimum tier.
//!
//! ```text
//! client request
//!   → ConnectionStrategy::configure   (once: TLS context, client cert)
//!   → ConnectionStrategy::decorate    (per request: bearer header)
//!   → TLS handshake                   (server validates client cert or aborts)
//!   → PeerIdentity extraction         (subject from the certificate DN)
//!   → AccessPipeline::evaluate        (tier → escalation → route check)
//!   → handler or structured denial
//! ```
//!
//! [`ConnectionStrategy`]: strategy::ConnectionStrategy
//! [`StrategySelector`]: strategy::StrategySelector
//! [`AccessPipeline`]: pipeline::AccessPipeline
//! [`TrustTier`]: tier::TrustTier

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod identity;
pub mod material;
pub mod middleware;
pub mod pipeline;
pub mod strategy;
pub mod tier;
pub mod transport;

pub use error::{Error, Result};
pub use identity::{PeerIdentity, SubjectAttribute};
pub use material::TrustMaterial;
pub use pipeline::{AccessOutcome, AccessPipeline, DenialReason, RequestAuth, RoutePolicy};
pub use strategy::{ConnectionStrategy, ParamSource, StrategySelector};
pub use tier::{Credential, TrustTier};
pub use transport::TransportFactory;

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        Some("json") => {
            subscriber.with(fmt::layer().json()).init();
        }
        _ => {
            subscriber.with(fmt::layer()).init();
        }
    }

    Ok(())
}
