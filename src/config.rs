//! Server-side configuration types.
//!
//! YAML-deserialisable configuration for the gate: material paths, subject
//! extraction, escalation secret, and the route policy. An invalid
//! configuration fails startup — there is no degraded pipeline.
//!
//! # Example YAML
//!
//! ```yaml
//! server_cert: "/etc/tiergate/tls/server.crt"
//! server_key:  "/etc/tiergate/tls/server.key"
//! ca_cert:     "/etc/tiergate/tls/ca.crt"
//! subject_attribute: common_name
//! escalation_token: "${ESCALATION_TOKEN}"
//! routes:
//!   /status: unauthenticated
//!   /ingest: identified
//!   /admin:  privileged
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::identity::SubjectAttribute;
use crate::material::TrustMaterial;
use crate::pipeline::{AccessPipeline, RoutePolicy};
use crate::tier::TrustTier;
use crate::Result;

/// Top-level server authentication configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ServerAuthConfig {
    /// Path to the PEM-encoded server certificate file.
    pub server_cert: String,

    /// Path to the PEM-encoded server private key file.
    pub server_key: String,

    /// Path to the PEM-encoded CA set used to verify client certificates.
    pub ca_cert: String,

    /// Which DN attribute carries the client subject identifier.
    pub subject_attribute: SubjectAttribute,

    /// Server-held secret for bearer escalation. `None` disables escalation
    /// entirely; provisioning and rotation belong to the secret-management
    /// collaborator.
    pub escalation_token: Option<String>,

    /// Route identifier → minimum required tier. Total and explicit: a route
    /// absent from this map is denied.
    pub routes: HashMap<String, TrustTier>,
}

impl ServerAuthConfig {
    /// Load the server trust material referenced by this config.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Material`] if any referenced file is missing
    /// or malformed.
    pub fn load_material(&self) -> Result<TrustMaterial> {
        TrustMaterial::from_files(&self.server_key, &self.server_cert, &self.ca_cert)
    }

    /// Build the access pipeline described by this config.
    #[must_use]
    pub fn build_pipeline(&self) -> AccessPipeline {
        let policy = RoutePolicy::new(
            self.routes
                .iter()
                .map(|(route, tier)| (route.clone(), *tier)),
        );
        AccessPipeline::new(self.escalation_token.clone(), policy)
    }
}
