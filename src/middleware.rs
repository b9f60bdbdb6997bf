//! Axum middleware for the access pipeline.
//!
//! The connection layer (the TLS accept loop) inserts the handshake-proven
//! [`PeerIdentity`] into request extensions; this middleware reads it, pulls
//! the bearer token from the `Authorization` header, evaluates the
//! [`AccessPipeline`] for the request path, and either forwards the request
//! (with [`RequestAuth`] injected for handlers) or refuses it.
//!
//! Failure classes are kept distinguishable, matching the error taxonomy:
//!
//! - handshake rejection never reaches this code (the connection is closed at
//!   the transport layer);
//! - a missing identity extension answers **401** — "no identity at all",
//!   only possible when the acceptor glue is miswired;
//! - an insufficient tier answers **403** — "identity established but
//!   insufficient privilege" — with a structured body naming required and
//!   granted tiers. The connection stays usable for further requests.

use std::sync::Arc;

use axum::{
    Json,
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::{debug, warn};

use crate::identity::PeerIdentity;
use crate::pipeline::{AccessOutcome, AccessPipeline, DenialReason, RequestAuth};
use crate::tier::Credential;

/// Access-control middleware.
///
/// Layer it over the routes the pipeline gates:
///
/// ```ignore
/// Router::new()
///     .route("/admin", post(admin_handler))
///     .layer(middleware::from_fn_with_state(pipeline.clone(), access_middleware))
/// ```
pub async fn access_middleware(
    State(pipeline): State<Arc<AccessPipeline>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let path = request.uri().path().to_owned();

    // Identity comes from the TLS layer, not from anything the request says.
    let Some(identity) = request.extensions().get::<PeerIdentity>().cloned() else {
        warn!(path = %path, "Request reached access middleware without a peer identity");
        return no_identity_response();
    };

    let credential = request
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map_or(Credential::None, Credential::from_authorization_header);

    match pipeline.evaluate(&identity, credential.bearer_value(), &path) {
        AccessOutcome::Allowed(auth) => {
            debug!(path = %path, subject = ?auth.subject(), tier = %auth.tier(), "Access granted");
            request.extensions_mut().insert::<RequestAuth>(auth);
            next.run(request).await
        }
        AccessOutcome::Denied(reason) => {
            warn!(path = %path, subject = %identity.subject, %reason, "Access denied");
            denied_response(&reason)
        }
    }
}

/// 401: no identity at all (acceptor glue did not inject one).
fn no_identity_response() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({
            "error": "no_identity",
            "message": "No client certificate identity associated with this request"
        })),
    )
        .into_response()
}

/// 403: identity established but the route requirement is not met.
fn denied_response(reason: &DenialReason) -> Response {
    let body = match reason {
        DenialReason::InsufficientTier { required, granted } => json!({
            "error": "insufficient_tier",
            "message": reason.to_string(),
            "required": required,
            "granted": granted,
        }),
        DenialReason::UnknownRoute(route) => json!({
            "error": "unknown_route",
            "message": reason.to_string(),
            "route": route,
        }),
    };
    (StatusCode::FORBIDDEN, Json(body)).into_response()
}
