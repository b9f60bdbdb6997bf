//! Error types for tiergate

use std::io;

use thiserror::Error;

/// Result type alias for tiergate
pub type Result<T> = std::result::Result<T, Error>;

/// Tiergate errors.
///
/// Authorization denials are **not** errors: a request that fails the route
/// tier check yields a structured [`AccessOutcome::Denied`] value. The
/// variants here cover construction and transport failures only.
///
/// [`AccessOutcome::Denied`]: crate::pipeline::AccessOutcome::Denied
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error (missing required parameter, invalid role setup).
    ///
    /// Fatal at startup/selection time — never produces a partially usable
    /// strategy or pipeline.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Key or trust material could not be loaded or parsed.
    #[error("Trust material error: {0}")]
    Material(String),

    /// A subject identity could not be extracted from a client certificate.
    #[error("Identity error: {0}")]
    Identity(String),

    /// TLS context construction failed.
    #[error("Transport error: {0}")]
    Transport(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Create a configuration error for a missing required parameter.
    ///
    /// Selection fails closed: the message names the missing key so operators
    /// can fix the configuration instead of the client silently running at a
    /// lower tier.
    pub fn missing_param(role: &str, key: &str) -> Self {
        Self::Config(format!(
            "role '{role}' requires parameter '{key}' to be set and non-empty"
        ))
    }
}
