//! Error types shared across the gateway.
//!
//! Authentication failures and method rejections are not errors here: they
//! are access decisions that become 403/405 responses. What remains are
//! programmer errors, collaborator failures and startup problems.

use axum::http::Method;
use thiserror::Error;

/// Errors produced by the gateway library.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The request is not one of the recognized inbound webhook shapes.
    #[error("unsupported webhook transport: {method} requests carry no Twilio parameters")]
    UnsupportedTransport { method: Method },

    /// No auth token could be found in any credential source.
    #[error("no Twilio credentials could be discovered")]
    MissingCredentials,

    /// The HMAC key could not be initialised.
    #[error("invalid signing key")]
    InvalidSigningKey,

    /// A caller or credential lookup failed.
    #[error("store lookup failed: {0}")]
    Store(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, GatewayError>;
