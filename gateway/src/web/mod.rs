//! axum integration for the webhook gateway.
//!
//! This module provides:
//! - A [`WebhookRequest`](crate::request::WebhookRequest) extractor
//! - The server's router: health check plus canned TwiML views
//!
//! Route handlers stay thin; all checks happen in the gateway.

pub mod extract;
pub mod routes;

pub use extract::{AuthenticatedUser, MAX_BODY_BYTES};
pub use routes::{health, router, AppState, HealthResponse, ViewDefaults};
