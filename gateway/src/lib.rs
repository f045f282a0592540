//! Twilio Gateway - authenticated, normalized Twilio webhooks.
//!
//! This library sits between Twilio and your webhook handlers:
//! - Verifies the `X-Twilio-Signature` HMAC so forged requests get a 403
//! - Restricts handler methods (405) while forgery protection is on
//! - Rejects blacklisted callers before the handler runs
//! - Turns strings, bytes and TwiML builders into `application/xml` responses
//!
//! ## Request Flow
//!
//! ```text
//! Twilio → WebhookRequest → AccessPolicy → handler → HandlerReply → Response
//! ```

pub mod config;
pub mod credentials;
pub mod error;
pub mod gateway;
pub mod policy;
pub mod request;
pub mod response;
pub mod signature;
pub mod store;
pub mod twiml;
pub mod views;
pub mod web;

// Re-export commonly used types
pub use config::{Config, SharedConfig};
pub use credentials::Credentials;
pub use error::{GatewayError, Result};
pub use gateway::{CsrfExempt, WebhookController, WebhookGateway};
pub use policy::{AccessDecision, DenyReason, HandlerOptions, HttpOutcome};
pub use request::{decompose, NormalizedWebhookRequest, RequestKind, WebhookRequest};
pub use response::{HandlerReply, XML_CONTENT_TYPE};
pub use store::{Caller, CallerStore, CredentialStore, InMemoryCallerStore};
pub use web::AppState;
