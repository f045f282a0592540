//! Twilio credential discovery.
//!
//! The auth token that keys the webhook signature can come from several
//! places. They are tried in order:
//!
//! 1. an explicit per-handler override
//! 2. the `TWILIO_ACCOUNT_SID` / `TWILIO_AUTH_TOKEN` environment pair
//! 3. the credential linked to the request's application user
//! 4. host configuration

use std::fmt;

use tracing::{debug, warn};

use crate::config::{Config, Environment};
use crate::error::{GatewayError, Result};
use crate::store::CredentialStore;

pub const ACCOUNT_SID_VAR: &str = "TWILIO_ACCOUNT_SID";
pub const AUTH_TOKEN_VAR: &str = "TWILIO_AUTH_TOKEN";

/// An account SID and auth token pair.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub account_sid: String,
    pub auth_token: String,
}

impl Credentials {
    pub fn new(account_sid: impl Into<String>, auth_token: impl Into<String>) -> Self {
        Self {
            account_sid: account_sid.into(),
            auth_token: auth_token.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("account_sid", &self.account_sid)
            .field("auth_token", &"[REDACTED]")
            .finish()
    }
}

/// Everything credential discovery may consult.
pub struct CredentialSources<'a> {
    pub explicit: Option<&'a Credentials>,
    pub env: &'a dyn Environment,
    pub user: Option<&'a str>,
    pub store: &'a dyn CredentialStore,
    pub config: &'a Config,
}

/// Find the credentials to verify a request with.
pub async fn discover_credentials(sources: CredentialSources<'_>) -> Result<Credentials> {
    if let Some(explicit) = sources.explicit.filter(|c| !c.auth_token.is_empty()) {
        debug!(source = "explicit", "twilio_credentials_discovered");
        return Ok(explicit.clone());
    }

    let env_sid = sources.env.var(ACCOUNT_SID_VAR).filter(|v| !v.is_empty());
    let env_token = sources.env.var(AUTH_TOKEN_VAR).filter(|v| !v.is_empty());
    if let (Some(account_sid), Some(auth_token)) = (env_sid, env_token) {
        debug!(source = "environment", "twilio_credentials_discovered");
        return Ok(Credentials {
            account_sid,
            auth_token,
        });
    }

    if let Some(user) = sources.user {
        match sources.store.find_secret_for_user(user).await {
            Ok(Some(credentials)) if !credentials.auth_token.is_empty() => {
                debug!(source = "user_credential", user = %user, "twilio_credentials_discovered");
                return Ok(credentials);
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, user = %user, "twilio_credential_lookup_failed"),
        }
    }

    if let Some(auth_token) = sources.config.auth_token.as_ref().filter(|t| !t.is_empty()) {
        debug!(source = "config", "twilio_credentials_discovered");
        return Ok(Credentials {
            account_sid: sources.config.account_sid.clone().unwrap_or_default(),
            auth_token: auth_token.clone(),
        });
    }

    Err(GatewayError::MissingCredentials)
}
