//! Read-only lookups for callers and per-user credentials.
//!
//! The gateway only ever reads from these stores and issues at most one
//! caller lookup per request. The in-memory implementations back the server
//! binary and the tests; a database-backed store only has to implement the
//! two traits.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::credentials::Credentials;
use crate::error::Result;

/// A phone-number principal. At most one record exists per number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    /// E.164 phone number, e.g. `+15005550006`
    pub phone_number: String,
    /// Whether the caller is denied service
    #[serde(default)]
    pub blacklisted: bool,
}

impl Caller {
    pub fn new(phone_number: impl Into<String>) -> Self {
        Self {
            phone_number: phone_number.into(),
            blacklisted: false,
        }
    }

    pub fn blacklisted(phone_number: impl Into<String>) -> Self {
        Self {
            phone_number: phone_number.into(),
            blacklisted: true,
        }
    }
}

impl fmt::Display for Caller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.phone_number)?;
        if self.blacklisted {
            write!(f, " (blacklisted)")?;
        }
        Ok(())
    }
}

/// A named Twilio account credential owned by one application user.
#[derive(Clone, Serialize, Deserialize)]
pub struct Credential {
    pub name: String,
    pub user_id: String,
    pub account_sid: String,
    pub auth_token: String,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("name", &self.name)
            .field("user_id", &self.user_id)
            .field("account_sid", &self.account_sid)
            .field("auth_token", &"[REDACTED]")
            .finish()
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.name, self.account_sid)
    }
}

/// Caller lookup by phone number.
#[async_trait]
pub trait CallerStore: Send + Sync {
    async fn find_by_phone_number(&self, phone_number: &str) -> Result<Option<Caller>>;
}

/// Credential lookup by application user.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_secret_for_user(&self, user_id: &str) -> Result<Option<Credentials>>;
}

// =============================================================================
// In-Memory Stores
// =============================================================================

/// Caller store held in memory, keyed by phone number.
#[derive(Debug, Default)]
pub struct InMemoryCallerStore {
    callers: RwLock<HashMap<String, Caller>>,
}

impl InMemoryCallerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_callers(callers: impl IntoIterator<Item = Caller>) -> Self {
        let store = Self::new();
        for caller in callers {
            store.upsert(caller);
        }
        store
    }

    /// Load a JSON array of callers, e.g.
    /// `[{"phone_number": "+15005550001", "blacklisted": true}]`.
    pub fn from_json(json: &str) -> Result<Self> {
        let callers: Vec<Caller> = serde_json::from_str(json)?;
        Ok(Self::with_callers(callers))
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let store = Self::from_json(&raw)?;
        info!(
            path = %path.display(),
            callers = store.len(),
            "caller_fixtures_loaded"
        );
        Ok(store)
    }

    /// Insert or replace the record for a phone number.
    pub fn upsert(&self, caller: Caller) -> Option<Caller> {
        self.callers
            .write()
            .insert(caller.phone_number.clone(), caller)
    }

    pub fn len(&self) -> usize {
        self.callers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.callers.read().is_empty()
    }
}

#[async_trait]
impl CallerStore for InMemoryCallerStore {
    async fn find_by_phone_number(&self, phone_number: &str) -> Result<Option<Caller>> {
        Ok(self.callers.read().get(phone_number).cloned())
    }
}

/// Credential store held in memory, keyed by user id.
#[derive(Debug, Default)]
pub struct InMemoryCredentialStore {
    credentials: RwLock<HashMap<String, Credential>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, credential: Credential) -> Option<Credential> {
        self.credentials
            .write()
            .insert(credential.user_id.clone(), credential)
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn find_secret_for_user(&self, user_id: &str) -> Result<Option<Credentials>> {
        Ok(self.credentials.read().get(user_id).map(|c| Credentials {
            account_sid: c.account_sid.clone(),
            auth_token: c.auth_token.clone(),
        }))
    }
}
