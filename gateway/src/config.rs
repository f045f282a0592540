//! Configuration module for environment variable parsing.
//!
//! Configuration is read into a plain [`Config`] value and shared through a
//! [`SharedConfig`] handle. The gateway takes a fresh snapshot on every
//! request, so toggling debug mode, forgery protection or the blacklist
//! check at runtime takes effect without re-registering any handler.

use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use axum::http::Method;
use parking_lot::RwLock;
use tracing::warn;

/// Default header carrying the provider signature.
pub const DEFAULT_SIGNATURE_HEADER: &str = "X-Twilio-Signature";

/// Source of environment-style variables.
///
/// The process environment is the production source; tests hand in a map
/// so they never have to mutate global state.
pub trait Environment: Send + Sync {
    fn var(&self, key: &str) -> Option<String>;
}

/// Reads from the real process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl Environment for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        env::var(key).ok()
    }
}

impl Environment for HashMap<String, String> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port for the web server to listen on
    pub port: u16,

    /// Relaxed development mode. Disables forgery protection (and with it
    /// the method restriction) unless `forgery_protection` says otherwise.
    pub debug: bool,

    /// Twilio account SID from host configuration
    pub account_sid: Option<String>,

    /// Twilio auth token from host configuration, last fallback secret
    pub auth_token: Option<String>,

    /// Explicit forgery protection override; `None` means "on unless debug"
    pub forgery_protection: Option<bool>,

    /// Whether blacklisted callers are rejected
    pub blacklist_check: bool,

    /// Methods accepted by handlers that don't configure their own
    pub allowed_methods: Vec<Method>,

    /// Header carrying the request signature
    pub signature_header: String,

    /// Honour X-Forwarded-Host / X-Forwarded-Proto when rebuilding the URL
    pub trust_forwarded_headers: bool,

    /// Optional JSON file used to seed the caller store
    pub caller_fixtures: Option<PathBuf>,

    /// Default `<Say>` voice for the canned views
    pub voice: Option<String>,

    /// Default `<Say>` language for the canned views
    pub language: Option<String>,

    /// Caller ID presented by the canned `<Dial>` view
    pub caller_id: Option<String>,

    /// Status callback URL for messages sent by the canned `<Message>` view
    pub status_callback: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            port: 8080,
            debug: false,
            account_sid: None,
            auth_token: None,
            forgery_protection: None,
            blacklist_check: true,
            allowed_methods: default_methods(),
            signature_header: DEFAULT_SIGNATURE_HEADER.to_string(),
            trust_forwarded_headers: true,
            caller_fixtures: None,
            voice: None,
            language: None,
            caller_id: None,
            status_callback: None,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self::from_environment(&ProcessEnv)
    }

    /// Load configuration from any environment-style source.
    pub fn from_environment(source: &dyn Environment) -> Self {
        let defaults = Config::default();

        Config {
            port: source
                .var("PORT")
                .and_then(|v| match v.parse() {
                    Ok(port) => Some(port),
                    Err(_) => {
                        warn!(env_var = "PORT", value = %v, "Invalid port, using default");
                        None
                    }
                })
                .unwrap_or(defaults.port),

            debug: parse_bool(source, "DEBUG").unwrap_or(defaults.debug),

            account_sid: non_empty(source.var("TWILIO_ACCOUNT_SID")),

            auth_token: non_empty(source.var("TWILIO_AUTH_TOKEN")),

            forgery_protection: parse_bool(source, "TWILIO_FORGERY_PROTECTION"),

            blacklist_check: parse_bool(source, "TWILIO_BLACKLIST_CHECK")
                .unwrap_or(defaults.blacklist_check),

            allowed_methods: parse_methods(source, "TWILIO_ALLOWED_METHODS")
                .unwrap_or(defaults.allowed_methods),

            signature_header: non_empty(source.var("TWILIO_SIGNATURE_HEADER"))
                .unwrap_or(defaults.signature_header),

            trust_forwarded_headers: parse_bool(source, "TWILIO_TRUST_FORWARDED_HEADERS")
                .unwrap_or(defaults.trust_forwarded_headers),

            caller_fixtures: non_empty(source.var("TWILIO_CALLER_FIXTURES")).map(PathBuf::from),

            voice: non_empty(source.var("TWILIO_VOICE")),

            language: non_empty(source.var("TWILIO_LANGUAGE")),

            caller_id: non_empty(source.var("TWILIO_CALLER_ID")),

            status_callback: non_empty(source.var("TWILIO_STATUS_CALLBACK")),
        }
    }

    /// Whether signature verification (and the method check) is enforced.
    pub fn forgery_protection_enabled(&self) -> bool {
        self.forgery_protection.unwrap_or(!self.debug)
    }
}

fn default_methods() -> Vec<Method> {
    vec![Method::GET, Method::POST]
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse a boolean flag such as "true", "0" or "off".
fn parse_bool(source: &dyn Environment, name: &str) -> Option<bool> {
    let raw = source.var(name)?;

    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => {
            warn!(env_var = name, value = %raw, "Invalid boolean, using default");
            None
        }
    }
}

/// Parse a comma-separated list of HTTP methods.
fn parse_methods(source: &dyn Environment, name: &str) -> Option<Vec<Method>> {
    let raw = parse_csv(source, name)?;

    let mut methods = Vec::with_capacity(raw.len());
    for item in &raw {
        match Method::from_bytes(item.to_ascii_uppercase().as_bytes()) {
            Ok(method) if !methods.contains(&method) => methods.push(method),
            Ok(_) => {}
            Err(_) => warn!(env_var = name, value = %item, "Invalid HTTP method, skipping"),
        }
    }

    if methods.is_empty() {
        warn!(env_var = name, "No valid methods configured, using default");
        return None;
    }

    Some(methods)
}

/// Parse a comma-separated list of strings.
fn parse_csv(source: &dyn Environment, name: &str) -> Option<Vec<String>> {
    source.var(name).map(|raw| {
        raw.split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    })
}

// =============================================================================
// Shared Configuration
// =============================================================================

/// Cloneable handle to the live configuration.
#[derive(Debug, Clone)]
pub struct SharedConfig {
    inner: Arc<RwLock<Arc<Config>>>,
}

impl SharedConfig {
    pub fn new(config: Config) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(config))),
        }
    }

    /// The configuration as of right now.
    pub fn snapshot(&self) -> Arc<Config> {
        self.inner.read().clone()
    }

    /// Swap in a new configuration, returning the previous one.
    pub fn replace(&self, config: Config) -> Arc<Config> {
        std::mem::replace(&mut *self.inner.write(), Arc::new(config))
    }

    /// Edit the configuration in place.
    pub fn update(&self, edit: impl FnOnce(&mut Config)) {
        let mut guard = self.inner.write();
        let mut next = Config::clone(&guard);
        edit(&mut next);
        *guard = Arc::new(next);
    }

    /// Apply a temporary edit that is rolled back when the guard drops.
    ///
    /// Guards must be dropped in reverse order of creation.
    pub fn override_with(&self, edit: impl FnOnce(&mut Config)) -> ConfigOverride {
        let previous = self.snapshot();
        self.update(edit);
        ConfigOverride {
            shared: self.clone(),
            previous: Some(previous),
        }
    }
}

impl Default for SharedConfig {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl From<Config> for SharedConfig {
    fn from(config: Config) -> Self {
        Self::new(config)
    }
}

/// Restores the configuration captured by [`SharedConfig::override_with`].
#[must_use = "the override is reverted as soon as the guard is dropped"]
pub struct ConfigOverride {
    shared: SharedConfig,
    previous: Option<Arc<Config>>,
}

impl Drop for ConfigOverride {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            *self.shared.inner.write() = previous;
        }
    }
}
