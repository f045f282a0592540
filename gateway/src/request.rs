//! Inbound webhook requests and their normalized form.
//!
//! [`WebhookRequest`] is the framework-neutral record of what arrived over
//! HTTP. [`decompose`] flattens its parameter bag into a
//! [`NormalizedWebhookRequest`] with predictable, lower-cased field names and
//! classifies it as a voice call, a message, or unknown.

use std::collections::BTreeMap;
use std::fmt;

use axum::http::{HeaderMap, Method, Uri};
use serde::Serialize;
use url::form_urlencoded;

use crate::error::{GatewayError, Result};

/// Flattened, single-valued request parameters.
pub type Params = BTreeMap<String, String>;

/// Twilio's caller field, matched case-sensitively.
pub const CALLER_FIELD: &str = "From";

/// Normalized name for the caller field; `from` is reserved in many languages.
pub const FROM_KEY: &str = "from_";

const CALL_ID_FIELD: &str = "callsid";
const MESSAGE_ID_FIELD: &str = "messagesid";

// =============================================================================
// Inbound Request
// =============================================================================

/// An inbound webhook request as seen by the gateway.
#[derive(Debug, Clone)]
pub struct WebhookRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    /// Query string parameters
    pub query: Params,
    /// Form-encoded body parameters (POST only)
    pub form: Params,
    /// Application user the request is bound to, if the host authenticated one.
    /// Used to look up a per-user credential.
    pub user: Option<String>,
}

impl WebhookRequest {
    /// Build a request from its raw parts. The body is only parsed for POST.
    pub fn new(method: Method, uri: Uri, headers: HeaderMap, body: &[u8]) -> Self {
        let query = uri
            .query()
            .map(|q| parse_params(q.as_bytes()))
            .unwrap_or_default();

        let form = if method == Method::POST {
            parse_params(body)
        } else {
            Params::new()
        };

        Self {
            method,
            uri,
            headers,
            query,
            form,
            user: None,
        }
    }

    /// Bind the request to an application user.
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// The parameter set Twilio signed: GET parameters for GET, POST
    /// parameters for POST, nothing for any other method.
    pub fn params(&self) -> Option<&Params> {
        match self.method {
            Method::GET => Some(&self.query),
            Method::POST => Some(&self.form),
            _ => None,
        }
    }

    /// A header value as a string, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Reconstruct the URL the provider requested.
    ///
    /// Behind a reverse proxy the scheme and host seen here are not the ones
    /// Twilio signed, so `X-Forwarded-Proto` and `X-Forwarded-Host` win when
    /// `trust_forwarded` is set. Those headers carry no signature of their
    /// own; only trust them when a proxy you control sets them.
    pub fn absolute_url(&self, trust_forwarded: bool) -> String {
        let forwarded = |name: &str| {
            if trust_forwarded {
                self.header(name).and_then(first_list_item)
            } else {
                None
            }
        };

        let scheme = forwarded("x-forwarded-proto")
            .or_else(|| self.uri.scheme_str())
            .unwrap_or("http");

        let host = forwarded("x-forwarded-host")
            .or_else(|| self.header("host"))
            .or_else(|| self.uri.authority().map(|a| a.as_str()))
            .unwrap_or("localhost");

        let path_and_query = self
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");

        format!("{}://{}{}", scheme, host, path_and_query)
    }
}

/// Proxies may append to forwarded headers; the first entry is the client-facing one.
fn first_list_item(value: &str) -> Option<&str> {
    value
        .split(',')
        .next()
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Parse a urlencoded parameter string. Repeated keys keep their first value.
pub fn parse_params(raw: &[u8]) -> Params {
    let mut params = Params::new();
    for (key, value) in form_urlencoded::parse(raw) {
        params
            .entry(key.into_owned())
            .or_insert_with(|| value.into_owned());
    }
    params
}

// =============================================================================
// Normalized Request
// =============================================================================

/// What kind of Twilio event a request describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestKind {
    Voice,
    Message,
    Unknown,
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestKind::Voice => write!(f, "voice"),
            RequestKind::Message => write!(f, "message"),
            RequestKind::Unknown => write!(f, "unknown"),
        }
    }
}

/// Twilio parameters keyed by lower-cased name, with `From` stored as `from_`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NormalizedWebhookRequest {
    fields: BTreeMap<String, String>,
}

impl NormalizedWebhookRequest {
    pub fn from_params<'a, I>(params: I) -> Self
    where
        I: IntoIterator<Item = (&'a String, &'a String)>,
    {
        let fields = params
            .into_iter()
            .map(|(key, value)| {
                let name = if key == CALLER_FIELD {
                    FROM_KEY.to_string()
                } else {
                    key.to_lowercase()
                };
                (name, value.clone())
            })
            .collect();

        Self { fields }
    }

    /// Look up a normalized field.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    /// The caller's phone number.
    pub fn from_(&self) -> Option<&str> {
        self.get(FROM_KEY)
    }

    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }

    /// Voice if a call SID is present, else message if a message SID is
    /// present, else unknown. Empty values count as absent.
    pub fn kind(&self) -> RequestKind {
        let present = |name: &str| self.get(name).map(|v| !v.is_empty()).unwrap_or(false);

        if present(CALL_ID_FIELD) {
            RequestKind::Voice
        } else if present(MESSAGE_ID_FIELD) {
            RequestKind::Message
        } else {
            RequestKind::Unknown
        }
    }
}

/// Collect the Twilio parameters of a GET or POST request.
///
/// Any other method is not a webhook transport Twilio uses and is reported
/// as [`GatewayError::UnsupportedTransport`].
pub fn decompose(request: &WebhookRequest) -> Result<NormalizedWebhookRequest> {
    match request.params() {
        Some(params) => Ok(NormalizedWebhookRequest::from_params(params)),
        None => Err(GatewayError::UnsupportedTransport {
            method: request.method.clone(),
        }),
    }
}
