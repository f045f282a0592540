//! Access policy applied before a webhook handler runs.
//!
//! Checks run cheapest first and stop at the first denial:
//!
//! ```text
//! method check → forgery check → blacklist check → allow
//! ```
//!
//! The method check is only enforced while forgery protection is active, so
//! relaxed development setups accept any method. The blacklist check fails
//! open: a lookup error never blocks a caller.

use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use tracing::{info, warn};

use crate::config::{Config, Environment};
use crate::credentials::{discover_credentials, CredentialSources, Credentials};
use crate::request::{decompose, Params, RequestKind, WebhookRequest, CALLER_FIELD};
use crate::response::XML_CONTENT_TYPE;
use crate::signature;
use crate::store::{CallerStore, CredentialStore};
use crate::twiml::{Markup, MessagingResponse, VoiceResponse};

/// Per-handler settings. Unset values fall back to the live [`Config`].
#[derive(Debug, Clone, Default)]
pub struct HandlerOptions {
    pub allowed_methods: Option<Vec<Method>>,
    pub forgery_protection: Option<bool>,
    pub blacklist_check: Option<bool>,
    /// Credentials that take precedence over every other source
    pub credentials: Option<Credentials>,
}

impl HandlerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn methods(mut self, methods: impl IntoIterator<Item = Method>) -> Self {
        self.allowed_methods = Some(methods.into_iter().collect());
        self
    }

    pub fn forgery_protection(mut self, enabled: bool) -> Self {
        self.forgery_protection = Some(enabled);
        self
    }

    pub fn blacklist_check(mut self, enabled: bool) -> Self {
        self.blacklist_check = Some(enabled);
        self
    }

    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }
}

// =============================================================================
// Decisions
// =============================================================================

/// Why a request was turned away.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenyReason {
    MethodNotAllowed(Method),
    MissingCredentials,
    MissingSignature,
    InvalidSignature,
    Blacklisted(RequestKind),
}

/// The HTTP response a denial turns into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpOutcome {
    pub status: StatusCode,
    pub body: Option<String>,
    pub content_type: Option<&'static str>,
    /// Methods to advertise in the `Allow` header of a 405
    pub allow: Vec<Method>,
}

impl HttpOutcome {
    pub fn forbidden() -> Self {
        Self {
            status: StatusCode::FORBIDDEN,
            body: None,
            content_type: None,
            allow: Vec::new(),
        }
    }

    pub fn method_not_allowed(allowed: &[Method]) -> Self {
        Self {
            status: StatusCode::METHOD_NOT_ALLOWED,
            body: None,
            content_type: None,
            allow: allowed.to_vec(),
        }
    }

    /// Empty 200 answering an OPTIONS request.
    pub fn options(allowed: &[Method]) -> Self {
        Self {
            status: StatusCode::OK,
            body: None,
            content_type: None,
            allow: allowed.to_vec(),
        }
    }

    pub fn markup(body: String) -> Self {
        Self {
            status: StatusCode::OK,
            body: Some(body),
            content_type: Some(XML_CONTENT_TYPE),
            allow: Vec::new(),
        }
    }
}

impl IntoResponse for HttpOutcome {
    fn into_response(self) -> Response {
        let mut response = (self.status, self.body.unwrap_or_default()).into_response();

        let headers = response.headers_mut();
        match self.content_type {
            Some(content_type) => {
                headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
            }
            None => {
                headers.remove(header::CONTENT_TYPE);
            }
        }

        if !self.allow.is_empty() {
            let allow = self
                .allow
                .iter()
                .map(Method::as_str)
                .collect::<Vec<_>>()
                .join(", ");
            if let Ok(value) = HeaderValue::from_str(&allow) {
                headers.insert(header::ALLOW, value);
            }
        }

        response
    }
}

/// Result of running the policy against one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessDecision {
    Allow,
    Deny {
        reason: DenyReason,
        outcome: HttpOutcome,
    },
}

impl AccessDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, AccessDecision::Allow)
    }

    fn forbidden(reason: DenyReason) -> Self {
        AccessDecision::Deny {
            reason,
            outcome: HttpOutcome::forbidden(),
        }
    }
}

/// The canned response for a blacklisted caller.
///
/// Calls are rejected outright. Messages have no reject primitive, so they
/// get an empty response and nothing is sent back.
pub fn blacklisted_response(kind: RequestKind) -> HttpOutcome {
    let body = match kind {
        RequestKind::Voice => {
            let mut r = VoiceResponse::new();
            r.reject(None);
            r.to_xml()
        }
        RequestKind::Message | RequestKind::Unknown => MessagingResponse::new().to_xml(),
    };
    HttpOutcome::markup(body)
}

// =============================================================================
// Policy
// =============================================================================

/// Borrowed view of everything one policy evaluation needs.
pub struct AccessPolicy<'a> {
    config: &'a Config,
    env: &'a dyn Environment,
    callers: &'a dyn CallerStore,
    credentials: &'a dyn CredentialStore,
}

impl<'a> AccessPolicy<'a> {
    pub fn new(
        config: &'a Config,
        env: &'a dyn Environment,
        callers: &'a dyn CallerStore,
        credentials: &'a dyn CredentialStore,
    ) -> Self {
        Self {
            config,
            env,
            callers,
            credentials,
        }
    }

    /// Run every enabled check against the request.
    pub async fn evaluate(
        &self,
        request: &WebhookRequest,
        options: &HandlerOptions,
    ) -> AccessDecision {
        let forgery_protection = options
            .forgery_protection
            .unwrap_or_else(|| self.config.forgery_protection_enabled());

        if forgery_protection {
            if let Some(denied) = self.check_method(request, options) {
                return denied;
            }
            if let Some(denied) = self.check_forgery(request, options).await {
                return denied;
            }
        }

        let blacklist_check = options
            .blacklist_check
            .unwrap_or(self.config.blacklist_check);

        if blacklist_check {
            if let Some(denied) = self.check_blacklist(request).await {
                return denied;
            }
        }

        AccessDecision::Allow
    }

    fn check_method(
        &self,
        request: &WebhookRequest,
        options: &HandlerOptions,
    ) -> Option<AccessDecision> {
        let allowed = options
            .allowed_methods
            .as_deref()
            .unwrap_or(&self.config.allowed_methods);

        if allowed.contains(&request.method) {
            return None;
        }

        warn!(
            method = %request.method,
            path = %request.uri.path(),
            "webhook_method_not_allowed"
        );

        Some(AccessDecision::Deny {
            reason: DenyReason::MethodNotAllowed(request.method.clone()),
            outcome: HttpOutcome::method_not_allowed(allowed),
        })
    }

    async fn check_forgery(
        &self,
        request: &WebhookRequest,
        options: &HandlerOptions,
    ) -> Option<AccessDecision> {
        let credentials = match discover_credentials(CredentialSources {
            explicit: options.credentials.as_ref(),
            env: self.env,
            user: request.user.as_deref(),
            store: self.credentials,
            config: self.config,
        })
        .await
        {
            Ok(credentials) => credentials,
            Err(e) => {
                warn!(error = %e, path = %request.uri.path(), "webhook_credentials_missing");
                return Some(AccessDecision::forbidden(DenyReason::MissingCredentials));
            }
        };

        let Some(provided) = request.header(&self.config.signature_header) else {
            warn!(
                header = %self.config.signature_header,
                path = %request.uri.path(),
                "webhook_signature_missing"
            );
            return Some(AccessDecision::forbidden(DenyReason::MissingSignature));
        };

        let url = request.absolute_url(self.config.trust_forwarded_headers);
        let empty = Params::new();
        let params = request.params().unwrap_or(&empty);

        if !signature::verify(credentials.auth_token.as_bytes(), &url, params, provided) {
            warn!(url = %url, method = %request.method, "webhook_forgery_rejected");
            return Some(AccessDecision::forbidden(DenyReason::InvalidSignature));
        }

        None
    }

    async fn check_blacklist(&self, request: &WebhookRequest) -> Option<AccessDecision> {
        let phone_number = request.params()?.get(CALLER_FIELD)?;

        let caller = match self.callers.find_by_phone_number(phone_number).await {
            Ok(Some(caller)) => caller,
            Ok(None) => return None,
            Err(e) => {
                warn!(error = %e, from = %phone_number, "blacklist_lookup_failed");
                return None;
            }
        };

        if !caller.blacklisted {
            return None;
        }

        let kind = decompose(request)
            .map(|normalized| normalized.kind())
            .unwrap_or(RequestKind::Unknown);

        info!(from = %phone_number, kind = %kind, "caller_blacklisted");

        Some(AccessDecision::Deny {
            reason: DenyReason::Blacklisted(kind),
            outcome: blacklisted_response(kind),
        })
    }
}
