//! The webhook gateway: policy, handler and response coercion in one call.
//!
//! ```text
//! WebhookRequest → AccessPolicy → handler → HandlerReply::coerce → Response
//! ```
//!
//! Function handlers are passed straight to [`WebhookGateway::handle`].
//! Controller-style handlers implement [`WebhookController`] and go through
//! [`WebhookGateway::handle_controller`], which dispatches on the method.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::Method;
use axum::response::{IntoResponse, Response};
use tracing::{debug, info};

use crate::config::{Environment, ProcessEnv, SharedConfig};
use crate::policy::{AccessDecision, AccessPolicy, HandlerOptions, HttpOutcome};
use crate::request::WebhookRequest;
use crate::response::HandlerReply;
use crate::store::{CallerStore, CredentialStore, InMemoryCallerStore, InMemoryCredentialStore};

/// Marks a response as produced behind signature verification.
///
/// Twilio cannot present a CSRF token, so gateway routes must be exempt
/// from CSRF middleware; the signature check stands in for it. Middleware
/// can look for this extension on the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CsrfExempt;

/// Stateless per-request orchestrator. Cheap to clone.
#[derive(Clone)]
pub struct WebhookGateway {
    config: SharedConfig,
    env: Arc<dyn Environment>,
    callers: Arc<dyn CallerStore>,
    credentials: Arc<dyn CredentialStore>,
}

impl WebhookGateway {
    /// A gateway reading the process environment, with empty stores.
    pub fn new(config: impl Into<SharedConfig>) -> Self {
        Self {
            config: config.into(),
            env: Arc::new(ProcessEnv),
            callers: Arc::new(InMemoryCallerStore::new()),
            credentials: Arc::new(InMemoryCredentialStore::new()),
        }
    }

    pub fn with_callers(mut self, callers: Arc<dyn CallerStore>) -> Self {
        self.callers = callers;
        self
    }

    pub fn with_credentials(mut self, credentials: Arc<dyn CredentialStore>) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn with_environment(mut self, env: Arc<dyn Environment>) -> Self {
        self.env = env;
        self
    }

    pub fn config(&self) -> &SharedConfig {
        &self.config
    }

    /// Run the access policy against the configuration as it is right now.
    pub async fn authorize(
        &self,
        request: &WebhookRequest,
        options: &HandlerOptions,
    ) -> AccessDecision {
        let config = self.config.snapshot();
        AccessPolicy::new(
            &config,
            self.env.as_ref(),
            self.callers.as_ref(),
            self.credentials.as_ref(),
        )
        .evaluate(request, options)
        .await
    }

    /// Authorize the request, run the handler if allowed, and coerce its reply.
    pub async fn handle<H, Fut, R>(
        &self,
        request: WebhookRequest,
        options: &HandlerOptions,
        handler: H,
    ) -> Response
    where
        H: FnOnce(WebhookRequest) -> Fut,
        Fut: Future<Output = R>,
        R: Into<HandlerReply>,
    {
        let method = request.method.clone();
        let path = request.uri.path().to_string();

        let response = match self.authorize(&request, options).await {
            AccessDecision::Allow => {
                debug!(method = %method, path = %path, "webhook_handler_invoked");
                handler(request).await.into().coerce()
            }
            AccessDecision::Deny { reason, outcome } => {
                info!(
                    method = %method,
                    path = %path,
                    reason = ?reason,
                    status = outcome.status.as_u16(),
                    "webhook_denied"
                );
                outcome.into_response()
            }
        };

        mark_csrf_exempt(response)
    }

    /// Like [`handle`](Self::handle), dispatching to a controller's method handler.
    pub async fn handle_controller<C>(
        &self,
        request: WebhookRequest,
        options: &HandlerOptions,
        controller: &C,
    ) -> Response
    where
        C: WebhookController + ?Sized,
    {
        self.handle(request, options, |request| dispatch(controller, request))
            .await
    }
}

fn mark_csrf_exempt(mut response: Response) -> Response {
    response.extensions_mut().insert(CsrfExempt);
    response
}

// =============================================================================
// Controllers
// =============================================================================

/// A webhook endpoint with one handler per HTTP method.
///
/// Methods a controller does not override answer 405. HEAD is served by
/// `get` and OPTIONS lists the advertised methods.
#[async_trait]
pub trait WebhookController: Send + Sync {
    async fn get(&self, request: WebhookRequest) -> HandlerReply {
        method_not_allowed(self, &request)
    }

    async fn post(&self, request: WebhookRequest) -> HandlerReply {
        method_not_allowed(self, &request)
    }

    /// Methods this controller implements. Override when only one of
    /// `get`/`post` is provided so `Allow` headers stay accurate.
    fn allowed_methods(&self) -> Vec<Method> {
        vec![Method::GET, Method::POST]
    }
}

/// Route a request to the controller method matching its HTTP method.
pub async fn dispatch<C>(controller: &C, request: WebhookRequest) -> HandlerReply
where
    C: WebhookController + ?Sized,
{
    match request.method {
        Method::GET | Method::HEAD => controller.get(request).await,
        Method::POST => controller.post(request).await,
        Method::OPTIONS => {
            HandlerReply::Http(HttpOutcome::options(&advertised_methods(controller)).into_response())
        }
        _ => method_not_allowed(controller, &request),
    }
}

/// Implemented methods plus the ones dispatch answers on their behalf.
fn advertised_methods<C>(controller: &C) -> Vec<Method>
where
    C: WebhookController + ?Sized,
{
    let mut methods = controller.allowed_methods();
    if methods.contains(&Method::GET) && !methods.contains(&Method::HEAD) {
        methods.push(Method::HEAD);
    }
    if !methods.contains(&Method::OPTIONS) {
        methods.push(Method::OPTIONS);
    }
    methods
}

fn method_not_allowed<C>(controller: &C, request: &WebhookRequest) -> HandlerReply
where
    C: WebhookController + ?Sized,
{
    debug!(method = %request.method, "controller_method_not_implemented");
    HandlerReply::Http(
        HttpOutcome::method_not_allowed(&advertised_methods(controller)).into_response(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::signature::compute_signature;
    use crate::store::Caller;
    use crate::twiml::VoiceResponse;
    use axum::body::to_bytes;
    use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const TOKEN: &str = "gateway-token";

    fn gateway(config: Config) -> WebhookGateway {
        WebhookGateway::new(config)
            .with_environment(Arc::new(HashMap::<String, String>::new()))
            .with_callers(Arc::new(InMemoryCallerStore::with_callers([
                Caller::blacklisted("+15005550001"),
            ])))
    }

    fn config() -> Config {
        Config {
            auth_token: Some(TOKEN.to_string()),
            ..Config::default()
        }
    }

    fn request(method: Method, body: &str, sign: bool) -> WebhookRequest {
        let mut headers = HeaderMap::new();
        headers.insert("host", HeaderValue::from_static("testserver"));
        let mut request = WebhookRequest::new(method, "/hook".parse().unwrap(), headers, body.as_bytes());
        if sign {
            let url = request.absolute_url(true);
            let signature = compute_signature(TOKEN.as_bytes(), &url, &request.form).unwrap();
            request
                .headers
                .insert("x-twilio-signature", HeaderValue::from_str(&signature).unwrap());
        }
        request
    }

    struct StrController;

    #[async_trait]
    impl WebhookController for StrController {
        async fn post(&self, _request: WebhookRequest) -> HandlerReply {
            "<Response><Message>Hi!</Message></Response>".into()
        }

        fn allowed_methods(&self) -> Vec<Method> {
            vec![Method::POST]
        }
    }

    struct GetOnlyController;

    #[async_trait]
    impl WebhookController for GetOnlyController {
        async fn get(&self, _request: WebhookRequest) -> HandlerReply {
            "<Response><Say>Hello</Say></Response>".into()
        }

        fn allowed_methods(&self) -> Vec<Method> {
            vec![Method::GET]
        }
    }

    /// Controller relying on the default method list.
    struct DefaultController;

    #[async_trait]
    impl WebhookController for DefaultController {}

    #[tokio::test]
    async fn test_allowed_request_runs_handler() {
        let gateway = gateway(config());
        let calls = AtomicUsize::new(0);

        let response = gateway
            .handle(request(Method::POST, "", true), &HandlerOptions::default(), |_| async {
                calls.fetch_add(1, Ordering::SeqCst);
                "<Response />"
            })
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(response.extensions().get::<CsrfExempt>(), Some(&CsrfExempt));
    }

    #[tokio::test]
    async fn test_blacklisted_caller_never_reaches_handler() {
        let gateway = gateway(config());
        let calls = AtomicUsize::new(0);

        let response = gateway
            .handle(
                request(Method::POST, "From=%2B15005550001&CallSid=CA1", true),
                &HandlerOptions::default(),
                |_| async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    VoiceResponse::new()
                },
            )
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_forged_request_is_forbidden_and_exempt() {
        let gateway = gateway(config());

        let response = gateway
            .handle(request(Method::POST, "", false), &HandlerOptions::default(), |_| async {
                "<Response />"
            })
            .await;

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(response.extensions().get::<CsrfExempt>().is_some());
    }

    #[tokio::test]
    async fn test_configuration_read_per_request() {
        let gateway = gateway(config());
        let options = HandlerOptions::default();

        let response = gateway
            .handle(request(Method::POST, "", false), &options, |_| async { "<Response />" })
            .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        {
            let _debug = gateway.config().override_with(|c| c.debug = true);
            let response = gateway
                .handle(request(Method::POST, "", false), &options, |_| async { "<Response />" })
                .await;
            assert_eq!(response.status(), StatusCode::OK);
        }

        let response = gateway
            .handle(request(Method::POST, "", false), &options, |_| async { "<Response />" })
            .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_controller_dispatch() {
        let gateway = gateway(Config {
            debug: true,
            ..Config::default()
        });
        let options = HandlerOptions::default();

        let response = gateway
            .handle_controller(request(Method::POST, "", false), &options, &StrController)
            .await;
        assert_eq!(response.status(), StatusCode::OK);

        // relaxed mode lets GET and PUT through the policy; the controller refuses them
        let response = gateway
            .handle_controller(request(Method::GET, "", false), &options, &StrController)
            .await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers().get(header::ALLOW).unwrap(), "POST, OPTIONS");

        let response = gateway
            .handle_controller(request(Method::PUT, "", false), &options, &StrController)
            .await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_controller_behind_forgery_protection() {
        let gateway = gateway(config());

        let response = gateway
            .handle_controller(request(Method::POST, "", true), &HandlerOptions::default(), &StrController)
            .await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = gateway
            .handle_controller(request(Method::POST, "", false), &HandlerOptions::default(), &StrController)
            .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_controller_head_and_options_in_debug_mode() {
        let gateway = gateway(Config {
            debug: true,
            ..Config::default()
        });
        let options = HandlerOptions::default();

        let response = gateway
            .handle_controller(request(Method::GET, "", false), &options, &GetOnlyController)
            .await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = gateway
            .handle_controller(request(Method::HEAD, "", false), &options, &GetOnlyController)
            .await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = gateway
            .handle_controller(request(Method::OPTIONS, "", false), &options, &GetOnlyController)
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get(header::ALLOW).unwrap(), "GET, HEAD, OPTIONS");
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(body.is_empty());

        let response = gateway
            .handle_controller(request(Method::POST, "", false), &options, &GetOnlyController)
            .await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers().get(header::ALLOW).unwrap(), "GET, HEAD, OPTIONS");
    }

    #[tokio::test]
    async fn test_default_controller_advertises_get_and_post() {
        let gateway = gateway(Config {
            debug: true,
            ..Config::default()
        });

        let response = gateway
            .handle_controller(
                request(Method::OPTIONS, "", false),
                &HandlerOptions::default(),
                &DefaultController,
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::ALLOW).unwrap(),
            "GET, POST, HEAD, OPTIONS"
        );

        let response = gateway
            .handle_controller(
                request(Method::HEAD, "", false),
                &HandlerOptions::default(),
                &DefaultController,
            )
            .await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }
}
