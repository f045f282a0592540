//! HTTP routes for the gateway server.
//!
//! Every `/twilio/...` route accepts any method so the gateway, not the
//! router, decides between 403, 405 and the handler.

use axum::{
    extract::{DefaultBodyLimit, Path, State},
    response::Response,
    routing::{any, get},
    Json, Router,
};
use serde::Serialize;

use crate::config::Config;
use crate::gateway::WebhookGateway;
use crate::policy::HandlerOptions;
use crate::request::WebhookRequest;
use crate::twiml::{ConferenceOptions, DialOptions, GatherOptions, MessageOptions, RecordOptions, SayOptions};
use crate::views;
use crate::web::extract::MAX_BODY_BYTES;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub gateway: WebhookGateway,
    pub options: HandlerOptions,
    pub views: ViewDefaults,
}

impl AppState {
    /// State whose view defaults come from the gateway's configuration.
    pub fn new(gateway: WebhookGateway) -> Self {
        let views = ViewDefaults::from_config(&gateway.config().snapshot());
        Self {
            gateway,
            options: HandlerOptions::default(),
            views,
        }
    }

    pub fn with_views(mut self, views: ViewDefaults) -> Self {
        self.views = views;
        self
    }
}

/// Options each canned view starts from.
#[derive(Debug, Clone, Default)]
pub struct ViewDefaults {
    pub say: SayOptions,
    pub gather: GatherOptions,
    pub record: RecordOptions,
    pub message: MessageOptions,
    pub dial: DialOptions,
    pub conference: ConferenceOptions,
}

impl ViewDefaults {
    pub fn from_config(config: &Config) -> Self {
        Self {
            say: SayOptions {
                voice: config.voice.clone(),
                language: config.language.clone(),
                ..SayOptions::default()
            },
            message: MessageOptions {
                status_callback: config.status_callback.clone(),
                ..MessageOptions::default()
            },
            dial: DialOptions {
                caller_id: config.caller_id.clone(),
                ..DialOptions::default()
            },
            ..Self::default()
        }
    }
}

/// Build the router with health check and canned TwiML views.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/twilio/say/:text", any(say))
        .route("/twilio/play/*url", any(play))
        .route("/twilio/gather", any(gather))
        .route("/twilio/record", any(record))
        .route("/twilio/message/:body", any(message))
        .route("/twilio/dial/:number", any(dial))
        .route("/twilio/conference/:name", any(conference))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}

// =============================================================================
// Health Check
// =============================================================================

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

// =============================================================================
// TwiML Views
// =============================================================================

pub async fn say(
    State(state): State<AppState>,
    Path(text): Path<String>,
    request: WebhookRequest,
) -> Response {
    let options = state.views.say.clone();
    state
        .gateway
        .handle(request, &state.options, |_| async move { views::say(&text, options) })
        .await
}

pub async fn play(
    State(state): State<AppState>,
    Path(url): Path<String>,
    request: WebhookRequest,
) -> Response {
    state
        .gateway
        .handle(request, &state.options, |_| async move { views::play(&url, None) })
        .await
}

pub async fn gather(State(state): State<AppState>, request: WebhookRequest) -> Response {
    let options = state.views.gather.clone();
    state
        .gateway
        .handle(request, &state.options, |_| async move { views::gather(options) })
        .await
}

pub async fn record(State(state): State<AppState>, request: WebhookRequest) -> Response {
    let options = state.views.record.clone();
    state
        .gateway
        .handle(request, &state.options, |_| async move { views::record(options) })
        .await
}

pub async fn message(
    State(state): State<AppState>,
    Path(body): Path<String>,
    request: WebhookRequest,
) -> Response {
    let options = state.views.message.clone();
    state
        .gateway
        .handle(request, &state.options, |_| async move {
            views::message(&body, options)
        })
        .await
}

pub async fn dial(
    State(state): State<AppState>,
    Path(number): Path<String>,
    request: WebhookRequest,
) -> Response {
    let options = state.views.dial.clone();
    state
        .gateway
        .handle(request, &state.options, |_| async move { views::dial(&number, options) })
        .await
}

pub async fn conference(
    State(state): State<AppState>,
    Path(name): Path<String>,
    request: WebhookRequest,
) -> Response {
    let options = state.views.conference.clone();
    state
        .gateway
        .handle(request, &state.options, |_| async move {
            views::conference(&name, options)
        })
        .await
}
