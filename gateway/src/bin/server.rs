//! Twilio Gateway Server - signature-verified TwiML endpoints.
//!
//! This binary serves the canned TwiML views behind the webhook gateway:
//! - Verifies every request's Twilio signature (unless in debug mode)
//! - Rejects blacklisted callers loaded from a JSON fixture file
//! - Answers with `application/xml` TwiML

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::{net::TcpListener, signal};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use twilio_gateway::store::InMemoryCallerStore;
use twilio_gateway::web::{router, AppState};
use twilio_gateway::{Config, SharedConfig, WebhookGateway};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured JSON logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    info!("gateway_starting");

    // Load configuration
    let config = Config::from_env();
    info!(
        port = config.port,
        debug = config.debug,
        forgery_protection = config.forgery_protection_enabled(),
        blacklist_check = config.blacklist_check,
        account_sid_set = config.account_sid.is_some(),
        auth_token_set = config.auth_token.is_some(),
        trust_forwarded_headers = config.trust_forwarded_headers,
        "config_loaded"
    );

    if !config.forgery_protection_enabled() {
        warn!("forgery_protection_disabled");
    }

    // Seed the caller store
    let callers = match &config.caller_fixtures {
        Some(path) => InMemoryCallerStore::from_json_file(path)
            .with_context(|| format!("Failed to load caller fixtures from {}", path.display()))?,
        None => InMemoryCallerStore::new(),
    };

    let port = config.port;
    let gateway = WebhookGateway::new(SharedConfig::new(config)).with_callers(Arc::new(callers));

    // Build the router
    let app = router(AppState::new(gateway)).layer(TraceLayer::new_for_http());

    // Bind to address
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    info!(address = %addr, "gateway_listening");

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("gateway_shutdown_complete");

    Ok(())
}

/// Create a future that completes when a shutdown signal is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "ctrl_c_handler_failed");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "sigterm_handler_failed");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }

    info!("gateway_shutting_down");
}
