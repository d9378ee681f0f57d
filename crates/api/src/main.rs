//! Notification relay API server binary entrypoint.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use relay_common::config::AppConfig;
use relay_engine::{Dispatcher, UserDirectory};
use relay_notifier::{HttpDeliveryProvider, RateLimit};

use relay_api::middleware::request_log::log_requests;
use relay_api::routes::create_router;
use relay_api::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("relay_api=info,relay_engine=info,relay_notifier=info,tower_http=info")
        }))
        .json()
        .init();

    tracing::info!("Starting notification relay...");

    // Load configuration
    let config = AppConfig::from_env()?;

    // Channel queues + delivery
    let email_limit = RateLimit::try_from(config.email_queue)?;
    let sms_limit = RateLimit::try_from(config.sms_queue)?;
    let provider = Arc::new(HttpDeliveryProvider::new(
        config.notification_service_url.clone(),
    ));
    let dispatcher = Arc::new(Dispatcher::start(
        UserDirectory::new().into_shared(),
        email_limit,
        sms_limit,
        provider,
        config.delivery_timeout_ms.map(Duration::from_millis),
    ));

    // Build application state
    let state = AppState::new(config.clone(), Arc::clone(&dispatcher));

    // Build router
    let app = create_router(state)
        .layer(axum::middleware::from_fn(log_requests))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("API server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    dispatcher.stop();
    tracing::info!("Notification relay stopped.");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Received shutdown signal, stopping gracefully...");
}
