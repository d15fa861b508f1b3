use axum::Router;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bottega::catalog::Catalog;
use bottega::config::Config;
use bottega::handlers;
use bottega::state::AppState;

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bottega=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    let catalog = Catalog::builtin();
    tracing::info!("Catalog loaded: {} publications", catalog.len());

    if config.stripe_secret_key.is_none() {
        tracing::warn!("STRIPE_SECRET_KEY not set: checkout, webhook and download endpoints will fail");
    }
    if config.printful_api_key.is_some() {
        tracing::info!("Fulfillment dispatch enabled");
    } else {
        tracing::warn!("PRINTFUL_API_KEY not set: fulfillment dispatch disabled");
    }
    if config.resend_api_key.is_none() {
        tracing::warn!("RESEND_API_KEY not set: confirmation emails disabled");
    }

    let addr = config.addr();
    let state = AppState::new(config, catalog);

    let app = Router::new()
        .merge(handlers::public::router())
        .merge(handlers::webhooks::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Bottega server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Failed to start server");
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    tracing::info!("Shutdown signal received, stopping server...");
}
