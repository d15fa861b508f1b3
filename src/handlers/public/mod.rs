mod checkout;
mod download;

pub use checkout::*;
pub use download::*;

use axum::{
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/checkout", post(create_checkout))
        .route("/checkout/cart", post(create_cart_checkout))
        .route("/download", get(download_asset))
}
