use axum::extract::State;
use serde::{Deserialize, Serialize};

use crate::catalog::Variant;
use crate::error::{AppError, Result};
use crate::extractors::Json;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub slug: String,
    /// "digital" or "physical".
    pub kind: String,
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    /// Stripe's hosted checkout page; the client redirects here.
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct CartItemRequest {
    pub price_id: String,
    pub quantity: u32,
}

#[derive(Debug, Deserialize)]
pub struct CartCheckoutRequest {
    pub items: Vec<CartItemRequest>,
}

fn success_url(base_url: &str) -> String {
    // Stripe substitutes the placeholder with the real session id on redirect.
    format!("{}/grazie?session_id={{CHECKOUT_SESSION_ID}}", base_url)
}

fn cancel_url(base_url: &str) -> String {
    format!("{}/annullato", base_url)
}

/// Create a checkout session for a single publication variant.
pub async fn create_checkout(
    State(state): State<AppState>,
    Json(request): Json<CheckoutRequest>,
) -> Result<Json<CheckoutResponse>> {
    let kind = Variant::from_str(&request.kind)
        .ok_or_else(|| AppError::BadRequest("kind must be \"digital\" or \"physical\"".into()))?;

    let product = state
        .catalog
        .lookup(&request.slug)
        .ok_or_else(|| AppError::NotFound(format!("Unknown publication: {}", request.slug)))?;

    let price_id = match kind {
        Variant::Digital => product.digital_price_id.as_deref(),
        Variant::Physical => product.physical_price_id.as_deref(),
    }
    .ok_or_else(|| {
        AppError::BadRequest(format!(
            "{} is not available as {}",
            product.slug,
            kind.as_str()
        ))
    })?;

    let stripe = state.stripe()?;
    let base_url = &state.config.base_url;
    let (session_id, url) = stripe
        .create_checkout_session(
            price_id,
            &product.slug,
            kind,
            &success_url(base_url),
            &cancel_url(base_url),
        )
        .await?;

    tracing::info!(session_id = %session_id, slug = %product.slug, kind = %kind.as_str(), "Checkout session created");

    Ok(Json(CheckoutResponse { url }))
}

/// Create a checkout session for the client-side cart.
///
/// Price ids are validated against the catalog before Stripe is called: the
/// site's own cart built them, so an unknown id is a bad request, not a new
/// product.
pub async fn create_cart_checkout(
    State(state): State<AppState>,
    Json(request): Json<CartCheckoutRequest>,
) -> Result<Json<CheckoutResponse>> {
    if request.items.is_empty() {
        return Err(AppError::BadRequest("Cart is empty".into()));
    }

    let mut items: Vec<(String, u32)> = Vec::with_capacity(request.items.len());
    let mut collect_shipping = false;

    for item in &request.items {
        let entry = state.catalog.resolve_price(&item.price_id).ok_or_else(|| {
            AppError::BadRequest(format!("Unknown price id: {}", item.price_id))
        })?;
        if entry.variant == Variant::Physical {
            collect_shipping = true;
        }
        items.push((item.price_id.clone(), item.quantity.clamp(1, 100)));
    }

    let stripe = state.stripe()?;
    let base_url = &state.config.base_url;
    let (session_id, url) = stripe
        .create_cart_checkout_session(
            &items,
            collect_shipping,
            &success_url(base_url),
            &cancel_url(base_url),
        )
        .await?;

    tracing::info!(session_id = %session_id, items = items.len(), "Cart checkout session created");

    Ok(Json(CheckoutResponse { url }))
}
