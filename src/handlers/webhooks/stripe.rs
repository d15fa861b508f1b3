//! Stripe webhook endpoint.
//!
//! Once the signature has been verified, the delivery is always acknowledged
//! with 200: every downstream step (email, fulfillment) is wrapped so its
//! failure is logged instead of propagated. Failing the ack would make Stripe
//! retry-storm a transient downstream outage into duplicate processing.

use axum::{body::Bytes, extract::State, http::HeaderMap};
use serde::Serialize;

use crate::email::compose_order_confirmation;
use crate::error::{AppError, Result};
use crate::extractors::Json;
use crate::fulfillment::{self, DispatchOutcome};
use crate::payments::{StripeClient, StripeWebhookEvent, WebhookSessionRef};
use crate::reconcile::{reconcile, PurchaseRecord};
use crate::state::AppState;
use crate::util::best_effort;

/// Event types that carry a completed, payable checkout session.
const HANDLED_EVENTS: [&str; 2] = [
    "checkout.session.completed",
    "checkout.session.async_payment_succeeded",
];

#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub received: bool,
}

pub async fn handle_stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>> {
    let stripe = state.stripe()?;

    // Signature verification needs the exact raw bytes, which is why the body
    // arrives as Bytes and is only parsed afterwards.
    let signature = headers
        .get("stripe-signature")
        .ok_or_else(|| AppError::Signature("missing stripe-signature header".into()))?
        .to_str()
        .map_err(|_| AppError::Signature("invalid stripe-signature header".into()))?;

    match stripe.verify_webhook_signature(&body, signature) {
        Ok(true) => {}
        Ok(false) => return Err(AppError::Signature("verification failed".into())),
        Err(e @ AppError::Config(_)) => return Err(e),
        Err(e) => return Err(AppError::Signature(e.to_string())),
    }

    let event: StripeWebhookEvent = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("Invalid webhook payload: {}", e)))?;

    if HANDLED_EVENTS.contains(&event.event_type.as_str()) {
        let session_ref: WebhookSessionRef = serde_json::from_value(event.data.object)
            .map_err(|e| AppError::BadRequest(format!("Invalid checkout session: {}", e)))?;

        tracing::info!(
            event_type = %event.event_type,
            session_id = %session_ref.id,
            "Processing checkout completion"
        );
        process_completed_session(&state, &stripe, &session_ref.id).await;
    } else {
        tracing::debug!(event_type = %event.event_type, "Ignoring event type");
    }

    Ok(Json(WebhookAck { received: true }))
}

/// Reconcile a completed session, send the confirmation and dispatch
/// fulfillment. Infallible by design: every step logs its own failure.
async fn process_completed_session(state: &AppState, stripe: &StripeClient, session_id: &str) {
    let session = match stripe.retrieve_session(session_id).await {
        Ok(session) => session,
        Err(e) => {
            tracing::error!(session_id, "Session lookup failed: {}", e);
            return;
        }
    };

    if !session.is_paid() {
        tracing::info!(session_id, status = %session.payment_status, "Session not paid; nothing to do");
        return;
    }

    let line_items = match stripe.list_line_items(session_id).await {
        Ok(items) => items,
        Err(e) => {
            tracing::error!(session_id, "Line-item lookup failed: {}", e);
            return;
        }
    };

    let mut records = reconcile(&line_items, &state.catalog);
    if records.is_empty() {
        tracing::warn!(
            session_id,
            "No line item mapped to the catalog; sending generic confirmation"
        );
        records.push(PurchaseRecord::unknown_order());
    }

    match session.customer_email() {
        Some(to) => {
            let links = stripe.retrieve_invoice_links(&session).await;
            let email =
                compose_order_confirmation(&records, &session, &links, &state.config.base_url);
            best_effort(
                "send_confirmation_email",
                state.email().send(to, &email).await,
            );
        }
        None => {
            tracing::warn!(session_id, "Session has no customer email; skipping confirmation");
        }
    }

    match state.printful() {
        Some(printful) => {
            match fulfillment::dispatch(stripe, &printful, &state.catalog, session_id).await {
                Ok(DispatchOutcome::Dispatched { created: true, order }) => {
                    tracing::info!(session_id, order_id = order.id, "Fulfillment order created");
                }
                Ok(DispatchOutcome::Dispatched { created: false, order }) => {
                    tracing::info!(
                        session_id,
                        order_id = order.id,
                        "Fulfillment order already exists; nothing created"
                    );
                }
                Ok(DispatchOutcome::Skipped(reason)) => {
                    tracing::info!(session_id, reason = reason.as_str(), "Fulfillment skipped");
                }
                Err(e) => {
                    tracing::error!(session_id, "Fulfillment dispatch failed: {}", e);
                }
            }
        }
        None => {
            tracing::debug!(session_id, "Fulfillment dispatch disabled (no API key)");
        }
    }
}
