use axum::{
    extract::State,
    http::header,
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use crate::error::{AppError, Result};
use crate::extractors::Query;
use crate::payments::CheckoutSession;
use crate::state::AppState;

/// A download link stays valid for this long after checkout.
pub const DOWNLOAD_WINDOW_SECS: i64 = 24 * 60 * 60;

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub slug: Option<String>,
}

/// Decide whether a session may download the given publication.
///
/// The session must be paid, must have been created for this exact slug (a
/// paid session for one title cannot be reused for another), and must be
/// younger than the validity window. At exactly the window boundary the link
/// is already expired.
pub fn check_download_access(session: &CheckoutSession, slug: &str, now: i64) -> Result<()> {
    if !session.is_paid() {
        return Err(AppError::Forbidden("Pagamento non valido".into()));
    }
    if session.metadata.slug.as_deref() != Some(slug) {
        return Err(AppError::Forbidden("Pagamento non valido".into()));
    }
    if now - session.created >= DOWNLOAD_WINDOW_SECS {
        return Err(AppError::Forbidden("Link di download scaduto".into()));
    }
    Ok(())
}

/// Serve a purchased PDF after re-checking the payment with Stripe.
pub async fn download_asset(
    State(state): State<AppState>,
    Query(query): Query<DownloadQuery>,
) -> Result<Response> {
    let (Some(session_id), Some(slug)) = (query.session_id, query.slug) else {
        return Err(AppError::BadRequest(
            "session_id e slug sono obbligatori".into(),
        ));
    };

    let asset_path = state
        .catalog
        .lookup(&slug)
        .and_then(|product| product.digital_asset_path.clone())
        .ok_or_else(|| AppError::NotFound("Documento non trovato".into()))?;

    let stripe = state.stripe()?;
    let session = stripe.retrieve_session(&session_id).await?;

    check_download_access(&session, &slug, chrono::Utc::now().timestamp())?;

    let bytes = tokio::fs::read(&asset_path).await.map_err(|e| {
        AppError::Internal(format!("Failed to read asset {}: {}", asset_path, e))
    })?;

    tracing::info!(session_id = %session_id, slug = %slug, "Download released");

    let headers = [
        (header::CONTENT_TYPE, "application/pdf".to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}.pdf\"", slug),
        ),
        (header::CACHE_CONTROL, "no-store".to_string()),
    ];

    Ok((headers, bytes).into_response())
}
