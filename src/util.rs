//! Shared helpers for upstream error handling.

use crate::error::AppError;

/// Extract a human-readable message from a provider error body.
///
/// Providers disagree on where the message lives, so the shapes are tried in
/// priority order: `error.message`, `message`, a string `result`, `detail`.
/// Falls back to the (truncated) raw body when none match.
pub fn extract_api_error(body: &str) -> String {
    const RAW_BODY_LIMIT: usize = 200;

    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        let candidates = [
            value.pointer("/error/message"),
            value.pointer("/message"),
            value.pointer("/result"),
            value.pointer("/detail"),
        ];
        for candidate in candidates.into_iter().flatten() {
            if let Some(s) = candidate.as_str() {
                if !s.is_empty() {
                    return s.to_string();
                }
            }
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "no response body".to_string();
    }
    let mut message: String = trimmed.chars().take(RAW_BODY_LIMIT).collect();
    if trimmed.chars().count() > RAW_BODY_LIMIT {
        message.push_str("...");
    }
    message
}

/// Run a side-effecting step that must never fail its caller.
///
/// Returns the value on success; on failure logs the error under `step` and
/// returns `None`. Used by the webhook handler so a failing email or
/// fulfillment call cannot block the acknowledgment.
pub fn best_effort<T>(step: &str, result: Result<T, AppError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::error!(step, "Step failed (continuing): {}", e);
            None
        }
    }
}
