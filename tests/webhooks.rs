//! Webhook signature verification and event envelope parsing.

use bottega::error::AppError;
use bottega::payments::{StripeClient, StripeWebhookEvent, WebhookSessionRef};

const TEST_WEBHOOK_SECRET: &str = "whsec_test123secret456";

fn test_client() -> StripeClient {
    StripeClient::new(
        reqwest::Client::new(),
        "sk_test_xxx".to_string(),
        Some(TEST_WEBHOOK_SECRET.to_string()),
    )
}

/// Get current Unix timestamp as a string (for webhook signature tests)
fn current_timestamp() -> String {
    chrono::Utc::now().timestamp().to_string()
}

/// Get an old timestamp (for testing timestamp rejection)
fn old_timestamp() -> String {
    // 10 minutes ago - beyond the 5-minute tolerance
    (chrono::Utc::now().timestamp() - 600).to_string()
}

fn compute_signature(payload: &[u8], secret: &str, timestamp: &str) -> String {
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    type HmacSha256 = Hmac<Sha256>;

    let signed_payload = format!("{}.{}", timestamp, String::from_utf8_lossy(payload));
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(signed_payload.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

#[test]
fn valid_signature_is_accepted() {
    let client = test_client();
    let payload = b"{\"type\":\"checkout.session.completed\"}";
    let timestamp = current_timestamp();
    let signature = compute_signature(payload, TEST_WEBHOOK_SECRET, &timestamp);
    let signature_header = format!("t={},v1={}", timestamp, signature);

    let result = client
        .verify_webhook_signature(payload, &signature_header)
        .expect("Verification should not error");

    assert!(result, "Valid signature should be accepted");
}

#[test]
fn wrong_secret_is_rejected() {
    let client = test_client();
    let payload = b"{\"type\":\"checkout.session.completed\"}";
    let timestamp = current_timestamp();
    let signature = compute_signature(payload, "wrong_secret", &timestamp);
    let signature_header = format!("t={},v1={}", timestamp, signature);

    let result = client
        .verify_webhook_signature(payload, &signature_header)
        .expect("Verification should not error");

    assert!(!result, "Invalid signature should be rejected");
}

#[test]
fn modified_payload_is_rejected() {
    let client = test_client();
    let original_payload = b"{\"type\":\"checkout.session.completed\"}";
    let modified_payload = b"{\"type\":\"checkout.session.completed\",\"hacked\":true}";
    let timestamp = current_timestamp();
    let signature = compute_signature(original_payload, TEST_WEBHOOK_SECRET, &timestamp);
    let signature_header = format!("t={},v1={}", timestamp, signature);

    let result = client
        .verify_webhook_signature(modified_payload, &signature_header)
        .expect("Verification should not error");

    assert!(!result, "Modified payload should be rejected");
}

#[test]
fn old_timestamp_is_rejected() {
    let client = test_client();
    let payload = b"{\"type\":\"checkout.session.completed\"}";
    let timestamp = old_timestamp();
    // Valid signature but timestamp too old
    let signature = compute_signature(payload, TEST_WEBHOOK_SECRET, &timestamp);
    let signature_header = format!("t={},v1={}", timestamp, signature);

    let result = client
        .verify_webhook_signature(payload, &signature_header)
        .expect("Verification should not error");

    assert!(
        !result,
        "Old timestamp should be rejected (replay attack prevention)"
    );
}

#[test]
fn future_timestamp_is_rejected() {
    let client = test_client();
    let payload = b"{\"type\":\"checkout.session.completed\"}";
    let timestamp = (chrono::Utc::now().timestamp() + 300).to_string();
    let signature = compute_signature(payload, TEST_WEBHOOK_SECRET, &timestamp);
    let signature_header = format!("t={},v1={}", timestamp, signature);

    let result = client
        .verify_webhook_signature(payload, &signature_header)
        .expect("Verification should not error");

    assert!(!result, "Future timestamp should be rejected");
}

#[test]
fn missing_timestamp_errors() {
    let client = test_client();
    let payload = b"{\"type\":\"checkout.session.completed\"}";
    let signature_header = "v1=somesignature";

    let result = client.verify_webhook_signature(payload, signature_header);

    assert!(result.is_err(), "Missing timestamp should error");
}

#[test]
fn missing_signature_errors() {
    let client = test_client();
    let payload = b"{\"type\":\"checkout.session.completed\"}";
    let signature_header = "t=1234567890";

    let result = client.verify_webhook_signature(payload, signature_header);

    assert!(result.is_err(), "Missing signature should error");
}

#[test]
fn malformed_header_errors() {
    let client = test_client();
    let payload = b"{\"type\":\"checkout.session.completed\"}";

    let result = client.verify_webhook_signature(payload, "garbage");

    assert!(result.is_err(), "Malformed header should error");
}

#[test]
fn missing_webhook_secret_is_a_config_error() {
    let client = StripeClient::new(reqwest::Client::new(), "sk_test_xxx".to_string(), None);
    let payload = b"{}";
    let timestamp = current_timestamp();
    let signature = compute_signature(payload, TEST_WEBHOOK_SECRET, &timestamp);
    let signature_header = format!("t={},v1={}", timestamp, signature);

    let result = client.verify_webhook_signature(payload, &signature_header);

    assert!(matches!(result, Err(AppError::Config(_))));
}

// ============ Event envelope parsing ============

#[test]
fn checkout_completed_event_parses_to_session_ref() {
    let body = r#"{
        "id": "evt_1",
        "type": "checkout.session.completed",
        "data": {
            "object": {
                "id": "cs_test_abc",
                "object": "checkout.session",
                "payment_status": "paid"
            }
        }
    }"#;

    let event: StripeWebhookEvent = serde_json::from_str(body).unwrap();
    assert_eq!(event.event_type, "checkout.session.completed");

    let session_ref: WebhookSessionRef = serde_json::from_value(event.data.object).unwrap();
    assert_eq!(session_ref.id, "cs_test_abc");
}

#[test]
fn unrelated_event_types_still_parse() {
    // The handler acknowledges these as no-ops; parsing must not reject them.
    let body = r#"{
        "id": "evt_2",
        "type": "payment_intent.created",
        "data": { "object": { "id": "pi_123" } }
    }"#;

    let event: StripeWebhookEvent = serde_json::from_str(body).unwrap();
    assert_eq!(event.event_type, "payment_intent.created");
}
