use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::catalog::Variant;
use crate::error::{AppError, Result};
use crate::fulfillment::ALLOWED_SHIP_COUNTRY;
use crate::util::extract_api_error;

type HmacSha256 = Hmac<Sha256>;

const STRIPE_API_BASE: &str = "https://api.stripe.com/v1";

/// Carts never exceed this; line-item pagination is drained up to here.
pub const LINE_ITEM_CAP: usize = 100;

// Note: products use pre-configured prices (price_xxx) from the Stripe
// dashboard, never ad-hoc price_data. The catalog's reverse index depends on
// the ids being stable.

#[derive(Debug, Deserialize)]
struct CreateCheckoutSessionResponse {
    id: String,
    url: String,
}

/// A checkout session as returned by Stripe. Read-only from our side: the
/// webhook and the download gate both refetch it rather than trusting any
/// client-supplied copy.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub payment_status: String,
    /// Unix timestamp of session creation; drives download-link expiry.
    pub created: i64,
    pub customer_details: Option<CustomerDetails>,
    pub shipping_details: Option<ShippingDetails>,
    #[serde(default)]
    pub metadata: SessionMetadata,
    pub invoice: Option<String>,
    pub payment_intent: Option<String>,
}

impl CheckoutSession {
    pub fn is_paid(&self) -> bool {
        self.payment_status == "paid"
    }

    pub fn customer_email(&self) -> Option<&str> {
        self.customer_details
            .as_ref()
            .and_then(|d| d.email.as_deref())
    }
}

/// Metadata we set at checkout-creation time so the webhook and the download
/// gate can tie the session back to the catalog.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionMetadata {
    pub slug: Option<String>,
    pub kind: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CustomerDetails {
    pub email: Option<String>,
    pub name: Option<String>,
    pub address: Option<Address>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShippingDetails {
    pub name: Option<String>,
    pub address: Option<Address>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Address {
    pub line1: Option<String>,
    pub line2: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LineItem {
    pub id: Option<String>,
    /// Deserialized as f64 so a malformed fractional quantity is normalized
    /// instead of failing the whole reconciliation.
    pub quantity: Option<f64>,
    pub description: Option<String>,
    pub price: Option<PriceRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PriceRef {
    pub id: String,
}

#[derive(Debug, Deserialize)]
struct LineItemPage {
    data: Vec<LineItem>,
    has_more: bool,
}

/// Links to the billing documents of a paid session. Every field is
/// best-effort; absent just means the lookup did not resolve.
#[derive(Debug, Clone, Default)]
pub struct InvoiceLinks {
    pub hosted_url: Option<String>,
    pub pdf_url: Option<String>,
    pub receipt_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InvoiceDoc {
    hosted_invoice_url: Option<String>,
    invoice_pdf: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PaymentIntentDoc {
    latest_charge: Option<ChargeDoc>,
}

#[derive(Debug, Deserialize)]
struct ChargeDoc {
    receipt_url: Option<String>,
}

/// Webhook envelope: the object is parsed further based on event type.
#[derive(Debug, Deserialize)]
pub struct StripeWebhookEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: StripeEventData,
}

#[derive(Debug, Deserialize)]
pub struct StripeEventData {
    pub object: serde_json::Value,
}

/// Minimal parse of a checkout-session event object. Only the id is trusted;
/// the authoritative session is refetched through the API.
#[derive(Debug, Deserialize)]
pub struct WebhookSessionRef {
    pub id: String,
}

#[derive(Debug, Clone)]
pub struct StripeClient {
    http: Client,
    secret_key: String,
    webhook_secret: Option<String>,
}

impl StripeClient {
    pub fn new(http: Client, secret_key: String, webhook_secret: Option<String>) -> Self {
        Self {
            http,
            secret_key,
            webhook_secret,
        }
    }

    /// Create a checkout session for a single publication variant.
    ///
    /// `slug` and the variant kind are stored as session metadata; the webhook
    /// and the download gate read them back later.
    pub async fn create_checkout_session(
        &self,
        price_id: &str,
        slug: &str,
        kind: Variant,
        success_url: &str,
        cancel_url: &str,
    ) -> Result<(String, String)> {
        let mut form: Vec<(String, String)> = vec![
            ("mode".into(), "payment".into()),
            ("success_url".into(), success_url.into()),
            ("cancel_url".into(), cancel_url.into()),
            ("line_items[0][price]".into(), price_id.into()),
            ("line_items[0][quantity]".into(), "1".into()),
            ("metadata[slug]".into(), slug.into()),
            ("metadata[kind]".into(), kind.as_str().into()),
        ];
        if kind == Variant::Physical {
            form.push((
                "shipping_address_collection[allowed_countries][0]".into(),
                ALLOWED_SHIP_COUNTRY.into(),
            ));
        }

        self.post_checkout_session(&form).await
    }

    /// Create a checkout session for a cart of `(price_id, quantity)` pairs.
    pub async fn create_cart_checkout_session(
        &self,
        items: &[(String, u32)],
        collect_shipping: bool,
        success_url: &str,
        cancel_url: &str,
    ) -> Result<(String, String)> {
        let mut form: Vec<(String, String)> = vec![
            ("mode".into(), "payment".into()),
            ("success_url".into(), success_url.into()),
            ("cancel_url".into(), cancel_url.into()),
            ("metadata[kind]".into(), "cart".into()),
        ];
        for (i, (price_id, quantity)) in items.iter().enumerate() {
            form.push((format!("line_items[{}][price]", i), price_id.clone()));
            form.push((format!("line_items[{}][quantity]", i), quantity.to_string()));
        }
        if collect_shipping {
            form.push((
                "shipping_address_collection[allowed_countries][0]".into(),
                ALLOWED_SHIP_COUNTRY.into(),
            ));
        }

        self.post_checkout_session(&form).await
    }

    async fn post_checkout_session(&self, form: &[(String, String)]) -> Result<(String, String)> {
        let response = self
            .http
            .post(format!("{}/checkout/sessions", STRIPE_API_BASE))
            .basic_auth(&self.secret_key, None::<&str>)
            .form(form)
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("Stripe API error: {}", e)))?;

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Upstream(format!(
                "Stripe API error: {}",
                extract_api_error(&body)
            )));
        }

        let session: CreateCheckoutSessionResponse = response
            .json()
            .await
            .map_err(|e| AppError::Upstream(format!("Failed to parse Stripe response: {}", e)))?;

        Ok((session.id, session.url))
    }

    /// Fetch the authoritative session state from Stripe.
    pub async fn retrieve_session(&self, session_id: &str) -> Result<CheckoutSession> {
        let response = self
            .http
            .get(format!("{}/checkout/sessions/{}", STRIPE_API_BASE, session_id))
            .basic_auth(&self.secret_key, None::<&str>)
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("Stripe API error: {}", e)))?;

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Upstream(format!(
                "Stripe session lookup failed: {}",
                extract_api_error(&body)
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::Upstream(format!("Failed to parse Stripe session: {}", e)))
    }

    /// List all line items of a session, draining pagination up to
    /// [`LINE_ITEM_CAP`].
    pub async fn list_line_items(&self, session_id: &str) -> Result<Vec<LineItem>> {
        let mut items: Vec<LineItem> = Vec::new();
        let mut starting_after: Option<String> = None;

        loop {
            let mut request = self
                .http
                .get(format!(
                    "{}/checkout/sessions/{}/line_items",
                    STRIPE_API_BASE, session_id
                ))
                .basic_auth(&self.secret_key, None::<&str>)
                .query(&[("limit", "100")]);
            if let Some(ref cursor) = starting_after {
                request = request.query(&[("starting_after", cursor.as_str())]);
            }

            let response = request
                .send()
                .await
                .map_err(|e| AppError::Upstream(format!("Stripe API error: {}", e)))?;

            if !response.status().is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(AppError::Upstream(format!(
                    "Stripe line-item lookup failed: {}",
                    extract_api_error(&body)
                )));
            }

            let page: LineItemPage = response.json().await.map_err(|e| {
                AppError::Upstream(format!("Failed to parse Stripe line items: {}", e))
            })?;

            let has_more = page.has_more;
            items.extend(page.data);

            if items.len() >= LINE_ITEM_CAP {
                items.truncate(LINE_ITEM_CAP);
                break;
            }
            if !has_more {
                break;
            }
            starting_after = match items.last().and_then(|i| i.id.clone()) {
                Some(id) => Some(id),
                None => break,
            };
        }

        Ok(items)
    }

    /// Resolve links to the session's billing documents.
    ///
    /// Every lookup is best-effort: a failing one is logged and leaves its
    /// field unset, it never aborts the caller.
    pub async fn retrieve_invoice_links(&self, session: &CheckoutSession) -> InvoiceLinks {
        let mut links = InvoiceLinks::default();

        if let Some(ref invoice_id) = session.invoice {
            match self.get_json::<InvoiceDoc>(&format!("invoices/{}", invoice_id)).await {
                Ok(invoice) => {
                    links.hosted_url = invoice.hosted_invoice_url;
                    links.pdf_url = invoice.invoice_pdf;
                }
                Err(e) => {
                    tracing::warn!(session_id = %session.id, "Invoice lookup failed: {}", e);
                }
            }
        }

        if let Some(ref intent_id) = session.payment_intent {
            let path = format!("payment_intents/{}?expand[]=latest_charge", intent_id);
            match self.get_json::<PaymentIntentDoc>(&path).await {
                Ok(intent) => {
                    links.receipt_url = intent.latest_charge.and_then(|c| c.receipt_url);
                }
                Err(e) => {
                    tracing::warn!(session_id = %session.id, "Receipt lookup failed: {}", e);
                }
            }
        }

        links
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self
            .http
            .get(format!("{}/{}", STRIPE_API_BASE, path))
            .basic_auth(&self.secret_key, None::<&str>)
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("Stripe API error: {}", e)))?;

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Upstream(extract_api_error(&body)));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::Upstream(format!("Failed to parse Stripe response: {}", e)))
    }

    /// Maximum age of a webhook timestamp before it's rejected (in seconds).
    /// Stripe recommends 300 seconds (5 minutes).
    const WEBHOOK_TIMESTAMP_TOLERANCE_SECS: i64 = 300;

    pub fn verify_webhook_signature(&self, payload: &[u8], signature: &str) -> Result<bool> {
        let webhook_secret = self
            .webhook_secret
            .as_deref()
            .ok_or_else(|| AppError::Config("STRIPE_WEBHOOK_SECRET".into()))?;

        // Stripe signature format: t=timestamp,v1=signature
        let parts: Vec<&str> = signature.split(',').collect();

        let mut timestamp = None;
        let mut sig_v1 = None;

        for part in parts {
            if let Some(t) = part.strip_prefix("t=") {
                timestamp = Some(t);
            } else if let Some(s) = part.strip_prefix("v1=") {
                sig_v1 = Some(s);
            }
        }

        let timestamp_str = timestamp
            .ok_or_else(|| AppError::BadRequest("Invalid signature format".into()))?;
        let sig_v1 =
            sig_v1.ok_or_else(|| AppError::BadRequest("Invalid signature format".into()))?;

        // Parse and validate timestamp to prevent replay attacks.
        let timestamp: i64 = timestamp_str
            .parse()
            .map_err(|_| AppError::BadRequest("Invalid timestamp in signature".into()))?;

        let now = chrono::Utc::now().timestamp();
        let age = now - timestamp;

        if age > Self::WEBHOOK_TIMESTAMP_TOLERANCE_SECS {
            tracing::warn!(
                "Stripe webhook rejected: timestamp too old (age={}s, max={}s)",
                age,
                Self::WEBHOOK_TIMESTAMP_TOLERANCE_SECS
            );
            return Ok(false);
        }

        // Also reject timestamps from the future (clock skew tolerance: 60 seconds)
        if age < -60 {
            tracing::warn!(
                "Stripe webhook rejected: timestamp in the future (age={}s)",
                age
            );
            return Ok(false);
        }

        let signed_payload = format!("{}.{}", timestamp_str, String::from_utf8_lossy(payload));

        let mut mac = HmacSha256::new_from_slice(webhook_secret.as_bytes())
            .map_err(|_| AppError::Internal("Invalid webhook secret".into()))?;
        mac.update(signed_payload.as_bytes());
        let expected = hex::encode(mac.finalize().into_bytes());

        // Constant-time comparison to prevent timing attacks. The length check
        // is not constant-time, but signature length is not secret (always 64
        // hex chars for SHA-256).
        let expected_bytes = expected.as_bytes();
        let provided_bytes = sig_v1.as_bytes();

        if expected_bytes.len() != provided_bytes.len() {
            return Ok(false);
        }

        Ok(expected_bytes.ct_eq(provided_bytes).into())
    }
}
