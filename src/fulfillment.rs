//! Dispatch of physical orders to the print provider.
//!
//! The central guarantee: at most one provider order per checkout session.
//! Orders are keyed by an external id derived from the session id, and the
//! provider is queried for that id before any create call. The query+create
//! pair is only as atomic as the provider itself; there is no local lock.

use std::collections::BTreeMap;
use std::future::Future;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::catalog::{Catalog, Variant};
use crate::error::{AppError, Result};
use crate::payments::{CheckoutSession, LineItem, StripeClient};
use crate::reconcile::normalize_quantity;
use crate::util::extract_api_error;

const PRINTFUL_API_BASE: &str = "https://api.printful.com";

/// Prefix for provider order external ids, followed by the session id.
pub const EXTERNAL_ID_PREFIX: &str = "web-";

/// The studio only ships domestically.
pub const ALLOWED_SHIP_COUNTRY: &str = "IT";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Recipient {
    pub name: String,
    pub address1: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address2: Option<String>,
    pub city: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_code: Option<String>,
    pub country_code: String,
    pub zip: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderItem {
    pub variant_id: u64,
    pub quantity: u32,
    pub name: String,
}

/// An order as the print provider reports it.
#[derive(Debug, Clone, Deserialize)]
pub struct FulfillmentOrder {
    pub id: u64,
    pub external_id: Option<String>,
    pub status: Option<String>,
}

/// Why a session produced no provider order. None of these are errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NotPaid,
    NoItems,
    /// Pure-digital orders land here; expected, not exceptional.
    NoPrintItems,
    MissingShipping,
    CountryNotAllowed,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::NotPaid => "not_paid",
            SkipReason::NoItems => "no_items",
            SkipReason::NoPrintItems => "no_print_items",
            SkipReason::MissingShipping => "missing_shipping",
            SkipReason::CountryNotAllowed => "country_not_allowed",
        }
    }
}

#[derive(Debug)]
pub enum DispatchOutcome {
    Skipped(SkipReason),
    Dispatched {
        /// False when the order already existed at the provider.
        created: bool,
        order: FulfillmentOrder,
    },
}

/// What would be sent to the provider for a given session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FulfillmentPlan {
    pub recipient: Recipient,
    pub items: Vec<OrderItem>,
}

/// The provider calls the dispatcher needs. Implemented by [`PrintfulClient`];
/// tests substitute an in-memory double.
pub trait FulfillmentApi {
    fn find_order_by_external_id(
        &self,
        external_id: &str,
    ) -> impl Future<Output = Result<Option<FulfillmentOrder>>> + Send;

    fn create_order(
        &self,
        external_id: &str,
        recipient: &Recipient,
        items: &[OrderItem],
    ) -> impl Future<Output = Result<FulfillmentOrder>> + Send;
}

/// Derive a shipping recipient from the session, if one is complete enough.
///
/// Stripe puts the collected address in `shipping_details`; some sessions
/// fold it into `customer_details` instead, so that is the fallback.
fn derive_recipient(session: &CheckoutSession) -> Option<Recipient> {
    let (name, address, phone) = match session.shipping_details {
        Some(ref shipping) if shipping.address.is_some() => (
            shipping.name.clone(),
            shipping.address.clone()?,
            shipping.phone.clone(),
        ),
        _ => {
            let customer = session.customer_details.as_ref()?;
            (
                customer.name.clone(),
                customer.address.clone()?,
                customer.phone.clone(),
            )
        }
    };

    Some(Recipient {
        name: name?,
        address1: address.line1?,
        address2: address.line2,
        city: address.city?,
        state_code: address.state,
        country_code: address.country?,
        zip: address.postal_code?,
        phone,
        email: session.customer_email().map(String::from),
    })
}

/// Decide what, if anything, a session ships.
///
/// Preconditions are checked in order, short-circuiting on the first failure:
/// paid, has line items, maps to at least one print variant, has a complete
/// recipient, ships to the supported country.
pub fn plan_order(
    session: &CheckoutSession,
    line_items: &[LineItem],
    catalog: &Catalog,
) -> std::result::Result<FulfillmentPlan, SkipReason> {
    if !session.is_paid() {
        return Err(SkipReason::NotPaid);
    }
    if line_items.is_empty() {
        return Err(SkipReason::NoItems);
    }

    let mut items: BTreeMap<u64, OrderItem> = BTreeMap::new();
    for item in line_items {
        let Some(price_id) = item.price.as_ref().map(|p| p.id.as_str()) else {
            continue;
        };
        let Some(entry) = catalog.resolve_price(price_id) else {
            continue;
        };
        if entry.variant != Variant::Physical {
            continue;
        }
        let Some(variant_id) = entry.fulfillment_variant_id else {
            continue;
        };

        let quantity = normalize_quantity(item.quantity);
        items
            .entry(variant_id)
            .and_modify(|order_item| order_item.quantity += quantity)
            .or_insert_with(|| OrderItem {
                variant_id,
                quantity,
                name: entry.title.clone(),
            });
    }

    if items.is_empty() {
        return Err(SkipReason::NoPrintItems);
    }

    let recipient = derive_recipient(session).ok_or(SkipReason::MissingShipping)?;
    if recipient.country_code != ALLOWED_SHIP_COUNTRY {
        return Err(SkipReason::CountryNotAllowed);
    }

    Ok(FulfillmentPlan {
        recipient,
        items: items.into_values().collect(),
    })
}

pub fn external_id_for(session_id: &str) -> String {
    format!("{}{}", EXTERNAL_ID_PREFIX, session_id)
}

/// Idempotently place (or retrieve) the provider order for a paid session.
pub async fn dispatch<F: FulfillmentApi>(
    stripe: &StripeClient,
    provider: &F,
    catalog: &Catalog,
    session_id: &str,
) -> Result<DispatchOutcome> {
    let session = stripe.retrieve_session(session_id).await?;
    let line_items = stripe.list_line_items(session_id).await?;
    dispatch_for_session(&session, &line_items, provider, catalog).await
}

/// Same as [`dispatch`], for callers that already hold the session facts.
pub async fn dispatch_for_session<F: FulfillmentApi>(
    session: &CheckoutSession,
    line_items: &[LineItem],
    provider: &F,
    catalog: &Catalog,
) -> Result<DispatchOutcome> {
    let plan = match plan_order(session, line_items, catalog) {
        Ok(plan) => plan,
        Err(reason) => return Ok(DispatchOutcome::Skipped(reason)),
    };

    let external_id = external_id_for(&session.id);

    // Lookup before create: a provider order already keyed by this session
    // means a retried webhook, not a new purchase.
    if let Some(existing) = provider.find_order_by_external_id(&external_id).await? {
        return Ok(DispatchOutcome::Dispatched {
            created: false,
            order: existing,
        });
    }

    let order = provider
        .create_order(&external_id, &plan.recipient, &plan.items)
        .await?;

    Ok(DispatchOutcome::Dispatched {
        created: true,
        order,
    })
}

#[derive(Debug, Serialize)]
struct CreateOrderRequest<'a> {
    external_id: &'a str,
    recipient: &'a Recipient,
    items: &'a [OrderItem],
}

#[derive(Debug, Deserialize)]
struct PrintfulEnvelope<T> {
    result: T,
}

#[derive(Debug, Clone)]
pub struct PrintfulClient {
    http: Client,
    api_key: String,
}

impl PrintfulClient {
    pub fn new(http: Client, api_key: String) -> Self {
        Self { http, api_key }
    }
}

impl FulfillmentApi for PrintfulClient {
    async fn find_order_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<FulfillmentOrder>> {
        let response = self
            .http
            .get(format!("{}/orders/@{}", PRINTFUL_API_BASE, external_id))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("Printful API error: {}", e)))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Upstream(format!(
                "Printful order lookup failed: {}",
                extract_api_error(&body)
            )));
        }

        let envelope: PrintfulEnvelope<FulfillmentOrder> = response
            .json()
            .await
            .map_err(|e| AppError::Upstream(format!("Failed to parse Printful order: {}", e)))?;

        Ok(Some(envelope.result))
    }

    async fn create_order(
        &self,
        external_id: &str,
        recipient: &Recipient,
        items: &[OrderItem],
    ) -> Result<FulfillmentOrder> {
        let request = CreateOrderRequest {
            external_id,
            recipient,
            items,
        };

        // confirm=1: the order enters the fulfillment queue immediately
        // instead of being saved as a draft.
        let response = self
            .http
            .post(format!("{}/orders", PRINTFUL_API_BASE))
            .query(&[("confirm", "1")])
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("Printful API error: {}", e)))?;

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Upstream(format!(
                "Printful order creation failed: {}",
                extract_api_error(&body)
            )));
        }

        let envelope: PrintfulEnvelope<FulfillmentOrder> = response
            .json()
            .await
            .map_err(|e| AppError::Upstream(format!("Failed to parse Printful order: {}", e)))?;

        Ok(envelope.result)
    }
}
