//! Test fixtures shared by the integration tests.

#![allow(dead_code)]

use std::sync::Mutex;

use bottega::catalog::{Catalog, Product};
use bottega::error::Result;
use bottega::fulfillment::{FulfillmentApi, FulfillmentOrder, OrderItem, Recipient};
use bottega::payments::{
    Address, CheckoutSession, CustomerDetails, LineItem, PriceRef, SessionMetadata,
    ShippingDetails,
};

pub const PRICE_PDF_ACQUA: &str = "price_pdf_acqua";
pub const PRICE_LIBRO_ACQUA: &str = "price_libro_acqua";
pub const PRICE_PDF_QUADERNI: &str = "price_pdf_quaderni";
pub const PRICE_LIBRO_QUADERNI: &str = "price_libro_quaderni";

/// Catalog used across the tests: one fully dispatchable publication, one
/// whose print edition has no provider variant, one digital-only.
pub fn test_catalog() -> Catalog {
    Catalog::new(vec![
        Product {
            slug: "acqua-gestione-risorsa-idrica".to_string(),
            title: "Acqua. La gestione di una risorsa idrica".to_string(),
            digital_price_id: Some(PRICE_PDF_ACQUA.to_string()),
            physical_price_id: Some(PRICE_LIBRO_ACQUA.to_string()),
            fulfillment_variant_id: Some(4011),
            digital_asset_path: Some("assets/acqua-gestione-risorsa-idrica.pdf".to_string()),
        },
        Product {
            slug: "quaderni-di-cantiere".to_string(),
            title: "Quaderni di cantiere".to_string(),
            digital_price_id: Some(PRICE_PDF_QUADERNI.to_string()),
            physical_price_id: Some(PRICE_LIBRO_QUADERNI.to_string()),
            fulfillment_variant_id: None,
            digital_asset_path: Some("assets/quaderni-di-cantiere.pdf".to_string()),
        },
        Product {
            slug: "relazione-geotecnica-guida".to_string(),
            title: "La relazione geotecnica. Guida pratica".to_string(),
            digital_price_id: Some("price_pdf_geotecnica".to_string()),
            physical_price_id: None,
            fulfillment_variant_id: None,
            digital_asset_path: Some("assets/relazione-geotecnica-guida.pdf".to_string()),
        },
    ])
}

pub fn line_item(price_id: &str, quantity: f64) -> LineItem {
    LineItem {
        id: Some(format!("li_{}", price_id)),
        quantity: Some(quantity),
        description: None,
        price: Some(PriceRef {
            id: price_id.to_string(),
        }),
    }
}

/// A line item whose price id Stripe reports but the catalog never issued.
pub fn foreign_line_item() -> LineItem {
    line_item("price_sconosciuto", 1.0)
}

pub fn domestic_address() -> Address {
    Address {
        line1: Some("Via Roma 12".to_string()),
        line2: None,
        city: Some("Verona".to_string()),
        state: Some("VR".to_string()),
        postal_code: Some("37121".to_string()),
        country: Some("IT".to_string()),
    }
}

pub fn paid_session(session_id: &str) -> CheckoutSession {
    CheckoutSession {
        id: session_id.to_string(),
        payment_status: "paid".to_string(),
        created: chrono::Utc::now().timestamp(),
        customer_details: Some(CustomerDetails {
            email: Some("cliente@example.com".to_string()),
            name: Some("Maria Rossi".to_string()),
            address: None,
            phone: None,
        }),
        shipping_details: Some(ShippingDetails {
            name: Some("Maria Rossi".to_string()),
            address: Some(domestic_address()),
            phone: None,
        }),
        metadata: SessionMetadata {
            slug: None,
            kind: None,
        },
        invoice: None,
        payment_intent: None,
    }
}

pub fn unpaid_session(session_id: &str) -> CheckoutSession {
    let mut session = paid_session(session_id);
    session.payment_status = "unpaid".to_string();
    session
}

#[derive(Debug)]
pub struct StoredOrder {
    pub order: FulfillmentOrder,
    pub recipient: Recipient,
    pub items: Vec<OrderItem>,
}

#[derive(Debug, Default)]
struct MockState {
    orders: Vec<StoredOrder>,
    find_calls: usize,
    create_calls: usize,
}

/// In-memory stand-in for the print provider.
#[derive(Debug, Default)]
pub struct MockFulfillment {
    state: Mutex<MockState>,
}

impl MockFulfillment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn order_count(&self) -> usize {
        self.state.lock().unwrap().orders.len()
    }

    pub fn find_calls(&self) -> usize {
        self.state.lock().unwrap().find_calls
    }

    pub fn create_calls(&self) -> usize {
        self.state.lock().unwrap().create_calls
    }

    pub fn total_calls(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.find_calls + state.create_calls
    }

    pub fn last_items(&self) -> Vec<OrderItem> {
        self.state
            .lock()
            .unwrap()
            .orders
            .last()
            .map(|stored| stored.items.clone())
            .unwrap_or_default()
    }
}

impl FulfillmentApi for MockFulfillment {
    async fn find_order_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<FulfillmentOrder>> {
        let mut state = self.state.lock().unwrap();
        state.find_calls += 1;
        Ok(state
            .orders
            .iter()
            .find(|stored| stored.order.external_id.as_deref() == Some(external_id))
            .map(|stored| stored.order.clone()))
    }

    async fn create_order(
        &self,
        external_id: &str,
        recipient: &Recipient,
        items: &[OrderItem],
    ) -> Result<FulfillmentOrder> {
        let mut state = self.state.lock().unwrap();
        state.create_calls += 1;
        let order = FulfillmentOrder {
            id: state.orders.len() as u64 + 1,
            external_id: Some(external_id.to_string()),
            status: Some("pending".to_string()),
        };
        state.orders.push(StoredOrder {
            order: order.clone(),
            recipient: recipient.clone(),
            items: items.to_vec(),
        });
        Ok(order)
    }
}
