//! Reconciliation of purchased line items against the catalog.
//!
//! Stripe reports purchases as opaque price ids; this module maps them back to
//! publications and aggregates quantities per (slug, variant). The fold is
//! order-independent: duplicate line items for the same pair merge into one
//! record.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::catalog::{Catalog, Variant};
use crate::payments::LineItem;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PurchaseRecord {
    pub slug: String,
    pub title: String,
    pub variant: Variant,
    pub quantity: u32,
}

impl PurchaseRecord {
    /// Substitute record when no line item maps to the catalog, so a
    /// confirmation still goes out instead of silence.
    pub fn unknown_order() -> Self {
        Self {
            slug: "ordine".to_string(),
            title: "Il tuo ordine".to_string(),
            variant: Variant::Digital,
            quantity: 1,
        }
    }
}

/// Coerce a raw quantity into a positive integer: default 1, floor any
/// fractional value, clamp below at 1.
pub fn normalize_quantity(raw: Option<f64>) -> u32 {
    match raw {
        Some(q) if q.is_finite() => (q.floor() as i64).max(1) as u32,
        _ => 1,
    }
}

/// Map line items to catalog entries and aggregate quantities per
/// (slug, variant).
///
/// Line items with an unknown price id contribute nothing. Returns an honest
/// empty list when nothing resolved; substituting [`PurchaseRecord::unknown_order`]
/// is the caller's call.
pub fn reconcile(line_items: &[LineItem], catalog: &Catalog) -> Vec<PurchaseRecord> {
    let mut aggregated: BTreeMap<String, PurchaseRecord> = BTreeMap::new();

    for item in line_items {
        let Some(price_id) = item.price.as_ref().map(|p| p.id.as_str()) else {
            continue;
        };
        let Some(entry) = catalog.resolve_price(price_id) else {
            continue;
        };

        let quantity = normalize_quantity(item.quantity);
        let key = format!("{}:{}", entry.slug, entry.variant.as_str());

        aggregated
            .entry(key)
            .and_modify(|record| record.quantity += quantity)
            .or_insert_with(|| PurchaseRecord {
                slug: entry.slug.clone(),
                title: entry.title.clone(),
                variant: entry.variant,
                quantity,
            });
    }

    aggregated.into_values().collect()
}
