//! Product catalog for the studio's publications.
//!
//! The catalog is built once at startup and is immutable afterwards. Besides
//! the slug lookup it precomputes a reverse index from Stripe price id to
//! (product, variant), which is what webhook reconciliation works from.

use std::collections::HashMap;

use serde::Serialize;

/// Purchasable form of a publication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    /// Downloadable PDF.
    Digital,
    /// Printed copy, shipped via the print provider.
    Physical,
}

impl Variant {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "digital" => Some(Variant::Digital),
            "physical" => Some(Variant::Physical),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Variant::Digital => "digital",
            Variant::Physical => "physical",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Product {
    pub slug: String,
    pub title: String,
    /// Stripe price id for the downloadable variant, if sold.
    pub digital_price_id: Option<String>,
    /// Stripe price id for the printed variant, if sold.
    pub physical_price_id: Option<String>,
    /// Variant id at the print provider. A product with a physical price but
    /// no variant id is still sellable; it just never reaches automated
    /// dispatch.
    pub fulfillment_variant_id: Option<u64>,
    /// Server-local path of the protected PDF, if the product is downloadable.
    pub digital_asset_path: Option<String>,
}

/// One entry of the reverse price index.
#[derive(Debug, Clone)]
pub struct PriceEntry {
    pub slug: String,
    pub title: String,
    pub variant: Variant,
    /// Present only on physical entries of products eligible for dispatch.
    pub fulfillment_variant_id: Option<u64>,
}

#[derive(Debug)]
pub struct Catalog {
    by_slug: HashMap<String, Product>,
    by_price: HashMap<String, PriceEntry>,
}

impl Catalog {
    pub fn new(products: Vec<Product>) -> Self {
        let mut by_slug = HashMap::new();
        let mut by_price = HashMap::new();

        for product in products {
            if let Some(ref price_id) = product.digital_price_id {
                by_price.insert(
                    price_id.clone(),
                    PriceEntry {
                        slug: product.slug.clone(),
                        title: product.title.clone(),
                        variant: Variant::Digital,
                        fulfillment_variant_id: None,
                    },
                );
            }
            if let Some(ref price_id) = product.physical_price_id {
                by_price.insert(
                    price_id.clone(),
                    PriceEntry {
                        slug: product.slug.clone(),
                        title: product.title.clone(),
                        variant: Variant::Physical,
                        fulfillment_variant_id: product.fulfillment_variant_id,
                    },
                );
            }
            by_slug.insert(product.slug.clone(), product);
        }

        Self { by_slug, by_price }
    }

    /// The publications currently on sale. Price ids are the live ones from
    /// the Stripe dashboard; variant ids come from the Printful store.
    pub fn builtin() -> Self {
        Self::new(vec![
            Product {
                slug: "acqua-gestione-risorsa-idrica".to_string(),
                title: "Acqua. La gestione di una risorsa idrica".to_string(),
                digital_price_id: Some("price_1OYwQhLxTmAvVzKcR2dGnPjS".to_string()),
                physical_price_id: Some("price_1OYwRfLxTmAvVzKcUq8eWb3M".to_string()),
                fulfillment_variant_id: Some(4011),
                digital_asset_path: Some("assets/acqua-gestione-risorsa-idrica.pdf".to_string()),
            },
            Product {
                slug: "quaderni-di-cantiere".to_string(),
                title: "Quaderni di cantiere".to_string(),
                digital_price_id: Some("price_1PBtKeLxTmAvVzKcMhX0aRwD".to_string()),
                physical_price_id: Some("price_1PBtLsLxTmAvVzKcJf4yQn7T".to_string()),
                // Print edition handled manually for now; no store variant yet.
                fulfillment_variant_id: None,
                digital_asset_path: Some("assets/quaderni-di-cantiere.pdf".to_string()),
            },
            Product {
                slug: "relazione-geotecnica-guida".to_string(),
                title: "La relazione geotecnica. Guida pratica".to_string(),
                digital_price_id: Some("price_1PKm2vLxTmAvVzKcTg6bZe9H".to_string()),
                physical_price_id: None,
                fulfillment_variant_id: None,
                digital_asset_path: Some("assets/relazione-geotecnica-guida.pdf".to_string()),
            },
        ])
    }

    pub fn lookup(&self, slug: &str) -> Option<&Product> {
        self.by_slug.get(slug)
    }

    /// Reverse lookup: Stripe price id to catalog entry.
    pub fn resolve_price(&self, price_id: &str) -> Option<&PriceEntry> {
        self.by_price.get(price_id)
    }

    pub fn len(&self) -> usize {
        self.by_slug.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_slug.is_empty()
    }
}
