//! # Pricing Catalog
//!
//! The read-only view of catalog, promotion, and usage-history data the
//! pricing engine needs.
//!
//! ## Why a Trait?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  orderline-db                          orderline-core                   │
//! │  ────────────                          ──────────────                   │
//! │  CatalogRepository::load_snapshot() ──► CatalogSnapshot                 │
//! │                                              │ impl PricingCatalog      │
//! │                                              ▼                          │
//! │                                         SummaryComposer::compose()      │
//! │                                                                         │
//! │  The database crate gathers exactly the rows a cart touches, then the   │
//! │  pure composer runs against the in-memory snapshot. Tests build the     │
//! │  same snapshot by hand.                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::types::{normalize_coupon_code, Coupon, FlashSale, Product, ProductVariant};

/// Read access to everything a quote depends on.
pub trait PricingCatalog {
    /// Looks up a product by id.
    fn product(&self, id: &str) -> Option<&Product>;

    /// Looks up a variant by id.
    fn variant(&self, id: &str) -> Option<&ProductVariant>;

    /// All flash sales defined for a product (active or not).
    fn flash_sales_for(&self, product_id: &str) -> &[FlashSale];

    /// Units of `flash_sale_id` already bought by `user_id`.
    fn flash_sale_purchased_by(&self, flash_sale_id: &str, user_id: &str) -> i64;

    /// Looks up a coupon by normalized code.
    fn coupon(&self, code: &str) -> Option<&Coupon>;

    /// Times `user_id` has redeemed `coupon_id`.
    fn coupon_used_by(&self, coupon_id: &str, user_id: &str) -> i64;

    /// The active flash sale for a product at `at`, if any.
    ///
    /// When several overlap, the lowest sale price wins (ties by id) so the
    /// choice is deterministic.
    fn active_flash_sale(&self, product_id: &str, at: DateTime<Utc>) -> Option<&FlashSale> {
        self.flash_sales_for(product_id)
            .iter()
            .filter(|sale| sale.is_active_at(at))
            .min_by(|a, b| {
                a.sale_price
                    .cmp(&b.sale_price)
                    .then_with(|| a.id.cmp(&b.id))
            })
    }
}

// =============================================================================
// Catalog Snapshot
// =============================================================================

/// In-memory [`PricingCatalog`].
///
/// ## Usage
/// ```rust
/// use orderline_core::catalog::{CatalogSnapshot, PricingCatalog};
///
/// let snapshot = CatalogSnapshot::new();
/// assert!(snapshot.product("missing").is_none());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CatalogSnapshot {
    products: HashMap<String, Product>,
    variants: HashMap<String, ProductVariant>,
    flash_sales: HashMap<String, Vec<FlashSale>>,
    flash_sale_purchases: HashMap<(String, String), i64>,
    coupons: HashMap<String, Coupon>,
    coupon_usages: HashMap<(String, String), i64>,
}

impl CatalogSnapshot {
    /// Creates an empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_product(&mut self, product: Product) {
        self.products.insert(product.id.clone(), product);
    }

    pub fn insert_variant(&mut self, variant: ProductVariant) {
        self.variants.insert(variant.id.clone(), variant);
    }

    pub fn insert_flash_sale(&mut self, sale: FlashSale) {
        self.flash_sales
            .entry(sale.product_id.clone())
            .or_default()
            .push(sale);
    }

    pub fn set_flash_sale_purchased(&mut self, flash_sale_id: &str, user_id: &str, quantity: i64) {
        self.flash_sale_purchases
            .insert((flash_sale_id.to_string(), user_id.to_string()), quantity);
    }

    pub fn insert_coupon(&mut self, coupon: Coupon) {
        self.coupons.insert(normalize_coupon_code(&coupon.code), coupon);
    }

    pub fn set_coupon_used(&mut self, coupon_id: &str, user_id: &str, count: i64) {
        self.coupon_usages
            .insert((coupon_id.to_string(), user_id.to_string()), count);
    }

    /// Builder-style [`insert_product`](Self::insert_product).
    pub fn with_product(mut self, product: Product) -> Self {
        self.insert_product(product);
        self
    }

    /// Builder-style [`insert_variant`](Self::insert_variant).
    pub fn with_variant(mut self, variant: ProductVariant) -> Self {
        self.insert_variant(variant);
        self
    }

    /// Builder-style [`insert_flash_sale`](Self::insert_flash_sale).
    pub fn with_flash_sale(mut self, sale: FlashSale) -> Self {
        self.insert_flash_sale(sale);
        self
    }

    /// Builder-style [`insert_coupon`](Self::insert_coupon).
    pub fn with_coupon(mut self, coupon: Coupon) -> Self {
        self.insert_coupon(coupon);
        self
    }
}

impl PricingCatalog for CatalogSnapshot {
    fn product(&self, id: &str) -> Option<&Product> {
        self.products.get(id)
    }

    fn variant(&self, id: &str) -> Option<&ProductVariant> {
        self.variants.get(id)
    }

    fn flash_sales_for(&self, product_id: &str) -> &[FlashSale] {
        self.flash_sales
            .get(product_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn flash_sale_purchased_by(&self, flash_sale_id: &str, user_id: &str) -> i64 {
        self.flash_sale_purchases
            .get(&(flash_sale_id.to_string(), user_id.to_string()))
            .copied()
            .unwrap_or(0)
    }

    fn coupon(&self, code: &str) -> Option<&Coupon> {
        self.coupons.get(&normalize_coupon_code(code))
    }

    fn coupon_used_by(&self, coupon_id: &str, user_id: &str) -> i64 {
        self.coupon_usages
            .get(&(coupon_id.to_string(), user_id.to_string()))
            .copied()
            .unwrap_or(0)
    }
}
