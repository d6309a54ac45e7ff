//! # Order Summary Composer
//!
//! Turns a cart into a complete, priced order summary. This is the single
//! computation shared by quoting and checkout.
//!
//! ## Composition Pipeline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  QuoteRequest                                                           │
//! │      │                                                                  │
//! │      ▼  1. PriceResolver (every line, abort on first failure)           │
//! │  [LineItem, ...]                                                        │
//! │      │                                                                  │
//! │      ▼  2. subtotal = Σ line_total                                      │
//! │      ▼  3. CouponEvaluator(subtotal) → discount (or 0)                  │
//! │      ▼  4. taxable_base = max(subtotal - discount, 0)                   │
//! │      ▼  5. tax = taxable_base × rate                                    │
//! │      ▼  6. ShippingRateProvider(Σ weight) + free-shipping policy        │
//! │      ▼  7. grand_total = subtotal - discount + tax + shipping           │
//! │                                                                         │
//! │  OrderSummary   (all-or-nothing: no partial totals on error)            │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//! ```rust
//! use chrono::Utc;
//! use orderline_core::catalog::CatalogSnapshot;
//! use orderline_core::money::Money;
//! use orderline_core::pricing::PricingConfig;
//! use orderline_core::shipping::{FlatRateShipping, ShippingRequest};
//! use orderline_core::summary::{QuoteRequest, SummaryComposer};
//! use orderline_core::error::PricingError;
//!
//! let catalog = CatalogSnapshot::new();
//! let config = PricingConfig::default();
//! let shipping = FlatRateShipping::new(Money::from_minor(10_000), 2);
//! let composer = SummaryComposer::new(&catalog, &config, &shipping);
//!
//! let request = QuoteRequest::retail(vec![], ShippingRequest::new("bandung", "jakarta"));
//! assert_eq!(composer.compose(&request, Utc::now()), Err(PricingError::EmptyCart));
//! ```

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use ts_rs::TS;

use crate::catalog::PricingCatalog;
use crate::coupon::{AppliedCoupon, CouponEvaluator};
use crate::error::{PricingError, PricingResult};
use crate::money::Money;
use crate::pricing::{ItemRequest, LineItem, PriceResolver, PricingConfig};
use crate::shipping::{resolve_shipping, ShippingRateProvider, ShippingRequest};
use crate::tax::{compute_tax, taxable_base};
use crate::types::{CustomerTier, TaxRate};
use crate::validation::validate_cart_size;
use crate::MAX_CART_ITEMS;

// =============================================================================
// Request
// =============================================================================

/// Everything a quote depends on besides the catalog and the instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct QuoteRequest {
    pub items: Vec<ItemRequest>,
    pub shipping: ShippingRequest,
    #[serde(default)]
    pub tier: CustomerTier,
    #[serde(default)]
    pub coupon_code: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

impl QuoteRequest {
    /// Anonymous retail quote without a coupon.
    pub fn retail(items: Vec<ItemRequest>, shipping: ShippingRequest) -> Self {
        Self {
            items,
            shipping,
            tier: CustomerTier::Retail,
            coupon_code: None,
            user_id: None,
        }
    }

    pub fn with_tier(mut self, tier: CustomerTier) -> Self {
        self.tier = tier;
        self
    }

    pub fn with_coupon(mut self, code: impl Into<String>) -> Self {
        self.coupon_code = Some(code.into());
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Coupon code if one was given and it is not blank.
    pub fn effective_coupon_code(&self) -> Option<&str> {
        self.coupon_code
            .as_deref()
            .map(str::trim)
            .filter(|code| !code.is_empty())
    }
}

// =============================================================================
// Summary
// =============================================================================

/// A fully priced cart.
///
/// ## Invariants
/// - `grand_total == subtotal - discount + tax + shipping_cost`
/// - `grand_total >= 0`
/// - `discount <= subtotal`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct OrderSummary {
    pub lines: Vec<LineItem>,
    pub subtotal: Money,
    pub coupon: Option<AppliedCoupon>,
    pub discount: Money,
    pub taxable_base: Money,
    pub tax_rate: TaxRate,
    pub tax: Money,
    pub total_weight_grams: i64,
    pub shipping_cost: Money,
    pub shipping_estimated_days: u32,
    pub free_shipping: bool,
    pub grand_total: Money,
    pub evaluated_at: DateTime<Utc>,
}

impl OrderSummary {
    /// Checks the arithmetic invariants.
    pub fn is_consistent(&self) -> bool {
        let lines_total: Money = self.lines.iter().map(|line| line.line_total).sum();
        lines_total == self.subtotal
            && self.discount <= self.subtotal
            && self.grand_total == self.subtotal - self.discount + self.tax + self.shipping_cost
            && !self.grand_total.is_negative()
    }

    pub fn coupon_code(&self) -> Option<&str> {
        self.coupon.as_ref().map(|c| c.code.as_str())
    }

    pub fn item_count(&self) -> i64 {
        self.lines.iter().map(|line| line.quantity).sum()
    }
}

// =============================================================================
// Composer
// =============================================================================

/// Composes summaries from a catalog, pricing rules, and a shipping provider.
pub struct SummaryComposer<'a, C: PricingCatalog + ?Sized> {
    catalog: &'a C,
    config: &'a PricingConfig,
    shipping: &'a dyn ShippingRateProvider,
}

impl<'a, C: PricingCatalog + ?Sized> SummaryComposer<'a, C> {
    pub fn new(
        catalog: &'a C,
        config: &'a PricingConfig,
        shipping: &'a dyn ShippingRateProvider,
    ) -> Self {
        Self {
            catalog,
            config,
            shipping,
        }
    }

    /// Prices `request` at instant `at`.
    pub fn compose(&self, request: &QuoteRequest, at: DateTime<Utc>) -> PricingResult<OrderSummary> {
        if request.items.is_empty() {
            return Err(PricingError::EmptyCart);
        }
        validate_cart_size(request.items.len())
            .map_err(|_| PricingError::CartTooLarge { max: MAX_CART_ITEMS })?;

        let user_id = request.user_id.as_deref();

        // 1. Lines
        let resolver = PriceResolver::new(self.catalog, self.config);
        let mut claimed = HashMap::new();
        let lines = request
            .items
            .iter()
            .map(|item| resolver.resolve_in_cart(item, request.tier, user_id, at, &mut claimed))
            .collect::<PricingResult<Vec<_>>>()?;

        // 2. Subtotal
        let subtotal: Money = lines.iter().map(|line| line.line_total).sum();

        // 3. Coupon
        let coupon = match request.effective_coupon_code() {
            Some(code) => Some(CouponEvaluator::new(self.catalog).evaluate(
                code,
                user_id,
                subtotal,
                request.tier,
                at,
            )?),
            None => None,
        };
        let discount = coupon.as_ref().map_or(Money::zero(), |c| c.discount);

        // 4-5. Tax
        let taxable_base = taxable_base(subtotal, discount);
        let tax = compute_tax(taxable_base, self.config.tax_rate);

        // 6. Shipping
        let total_weight_grams: i64 = lines.iter().map(|line| line.line_weight_grams).sum();
        let shipping = resolve_shipping(
            self.shipping,
            &request.shipping,
            total_weight_grams,
            subtotal - discount,
            self.config.free_shipping_threshold,
            coupon.as_ref().map_or(false, |c| c.free_shipping),
        )?;

        // 7. Grand total
        let grand_total = subtotal - discount + tax + shipping.cost;

        debug!(
            lines = lines.len(),
            subtotal = %subtotal,
            discount = %discount,
            tax = %tax,
            shipping = %shipping.cost,
            grand_total = %grand_total,
            "Composed order summary"
        );

        Ok(OrderSummary {
            lines,
            subtotal,
            coupon,
            discount,
            taxable_base,
            tax_rate: self.config.tax_rate,
            tax,
            total_weight_grams,
            shipping_cost: shipping.cost,
            shipping_estimated_days: shipping.estimated_days,
            free_shipping: shipping.free_shipping,
            grand_total,
            evaluated_at: at,
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CatalogSnapshot;
    use crate::error::ShippingError;
    use crate::pricing::PriceSource;
    use crate::shipping::{FlatRateShipping, ShippingQuote, WeightTieredShipping};
    use crate::types::{Coupon, CouponStatus, DiscountKind, FlashSale, Product};
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 11, 0, 0).unwrap()
    }

    fn product(id: &str, price: i64) -> Product {
        Product {
            id: id.to_string(),
            sku: format!("SKU-{}", id),
            name: format!("Product {}", id),
            base_price: Money::from_minor(price),
            weight_grams: 400,
            stock: 10,
            is_active: true,
            created_at: now(),
            updated_at: now(),
        }
    }

    fn coupon(code: &str, kind: DiscountKind, value: i64) -> Coupon {
        Coupon {
            id: format!("c-{}", code),
            code: code.to_string(),
            name: format!("Promo {}", code),
            kind,
            value,
            max_discount: None,
            min_purchase: Money::zero(),
            max_usage_count: None,
            max_usage_per_user: None,
            valid_from: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
            valid_until: Utc.with_ymd_and_hms(2026, 12, 31, 0, 0, 0).unwrap(),
            status: CouponStatus::Active,
            for_retail: true,
            for_reseller: true,
            free_shipping: false,
            usage_count: 0,
        }
    }

    fn flat() -> FlatRateShipping {
        FlatRateShipping::new(Money::from_minor(10_000), 2)
    }

    fn request(items: Vec<ItemRequest>) -> QuoteRequest {
        QuoteRequest::retail(items, ShippingRequest::new("bandung", "jakarta"))
    }

    struct Down;

    impl ShippingRateProvider for Down {
        fn quote(&self, _: &str, _: &str, _: i64) -> Result<ShippingQuote, ShippingError> {
            Err(ShippingError::Timeout(10))
        }
    }

    #[test]
    fn test_basic_retail_scenario() {
        let catalog = CatalogSnapshot::new().with_product(product("A", 50_000));
        let config = PricingConfig::default();
        let shipping = flat();
        let composer = SummaryComposer::new(&catalog, &config, &shipping);

        let summary = composer
            .compose(&request(vec![ItemRequest::new("A", 2)]), now())
            .unwrap();

        assert_eq!(summary.subtotal.minor(), 100_000);
        assert_eq!(summary.discount.minor(), 0);
        assert_eq!(summary.tax.minor(), 11_000);
        assert_eq!(summary.shipping_cost.minor(), 10_000);
        assert_eq!(summary.grand_total.minor(), 121_000);
        assert_eq!(summary.total_weight_grams, 800);
        assert!(summary.is_consistent());
    }

    #[test]
    fn test_percentage_coupon_scenario() {
        let catalog = CatalogSnapshot::new()
            .with_product(product("A", 50_000))
            .with_coupon(coupon("SALE10", DiscountKind::Percentage, 10));
        let config = PricingConfig::default();
        let shipping = flat();
        let composer = SummaryComposer::new(&catalog, &config, &shipping);

        let summary = composer
            .compose(&request(vec![ItemRequest::new("A", 2)]).with_coupon("SALE10"), now())
            .unwrap();

        assert_eq!(summary.discount.minor(), 10_000);
        assert_eq!(summary.taxable_base.minor(), 90_000);
        assert_eq!(summary.tax.minor(), 9_900);
        assert_eq!(summary.grand_total.minor(), 109_900);
        assert_eq!(summary.coupon_code(), Some("SALE10"));
        assert!(summary.is_consistent());
    }

    #[test]
    fn test_exhausted_coupon_aborts_summary() {
        let mut capped = coupon("ONCE", DiscountKind::Percentage, 10);
        capped.max_usage_count = Some(1);
        capped.usage_count = 1;
        let catalog = CatalogSnapshot::new()
            .with_product(product("A", 50_000))
            .with_coupon(capped);
        let config = PricingConfig::default();
        let shipping = flat();
        let composer = SummaryComposer::new(&catalog, &config, &shipping);

        let result = composer.compose(&request(vec![ItemRequest::new("A", 2)]).with_coupon("ONCE"), now());
        assert_eq!(result, Err(PricingError::CouponUsageExceeded("ONCE".to_string())));
    }

    #[test]
    fn test_fixed_coupon_larger_than_subtotal() {
        let catalog = CatalogSnapshot::new()
            .with_product(product("A", 50_000))
            .with_coupon(coupon("FLAT", DiscountKind::Fixed, 80_000));
        let config = PricingConfig::default();
        let shipping = flat();
        let composer = SummaryComposer::new(&catalog, &config, &shipping);

        let summary = composer
            .compose(&request(vec![ItemRequest::new("A", 1)]).with_coupon("FLAT"), now())
            .unwrap();
        assert_eq!(summary.discount.minor(), 50_000);
        assert!(summary.taxable_base.is_zero());
        assert!(summary.tax.is_zero());
        assert_eq!(summary.grand_total.minor(), 10_000);
        assert!(summary.is_consistent());
    }

    #[test]
    fn test_reseller_with_flash_sale_uses_sale_price_only() {
        let catalog = CatalogSnapshot::new()
            .with_product(product("A", 50_000))
            .with_product(product("B", 20_000))
            .with_flash_sale(FlashSale {
                id: "fs-1".to_string(),
                product_id: "A".to_string(),
                sale_price: Money::from_minor(35_000),
                starts_at: Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap(),
                ends_at: Utc.with_ymd_and_hms(2026, 3, 2, 0, 0, 0).unwrap(),
                per_user_limit: None,
                stock_cap: None,
                sold_count: 0,
            });
        let config = PricingConfig::default();
        let shipping = flat();
        let composer = SummaryComposer::new(&catalog, &config, &shipping);

        let summary = composer
            .compose(
                &request(vec![ItemRequest::new("A", 1), ItemRequest::new("B", 1)])
                    .with_tier(CustomerTier::Reseller),
                now(),
            )
            .unwrap();

        assert_eq!(summary.lines[0].price_source, PriceSource::FlashSale);
        assert_eq!(summary.lines[0].unit_price.minor(), 35_000);
        assert_eq!(summary.lines[1].price_source, PriceSource::Tier);
        assert_eq!(summary.lines[1].unit_price.minor(), 18_000);
        assert_eq!(summary.subtotal.minor(), 53_000);
    }

    #[test]
    fn test_flash_sale_caps_count_earlier_lines_of_the_cart() {
        let sale = |per_user_limit, stock_cap| FlashSale {
            id: "fs-1".to_string(),
            product_id: "A".to_string(),
            sale_price: Money::from_minor(40_000),
            starts_at: Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap(),
            ends_at: Utc.with_ymd_and_hms(2026, 3, 2, 0, 0, 0).unwrap(),
            per_user_limit,
            stock_cap,
            sold_count: 0,
        };
        let config = PricingConfig::default();
        let shipping = flat();
        let two_lines = || request(vec![ItemRequest::new("A", 2), ItemRequest::new("A", 2)]);
        let sources = |summary: &OrderSummary| {
            summary
                .lines
                .iter()
                .map(|line| (line.price_source, line.unit_price.minor()))
                .collect::<Vec<_>>()
        };

        // Per-user cap of 2: only the first line fits.
        let catalog = CatalogSnapshot::new()
            .with_product(product("A", 50_000))
            .with_flash_sale(sale(Some(2), None));
        let summary = SummaryComposer::new(&catalog, &config, &shipping)
            .compose(&two_lines().with_user("u-1"), now())
            .unwrap();
        assert_eq!(
            sources(&summary),
            vec![(PriceSource::FlashSale, 40_000), (PriceSource::Base, 50_000)]
        );
        assert_eq!(summary.lines[1].flash_sale_id, None);

        // Stock cap of 3 applies to anonymous carts too.
        let catalog = CatalogSnapshot::new()
            .with_product(product("A", 50_000))
            .with_flash_sale(sale(None, Some(3)));
        let summary = SummaryComposer::new(&catalog, &config, &shipping)
            .compose(&two_lines(), now())
            .unwrap();
        assert_eq!(
            sources(&summary),
            vec![(PriceSource::FlashSale, 40_000), (PriceSource::Base, 50_000)]
        );

        // A later line that still fits keeps the sale price.
        let summary = SummaryComposer::new(&catalog, &config, &shipping)
            .compose(
                &request(vec![ItemRequest::new("A", 2), ItemRequest::new("A", 1)]),
                now(),
            )
            .unwrap();
        assert_eq!(
            sources(&summary),
            vec![(PriceSource::FlashSale, 40_000), (PriceSource::FlashSale, 40_000)]
        );
    }

    #[test]
    fn test_free_shipping_threshold_uses_discounted_subtotal() {
        let catalog = CatalogSnapshot::new()
            .with_product(product("A", 50_000))
            .with_coupon(coupon("SALE10", DiscountKind::Percentage, 10));
        let config = PricingConfig {
            free_shipping_threshold: Some(Money::from_minor(100_000)),
            ..PricingConfig::default()
        };
        let shipping = flat();
        let composer = SummaryComposer::new(&catalog, &config, &shipping);

        let without_coupon = composer
            .compose(&request(vec![ItemRequest::new("A", 2)]), now())
            .unwrap();
        assert!(without_coupon.free_shipping);
        assert!(without_coupon.shipping_cost.is_zero());
        assert_eq!(without_coupon.shipping_estimated_days, 2);

        let with_coupon = composer
            .compose(&request(vec![ItemRequest::new("A", 2)]).with_coupon("SALE10"), now())
            .unwrap();
        assert!(!with_coupon.free_shipping);
        assert_eq!(with_coupon.shipping_cost.minor(), 10_000);
    }

    #[test]
    fn test_weight_drives_shipping_cost() {
        let catalog = CatalogSnapshot::new().with_product(product("A", 50_000));
        let config = PricingConfig::default();
        let shipping = WeightTieredShipping::new(Money::from_minor(9_000), Money::from_minor(7_000), 3);
        let composer = SummaryComposer::new(&catalog, &config, &shipping);

        // 3 × 400 g = 1.2 kg → 2 billable kg
        let summary = composer
            .compose(&request(vec![ItemRequest::new("A", 3)]), now())
            .unwrap();
        assert_eq!(summary.shipping_cost.minor(), 16_000);
    }

    #[test]
    fn test_all_or_nothing_failures() {
        let catalog = CatalogSnapshot::new().with_product(product("A", 50_000));
        let config = PricingConfig::default();
        let shipping = flat();
        let composer = SummaryComposer::new(&catalog, &config, &shipping);

        assert_eq!(composer.compose(&request(vec![]), now()), Err(PricingError::EmptyCart));
        assert!(matches!(
            composer.compose(&request(vec![ItemRequest::new("A", 1), ItemRequest::new("X", 1)]), now()),
            Err(PricingError::ProductNotFound(_))
        ));
        assert!(matches!(
            composer.compose(&request(vec![ItemRequest::new("A", 1)]).with_coupon("GHOST"), now()),
            Err(PricingError::CouponNotFound(_))
        ));

        let too_many = (0..=MAX_CART_ITEMS).map(|_| ItemRequest::new("A", 1)).collect();
        assert_eq!(
            composer.compose(&request(too_many), now()),
            Err(PricingError::CartTooLarge { max: MAX_CART_ITEMS })
        );

        let down = Down;
        let composer = SummaryComposer::new(&catalog, &config, &down);
        let err = composer
            .compose(&request(vec![ItemRequest::new("A", 1)]), now())
            .unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn test_blank_coupon_code_is_ignored() {
        let catalog = CatalogSnapshot::new().with_product(product("A", 50_000));
        let config = PricingConfig::default();
        let shipping = flat();
        let composer = SummaryComposer::new(&catalog, &config, &shipping);

        let summary = composer
            .compose(&request(vec![ItemRequest::new("A", 1)]).with_coupon("   "), now())
            .unwrap();
        assert!(summary.coupon.is_none());
    }

    #[test]
    fn test_same_instant_same_total() {
        let catalog = CatalogSnapshot::new()
            .with_product(product("A", 33_333))
            .with_coupon(coupon("SALE10", DiscountKind::Percentage, 7));
        let config = PricingConfig::default();
        let shipping = flat();
        let composer = SummaryComposer::new(&catalog, &config, &shipping);
        let req = request(vec![ItemRequest::new("A", 3)]).with_coupon("sale10");

        let first = composer.compose(&req, now()).unwrap();
        let second = composer.compose(&req, now()).unwrap();
        assert_eq!(first, second);
        assert!(first.is_consistent());
    }
}
