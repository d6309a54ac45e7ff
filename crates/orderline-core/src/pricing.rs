//! # Price Resolver
//!
//! Resolves the unit price of one cart line.
//!
//! ## Resolution Order
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  1. Base        variant.price_override ?? product.base_price            │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  2. Tier        Reseller only: greatest tier with min_quantity <= qty   │
//! │        │        price = base × (1 - discount_bps / 10000)               │
//! │        ▼                                                                │
//! │  3. FlashSale   active sale on the product that admits qty?             │
//! │        │          yes → price = sale_price  (REPLACES tier price)       │
//! │        │          no  → keep tier price     (line is never split)       │
//! │        ▼                                                                │
//! │  LineItem { unit_price, line_total = unit_price × qty, price_source }   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A flash sale and a reseller discount never stack: the sale price is a
//! final price, not a further discount.
//!
//! Within one cart the caps count every earlier line that got the sale
//! price, see [`PriceResolver::resolve_in_cart`].

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use ts_rs::TS;

use crate::catalog::PricingCatalog;
use crate::error::{PricingError, PricingResult, ValidationError};
use crate::money::Money;
use crate::tax::DEFAULT_TAX_RATE;
use crate::types::{CustomerTier, TaxRate};
use crate::validation::{validate_discount_bps, validate_quantity, validate_tax_rate_bps, ValidationResult};

// =============================================================================
// Configuration
// =============================================================================

/// One step of the reseller discount table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResellerTier {
    /// Smallest line quantity this step applies to.
    pub min_quantity: i64,
    /// Discount off the base price, in basis points.
    pub discount_bps: u32,
}

/// Pricing rules shared by quoting and checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingConfig {
    pub tax_rate: TaxRate,
    pub reseller_tiers: Vec<ResellerTier>,
    /// Orders whose discounted subtotal reaches this amount ship free.
    pub free_shipping_threshold: Option<Money>,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            tax_rate: DEFAULT_TAX_RATE,
            reseller_tiers: vec![
                ResellerTier { min_quantity: 1, discount_bps: 1_000 },
                ResellerTier { min_quantity: 12, discount_bps: 1_500 },
                ResellerTier { min_quantity: 48, discount_bps: 2_000 },
            ],
            free_shipping_threshold: None,
        }
    }
}

impl PricingConfig {
    /// Discount for a reseller buying `quantity` units, `None` below the
    /// smallest tier.
    ///
    /// ## Example
    /// ```rust
    /// use orderline_core::pricing::PricingConfig;
    ///
    /// let config = PricingConfig::default();
    /// assert_eq!(config.reseller_discount_bps(1), Some(1_000));
    /// assert_eq!(config.reseller_discount_bps(12), Some(1_500));
    /// assert_eq!(config.reseller_discount_bps(47), Some(1_500));
    /// ```
    pub fn reseller_discount_bps(&self, quantity: i64) -> Option<u32> {
        self.reseller_tiers
            .iter()
            .filter(|tier| tier.min_quantity <= quantity)
            .max_by_key(|tier| tier.min_quantity)
            .map(|tier| tier.discount_bps)
    }

    /// Checks rates and tier definitions.
    pub fn validate(&self) -> ValidationResult<()> {
        validate_tax_rate_bps(self.tax_rate.bps())?;
        for tier in &self.reseller_tiers {
            validate_discount_bps(tier.discount_bps)?;
            validate_quantity(tier.min_quantity)?;
        }
        if let Some(threshold) = self.free_shipping_threshold {
            crate::validation::validate_price("free_shipping_threshold", threshold.minor())?;
        }
        Ok(())
    }
}

// =============================================================================
// Request / Result Types
// =============================================================================

/// One requested cart line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ItemRequest {
    pub product_id: String,
    pub variant_id: Option<String>,
    pub quantity: i64,
}

impl ItemRequest {
    pub fn new(product_id: impl Into<String>, quantity: i64) -> Self {
        Self {
            product_id: product_id.into(),
            variant_id: None,
            quantity,
        }
    }

    pub fn with_variant(mut self, variant_id: impl Into<String>) -> Self {
        self.variant_id = Some(variant_id.into());
        self
    }
}

/// Which rule produced a line's unit price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PriceSource {
    Base,
    Tier,
    FlashSale,
}

/// A resolved cart line. Recomputed on every quote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct LineItem {
    pub product_id: String,
    pub variant_id: Option<String>,
    pub sku: String,
    pub product_name: String,
    pub variant_name: Option<String>,
    pub quantity: i64,
    /// Unit price before tier and flash-sale adjustments.
    pub base_unit_price: Money,
    pub unit_price: Money,
    pub line_total: Money,
    pub price_source: PriceSource,
    pub flash_sale_id: Option<String>,
    pub unit_weight_grams: i64,
    pub line_weight_grams: i64,
}

// =============================================================================
// Resolver
// =============================================================================

/// Resolves line prices against a catalog.
pub struct PriceResolver<'a, C: PricingCatalog + ?Sized> {
    catalog: &'a C,
    config: &'a PricingConfig,
}

impl<'a, C: PricingCatalog + ?Sized> PriceResolver<'a, C> {
    pub fn new(catalog: &'a C, config: &'a PricingConfig) -> Self {
        Self { catalog, config }
    }

    /// Resolves one line at instant `at`.
    ///
    /// `user_id` feeds the flash sale per-user cap; an anonymous quote counts
    /// as a user with no prior purchases.
    pub fn resolve(
        &self,
        item: &ItemRequest,
        tier: CustomerTier,
        user_id: Option<&str>,
        at: DateTime<Utc>,
    ) -> PricingResult<LineItem> {
        self.resolve_in_cart(item, tier, user_id, at, &mut HashMap::new())
    }

    /// Resolves one line of a cart.
    ///
    /// `claimed` maps flash sale ids to units earlier lines of the same cart
    /// already got at the sale price. Those units count against both caps,
    /// and a line admitted here adds its quantity.
    pub fn resolve_in_cart(
        &self,
        item: &ItemRequest,
        tier: CustomerTier,
        user_id: Option<&str>,
        at: DateTime<Utc>,
        claimed: &mut HashMap<String, i64>,
    ) -> PricingResult<LineItem> {
        if item.quantity <= 0 {
            return Err(PricingError::InvalidQuantity {
                product_id: item.product_id.clone(),
                quantity: item.quantity,
            });
        }
        validate_quantity(item.quantity)?;

        let product = self
            .catalog
            .product(&item.product_id)
            .ok_or_else(|| PricingError::ProductNotFound(item.product_id.clone()))?;
        if !product.is_active {
            return Err(PricingError::ProductInactive(product.id.clone()));
        }

        let variant = match &item.variant_id {
            Some(variant_id) => {
                let variant = self
                    .catalog
                    .variant(variant_id)
                    .filter(|v| v.is_active)
                    .ok_or_else(|| PricingError::VariantNotFound(variant_id.clone()))?;
                if variant.product_id != product.id {
                    return Err(PricingError::VariantMismatch {
                        product_id: product.id.clone(),
                        variant_id: variant_id.clone(),
                    });
                }
                Some(variant)
            }
            None => None,
        };

        let base_unit_price = variant.map_or(product.base_price, |v| v.base_price(product));
        let unit_weight_grams = variant.map_or(product.weight_grams, |v| v.weight_grams(product));

        let (mut unit_price, mut price_source) = match tier {
            CustomerTier::Reseller => match self.config.reseller_discount_bps(item.quantity) {
                Some(bps) if bps > 0 => (base_unit_price.apply_discount_bps(bps), PriceSource::Tier),
                _ => (base_unit_price, PriceSource::Base),
            },
            CustomerTier::Retail => (base_unit_price, PriceSource::Base),
        };

        let mut flash_sale_id = None;
        if let Some(sale) = self.catalog.active_flash_sale(&product.id, at) {
            let purchased = user_id
                .map(|user| self.catalog.flash_sale_purchased_by(&sale.id, user))
                .unwrap_or(0);
            let in_cart = claimed.get(&sale.id).copied().unwrap_or(0);
            if sale.admits(in_cart + item.quantity, purchased) {
                unit_price = sale.sale_price;
                price_source = PriceSource::FlashSale;
                flash_sale_id = Some(sale.id.clone());
                *claimed.entry(sale.id.clone()).or_insert(0) += item.quantity;
            } else {
                debug!(
                    product_id = %product.id,
                    flash_sale_id = %sale.id,
                    quantity = item.quantity,
                    purchased,
                    in_cart,
                    "Flash sale caps exceeded, charging regular price"
                );
            }
        }

        let line_total = unit_price
            .checked_multiply_quantity(item.quantity)
            .ok_or_else(|| out_of_range("line_total"))?;
        let line_weight_grams = unit_weight_grams
            .checked_mul(item.quantity)
            .ok_or_else(|| out_of_range("line_weight_grams"))?;

        debug!(
            product_id = %product.id,
            quantity = item.quantity,
            unit_price = %unit_price,
            source = ?price_source,
            "Resolved line price"
        );

        Ok(LineItem {
            product_id: product.id.clone(),
            variant_id: variant.map(|v| v.id.clone()),
            sku: product.sku.clone(),
            product_name: product.name.clone(),
            variant_name: variant.map(|v| v.name.clone()),
            quantity: item.quantity,
            base_unit_price,
            unit_price,
            line_total,
            price_source,
            flash_sale_id,
            unit_weight_grams,
            line_weight_grams,
        })
    }
}

fn out_of_range(field: &str) -> PricingError {
    ValidationError::OutOfRange {
        field: field.to_string(),
        min: 0,
        max: i64::MAX,
    }
    .into()
}

// =============================================================================
// Unit Tests
// =============================================================================
