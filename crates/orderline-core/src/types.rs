//! # Domain Types
//!
//! Catalog and promotion types read by the pricing engine.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Product      │   │ ProductVariant  │   │   FlashSale     │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id             │◄──│  product_id     │   │  product_id     │       │
//! │  │  base_price     │   │  price_override │   │  sale_price     │       │
//! │  │  weight_grams   │   │  weight_override│   │  [start, end)   │       │
//! │  │  stock          │   │  stock          │   │  caps, sold     │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    TaxRate      │   │  CustomerTier   │   │     Coupon      │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  bps (u32)      │   │  Retail         │   │  code, kind     │       │
//! │  │  1100 = 11%     │   │  Reseller       │   │  caps, window   │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! All instants are `DateTime<Utc>`. Nothing in this module reads the clock.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;

use crate::error::ValidationError;
use crate::money::Money;

// =============================================================================
// Tax Rate
// =============================================================================

/// Tax rate represented in basis points (bps).
///
/// ## Why Basis Points?
/// 1 basis point = 0.01% = 1/10000
/// 1100 bps = 11% (Indonesian VAT)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TaxRate(u32);

impl TaxRate {
    /// Creates a tax rate from basis points.
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        TaxRate(bps)
    }

    /// Returns the rate in basis points.
    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// Zero tax rate.
    #[inline]
    pub const fn zero() -> Self {
        TaxRate(0)
    }

    /// Checks if tax rate is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl Default for TaxRate {
    fn default() -> Self {
        TaxRate::zero()
    }
}

// =============================================================================
// Customer Tier
// =============================================================================

/// Customer classification. Selects the price table and coupon eligibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum CustomerTier {
    /// End customer buying at list price.
    #[default]
    Retail,
    /// Registered reseller buying at tier-discounted prices.
    Reseller,
}

impl fmt::Display for CustomerTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CustomerTier::Retail => write!(f, "retail"),
            CustomerTier::Reseller => write!(f, "reseller"),
        }
    }
}

impl FromStr for CustomerTier {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "retail" => Ok(CustomerTier::Retail),
            "reseller" => Ok(CustomerTier::Reseller),
            other => Err(ValidationError::InvalidFormat {
                field: "tier".to_string(),
                reason: format!("unknown customer tier '{}'", other),
            }),
        }
    }
}

// =============================================================================
// Product
// =============================================================================

/// A product available for sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Product {
    /// Unique identifier.
    pub id: String,

    /// Stock Keeping Unit - business identifier.
    pub sku: String,

    /// Display name, frozen into order items at checkout.
    pub name: String,

    /// Retail list price.
    pub base_price: Money,

    /// Shipping weight of one unit in grams.
    pub weight_grams: i64,

    /// Units on hand (for products sold without variants).
    pub stock: i64,

    /// Whether product is active (soft delete).
    pub is_active: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Product Variant
// =============================================================================

/// A purchasable variant (size, colour, pack) of a product.
///
/// A variant carries its own stock; price and weight fall back to the
/// parent product when no override is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct ProductVariant {
    pub id: String,
    pub product_id: String,
    pub name: String,
    pub price_override: Option<Money>,
    pub weight_override_grams: Option<i64>,
    pub stock: i64,
    pub is_active: bool,
}

impl ProductVariant {
    /// Unit price before tier and flash-sale adjustments.
    pub fn base_price(&self, product: &Product) -> Money {
        self.price_override.unwrap_or(product.base_price)
    }

    /// Unit weight in grams.
    pub fn weight_grams(&self, product: &Product) -> i64 {
        self.weight_override_grams.unwrap_or(product.weight_grams)
    }
}

// =============================================================================
// Flash Sale
// =============================================================================

/// A time-boxed promotional price for one product.
///
/// ## Active Window
/// ```text
///          starts_at                     ends_at
///              │◄──────── active ────────►│
///   ───────────●──────────────────────────○──────────► time
///           inclusive                 exclusive
/// ```
/// Also inactive once `sold_count` reaches `stock_cap`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct FlashSale {
    pub id: String,
    pub product_id: String,
    pub sale_price: Money,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    /// Maximum units one user may buy at the sale price.
    pub per_user_limit: Option<i64>,
    /// Maximum units sold at the sale price across all buyers.
    pub stock_cap: Option<i64>,
    /// Units committed at the sale price so far.
    pub sold_count: i64,
}

impl FlashSale {
    /// Whether `at` falls in `[starts_at, ends_at)`.
    pub fn is_within_window(&self, at: DateTime<Utc>) -> bool {
        self.starts_at <= at && at < self.ends_at
    }

    /// Units still available at the sale price, `None` when uncapped.
    pub fn remaining(&self) -> Option<i64> {
        self.stock_cap.map(|cap| (cap - self.sold_count).max(0))
    }

    /// Active iff inside the window and the stock cap is not exhausted.
    pub fn is_active_at(&self, at: DateTime<Utc>) -> bool {
        self.is_within_window(at) && self.remaining().map_or(true, |left| left > 0)
    }

    /// Whether `quantity` more units by a user who already bought
    /// `purchased_by_user` stay inside both caps.
    pub fn admits(&self, quantity: i64, purchased_by_user: i64) -> bool {
        let within_user_cap = self
            .per_user_limit
            .map_or(true, |limit| purchased_by_user + quantity <= limit);
        let within_stock_cap = self.remaining().map_or(true, |left| quantity <= left);
        within_user_cap && within_stock_cap
    }
}

// =============================================================================
// Coupon
// =============================================================================

/// How a coupon's `value` is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum DiscountKind {
    /// `value` is a whole percent of the purchase amount.
    Percentage,
    /// `value` is an amount in minor units.
    Fixed,
}

/// Administrative switch on a coupon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum CouponStatus {
    #[default]
    Active,
    Inactive,
}

/// A discount code redeemable once per order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Coupon {
    pub id: String,
    /// Unique, stored upper-case.
    pub code: String,
    /// Display name shown on the summary.
    pub name: String,
    pub kind: DiscountKind,
    pub value: i64,
    /// Cap for percentage discounts.
    pub max_discount: Option<Money>,
    pub min_purchase: Money,
    pub max_usage_count: Option<i64>,
    pub max_usage_per_user: Option<i64>,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    pub status: CouponStatus,
    pub for_retail: bool,
    pub for_reseller: bool,
    /// Waives shipping on orders using this coupon.
    pub free_shipping: bool,
    pub usage_count: i64,
}

impl Coupon {
    /// Active status and `valid_from <= at <= valid_until`.
    pub fn is_valid_at(&self, at: DateTime<Utc>) -> bool {
        self.status == CouponStatus::Active && self.valid_from <= at && at <= self.valid_until
    }

    /// Whether the requesting tier may redeem this coupon.
    pub fn is_eligible_for(&self, tier: CustomerTier) -> bool {
        match tier {
            CustomerTier::Retail => self.for_retail,
            CustomerTier::Reseller => self.for_reseller,
        }
    }

    /// Global cap, `None` when uncapped (absent or non-positive).
    pub fn usage_cap(&self) -> Option<i64> {
        self.max_usage_count.filter(|cap| *cap > 0)
    }

    /// Per-user cap, `None` when uncapped.
    pub fn per_user_cap(&self) -> Option<i64> {
        self.max_usage_per_user.filter(|cap| *cap > 0)
    }

    /// Whether the global cap has been reached.
    pub fn is_usage_exhausted(&self) -> bool {
        self.usage_cap()
            .map_or(false, |cap| self.usage_count >= cap)
    }
}

/// Normalizes a user-entered coupon code: trimmed, upper-case.
pub fn normalize_coupon_code(code: &str) -> String {
    code.trim().to_uppercase()
}

// =============================================================================
// Unit Tests
// =============================================================================
