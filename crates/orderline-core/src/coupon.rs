//! # Coupon Evaluator
//!
//! Decides whether a coupon applies to a purchase and computes its discount.
//!
//! ## Check Order
//! The first failing check wins:
//! ```text
//!   1. exists                           → CouponNotFound
//!   2. active and valid_from..=until    → CouponExpired
//!   3. tier flag                        → CouponNotEligible
//!   4. amount >= min_purchase           → CouponMinimumNotMet
//!   5. usage_count < max_usage_count    → CouponUsageExceeded
//!   6. user usage < max_usage_per_user  → CouponUserLimitExceeded
//! ```
//!
//! Evaluation has no side effects. Usage counters are incremented only when a
//! checkout commits.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use ts_rs::TS;

use crate::catalog::PricingCatalog;
use crate::error::{PricingError, PricingResult};
use crate::money::Money;
use crate::types::{normalize_coupon_code, Coupon, CustomerTier, DiscountKind};

/// A coupon that passed every check, with its computed discount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct AppliedCoupon {
    pub coupon_id: String,
    pub code: String,
    pub name: String,
    pub discount: Money,
    pub free_shipping: bool,
}

/// Discount a coupon grants on `amount`, ignoring validity.
///
/// Percentage coupons are capped by `max_discount`; fixed coupons by the
/// amount itself. Neither ever exceeds `amount`.
pub fn compute_discount(coupon: &Coupon, amount: Money) -> Money {
    let amount = amount.clamp_non_negative();
    let discount = match coupon.kind {
        DiscountKind::Percentage => {
            let raw = amount.portion_percent(coupon.value);
            match coupon.max_discount {
                Some(cap) => raw.min(cap),
                None => raw,
            }
        }
        DiscountKind::Fixed => Money::from_minor(coupon.value),
    };
    discount.min(amount).clamp_non_negative()
}

/// Runs the ordered checks against an already looked-up coupon.
///
/// `used_by_user` is the requesting user's redemption count.
pub fn check_coupon(
    coupon: &Coupon,
    amount: Money,
    tier: CustomerTier,
    used_by_user: i64,
    at: DateTime<Utc>,
) -> PricingResult<()> {
    if !coupon.is_valid_at(at) {
        return Err(PricingError::CouponExpired(coupon.code.clone()));
    }
    if !coupon.is_eligible_for(tier) {
        return Err(PricingError::CouponNotEligible {
            code: coupon.code.clone(),
            tier: tier.to_string(),
        });
    }
    if amount < coupon.min_purchase {
        return Err(PricingError::CouponMinimumNotMet {
            code: coupon.code.clone(),
            minimum: coupon.min_purchase,
            actual: amount,
        });
    }
    if coupon.is_usage_exhausted() {
        return Err(PricingError::CouponUsageExceeded(coupon.code.clone()));
    }
    if let Some(cap) = coupon.per_user_cap() {
        if used_by_user >= cap {
            return Err(PricingError::CouponUserLimitExceeded(coupon.code.clone()));
        }
    }
    Ok(())
}

/// Looks up and evaluates coupons against a catalog.
pub struct CouponEvaluator<'a, C: PricingCatalog + ?Sized> {
    catalog: &'a C,
}

impl<'a, C: PricingCatalog + ?Sized> CouponEvaluator<'a, C> {
    pub fn new(catalog: &'a C) -> Self {
        Self { catalog }
    }

    /// Evaluates `code` for a purchase of `amount` (the subtotal before
    /// discount).
    pub fn evaluate(
        &self,
        code: &str,
        user_id: Option<&str>,
        amount: Money,
        tier: CustomerTier,
        at: DateTime<Utc>,
    ) -> PricingResult<AppliedCoupon> {
        let normalized = normalize_coupon_code(code);
        let coupon = self
            .catalog
            .coupon(&normalized)
            .ok_or_else(|| PricingError::CouponNotFound(normalized.clone()))?;

        let used_by_user = user_id
            .map(|user| self.catalog.coupon_used_by(&coupon.id, user))
            .unwrap_or(0);
        check_coupon(coupon, amount, tier, used_by_user, at)?;

        let discount = compute_discount(coupon, amount);
        debug!(code = %coupon.code, discount = %discount, "Coupon applied");

        Ok(AppliedCoupon {
            coupon_id: coupon.id.clone(),
            code: coupon.code.clone(),
            name: coupon.name.clone(),
            discount,
            free_shipping: coupon.free_shipping,
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
