//! # Shipping
//!
//! The carrier rate lookup is an external collaborator. This module defines
//! its interface and the local policy that waives shipping.
//!
//! ```text
//! ┌──────────────────┐   quote(origin, dest, grams)   ┌─────────────────────┐
//! │ SummaryComposer  │ ─────────────────────────────► │ ShippingRateProvider│
//! │                  │ ◄───────────────────────────── │  (host / carrier)   │
//! └────────┬─────────┘   ShippingQuote{cost, days}    └─────────────────────┘
//!          │
//!          ▼  resolve_shipping()
//!   cost = 0 if discounted subtotal >= threshold OR coupon.free_shipping
//! ```
//!
//! The provider is always called, even when shipping ends up free, so the
//! estimated delivery time is known.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{PricingResult, ShippingError};
use crate::money::Money;

/// Where a parcel travels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ShippingRequest {
    pub origin: String,
    pub destination: String,
}

impl ShippingRequest {
    pub fn new(origin: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            destination: destination.into(),
        }
    }
}

/// A carrier's answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingQuote {
    pub cost: Money,
    pub estimated_days: u32,
}

/// Carrier rate lookup.
///
/// Implementations must be deterministic for a given input within one quote
/// so that checkout reproduces the quoted total.
pub trait ShippingRateProvider: Send + Sync {
    fn quote(
        &self,
        origin: &str,
        destination: &str,
        total_weight_grams: i64,
    ) -> Result<ShippingQuote, ShippingError>;
}

// =============================================================================
// Reference Providers
// =============================================================================

/// Same price for every parcel.
#[derive(Debug, Clone, Copy)]
pub struct FlatRateShipping {
    pub cost: Money,
    pub estimated_days: u32,
}

impl FlatRateShipping {
    pub fn new(cost: Money, estimated_days: u32) -> Self {
        Self { cost, estimated_days }
    }
}

impl ShippingRateProvider for FlatRateShipping {
    fn quote(&self, _origin: &str, _destination: &str, _grams: i64) -> Result<ShippingQuote, ShippingError> {
        Ok(ShippingQuote {
            cost: self.cost,
            estimated_days: self.estimated_days,
        })
    }
}

/// Price per started kilogram, Indonesian courier style.
///
/// ```text
///   kg   = max(1, ceil(grams / 1000))
///   cost = first_kg + (kg - 1) × additional_kg
/// ```
#[derive(Debug, Clone)]
pub struct WeightTieredShipping {
    pub first_kg: Money,
    pub additional_kg: Money,
    pub estimated_days: u32,
    /// Destinations served, case-insensitive. `None` serves everywhere.
    pub destinations: Option<Vec<String>>,
}

impl WeightTieredShipping {
    pub fn new(first_kg: Money, additional_kg: Money, estimated_days: u32) -> Self {
        Self {
            first_kg,
            additional_kg,
            estimated_days,
            destinations: None,
        }
    }

    pub fn serving(mut self, destinations: &[&str]) -> Self {
        self.destinations = Some(destinations.iter().map(|d| d.to_lowercase()).collect());
        self
    }

    /// Billable kilograms for a parcel.
    pub fn billable_kg(total_weight_grams: i64) -> i64 {
        ((total_weight_grams + 999) / 1_000).max(1)
    }
}

impl ShippingRateProvider for WeightTieredShipping {
    fn quote(
        &self,
        origin: &str,
        destination: &str,
        total_weight_grams: i64,
    ) -> Result<ShippingQuote, ShippingError> {
        if let Some(served) = &self.destinations {
            if !served.contains(&destination.to_lowercase()) {
                return Err(ShippingError::RouteUnavailable {
                    origin: origin.to_string(),
                    destination: destination.to_string(),
                });
            }
        }

        let kg = Self::billable_kg(total_weight_grams);
        Ok(ShippingQuote {
            cost: self.first_kg + Money::from_minor(self.additional_kg.minor() * (kg - 1)),
            estimated_days: self.estimated_days,
        })
    }
}

// =============================================================================
// Free-Shipping Policy
// =============================================================================

/// Shipping after the free-shipping policy ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedShipping {
    pub cost: Money,
    /// What the carrier quoted before any waiver.
    pub quoted_cost: Money,
    pub estimated_days: u32,
    pub free_shipping: bool,
}

/// Calls the provider, then applies the waiver rules.
///
/// `discounted_subtotal` is subtotal minus coupon discount.
pub fn resolve_shipping(
    provider: &dyn ShippingRateProvider,
    request: &ShippingRequest,
    total_weight_grams: i64,
    discounted_subtotal: Money,
    free_shipping_threshold: Option<Money>,
    coupon_free_shipping: bool,
) -> PricingResult<ResolvedShipping> {
    let quote = provider.quote(&request.origin, &request.destination, total_weight_grams)?;

    let over_threshold =
        free_shipping_threshold.map_or(false, |threshold| discounted_subtotal >= threshold);
    let free_shipping = over_threshold || coupon_free_shipping;

    Ok(ResolvedShipping {
        cost: if free_shipping {
            Money::zero()
        } else {
            quote.cost.clamp_non_negative()
        },
        quoted_cost: quote.cost,
        estimated_days: quote.estimated_days,
        free_shipping,
    })
}
