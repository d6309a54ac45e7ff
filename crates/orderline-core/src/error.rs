//! # Error Types
//!
//! Domain-specific error types for orderline-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  orderline-core errors (this file)                                     │
//! │  ├── PricingError     - Quote/summary failures                         │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  orderline-db errors (separate crate)                                  │
//! │  └── DbError          - Database operation failures                    │
//! │                                                                         │
//! │  orderline-checkout errors (separate crate)                            │
//! │  └── CheckoutError    - What the host application sees                 │
//! │                                                                         │
//! │  Flow: ValidationError → PricingError → CheckoutError → Host           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Error Classes
//! Every error maps to one [`ErrorKind`]. The class tells the caller what to do:
//! ```text
//!   Validation     → report the reason, never retry automatically
//!   Conflict       → report, caller may re-quote with adjusted input
//!   Collaborator   → "try again": quoting has no side effects
//!   Inconsistency  → log and drop (webhooks), never mutate state
//! ```

use serde::Serialize;
use thiserror::Error;

use crate::money::Money;

// =============================================================================
// Error Kind
// =============================================================================

/// Coarse classification of every error the engine can return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad input: unknown product/variant/coupon, bad quantity.
    Validation,
    /// State disagrees with the request: stock, usage caps, transitions.
    Conflict,
    /// External collaborator failed or timed out. Retryable.
    Collaborator,
    /// Out-of-order or unknown events. Logged and dropped.
    Inconsistency,
}

// =============================================================================
// Shipping Error
// =============================================================================

/// Failure reported by a shipping rate collaborator.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ShippingError {
    /// No service covers this route.
    #[error("No shipping service from {origin} to {destination}")]
    RouteUnavailable { origin: String, destination: String },

    /// Carrier lookup failed (network, upstream error).
    #[error("Shipping rate lookup failed: {0}")]
    Unavailable(String),

    /// Carrier lookup did not answer in time.
    #[error("Shipping rate lookup timed out after {0}s")]
    Timeout(u64),
}

// =============================================================================
// Pricing Error
// =============================================================================

/// Errors produced while resolving prices, coupons, and summaries.
///
/// A summary either succeeds completely or fails with exactly one of these;
/// partial totals are never returned.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PricingError {
    /// Quantity was zero or negative.
    #[error("Invalid quantity {quantity} for product {product_id}")]
    InvalidQuantity { product_id: String, quantity: i64 },

    /// Product id does not resolve.
    #[error("Product not found: {0}")]
    ProductNotFound(String),

    /// Product exists but has been deactivated.
    #[error("Product is not available: {0}")]
    ProductInactive(String),

    /// Variant id does not resolve.
    #[error("Variant not found: {0}")]
    VariantNotFound(String),

    /// Variant exists but belongs to a different product.
    #[error("Variant {variant_id} does not belong to product {product_id}")]
    VariantMismatch {
        product_id: String,
        variant_id: String,
    },

    /// Cart has no lines.
    #[error("Cart is empty")]
    EmptyCart,

    /// Cart has more lines than allowed.
    #[error("Cart cannot have more than {max} items")]
    CartTooLarge { max: usize },

    /// Coupon code does not exist.
    #[error("Coupon not found: {0}")]
    CouponNotFound(String),

    /// Coupon is inactive or outside its validity window.
    #[error("Coupon {0} is expired or inactive")]
    CouponExpired(String),

    /// Coupon is not offered to the requesting tier.
    #[error("Coupon {code} is not available for {tier} customers")]
    CouponNotEligible { code: String, tier: String },

    /// Purchase amount is below the coupon minimum.
    #[error("Coupon {code} requires a minimum purchase of {minimum}, got {actual}")]
    CouponMinimumNotMet {
        code: String,
        minimum: Money,
        actual: Money,
    },

    /// Global usage cap reached.
    #[error("Coupon {0} has reached its usage limit")]
    CouponUsageExceeded(String),

    /// Per-user usage cap reached.
    #[error("Coupon {0} has already been used the maximum number of times by this customer")]
    CouponUserLimitExceeded(String),

    /// Shipping collaborator failed.
    #[error("Shipping: {0}")]
    Shipping(#[from] ShippingError),

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl PricingError {
    /// Returns the error class.
    pub fn kind(&self) -> ErrorKind {
        match self {
            PricingError::CouponUsageExceeded(_) | PricingError::CouponUserLimitExceeded(_) => {
                ErrorKind::Conflict
            }
            PricingError::Shipping(_) => ErrorKind::Collaborator,
            _ => ErrorKind::Validation,
        }
    }

    /// Returns true if retrying the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Collaborator
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when input doesn't meet requirements.
/// Used for early validation before business logic runs.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g., bad coupon code characters).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with PricingError.
pub type PricingResult<T> = Result<T, PricingError>;

// =============================================================================
// Unit Tests
// =============================================================================
