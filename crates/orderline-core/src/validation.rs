//! # Validation Module
//!
//! Input validation for quotes, checkouts, and catalog seeding.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Host application                                              │
//! │  └── Deserialization into request types                                 │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE                                                   │
//! │  ├── Quantities, cart size, coupon code format                           │
//! │  ├── Rates (tax ≤ 100%, discounts ≤ 100%)                               │
//! │  └── Customer contact fields                                            │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                             │
//! │  ├── CHECK (stock >= 0), CHECK (usage_count >= 0)                       │
//! │  ├── UNIQUE (sku), UNIQUE (code), UNIQUE (order_number)                 │
//! │  └── Foreign key constraints                                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use orderline_core::validation::{validate_coupon_code, validate_quantity};
//!
//! validate_coupon_code("SALE10").unwrap();
//! validate_quantity(5).unwrap();
//! ```

use crate::error::ValidationError;
use crate::money::BPS_SCALE;
use crate::{MAX_CART_ITEMS, MAX_ITEM_QUANTITY, MAX_PRICE_MINOR};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

fn required(field: &str, value: &str) -> ValidationResult<()> {
    if value.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }
    Ok(())
}

fn max_len(field: &str, value: &str, max: usize) -> ValidationResult<()> {
    if value.trim().chars().count() > max {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        });
    }
    Ok(())
}

// =============================================================================
// Catalog Validators
// =============================================================================

/// Validates a SKU.
///
/// ## Rules
/// - Must not be empty
/// - At most 50 characters
/// - Letters, digits, hyphens, underscores only
///
/// ## Example
/// ```rust
/// use orderline_core::validation::validate_sku;
///
/// assert!(validate_sku("KAOS-HTM-L").is_ok());
/// assert!(validate_sku("").is_err());
/// assert!(validate_sku("A".repeat(100).as_str()).is_err());
/// ```
pub fn validate_sku(sku: &str) -> ValidationResult<()> {
    required("sku", sku)?;
    max_len("sku", sku, 50)?;

    if !sku
        .trim()
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ValidationError::InvalidFormat {
            field: "sku".to_string(),
            reason: "must contain only letters, numbers, hyphens, and underscores".to_string(),
        });
    }

    Ok(())
}

/// Validates a product or variant name (1-200 characters).
pub fn validate_product_name(name: &str) -> ValidationResult<()> {
    required("name", name)?;
    max_len("name", name, 200)
}

/// Validates a price in minor units is within `0..=MAX_PRICE_MINOR`.
/// Zero is allowed (free samples).
pub fn validate_price(field: &str, minor: i64) -> ValidationResult<()> {
    if !(0..=MAX_PRICE_MINOR).contains(&minor) {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: MAX_PRICE_MINOR,
        });
    }
    Ok(())
}

// =============================================================================
// Cart Validators
// =============================================================================

/// Validates a line quantity is within `1..=MAX_ITEM_QUANTITY`.
///
/// ## Example
/// ```rust
/// use orderline_core::validation::validate_quantity;
///
/// assert!(validate_quantity(1).is_ok());
/// assert!(validate_quantity(0).is_err());
/// assert!(validate_quantity(1000).is_err());
/// ```
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if !(1..=MAX_ITEM_QUANTITY).contains(&qty) {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_ITEM_QUANTITY,
        });
    }
    Ok(())
}

/// Validates the number of lines in a cart does not exceed `MAX_CART_ITEMS`.
pub fn validate_cart_size(lines: usize) -> ValidationResult<()> {
    if lines > MAX_CART_ITEMS {
        return Err(ValidationError::OutOfRange {
            field: "cart items".to_string(),
            min: 1,
            max: MAX_CART_ITEMS as i64,
        });
    }
    Ok(())
}

/// Validates a coupon code as typed by a customer.
///
/// ## Rules
/// - Must not be empty after trimming
/// - At most 32 characters
/// - Letters, digits, hyphens only
///
/// ## Example
/// ```rust
/// use orderline_core::validation::validate_coupon_code;
///
/// assert!(validate_coupon_code(" sale10 ").is_ok());
/// assert!(validate_coupon_code("SALE 10").is_err());
/// ```
pub fn validate_coupon_code(code: &str) -> ValidationResult<()> {
    required("coupon code", code)?;
    max_len("coupon code", code, 32)?;

    if !code
        .trim()
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-')
    {
        return Err(ValidationError::InvalidFormat {
            field: "coupon code".to_string(),
            reason: "must contain only letters, numbers, and hyphens".to_string(),
        });
    }

    Ok(())
}

// =============================================================================
// Rate Validators
// =============================================================================

/// Validates a tax rate. Rates above 100% are rejected.
///
/// ## Example
/// ```rust
/// use orderline_core::validation::validate_tax_rate_bps;
///
/// assert!(validate_tax_rate_bps(1_100).is_ok());
/// assert!(validate_tax_rate_bps(10_001).is_err());
/// ```
pub fn validate_tax_rate_bps(bps: u32) -> ValidationResult<()> {
    validate_bps("tax rate", bps)
}

/// Validates a discount expressed in basis points (at most 100%).
pub fn validate_discount_bps(bps: u32) -> ValidationResult<()> {
    validate_bps("discount", bps)
}

fn validate_bps(field: &str, bps: u32) -> ValidationResult<()> {
    if i64::from(bps) > BPS_SCALE {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: BPS_SCALE,
        });
    }
    Ok(())
}

// =============================================================================
// Customer Validators
// =============================================================================

/// Validates the customer name on an order (1-100 characters).
pub fn validate_customer_name(name: &str) -> ValidationResult<()> {
    required("customer name", name)?;
    max_len("customer name", name, 100)
}

/// Validates a phone number: digits with an optional leading `+`, 8-15 digits.
///
/// ## Example
/// ```rust
/// use orderline_core::validation::validate_phone;
///
/// assert!(validate_phone("+6281234567890").is_ok());
/// assert!(validate_phone("0812-3456").is_err());
/// ```
pub fn validate_phone(phone: &str) -> ValidationResult<()> {
    required("phone", phone)?;

    let phone = phone.trim();
    let digits = phone.strip_prefix('+').unwrap_or(phone);
    if !digits.chars().all(|c| c.is_ascii_digit()) || !(8..=15).contains(&digits.len()) {
        return Err(ValidationError::InvalidFormat {
            field: "phone".to_string(),
            reason: "must be 8-15 digits with optional leading +".to_string(),
        });
    }
    Ok(())
}

/// Validates a shipping address (1-500 characters).
pub fn validate_address(address: &str) -> ValidationResult<()> {
    required("address", address)?;
    max_len("address", address, 500)
}

// =============================================================================
// Unit Tests
// =============================================================================
