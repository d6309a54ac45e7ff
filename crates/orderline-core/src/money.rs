//! # Money Module
//!
//! Provides the `Money` type and the canonical rounding rule for every
//! currency computation in Orderline.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  In floating point:                                                     │
//! │    0.1 + 0.2 = 0.30000000000000004  ❌ WRONG!                           │
//! │                                                                         │
//! │  A quote computed at 10:00 and re-validated at payment time MUST       │
//! │  produce the same grand total, bit for bit.                            │
//! │                                                                         │
//! │  OUR SOLUTION: Integer minor units                                      │
//! │    Rp 50.000 is stored as 50000 (IDR has no sub-unit in practice)      │
//! │    Percentages are basis points, rounded exactly once                  │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Rounding Rule
//! Every fractional result is rounded **half away from zero**, exactly once,
//! at the end of the computation that produced it:
//! ```text
//!   2.5 →  3      -2.5 → -3
//!   2.4 →  2      -2.4 → -2
//! ```
//!
//! ## Usage
//! ```rust
//! use orderline_core::money::Money;
//!
//! let price = Money::from_minor(50_000);
//! let line = price.checked_multiply_quantity(2).unwrap();
//! assert_eq!(line.minor(), 100_000);
//! assert_eq!(line.to_string(), "Rp 100.000");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Sub, SubAssign};
use ts_rs::TS;

use crate::types::TaxRate;

/// Basis points in 100%.
pub const BPS_SCALE: i64 = 10_000;

// =============================================================================
// Rounding
// =============================================================================

/// Divides `numerator` by `denominator`, rounding half away from zero.
///
/// Computed in `i128` so `amount * bps` never overflows for any `i64` amount.
/// `denominator` must be positive.
///
/// ## Example
/// ```rust
/// use orderline_core::money::round_half_away;
///
/// assert_eq!(round_half_away(25, 10), 3);
/// assert_eq!(round_half_away(-25, 10), -3);
/// assert_eq!(round_half_away(24, 10), 2);
/// ```
pub fn round_half_away(numerator: i128, denominator: i128) -> i64 {
    debug_assert!(denominator > 0, "denominator must be positive");
    let half = denominator / 2;
    let rounded = if numerator >= 0 {
        (numerator + half) / denominator
    } else {
        (numerator - half) / denominator
    };
    rounded as i64
}

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in the smallest currency unit.
///
/// ## Design Decisions
/// - **i64 (signed)**: intermediate differences (subtotal - discount) may go
///   negative before being clamped
/// - **Single field tuple struct**: zero-cost abstraction over i64
/// - **sqlx transparent**: stored as a plain INTEGER column
///
/// ## Where Money Flows
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │  Product.base_price ──► PriceResolver ──► LineItem.unit_price           │
/// │                                                  │                      │
/// │                                                  ▼                      │
/// │  OrderSummary.subtotal ◄──────────── Σ LineItem.line_total              │
/// │       │                                                                 │
/// │       ├── - coupon discount ──► taxable base ──► tax                    │
/// │       └── + tax + shipping ───► grand_total ──► payment gateway         │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(transparent))]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from minor units.
    #[inline]
    pub const fn from_minor(minor: i64) -> Self {
        Money(minor)
    }

    /// Returns the value in minor units.
    #[inline]
    pub const fn minor(&self) -> i64 {
        self.0
    }

    /// Returns zero money value.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    /// Checks if the value is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checks if the value is positive (greater than zero).
    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Checks if the value is negative (less than zero).
    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Clamps negative values to zero.
    ///
    /// ## Example
    /// ```rust
    /// use orderline_core::money::Money;
    ///
    /// assert_eq!(Money::from_minor(-500).clamp_non_negative(), Money::zero());
    /// assert_eq!(Money::from_minor(500).clamp_non_negative().minor(), 500);
    /// ```
    #[inline]
    pub fn clamp_non_negative(self) -> Self {
        if self.0 < 0 {
            Money::zero()
        } else {
            self
        }
    }

    /// Multiplies money by a quantity, `None` on overflow.
    ///
    /// ## Example
    /// ```rust
    /// use orderline_core::money::Money;
    ///
    /// assert_eq!(Money::from_minor(50_000).checked_multiply_quantity(3), Some(Money::from_minor(150_000)));
    /// assert_eq!(Money::from_minor(i64::MAX / 2).checked_multiply_quantity(3), None);
    /// ```
    #[inline]
    pub const fn checked_multiply_quantity(&self, qty: i64) -> Option<Self> {
        match self.0.checked_mul(qty) {
            Some(minor) => Some(Money(minor)),
            None => None,
        }
    }

    /// Returns `self × bps / 10000`, rounded half away from zero.
    ///
    /// ## Example
    /// ```rust
    /// use orderline_core::money::Money;
    ///
    /// // 10% of Rp 15.005 = 1500.5 → 1501
    /// assert_eq!(Money::from_minor(15_005).portion_bps(1_000).minor(), 1_501);
    /// ```
    pub fn portion_bps(&self, bps: u32) -> Money {
        Money(round_half_away(
            self.0 as i128 * bps as i128,
            BPS_SCALE as i128,
        ))
    }

    /// Returns `self × percent / 100`, rounded half away from zero.
    ///
    /// Used by percentage coupons whose value is a whole percent.
    pub fn portion_percent(&self, percent: i64) -> Money {
        Money(round_half_away(self.0 as i128 * percent as i128, 100))
    }

    /// Applies a discount in basis points and returns the remaining price,
    /// rounded half away from zero in a single step.
    ///
    /// ## Example
    /// ```rust
    /// use orderline_core::money::Money;
    ///
    /// let price = Money::from_minor(99_999);
    /// // 99999 × 0.9 = 89999.1 → 89999
    /// assert_eq!(price.apply_discount_bps(1_000).minor(), 89_999);
    /// ```
    pub fn apply_discount_bps(&self, discount_bps: u32) -> Money {
        let keep = BPS_SCALE - discount_bps.min(BPS_SCALE as u32) as i64;
        Money(round_half_away(
            self.0 as i128 * keep as i128,
            BPS_SCALE as i128,
        ))
    }

    /// Calculates tax on this amount at the given rate.
    ///
    /// ## Example
    /// ```rust
    /// use orderline_core::money::Money;
    /// use orderline_core::types::TaxRate;
    ///
    /// let base = Money::from_minor(90_000);
    /// assert_eq!(base.calculate_tax(TaxRate::from_bps(1_100)).minor(), 9_900);
    /// ```
    pub fn calculate_tax(&self, rate: TaxRate) -> Money {
        self.portion_bps(rate.bps())
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Display uses the Indonesian convention: `Rp 121.000`.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits = self.0.unsigned_abs().to_string();
        let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
        for (i, ch) in digits.chars().enumerate() {
            if i > 0 && (digits.len() - i) % 3 == 0 {
                grouped.push('.');
            }
            grouped.push(ch);
        }
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}Rp {}", sign, grouped)
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + *m)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
