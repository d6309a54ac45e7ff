//! # Tax Calculator
//!
//! Applies the configured rate to the taxable base.
//!
//! ```text
//!   taxable_base = max(subtotal - discount, 0)
//!   tax          = round_half_away(taxable_base × bps / 10000)
//! ```

use crate::money::Money;
use crate::types::TaxRate;

/// Indonesian VAT (PPN), 11%.
pub const DEFAULT_TAX_RATE: TaxRate = TaxRate::from_bps(1_100);

/// The amount tax is computed on: subtotal minus discount, never negative.
pub fn taxable_base(subtotal: Money, discount: Money) -> Money {
    (subtotal - discount).clamp_non_negative()
}

/// Tax on `base` at `rate`.
pub fn compute_tax(base: Money, rate: TaxRate) -> Money {
    base.clamp_non_negative().calculate_tax(rate)
}
