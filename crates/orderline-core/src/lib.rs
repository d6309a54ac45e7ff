//! # orderline-core: Pure Pricing Logic for Orderline
//!
//! This crate is the **heart** of Orderline. It prices carts and decides
//! order/payment transitions as pure functions with zero I/O.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Orderline Architecture                           │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                  Host application (HTTP, webhooks)              │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │              orderline-checkout (Orchestrator)                  │   │
//! │  │    quote, checkout, payment notifications, cancel, refund       │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │             ★ orderline-core (THIS CRATE) ★                     │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │  pricing  │  │  coupon   │  │    tax    │  │ shipping  │  │   │
//! │  │   │ resolver  │  │ evaluator │  │   rate    │  │  policy   │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │          summary (composer) · order · payment (state)          │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                orderline-db (Database Layer)                    │   │
//! │  │          SQLite queries, migrations, atomic counters            │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`money`] - Money type and the half-away-from-zero rounding rule
//! - [`types`] - Catalog and promotion types (Product, FlashSale, Coupon)
//! - [`catalog`] - Read-only catalog trait and in-memory snapshot
//! - [`pricing`] - Per-line price resolution
//! - [`coupon`] - Coupon checks and discount computation
//! - [`tax`] - Tax on the taxable base
//! - [`shipping`] - Shipping collaborator trait and free-shipping policy
//! - [`summary`] - The order summary composer
//! - [`order`] - Order records, lifecycle, stock ledger
//! - [`payment`] - Payment status precedence and signal reconciliation
//! - [`validation`] - Input validation
//! - [`error`] - Domain error types
//!
//! ## Design Principles
//!
//! 1. **Deterministic**: the evaluation instant is a parameter, never read here
//! 2. **No I/O**: collaborators are traits, implemented by the host
//! 3. **Integer Money**: minor units (i64), basis points, rounded once
//! 4. **Explicit Errors**: every failure is a typed error with a class
//!
//! ## Example Usage
//!
//! ```rust
//! use orderline_core::money::Money;
//! use orderline_core::tax::DEFAULT_TAX_RATE;
//!
//! let base = Money::from_minor(100_000);
//! assert_eq!(base.calculate_tax(DEFAULT_TAX_RATE).minor(), 11_000);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod catalog;
pub mod coupon;
pub mod error;
pub mod money;
pub mod order;
pub mod payment;
pub mod pricing;
pub mod shipping;
pub mod summary;
pub mod tax;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use catalog::{CatalogSnapshot, PricingCatalog};
pub use error::{ErrorKind, PricingError, PricingResult, ShippingError, ValidationError};
pub use money::Money;
pub use order::{CustomerInfo, Order, OrderItem, OrderStatus, StockLog, StockReason};
pub use payment::{PaymentSignal, PaymentStatus, Transition};
pub use pricing::{ItemRequest, LineItem, PriceSource, PricingConfig, ResellerTier};
pub use shipping::{ShippingQuote, ShippingRateProvider, ShippingRequest};
pub use summary::{OrderSummary, QuoteRequest, SummaryComposer};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum lines allowed in a single cart.
pub const MAX_CART_ITEMS: usize = 100;

/// Maximum quantity of a single line.
///
/// ## Business Reason
/// Catches typos (1000 instead of 10) before they reserve a warehouse.
pub const MAX_ITEM_QUANTITY: i64 = 999;

/// Maximum unit price in minor units (Rp 10 trillion).
///
/// A full cart at this price stays far inside `i64`.
pub const MAX_PRICE_MINOR: i64 = 10_000_000_000_000;
