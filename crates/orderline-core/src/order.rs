//! # Orders
//!
//! Persisted order snapshots, the order lifecycle, and the stock ledger.
//!
//! ## Order Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   Pending ──paid──► Confirmed ──► Processing ──► Shipped ──► Delivered  │
//! │      │                  │              │                                │
//! │      │ cancel / failed  │ cancel       │ cancel                         │
//! │      ▼                  ▼              ▼                                │
//! │   Cancelled ◄───────────┴──────────────┘                                │
//! │                                                                         │
//! │   any status with payment Paid ──refund──► Refunded                     │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! An order is created once at checkout, mutated only along these arrows,
//! and never deleted. Its items are frozen copies of the quoted lines.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use ts_rs::TS;

use crate::money::Money;
use crate::payment::PaymentStatus;
use crate::pricing::PriceSource;
use crate::types::CustomerTier;
use crate::validation::{
    validate_address, validate_customer_name, validate_phone, ValidationResult,
};

// =============================================================================
// Order Status
// =============================================================================

/// Order lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Pending,
    Confirmed,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
    Refunded,
}

impl OrderStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Refunded => "refunded",
        }
    }

    /// Whether a cancel request is allowed from this status.
    pub const fn can_cancel(self) -> bool {
        matches!(
            self,
            OrderStatus::Pending | OrderStatus::Confirmed | OrderStatus::Processing
        )
    }

    /// The only status fulfillment may advance to from here.
    pub const fn next_fulfillment(self) -> Option<OrderStatus> {
        match self {
            OrderStatus::Confirmed => Some(OrderStatus::Processing),
            OrderStatus::Processing => Some(OrderStatus::Shipped),
            OrderStatus::Shipped => Some(OrderStatus::Delivered),
            _ => None,
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Delivered | OrderStatus::Cancelled | OrderStatus::Refunded
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A requested status change the lifecycle does not allow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Cannot move order from {from} to {to}")]
pub struct InvalidTransition {
    pub from: OrderStatus,
    pub to: OrderStatus,
}

/// Checks that fulfillment may move an order from `from` to `to`.
///
/// ## Example
/// ```rust
/// use orderline_core::order::{check_fulfillment, OrderStatus};
///
/// assert!(check_fulfillment(OrderStatus::Confirmed, OrderStatus::Processing).is_ok());
/// assert!(check_fulfillment(OrderStatus::Confirmed, OrderStatus::Shipped).is_err());
/// ```
pub fn check_fulfillment(from: OrderStatus, to: OrderStatus) -> Result<(), InvalidTransition> {
    if from.next_fulfillment() == Some(to) {
        Ok(())
    } else {
        Err(InvalidTransition { from, to })
    }
}

/// Checks that an order in `status` may be cancelled.
pub fn check_cancel(status: OrderStatus) -> Result<(), InvalidTransition> {
    if status.can_cancel() {
        Ok(())
    } else {
        Err(InvalidTransition {
            from: status,
            to: OrderStatus::Cancelled,
        })
    }
}

// =============================================================================
// Customer
// =============================================================================

/// Contact and delivery details captured at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CustomerInfo {
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
    pub address: String,
}

impl CustomerInfo {
    pub fn validate(&self) -> ValidationResult<()> {
        validate_customer_name(&self.name)?;
        validate_phone(&self.phone)?;
        validate_address(&self.address)
    }
}

// =============================================================================
// Order
// =============================================================================

/// A persisted order.
///
/// Monetary fields are copied from the summary computed at checkout and never
/// recomputed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Order {
    pub id: String,
    /// Human-facing reference shared with the payment gateway.
    pub order_number: String,
    pub user_id: Option<String>,
    pub tier: CustomerTier,

    pub customer_name: String,
    pub customer_phone: String,
    pub customer_email: Option<String>,
    pub shipping_address: String,
    pub shipping_origin: String,
    pub shipping_destination: String,

    pub status: OrderStatus,
    pub payment_status: PaymentStatus,

    pub subtotal: Money,
    pub discount: Money,
    pub coupon_code: Option<String>,
    pub taxable_base: Money,
    pub tax_rate_bps: i64,
    pub tax: Money,
    pub total_weight_grams: i64,
    pub shipping_cost: Money,
    pub grand_total: Money,

    pub payment_token: Option<String>,
    pub payment_redirect_url: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancel_reason: Option<String>,
    pub refunded_at: Option<DateTime<Utc>>,
}

impl Order {
    pub fn customer(&self) -> CustomerInfo {
        CustomerInfo {
            name: self.customer_name.clone(),
            phone: self.customer_phone.clone(),
            email: self.customer_email.clone(),
            address: self.shipping_address.clone(),
        }
    }
}

/// A frozen line of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct OrderItem {
    pub id: String,
    pub order_id: String,
    pub product_id: String,
    pub variant_id: Option<String>,
    pub sku: String,
    pub product_name: String,
    pub variant_name: Option<String>,
    pub quantity: i64,
    pub base_unit_price: Money,
    pub unit_price: Money,
    pub line_total: Money,
    pub price_source: PriceSource,
    pub flash_sale_id: Option<String>,
}

/// An order together with its items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderWithItems {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
}

// =============================================================================
// Stock Ledger
// =============================================================================

/// Why stock moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum StockReason {
    Checkout,
    PaymentFailedRestore,
    Cancelled,
    Refunded,
}

impl StockReason {
    pub const fn as_str(self) -> &'static str {
        match self {
            StockReason::Checkout => "checkout",
            StockReason::PaymentFailedRestore => "payment_failed_restore",
            StockReason::Cancelled => "cancelled",
            StockReason::Refunded => "refunded",
        }
    }
}

impl fmt::Display for StockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One append-only stock ledger entry.
///
/// `new_stock == previous_stock + delta` always holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct StockLog {
    pub id: String,
    pub product_id: String,
    pub variant_id: Option<String>,
    pub previous_stock: i64,
    pub delta: i64,
    pub new_stock: i64,
    pub reason: StockReason,
    /// Order number that caused the movement.
    pub reference: String,
    pub created_at: DateTime<Utc>,
}
