//! # Payment State Machine
//!
//! Reconciles asynchronous payment-gateway signals with an order's state.
//!
//! ## Precedence
//! ```text
//!   PaymentPending(0)  <  Failed(1)  <  Paid(2)  <  Refunded(3)
//!
//!   signal == current status        → NoOp          (duplicate delivery)
//!   signal ranks below current      → Rejected(Stale)
//!   Failed, then Paid arrives       → Rejected(Conflict)  (manual reconciliation)
//!   PaymentPending → Paid           → Apply: order Confirmed, paid_at set
//!   PaymentPending → Failed         → Apply: order Cancelled, stock restored
//! ```
//!
//! `Refunded` is never reached through a signal; only the refund operation
//! sets it. The function is pure: callers persist the returned transition.

use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

use crate::order::OrderStatus;

// =============================================================================
// Payment Status
// =============================================================================

/// Payment status, tracked independently of the order lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    PaymentPending,
    Failed,
    Paid,
    Refunded,
}

impl PaymentStatus {
    /// Precedence rank. Higher ranks are later in the payment lifecycle.
    pub const fn rank(self) -> u8 {
        match self {
            PaymentStatus::PaymentPending => 0,
            PaymentStatus::Failed => 1,
            PaymentStatus::Paid => 2,
            PaymentStatus::Refunded => 3,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            PaymentStatus::PaymentPending => "payment_pending",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Refunded => "refunded",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Signals
// =============================================================================

/// What the gateway reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentSignal {
    Pending,
    Paid,
    Failed,
    Expired,
}

impl PaymentSignal {
    /// Maps a gateway transaction status string.
    ///
    /// ## Example
    /// ```rust
    /// use orderline_core::payment::PaymentSignal;
    ///
    /// assert_eq!(PaymentSignal::from_gateway_status("settlement"), Some(PaymentSignal::Paid));
    /// assert_eq!(PaymentSignal::from_gateway_status("expire"), Some(PaymentSignal::Expired));
    /// assert_eq!(PaymentSignal::from_gateway_status("authorize"), None);
    /// ```
    pub fn from_gateway_status(status: &str) -> Option<Self> {
        match status.trim().to_lowercase().as_str() {
            "pending" => Some(PaymentSignal::Pending),
            "paid" | "settlement" | "capture" | "success" => Some(PaymentSignal::Paid),
            "failed" | "failure" | "deny" | "cancel" => Some(PaymentSignal::Failed),
            "expired" | "expire" => Some(PaymentSignal::Expired),
            _ => None,
        }
    }

    /// Payment status this signal asks for.
    pub const fn target(self) -> PaymentStatus {
        match self {
            PaymentSignal::Pending => PaymentStatus::PaymentPending,
            PaymentSignal::Paid => PaymentStatus::Paid,
            PaymentSignal::Failed | PaymentSignal::Expired => PaymentStatus::Failed,
        }
    }
}

// =============================================================================
// Transition
// =============================================================================

/// Why a signal was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// Older than the state already recorded.
    Stale,
    /// Contradicts a terminal state; needs a human.
    Conflict,
}

/// State changes to persist for an accepted signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaymentUpdate {
    pub payment_status: PaymentStatus,
    pub order_status: OrderStatus,
    /// Put the order's units back on the shelf.
    pub restore_stock: bool,
    /// Stamp `paid_at`.
    pub mark_paid: bool,
}

/// Outcome of [`apply`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    NoOp,
    Apply(PaymentUpdate),
    Rejected(RejectReason),
}

/// Computes the transition for `signal` given the current state.
///
/// ## Example
/// ```rust
/// use orderline_core::order::OrderStatus;
/// use orderline_core::payment::{apply, PaymentSignal, PaymentStatus, Transition};
///
/// let t = apply(OrderStatus::Confirmed, PaymentStatus::Paid, PaymentSignal::Paid);
/// assert_eq!(t, Transition::NoOp);
/// ```
pub fn apply(order: OrderStatus, payment: PaymentStatus, signal: PaymentSignal) -> Transition {
    let target = signal.target();

    if target == payment {
        return Transition::NoOp;
    }
    if target.rank() < payment.rank() {
        return Transition::Rejected(RejectReason::Stale);
    }
    if payment != PaymentStatus::PaymentPending {
        // Failed → Paid. Refunded is never a signal target.
        return Transition::Rejected(RejectReason::Conflict);
    }

    match target {
        PaymentStatus::Paid if order == OrderStatus::Pending => Transition::Apply(PaymentUpdate {
            payment_status: PaymentStatus::Paid,
            order_status: OrderStatus::Confirmed,
            restore_stock: false,
            mark_paid: true,
        }),
        // Money arrived for an order that was cancelled meanwhile.
        PaymentStatus::Paid => Transition::Rejected(RejectReason::Conflict),
        PaymentStatus::Failed => Transition::Apply(PaymentUpdate {
            payment_status: PaymentStatus::Failed,
            order_status: OrderStatus::Cancelled,
            restore_stock: order != OrderStatus::Cancelled,
            mark_paid: false,
        }),
        PaymentStatus::PaymentPending | PaymentStatus::Refunded => Transition::NoOp,
    }
}
