//! # Checkout Error Types
//!
//! Error types for checkout orchestration and configuration.
//!
//! ## Error Categories
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     CheckoutError by ErrorKind                          │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Validation     │  │   Conflict      │  │     Collaborator        │ │
//! │  │                 │  │                 │  │     (retryable)         │ │
//! │  │  Pricing(..)    │  │  Insufficient   │  │  Gateway                │ │
//! │  │  Validation     │  │    Stock        │  │  CollaboratorTimeout    │ │
//! │  │  InvalidSig.    │  │  FlashSale..    │  │  Pricing(Shipping)      │ │
//! │  │                 │  │  Pricing(Coupon │  │  Database(Busy)         │ │
//! │  │                 │  │   UsageExc..)   │  │                         │ │
//! │  │                 │  │  QuoteMismatch  │  │                         │ │
//! │  │                 │  │  Invalid        │  │                         │ │
//! │  │                 │  │   Transition    │  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  Inconsistency (logged and dropped by webhook hosts)            │   │
//! │  │  OrderNotFound · StaleEvent · ConflictingEvent · AmountMismatch │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use orderline_core::order::InvalidTransition;
use orderline_core::{ErrorKind, Money, OrderStatus, PaymentStatus, PricingError, ValidationError};
use orderline_db::DbError;
use thiserror::Error;

/// Result type alias for checkout operations.
pub type CheckoutResult<T> = Result<T, CheckoutError>;

/// Result type alias for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Failures reported by a payment gateway implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// Gateway refused the charge (bad amount, blocked customer...).
    #[error("Charge rejected: {0}")]
    Rejected(String),

    /// Gateway could not be reached or answered 5xx.
    #[error("Payment gateway unavailable: {0}")]
    Unavailable(String),
}

/// Checkout error type covering every orchestrator failure.
#[derive(Debug, Error)]
pub enum CheckoutError {
    // =========================================================================
    // Pricing & Input
    // =========================================================================
    /// Cart could not be priced (unknown product, bad coupon, shipping...).
    #[error(transparent)]
    Pricing(#[from] PricingError),

    /// Customer or shipping details rejected.
    #[error("Invalid input: {0}")]
    Validation(#[from] ValidationError),

    // =========================================================================
    // Checkout Conflicts
    // =========================================================================
    /// Fewer units on the shelf than requested.
    #[error("Insufficient stock for {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: String,
        variant_id: Option<String>,
        requested: i64,
        available: i64,
    },

    /// Flash sale reached its stock cap.
    #[error("Flash sale {flash_sale_id} is sold out")]
    FlashSaleSoldOut { flash_sale_id: String },

    /// User already bought the flash sale's per-user limit.
    #[error("Flash sale {flash_sale_id} limit reached for this customer")]
    FlashSaleUserLimitExceeded { flash_sale_id: String },

    /// Total shown to the customer no longer matches.
    #[error("Quoted total {expected} no longer matches {actual}")]
    QuoteMismatch { expected: Money, actual: Money },

    /// Order status does not allow the requested operation.
    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),

    /// Refund requested for an order whose payment is not `paid`.
    #[error("Order {order_number} cannot be refunded: payment is {payment_status}")]
    NotRefundable {
        order_number: String,
        payment_status: PaymentStatus,
    },

    // =========================================================================
    // Webhook Inconsistencies
    // =========================================================================
    /// Notification signature did not verify.
    #[error("Invalid notification signature for order {order_number}")]
    InvalidSignature { order_number: String },

    /// Gateway status string is not one we map.
    #[error("Unknown payment status '{0}'")]
    UnknownPaymentStatus(String),

    /// No order with this number.
    #[error("Order not found: {0}")]
    OrderNotFound(String),

    /// Event ranks below the order's current payment status.
    #[error("Stale payment event for {order_number}: {signal} after {current}")]
    StaleEvent {
        order_number: String,
        current: PaymentStatus,
        signal: PaymentStatus,
    },

    /// Event contradicts a terminal payment status.
    #[error("Conflicting payment event for {order_number}: {signal} after {current} (order {order_status})")]
    ConflictingEvent {
        order_number: String,
        current: PaymentStatus,
        signal: PaymentStatus,
        order_status: OrderStatus,
    },

    /// Notification amount differs from the order's grand total.
    #[error("Amount mismatch for {order_number}: notified {notified}, order total {expected}")]
    AmountMismatch {
        order_number: String,
        notified: Money,
        expected: Money,
    },

    // =========================================================================
    // Collaborators & Storage
    // =========================================================================
    /// Payment gateway failed.
    #[error("Payment gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// A collaborator did not answer within the configured timeout.
    #[error("{collaborator} timed out after {secs} seconds")]
    CollaboratorTimeout { collaborator: &'static str, secs: u64 },

    /// Database failure.
    #[error("Database error: {0}")]
    Database(#[from] DbError),
}

impl CheckoutError {
    /// Category for mapping to a response or log level.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CheckoutError::Pricing(e) => e.kind(),
            CheckoutError::Validation(_)
            | CheckoutError::InvalidSignature { .. }
            | CheckoutError::UnknownPaymentStatus(_) => ErrorKind::Validation,

            CheckoutError::InsufficientStock { .. }
            | CheckoutError::FlashSaleSoldOut { .. }
            | CheckoutError::FlashSaleUserLimitExceeded { .. }
            | CheckoutError::QuoteMismatch { .. }
            | CheckoutError::InvalidTransition(_)
            | CheckoutError::NotRefundable { .. } => ErrorKind::Conflict,

            CheckoutError::OrderNotFound(_)
            | CheckoutError::StaleEvent { .. }
            | CheckoutError::ConflictingEvent { .. }
            | CheckoutError::AmountMismatch { .. } => ErrorKind::Inconsistency,

            CheckoutError::Gateway(_) | CheckoutError::CollaboratorTimeout { .. } => {
                ErrorKind::Collaborator
            }

            CheckoutError::Database(DbError::Validation(_)) => ErrorKind::Validation,
            CheckoutError::Database(_) => ErrorKind::Collaborator,
        }
    }

    /// Returns true if the same call may succeed when retried unchanged.
    ///
    /// ## Retryable Errors
    /// - Gateway unavailable, collaborator timeouts
    /// - Shipping provider outages
    /// - SQLite lock contention
    pub fn is_retryable(&self) -> bool {
        match self {
            CheckoutError::Pricing(e) => e.is_retryable(),
            CheckoutError::Gateway(GatewayError::Unavailable(_)) => true,
            CheckoutError::CollaboratorTimeout { .. } => true,
            CheckoutError::Database(e) => e.is_retryable(),
            _ => false,
        }
    }
}

/// Configuration loading failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A value is out of range or inconsistent.
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    /// Config file could not be read or parsed.
    #[error("Failed to load config: {0}")]
    LoadFailed(String),

    /// Config file could not be written.
    #[error("Failed to save config: {0}")]
    SaveFailed(String),
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::LoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::LoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for ConfigError {
    fn from(err: toml::ser::Error) -> Self {
        ConfigError::SaveFailed(err.to_string())
    }
}

impl From<ValidationError> for ConfigError {
    fn from(err: ValidationError) -> Self {
        ConfigError::Invalid(err.to_string())
    }
}
