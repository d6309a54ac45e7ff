//! # orderline-checkout: Checkout Orchestration for Orderline
//!
//! Places orders and reconciles them with the payment gateway.
//!
//! ## Request Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   Storefront ──quote──► CheckoutService::quote ──► OrderSummary         │
//! │        │                                                                │
//! │        └──checkout──► CheckoutService::checkout                         │
//! │                            │  one SQLite transaction                    │
//! │                            ├─► stock, flash sales, coupon counters      │
//! │                            ├─► orders + order_items                     │
//! │                            └─► PaymentGateway::create_charge_token      │
//! │                                                                         │
//! │   Gateway webhook ──► CheckoutService::process_payment_notification     │
//! │                            │  SignatureVerifier first                   │
//! │                            └─► payment::apply ─► guarded UPDATE         │
//! │                                                                         │
//! │   Back office ──► cancel · refund · advance_fulfillment                 │
//! │                                                                         │
//! │   After every commit ──► NotificationDispatcher (best effort)           │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`orchestrator`] - The checkout service and its request/outcome types
//! - [`gateway`] - Payment gateway and signature verifier traits
//! - [`notify`] - Notification dispatcher trait and a logging implementation
//! - [`config`] - TOML + environment configuration
//! - [`error`] - Checkout and configuration errors
//!
//! ## Usage
//!
//! ```rust,ignore
//! use orderline_checkout::{CheckoutConfig, CheckoutService, Collaborators};
//! use orderline_db::Database;
//!
//! let config = CheckoutConfig::load(None)?;
//! let db = Database::new(config.db_config()).await?;
//! let service = CheckoutService::new(db, &config, collaborators);
//!
//! let receipt = service.checkout(&request, chrono::Utc::now()).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;
pub mod gateway;
pub mod notify;
pub mod orchestrator;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::CheckoutConfig;
pub use error::{CheckoutError, CheckoutResult, ConfigError, ConfigResult, GatewayError};
pub use gateway::{ChargeRequest, ChargeToken, PaymentGateway, PaymentNotification, SignatureVerifier};
pub use notify::{DispatchError, LogNotifier, NotificationDispatcher, NotificationKind};
pub use orchestrator::{
    CheckoutReceipt, CheckoutRequest, CheckoutService, Collaborators, NotificationOutcome,
};
