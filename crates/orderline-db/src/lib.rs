//! # orderline-db: Database Layer for Orderline
//!
//! SQLite storage for the catalog, coupons, orders and the stock ledger,
//! using sqlx for async operations.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Orderline Data Flow                              │
//! │                                                                         │
//! │  CheckoutService (orderline-checkout)                                   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   orderline-db (THIS CRATE)                     │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌────────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories  │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │                │    │  (embedded)  │  │   │
//! │  │   │               │    │ CatalogRepo    │    │              │  │   │
//! │  │   │ SqlitePool    │◄───│ CouponRepo     │    │ 001_initial  │  │   │
//! │  │   │ Transactions  │    │ OrderRepo      │    │   _schema    │  │   │
//! │  │   │               │    │ StockRepo      │    │              │  │   │
//! │  │   └───────────────┘    └────────────────┘    └──────────────┘  │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database (WAL)                       │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Repository implementations and transaction-scoped counters
//!
//! ## Usage
//!
//! ```rust,ignore
//! use orderline_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("path/to/orderline.db")).await?;
//!
//! let snapshot = db.catalog().load_snapshot(&request).await?;
//! let order = db.orders().get_with_items("ORD-20261018-1A2B3C4D").await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::catalog::{CatalogRepository, FlashClaimOutcome};
pub use repository::coupon::{CouponRepository, CouponUsage, RedeemOutcome};
pub use repository::order::OrderRepository;
pub use repository::stock::{StockMovement, StockRepository};

// Connection type taken by the transaction-scoped repository functions
pub use sqlx::SqliteConnection;
