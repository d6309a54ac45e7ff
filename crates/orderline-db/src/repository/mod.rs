//! # Repository Module
//!
//! Database repository implementations for Orderline.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Two Ways In                                          │
//! │                                                                         │
//! │  Reads and admin writes              Checkout / webhook transaction     │
//! │       │                                   │                             │
//! │       │  db.orders().get_by_number(..)    │  let mut tx = db.begin()    │
//! │       ▼                                   ▼                             │
//! │  XxxRepository { pool }              free fns taking                    │
//! │  (acquires its own connection)       &mut SqliteConnection (&mut *tx)   │
//! │       │                                   │                             │
//! │       └──────────────┬────────────────────┘                             │
//! │                      ▼                                                  │
//! │               SQLite Database                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`CatalogRepository`](catalog::CatalogRepository) - Products, variants, flash sales, quote snapshots
//! - [`CouponRepository`](coupon::CouponRepository) - Coupons and redemptions
//! - [`OrderRepository`](order::OrderRepository) - Orders, items, guarded status updates
//! - [`StockRepository`](stock::StockRepository) - Stock levels and the ledger

pub mod catalog;
pub mod coupon;
pub mod order;
pub mod stock;
