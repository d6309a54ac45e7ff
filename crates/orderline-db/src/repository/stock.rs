//! # Stock Repository
//!
//! Conditional stock updates and the append-only stock ledger.
//!
//! ## Conditional Decrement
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Why not read-then-write?                             │
//! │                                                                         │
//! │  ❌ WRONG: check in Rust, then write                                    │
//! │     SELECT stock → 1        (checkout A)                                │
//! │     SELECT stock → 1        (checkout B)                                │
//! │     UPDATE stock = 0        (A)                                         │
//! │     UPDATE stock = 0        (B)   ← two units sold, one on the shelf    │
//! │                                                                         │
//! │  ✅ CORRECT: the condition lives in the UPDATE                          │
//! │     UPDATE products SET stock = stock - ?q                              │
//! │     WHERE id = ? AND stock >= ?q RETURNING stock                        │
//! │                                                                         │
//! │     No row returned → insufficient stock, nothing written               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every movement writes one [`StockLog`] row in the same transaction.
//! Products sold without a variant keep stock on `products`; variant lines
//! keep it on `product_variants`.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use orderline_core::{StockLog, StockReason};

const STOCK_LOG_COLUMNS: &str = "id, product_id, variant_id, previous_stock, delta, new_stock, \
                                 reason, reference, created_at";

/// Units of one product (or variant) moving in or out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockMovement {
    pub product_id: String,
    pub variant_id: Option<String>,
    pub quantity: i64,
}

impl StockMovement {
    pub fn new(product_id: impl Into<String>, variant_id: Option<String>, quantity: i64) -> Self {
        Self {
            product_id: product_id.into(),
            variant_id,
            quantity,
        }
    }
}

// =============================================================================
// Transaction-scoped operations
// =============================================================================

/// Takes `movement.quantity` units off the shelf.
///
/// Returns `None` (and writes nothing) when fewer units are available.
pub async fn decrement(
    conn: &mut SqliteConnection,
    movement: &StockMovement,
    reference: &str,
    at: DateTime<Utc>,
) -> DbResult<Option<StockLog>> {
    let new_stock: Option<i64> = match &movement.variant_id {
        Some(variant_id) => {
            sqlx::query_scalar(
                r#"
                UPDATE product_variants
                SET stock = stock - ?1
                WHERE id = ?2 AND product_id = ?3 AND stock >= ?1
                RETURNING stock
                "#,
            )
            .bind(movement.quantity)
            .bind(variant_id)
            .bind(&movement.product_id)
            .fetch_optional(&mut *conn)
            .await?
        }
        None => {
            sqlx::query_scalar(
                r#"
                UPDATE products
                SET stock = stock - ?1, updated_at = ?2
                WHERE id = ?3 AND stock >= ?1
                RETURNING stock
                "#,
            )
            .bind(movement.quantity)
            .bind(at)
            .bind(&movement.product_id)
            .fetch_optional(&mut *conn)
            .await?
        }
    };

    let Some(new_stock) = new_stock else {
        debug!(
            product_id = %movement.product_id,
            variant_id = ?movement.variant_id,
            requested = movement.quantity,
            "Conditional stock decrement matched no row"
        );
        return Ok(None);
    };

    let log = append_log(
        conn,
        movement,
        new_stock + movement.quantity,
        -movement.quantity,
        StockReason::Checkout,
        reference,
        at,
    )
    .await?;
    Ok(Some(log))
}

/// Puts `movement.quantity` units back on the shelf.
pub async fn restore(
    conn: &mut SqliteConnection,
    movement: &StockMovement,
    reason: StockReason,
    reference: &str,
    at: DateTime<Utc>,
) -> DbResult<StockLog> {
    let new_stock: Option<i64> = match &movement.variant_id {
        Some(variant_id) => {
            sqlx::query_scalar(
                "UPDATE product_variants SET stock = stock + ?1 WHERE id = ?2 RETURNING stock",
            )
            .bind(movement.quantity)
            .bind(variant_id)
            .fetch_optional(&mut *conn)
            .await?
        }
        None => {
            sqlx::query_scalar(
                "UPDATE products SET stock = stock + ?1, updated_at = ?2 WHERE id = ?3 RETURNING stock",
            )
            .bind(movement.quantity)
            .bind(at)
            .bind(&movement.product_id)
            .fetch_optional(&mut *conn)
            .await?
        }
    };

    let new_stock = new_stock.ok_or_else(|| match &movement.variant_id {
        Some(variant_id) => DbError::not_found("ProductVariant", variant_id),
        None => DbError::not_found("Product", &movement.product_id),
    })?;

    append_log(
        conn,
        movement,
        new_stock - movement.quantity,
        movement.quantity,
        reason,
        reference,
        at,
    )
    .await
}

/// Units currently on the shelf.
pub async fn available(
    conn: &mut SqliteConnection,
    product_id: &str,
    variant_id: Option<&str>,
) -> DbResult<i64> {
    let stock: Option<i64> = match variant_id {
        Some(variant_id) => {
            sqlx::query_scalar("SELECT stock FROM product_variants WHERE id = ?1")
                .bind(variant_id)
                .fetch_optional(&mut *conn)
                .await?
        }
        None => {
            sqlx::query_scalar("SELECT stock FROM products WHERE id = ?1")
                .bind(product_id)
                .fetch_optional(&mut *conn)
                .await?
        }
    };
    Ok(stock.unwrap_or(0))
}

async fn append_log(
    conn: &mut SqliteConnection,
    movement: &StockMovement,
    previous_stock: i64,
    delta: i64,
    reason: StockReason,
    reference: &str,
    at: DateTime<Utc>,
) -> DbResult<StockLog> {
    let log = StockLog {
        id: Uuid::new_v4().to_string(),
        product_id: movement.product_id.clone(),
        variant_id: movement.variant_id.clone(),
        previous_stock,
        delta,
        new_stock: previous_stock + delta,
        reason,
        reference: reference.to_string(),
        created_at: at,
    };

    sqlx::query(
        r#"
        INSERT INTO stock_logs (
            id, product_id, variant_id, previous_stock, delta, new_stock,
            reason, reference, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        "#,
    )
    .bind(&log.id)
    .bind(&log.product_id)
    .bind(&log.variant_id)
    .bind(log.previous_stock)
    .bind(log.delta)
    .bind(log.new_stock)
    .bind(log.reason)
    .bind(&log.reference)
    .bind(log.created_at)
    .execute(&mut *conn)
    .await?;

    debug!(
        product_id = %log.product_id,
        delta = log.delta,
        new_stock = log.new_stock,
        reason = %log.reason,
        reference = %log.reference,
        "Stock ledger entry appended"
    );

    Ok(log)
}

// =============================================================================
// Read-side repository
// =============================================================================

/// Read access to stock levels and the ledger.
#[derive(Debug, Clone)]
pub struct StockRepository {
    pool: SqlitePool,
}

impl StockRepository {
    /// Creates a new StockRepository.
    pub fn new(pool: SqlitePool) -> Self {
        StockRepository { pool }
    }

    /// Current stock of a product or variant.
    pub async fn stock_of(&self, product_id: &str, variant_id: Option<&str>) -> DbResult<i64> {
        let mut conn = self.pool.acquire().await?;
        available(&mut conn, product_id, variant_id).await
    }

    /// Ledger entries for one reference (order number), oldest first.
    pub async fn history(&self, reference: &str) -> DbResult<Vec<StockLog>> {
        let logs = sqlx::query_as::<_, StockLog>(&format!(
            "SELECT {} FROM stock_logs WHERE reference = ?1 ORDER BY created_at, rowid",
            STOCK_LOG_COLUMNS
        ))
        .bind(reference)
        .fetch_all(&self.pool)
        .await?;
        Ok(logs)
    }

    /// Ledger entries for one product (all variants), oldest first.
    pub async fn history_for_product(&self, product_id: &str) -> DbResult<Vec<StockLog>> {
        let logs = sqlx::query_as::<_, StockLog>(&format!(
            "SELECT {} FROM stock_logs WHERE product_id = ?1 ORDER BY created_at, rowid",
            STOCK_LOG_COLUMNS
        ))
        .bind(product_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(logs)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::catalog::tests::{seed_product, seed_variant};
    use crate::{Database, DbConfig};

    #[tokio::test]
    async fn test_decrement_writes_ledger() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        seed_product(&db, "A", 50_000, 5).await;

        let mut tx = db.begin().await.unwrap();
        let log = decrement(&mut tx, &StockMovement::new("A", None, 2), "ORD-1", Utc::now())
            .await
            .unwrap()
            .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(log.previous_stock, 5);
        assert_eq!(log.delta, -2);
        assert_eq!(log.new_stock, 3);
        assert_eq!(log.reason, StockReason::Checkout);
        assert_eq!(db.stock().stock_of("A", None).await.unwrap(), 3);
        assert_eq!(db.stock().history("ORD-1").await.unwrap(), vec![log]);
    }

    #[tokio::test]
    async fn test_decrement_refuses_oversell() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        seed_product(&db, "A", 50_000, 1).await;

        let mut tx = db.begin().await.unwrap();
        let result = decrement(&mut tx, &StockMovement::new("A", None, 2), "ORD-1", Utc::now())
            .await
            .unwrap();
        assert!(result.is_none());
        assert_eq!(available(&mut tx, "A", None).await.unwrap(), 1);
        tx.rollback().await.unwrap();

        assert!(db.stock().history("ORD-1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_variant_stock_is_separate() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        seed_product(&db, "A", 50_000, 10).await;
        seed_variant(&db, "A-L", "A", 1).await;

        let mut tx = db.begin().await.unwrap();
        let movement = StockMovement::new("A", Some("A-L".to_string()), 1);
        assert!(decrement(&mut tx, &movement, "ORD-2", Utc::now()).await.unwrap().is_some());
        assert!(decrement(&mut tx, &movement, "ORD-2", Utc::now()).await.unwrap().is_none());
        tx.commit().await.unwrap();

        assert_eq!(db.stock().stock_of("A", Some("A-L")).await.unwrap(), 0);
        assert_eq!(db.stock().stock_of("A", None).await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_restore_appends_positive_entry() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        seed_product(&db, "A", 50_000, 5).await;
        let movement = StockMovement::new("A", None, 2);

        let mut tx = db.begin().await.unwrap();
        decrement(&mut tx, &movement, "ORD-3", Utc::now()).await.unwrap();
        let log = restore(&mut tx, &movement, StockReason::Cancelled, "ORD-3", Utc::now())
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(log.previous_stock, 3);
        assert_eq!(log.delta, 2);
        assert_eq!(log.new_stock, 5);

        let history = db.stock().history("ORD-3").await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history.iter().map(|l| l.delta).sum::<i64>(), 0);
    }

    #[tokio::test]
    async fn test_ledger_is_append_only() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        seed_product(&db, "A", 50_000, 5).await;

        let mut tx = db.begin().await.unwrap();
        decrement(&mut tx, &StockMovement::new("A", None, 1), "ORD-4", Utc::now())
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let result = sqlx::query("DELETE FROM stock_logs").execute(db.pool()).await;
        let err: DbError = result.unwrap_err().into();
        assert!(matches!(err, DbError::ConstraintViolation(_)));
    }
}
