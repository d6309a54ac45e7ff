//! # Order Repository
//!
//! Orders, their line items, and guarded status updates.
//!
//! ## Guarded Updates
//! Every status change names the state it expects to leave:
//!
//! ```text
//! UPDATE orders SET payment_status = 'paid', status = 'confirmed', ...
//! WHERE id = ? AND payment_status = 'payment_pending'
//! ```
//!
//! Zero rows affected means another writer moved the order first; the caller
//! re-reads and re-decides. Two webhook deliveries for the same order can
//! therefore never both apply.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use orderline_core::payment::PaymentUpdate;
use orderline_core::{Order, OrderItem, OrderStatus, PaymentStatus};
use orderline_core::order::OrderWithItems;

const ORDER_COLUMNS: &str = "id, order_number, user_id, tier, customer_name, customer_phone, \
    customer_email, shipping_address, shipping_origin, shipping_destination, status, \
    payment_status, subtotal, discount, coupon_code, taxable_base, tax_rate_bps, tax, \
    total_weight_grams, shipping_cost, grand_total, payment_token, payment_redirect_url, \
    created_at, updated_at, paid_at, cancelled_at, cancel_reason, refunded_at";

const ORDER_ITEM_COLUMNS: &str = "id, order_id, product_id, variant_id, sku, product_name, \
    variant_name, quantity, base_unit_price, unit_price, line_total, price_source, flash_sale_id";

/// Repository for order database operations.
///
/// ## Usage
/// ```rust,ignore
/// let order = db.orders().get_by_number("ORD-20261018-1A2B3C4D5E6F4A7B").await?;
/// let items = db.orders().items(&order.id).await?;
/// ```
#[derive(Debug, Clone)]
pub struct OrderRepository {
    pool: SqlitePool,
}

impl OrderRepository {
    /// Creates a new OrderRepository.
    pub fn new(pool: SqlitePool) -> Self {
        OrderRepository { pool }
    }

    /// Gets an order by its public order number.
    pub async fn get_by_number(&self, order_number: &str) -> DbResult<Option<Order>> {
        let mut conn = self.pool.acquire().await?;
        find_by_number(&mut conn, order_number).await
    }

    /// Gets an order by internal ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Order>> {
        let order = sqlx::query_as::<_, Order>(&format!(
            "SELECT {} FROM orders WHERE id = ?1",
            ORDER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(order)
    }

    /// Gets all line items for an order.
    pub async fn items(&self, order_id: &str) -> DbResult<Vec<OrderItem>> {
        let mut conn = self.pool.acquire().await?;
        items_for(&mut conn, order_id).await
    }

    /// Gets an order with its items.
    pub async fn get_with_items(&self, order_number: &str) -> DbResult<Option<OrderWithItems>> {
        let mut conn = self.pool.acquire().await?;
        let Some(order) = find_by_number(&mut conn, order_number).await? else {
            return Ok(None);
        };
        let items = items_for(&mut conn, &order.id).await?;
        Ok(Some(OrderWithItems { order, items }))
    }

    /// Lists a user's orders, newest first.
    pub async fn list_for_user(&self, user_id: &str, limit: u32) -> DbResult<Vec<Order>> {
        let orders = sqlx::query_as::<_, Order>(&format!(
            "SELECT {} FROM orders WHERE user_id = ?1 ORDER BY created_at DESC LIMIT ?2",
            ORDER_COLUMNS
        ))
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(orders)
    }
}

// =============================================================================
// Transaction-scoped operations
// =============================================================================

pub async fn find_by_number(conn: &mut SqliteConnection, order_number: &str) -> DbResult<Option<Order>> {
    let order = sqlx::query_as::<_, Order>(&format!(
        "SELECT {} FROM orders WHERE order_number = ?1",
        ORDER_COLUMNS
    ))
    .bind(order_number)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(order)
}

pub async fn items_for(conn: &mut SqliteConnection, order_id: &str) -> DbResult<Vec<OrderItem>> {
    let items = sqlx::query_as::<_, OrderItem>(&format!(
        "SELECT {} FROM order_items WHERE order_id = ?1 ORDER BY rowid",
        ORDER_ITEM_COLUMNS
    ))
    .bind(order_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(items)
}

/// Inserts an order header.
pub async fn insert_order(conn: &mut SqliteConnection, order: &Order) -> DbResult<()> {
    debug!(order_number = %order.order_number, grand_total = %order.grand_total, "Inserting order");

    sqlx::query(&format!(
        r#"
        INSERT INTO orders ({})
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27, ?28, ?29)
        "#,
        ORDER_COLUMNS
    ))
    .bind(&order.id)
    .bind(&order.order_number)
    .bind(&order.user_id)
    .bind(order.tier)
    .bind(&order.customer_name)
    .bind(&order.customer_phone)
    .bind(&order.customer_email)
    .bind(&order.shipping_address)
    .bind(&order.shipping_origin)
    .bind(&order.shipping_destination)
    .bind(order.status)
    .bind(order.payment_status)
    .bind(order.subtotal)
    .bind(order.discount)
    .bind(&order.coupon_code)
    .bind(order.taxable_base)
    .bind(order.tax_rate_bps)
    .bind(order.tax)
    .bind(order.total_weight_grams)
    .bind(order.shipping_cost)
    .bind(order.grand_total)
    .bind(&order.payment_token)
    .bind(&order.payment_redirect_url)
    .bind(order.created_at)
    .bind(order.updated_at)
    .bind(order.paid_at)
    .bind(order.cancelled_at)
    .bind(&order.cancel_reason)
    .bind(order.refunded_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Inserts an order's line items.
pub async fn insert_items(conn: &mut SqliteConnection, items: &[OrderItem]) -> DbResult<()> {
    for item in items {
        sqlx::query(&format!(
            r#"
            INSERT INTO order_items ({})
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
            ORDER_ITEM_COLUMNS
        ))
        .bind(&item.id)
        .bind(&item.order_id)
        .bind(&item.product_id)
        .bind(&item.variant_id)
        .bind(&item.sku)
        .bind(&item.product_name)
        .bind(&item.variant_name)
        .bind(item.quantity)
        .bind(item.base_unit_price)
        .bind(item.unit_price)
        .bind(item.line_total)
        .bind(item.price_source)
        .bind(&item.flash_sale_id)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

/// Stores the gateway's charge token and redirect URL.
pub async fn set_payment_token(
    conn: &mut SqliteConnection,
    order_id: &str,
    token: &str,
    redirect_url: Option<&str>,
    at: DateTime<Utc>,
) -> DbResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE orders
        SET payment_token = ?2, payment_redirect_url = ?3, updated_at = ?4
        WHERE id = ?1
        "#,
    )
    .bind(order_id)
    .bind(token)
    .bind(redirect_url)
    .bind(at)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found("Order", order_id));
    }
    Ok(())
}

/// Applies a payment transition if the order is still in `expected`.
///
/// Returns `false` when another writer changed `payment_status` first.
pub async fn apply_payment_update(
    conn: &mut SqliteConnection,
    order_id: &str,
    expected: PaymentStatus,
    update: &PaymentUpdate,
    at: DateTime<Utc>,
) -> DbResult<bool> {
    let paid_at = update.mark_paid.then_some(at);

    let result = sqlx::query(
        r#"
        UPDATE orders
        SET payment_status = ?3,
            status = ?4,
            paid_at = COALESCE(?5, paid_at),
            updated_at = ?6
        WHERE id = ?1 AND payment_status = ?2
        "#,
    )
    .bind(order_id)
    .bind(expected)
    .bind(update.payment_status)
    .bind(update.order_status)
    .bind(paid_at)
    .bind(at)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Cancels an order if it is still in `expected`.
pub async fn mark_cancelled(
    conn: &mut SqliteConnection,
    order_id: &str,
    expected: OrderStatus,
    reason: Option<&str>,
    at: DateTime<Utc>,
) -> DbResult<bool> {
    let result = sqlx::query(
        r#"
        UPDATE orders
        SET status = 'cancelled', cancelled_at = ?3, cancel_reason = ?4, updated_at = ?3
        WHERE id = ?1 AND status = ?2
        "#,
    )
    .bind(order_id)
    .bind(expected)
    .bind(at)
    .bind(reason)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Refunds a paid order.
pub async fn mark_refunded(
    conn: &mut SqliteConnection,
    order_id: &str,
    at: DateTime<Utc>,
) -> DbResult<bool> {
    let result = sqlx::query(
        r#"
        UPDATE orders
        SET status = 'refunded', payment_status = 'refunded', refunded_at = ?2, updated_at = ?2
        WHERE id = ?1 AND payment_status = 'paid'
        "#,
    )
    .bind(order_id)
    .bind(at)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Moves a fulfillment status forward if the order is still in `from`.
pub async fn advance_status(
    conn: &mut SqliteConnection,
    order_id: &str,
    from: OrderStatus,
    to: OrderStatus,
    at: DateTime<Utc>,
) -> DbResult<bool> {
    let result = sqlx::query("UPDATE orders SET status = ?3, updated_at = ?4 WHERE id = ?1 AND status = ?2")
        .bind(order_id)
        .bind(from)
        .bind(to)
        .bind(at)
        .execute(&mut *conn)
        .await?;

    Ok(result.rows_affected() == 1)
}

// =============================================================================
// Identifiers
// =============================================================================

/// Hex digits after the date in an order number.
const ORDER_SUFFIX_LEN: usize = 16;

/// Generates an order number in format: ORD-YYYYMMDD-XXXXXXXXXXXXXXXX
///
/// ## Format
/// - YYYYMMDD: UTC date the order was placed
/// - XXXXXXXXXXXXXXXX: first 16 hex digits of a v4 UUID, upper-case
///
/// A clash is still possible in principle; the unique index turns it into
/// a retryable [`DbError::UniqueViolation`] and a retry draws a new number.
///
/// ## Example
/// `ORD-20261018-1A2B3C4D5E6F4A7B`
pub fn generate_order_number(at: DateTime<Utc>) -> String {
    let suffix: String = Uuid::new_v4().simple().to_string().chars().take(ORDER_SUFFIX_LEN).collect();
    format!("ORD-{}-{}", at.format("%Y%m%d"), suffix.to_uppercase())
}

/// Generates a new order ID.
pub fn generate_order_id() -> String {
    Uuid::new_v4().to_string()
}

/// Generates a new order item ID.
pub fn generate_order_item_id() -> String {
    Uuid::new_v4().to_string()
}

// =============================================================================
// Unit Tests
// =============================================================================
