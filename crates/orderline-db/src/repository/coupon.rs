//! # Coupon Repository
//!
//! Coupon definitions and redemption counters.
//!
//! ## Redemption
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    redeem() inside the checkout tx                      │
//! │                                                                         │
//! │  UPDATE coupons SET usage_count = usage_count + 1                       │
//! │  WHERE id = ? AND (no cap OR usage_count < max_usage_count)             │
//! │       │                                                                 │
//! │       ├── 0 rows ──► UsageExceeded                                      │
//! │       ▼                                                                 │
//! │  COUNT(coupon_usages) for this user  >= max_usage_per_user ?            │
//! │       │                                                                 │
//! │       ├── yes ─────► UserLimitExceeded  (tx rolls back the increment)   │
//! │       ▼                                                                 │
//! │  INSERT coupon_usages ──► Redeemed                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Usage is never released: a cancelled or failed order keeps its
//! redemption.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use orderline_core::validation::{validate_coupon_code, validate_product_name};
use orderline_core::{normalize_coupon_code, Coupon, DiscountKind, ValidationError};

const COUPON_COLUMNS: &str = "id, code, name, kind, value, max_discount, min_purchase, \
                              max_usage_count, max_usage_per_user, valid_from, valid_until, \
                              status, for_retail, for_reseller, free_shipping, usage_count";

/// One redemption of a coupon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct CouponUsage {
    pub id: String,
    pub coupon_id: String,
    pub user_id: Option<String>,
    pub order_number: String,
    pub created_at: DateTime<Utc>,
}

/// Result of redeeming a coupon at checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedeemOutcome {
    Redeemed,
    UsageExceeded,
    UserLimitExceeded,
}

/// Repository for coupon database operations.
#[derive(Debug, Clone)]
pub struct CouponRepository {
    pool: SqlitePool,
}

impl CouponRepository {
    /// Creates a new CouponRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CouponRepository { pool }
    }

    /// Inserts a coupon. The code is stored normalized (trimmed, upper-case).
    ///
    /// ## Returns
    /// * `Err(DbError::Validation)` - bad code, name, value or window
    /// * `Err(DbError::UniqueViolation)` - code already exists
    pub async fn insert(&self, coupon: &Coupon) -> DbResult<()> {
        let code = normalize_coupon_code(&coupon.code);
        validate_coupon_code(&code)?;
        validate_product_name(&coupon.name)?;
        validate_coupon_value(coupon)?;

        debug!(code = %code, kind = ?coupon.kind, "Inserting coupon");

        sqlx::query(
            r#"
            INSERT INTO coupons (
                id, code, name, kind, value, max_discount, min_purchase,
                max_usage_count, max_usage_per_user, valid_from, valid_until,
                status, for_retail, for_reseller, free_shipping, usage_count
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
            "#,
        )
        .bind(&coupon.id)
        .bind(&code)
        .bind(&coupon.name)
        .bind(coupon.kind)
        .bind(coupon.value)
        .bind(coupon.max_discount)
        .bind(coupon.min_purchase)
        .bind(coupon.max_usage_count)
        .bind(coupon.max_usage_per_user)
        .bind(coupon.valid_from)
        .bind(coupon.valid_until)
        .bind(coupon.status)
        .bind(coupon.for_retail)
        .bind(coupon.for_reseller)
        .bind(coupon.free_shipping)
        .bind(coupon.usage_count)
        .execute(&self.pool)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { field, .. } => DbError::UniqueViolation {
                field,
                value: code.clone(),
            },
            other => other,
        })?;

        Ok(())
    }

    /// Looks up a coupon by code, case-insensitively.
    pub async fn get_by_code(&self, code: &str) -> DbResult<Option<Coupon>> {
        let mut conn = self.pool.acquire().await?;
        find_by_code(&mut conn, code).await
    }

    /// How many times `user_id` has redeemed the coupon.
    pub async fn usage_by_user(&self, coupon_id: &str, user_id: &str) -> DbResult<i64> {
        let mut conn = self.pool.acquire().await?;
        count_user_usage(&mut conn, coupon_id, user_id).await
    }

    /// Redemptions recorded for an order.
    pub async fn usages_for_order(&self, order_number: &str) -> DbResult<Vec<CouponUsage>> {
        let usages = sqlx::query_as::<_, CouponUsage>(
            r#"
            SELECT id, coupon_id, user_id, order_number, created_at
            FROM coupon_usages WHERE order_number = ?1
            ORDER BY created_at
            "#,
        )
        .bind(order_number)
        .fetch_all(&self.pool)
        .await?;
        Ok(usages)
    }
}

// =============================================================================
// Connection-scoped operations
// =============================================================================

pub(crate) async fn find_by_code(conn: &mut SqliteConnection, code: &str) -> DbResult<Option<Coupon>> {
    let coupon = sqlx::query_as::<_, Coupon>(&format!(
        "SELECT {} FROM coupons WHERE code = ?1",
        COUPON_COLUMNS
    ))
    .bind(normalize_coupon_code(code))
    .fetch_optional(&mut *conn)
    .await?;
    Ok(coupon)
}

pub(crate) async fn count_user_usage(
    conn: &mut SqliteConnection,
    coupon_id: &str,
    user_id: &str,
) -> DbResult<i64> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM coupon_usages WHERE coupon_id = ?1 AND user_id = ?2")
            .bind(coupon_id)
            .bind(user_id)
            .fetch_one(&mut *conn)
            .await?;
    Ok(count)
}

/// Redeems one use of a coupon for an order.
///
/// Must run inside the checkout transaction: a `UserLimitExceeded` outcome
/// leaves the global counter incremented until the caller rolls back.
pub async fn redeem(
    conn: &mut SqliteConnection,
    coupon_id: &str,
    user_id: Option<&str>,
    order_number: &str,
    at: DateTime<Utc>,
) -> DbResult<RedeemOutcome> {
    // Row comes back only if the global cap admits one more use
    let per_user_cap: Option<Option<i64>> = sqlx::query_scalar(
        r#"
        UPDATE coupons
        SET usage_count = usage_count + 1
        WHERE id = ?1
          AND (max_usage_count IS NULL OR max_usage_count <= 0 OR usage_count < max_usage_count)
        RETURNING max_usage_per_user
        "#,
    )
    .bind(coupon_id)
    .fetch_optional(&mut *conn)
    .await?;

    let Some(per_user_cap) = per_user_cap else {
        debug!(coupon_id, "Coupon usage cap reached");
        return Ok(RedeemOutcome::UsageExceeded);
    };

    if let (Some(user_id), Some(cap)) = (user_id, per_user_cap.filter(|c| *c > 0)) {
        let used = count_user_usage(conn, coupon_id, user_id).await?;
        if used >= cap {
            debug!(coupon_id, user_id, used, cap, "Coupon per-user limit reached");
            return Ok(RedeemOutcome::UserLimitExceeded);
        }
    }

    sqlx::query(
        r#"
        INSERT INTO coupon_usages (id, coupon_id, user_id, order_number, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(coupon_id)
    .bind(user_id)
    .bind(order_number)
    .bind(at)
    .execute(&mut *conn)
    .await?;

    debug!(coupon_id, order_number, "Coupon redeemed");
    Ok(RedeemOutcome::Redeemed)
}

fn validate_coupon_value(coupon: &Coupon) -> Result<(), ValidationError> {
    let max = match coupon.kind {
        DiscountKind::Percentage => 100,
        DiscountKind::Fixed => i64::MAX,
    };
    if coupon.value < 0 || coupon.value > max {
        return Err(ValidationError::OutOfRange {
            field: "value".to_string(),
            min: 0,
            max,
        });
    }
    if coupon.valid_until <= coupon.valid_from {
        return Err(ValidationError::InvalidFormat {
            field: "valid_until".to_string(),
            reason: "must be after valid_from".to_string(),
        });
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
