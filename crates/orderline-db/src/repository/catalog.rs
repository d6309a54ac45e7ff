//! # Catalog Repository
//!
//! Products, variants and flash sales, plus the snapshot the pricing engine
//! prices against.
//!
//! ## Quote Snapshot
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    load_snapshot(request)                               │
//! │                                                                         │
//! │  QuoteRequest { items, coupon_code, user_id }                           │
//! │       │                                                                 │
//! │       ├── products        WHERE id IN items.product_id                  │
//! │       ├── variants        WHERE id IN items.variant_id                  │
//! │       ├── flash_sales     WHERE product_id IN items.product_id          │
//! │       │     └── purchases by user_id (unreleased rows only)             │
//! │       └── coupon          WHERE code = normalize(coupon_code)           │
//! │             └── usages by user_id                                       │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  CatalogSnapshot ──► SummaryComposer (pure, no I/O)                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The flash-sale counter functions at the bottom run inside the checkout
//! transaction.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::repository::coupon;
use orderline_core::validation::{validate_price, validate_product_name, validate_sku};
use orderline_core::{CatalogSnapshot, FlashSale, Money, Product, ProductVariant, QuoteRequest, ValidationError};

const PRODUCT_COLUMNS: &str =
    "id, sku, name, base_price, weight_grams, stock, is_active, created_at, updated_at";

const VARIANT_COLUMNS: &str =
    "id, product_id, name, price_override, weight_override_grams, stock, is_active";

const FLASH_SALE_COLUMNS: &str =
    "id, product_id, sale_price, starts_at, ends_at, per_user_limit, stock_cap, sold_count";

/// Repository for catalog database operations.
#[derive(Debug, Clone)]
pub struct CatalogRepository {
    pool: SqlitePool,
}

impl CatalogRepository {
    /// Creates a new CatalogRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CatalogRepository { pool }
    }

    // =========================================================================
    // Products
    // =========================================================================

    /// Inserts a new product.
    ///
    /// ## Returns
    /// * `Err(DbError::Validation)` - SKU, name, price or weight rejected
    /// * `Err(DbError::UniqueViolation)` - SKU already exists
    pub async fn insert_product(&self, product: &Product) -> DbResult<()> {
        validate_sku(&product.sku)?;
        validate_product_name(&product.name)?;
        validate_price("base_price", product.base_price.minor())?;
        validate_non_negative("weight_grams", product.weight_grams)?;
        validate_non_negative("stock", product.stock)?;

        debug!(sku = %product.sku, "Inserting product");

        sqlx::query(
            r#"
            INSERT INTO products (
                id, sku, name, base_price, weight_grams, stock,
                is_active, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&product.id)
        .bind(&product.sku)
        .bind(&product.name)
        .bind(product.base_price)
        .bind(product.weight_grams)
        .bind(product.stock)
        .bind(product.is_active)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { field, .. } => DbError::UniqueViolation {
                field,
                value: product.sku.clone(),
            },
            other => other,
        })?;

        Ok(())
    }

    /// Gets a product by ID, active or not.
    pub async fn get_product(&self, id: &str) -> DbResult<Option<Product>> {
        let mut conn = self.pool.acquire().await?;
        find_product(&mut conn, id).await
    }

    /// Gets a product by SKU.
    pub async fn get_product_by_sku(&self, sku: &str) -> DbResult<Option<Product>> {
        let product = sqlx::query_as::<_, Product>(&format!(
            "SELECT {} FROM products WHERE sku = ?1",
            PRODUCT_COLUMNS
        ))
        .bind(sku)
        .fetch_optional(&self.pool)
        .await?;
        Ok(product)
    }

    /// Soft-deletes a product. Historical order items still reference it.
    pub async fn deactivate_product(&self, id: &str) -> DbResult<()> {
        let result = sqlx::query("UPDATE products SET is_active = 0, updated_at = ?2 WHERE id = ?1")
            .bind(id)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id));
        }
        Ok(())
    }

    /// Counts active products (for diagnostics).
    pub async fn count_products(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products WHERE is_active = 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    // =========================================================================
    // Variants
    // =========================================================================

    /// Inserts a new variant of an existing product.
    pub async fn insert_variant(&self, variant: &ProductVariant) -> DbResult<()> {
        validate_product_name(&variant.name)?;
        if let Some(price) = variant.price_override {
            validate_price("price_override", price.minor())?;
        }
        if let Some(weight) = variant.weight_override_grams {
            validate_non_negative("weight_override_grams", weight)?;
        }
        validate_non_negative("stock", variant.stock)?;

        debug!(product_id = %variant.product_id, name = %variant.name, "Inserting variant");

        sqlx::query(
            r#"
            INSERT INTO product_variants (
                id, product_id, name, price_override, weight_override_grams, stock, is_active
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&variant.id)
        .bind(&variant.product_id)
        .bind(&variant.name)
        .bind(variant.price_override)
        .bind(variant.weight_override_grams)
        .bind(variant.stock)
        .bind(variant.is_active)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Gets a variant by ID.
    pub async fn get_variant(&self, id: &str) -> DbResult<Option<ProductVariant>> {
        let variant = sqlx::query_as::<_, ProductVariant>(&format!(
            "SELECT {} FROM product_variants WHERE id = ?1",
            VARIANT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(variant)
    }

    /// Lists the variants of a product.
    pub async fn variants_for(&self, product_id: &str) -> DbResult<Vec<ProductVariant>> {
        let variants = sqlx::query_as::<_, ProductVariant>(&format!(
            "SELECT {} FROM product_variants WHERE product_id = ?1 ORDER BY name",
            VARIANT_COLUMNS
        ))
        .bind(product_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(variants)
    }

    // =========================================================================
    // Flash Sales
    // =========================================================================

    /// Schedules a flash sale.
    ///
    /// ## Returns
    /// * `Err(DbError::Validation)` - empty window, negative price or limits
    pub async fn insert_flash_sale(&self, sale: &FlashSale) -> DbResult<()> {
        validate_price("sale_price", sale.sale_price.minor())?;
        if sale.ends_at <= sale.starts_at {
            return Err(ValidationError::InvalidFormat {
                field: "ends_at".to_string(),
                reason: "must be after starts_at".to_string(),
            }
            .into());
        }
        if let Some(limit) = sale.per_user_limit {
            validate_non_negative("per_user_limit", limit)?;
        }
        if let Some(cap) = sale.stock_cap {
            validate_non_negative("stock_cap", cap)?;
        }

        debug!(product_id = %sale.product_id, sale_price = %sale.sale_price, "Inserting flash sale");

        sqlx::query(
            r#"
            INSERT INTO flash_sales (
                id, product_id, sale_price, starts_at, ends_at,
                per_user_limit, stock_cap, sold_count
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&sale.id)
        .bind(&sale.product_id)
        .bind(sale.sale_price)
        .bind(sale.starts_at)
        .bind(sale.ends_at)
        .bind(sale.per_user_limit)
        .bind(sale.stock_cap)
        .bind(sale.sold_count)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Gets a flash sale by ID.
    pub async fn get_flash_sale(&self, id: &str) -> DbResult<Option<FlashSale>> {
        let sale = sqlx::query_as::<_, FlashSale>(&format!(
            "SELECT {} FROM flash_sales WHERE id = ?1",
            FLASH_SALE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(sale)
    }

    /// Units of a flash sale a user holds in orders that were not restored.
    pub async fn flash_sale_purchased_by(&self, flash_sale_id: &str, user_id: &str) -> DbResult<i64> {
        let mut conn = self.pool.acquire().await?;
        purchased_by(&mut conn, flash_sale_id, user_id).await
    }

    // =========================================================================
    // Snapshot
    // =========================================================================

    /// Loads everything needed to price `request` into a [`CatalogSnapshot`].
    ///
    /// Unknown IDs and codes are simply absent from the snapshot; the pricing
    /// engine reports them.
    pub async fn load_snapshot(&self, request: &QuoteRequest) -> DbResult<CatalogSnapshot> {
        let mut conn = self.pool.acquire().await?;
        load_snapshot(&mut conn, request).await
    }
}

// =============================================================================
// Connection-scoped reads
// =============================================================================

pub(crate) async fn find_product(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Product>> {
    let product = sqlx::query_as::<_, Product>(&format!(
        "SELECT {} FROM products WHERE id = ?1",
        PRODUCT_COLUMNS
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(product)
}

/// Builds a [`CatalogSnapshot`] on an existing connection or transaction.
///
/// Checkout calls this inside its transaction so the re-priced summary and
/// the counter updates see the same rows.
pub async fn load_snapshot(
    conn: &mut SqliteConnection,
    request: &QuoteRequest,
) -> DbResult<CatalogSnapshot> {
    let mut snapshot = CatalogSnapshot::new();

    let product_ids: BTreeSet<&str> = request.items.iter().map(|i| i.product_id.as_str()).collect();
    let variant_ids: BTreeSet<&str> = request
        .items
        .iter()
        .filter_map(|i| i.variant_id.as_deref())
        .collect();

    for product_id in &product_ids {
        if let Some(product) = find_product(conn, product_id).await? {
            snapshot.insert_product(product);
        }

        let sales = sqlx::query_as::<_, FlashSale>(&format!(
            "SELECT {} FROM flash_sales WHERE product_id = ?1",
            FLASH_SALE_COLUMNS
        ))
        .bind(*product_id)
        .fetch_all(&mut *conn)
        .await?;

        for sale in sales {
            if let Some(user_id) = request.user_id.as_deref() {
                let purchased = purchased_by(conn, &sale.id, user_id).await?;
                snapshot.set_flash_sale_purchased(&sale.id, user_id, purchased);
            }
            snapshot.insert_flash_sale(sale);
        }
    }

    for variant_id in &variant_ids {
        let variant = sqlx::query_as::<_, ProductVariant>(&format!(
            "SELECT {} FROM product_variants WHERE id = ?1",
            VARIANT_COLUMNS
        ))
        .bind(*variant_id)
        .fetch_optional(&mut *conn)
        .await?;

        if let Some(variant) = variant {
            snapshot.insert_variant(variant);
        }
    }

    if let Some(code) = request.effective_coupon_code() {
        if let Some(found) = coupon::find_by_code(conn, code).await? {
            if let Some(user_id) = request.user_id.as_deref() {
                let used = coupon::count_user_usage(conn, &found.id, user_id).await?;
                snapshot.set_coupon_used(&found.id, user_id, used);
            }
            snapshot.insert_coupon(found);
        }
    }

    debug!(
        products = product_ids.len(),
        variants = variant_ids.len(),
        coupon = request.effective_coupon_code().is_some(),
        "Catalog snapshot loaded"
    );

    Ok(snapshot)
}

async fn purchased_by(conn: &mut SqliteConnection, flash_sale_id: &str, user_id: &str) -> DbResult<i64> {
    let quantity: i64 = sqlx::query_scalar(
        r#"
        SELECT COALESCE(SUM(quantity), 0) FROM flash_sale_purchases
        WHERE flash_sale_id = ?1 AND user_id = ?2 AND released_at IS NULL
        "#,
    )
    .bind(flash_sale_id)
    .bind(user_id)
    .fetch_one(&mut *conn)
    .await?;
    Ok(quantity)
}

// =============================================================================
// Flash-sale counters (transaction-scoped)
// =============================================================================

/// Result of claiming flash-sale units at checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashClaimOutcome {
    Claimed,
    /// The sale's stock cap would be exceeded.
    SoldOut,
    /// The user's per-sale limit would be exceeded.
    UserLimitExceeded,
}

/// Claims `quantity` units of a flash sale for an order.
///
/// The stock cap is enforced by a conditional `UPDATE`; the per-user limit
/// by counting this user's unreleased purchases inside the same transaction.
/// Guests (`user_id = None`) are bound by the cap only.
pub async fn claim_flash_sale(
    conn: &mut SqliteConnection,
    flash_sale_id: &str,
    user_id: Option<&str>,
    quantity: i64,
    order_number: &str,
    at: DateTime<Utc>,
) -> DbResult<FlashClaimOutcome> {
    if let Some(user_id) = user_id {
        let limit: Option<Option<i64>> =
            sqlx::query_scalar("SELECT per_user_limit FROM flash_sales WHERE id = ?1")
                .bind(flash_sale_id)
                .fetch_optional(&mut *conn)
                .await?;
        let limit = limit.ok_or_else(|| DbError::not_found("FlashSale", flash_sale_id))?;

        if let Some(limit) = limit.filter(|l| *l > 0) {
            let purchased = purchased_by(conn, flash_sale_id, user_id).await?;
            if purchased + quantity > limit {
                debug!(flash_sale_id, user_id, purchased, limit, "Flash sale per-user limit reached");
                return Ok(FlashClaimOutcome::UserLimitExceeded);
            }
        }
    }

    let sold: Option<i64> = sqlx::query_scalar(
        r#"
        UPDATE flash_sales
        SET sold_count = sold_count + ?1
        WHERE id = ?2 AND (stock_cap IS NULL OR sold_count + ?1 <= stock_cap)
        RETURNING sold_count
        "#,
    )
    .bind(quantity)
    .bind(flash_sale_id)
    .fetch_optional(&mut *conn)
    .await?;

    let Some(sold) = sold else {
        debug!(flash_sale_id, quantity, "Flash sale cap reached");
        return Ok(FlashClaimOutcome::SoldOut);
    };

    sqlx::query(
        r#"
        INSERT INTO flash_sale_purchases (
            id, flash_sale_id, user_id, order_number, quantity, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(flash_sale_id)
    .bind(user_id)
    .bind(order_number)
    .bind(quantity)
    .bind(at)
    .execute(&mut *conn)
    .await?;

    debug!(flash_sale_id, quantity, sold_count = sold, order_number, "Flash sale units claimed");
    Ok(FlashClaimOutcome::Claimed)
}

/// Returns an order's flash-sale units to their sales.
///
/// Released purchases stop counting against the per-user limit. Returns the
/// number of purchase rows released; a second call releases nothing.
pub async fn release_flash_sales(
    conn: &mut SqliteConnection,
    order_number: &str,
    at: DateTime<Utc>,
) -> DbResult<u64> {
    let claims: Vec<(String, String, i64)> = sqlx::query_as(
        r#"
        SELECT id, flash_sale_id, quantity FROM flash_sale_purchases
        WHERE order_number = ?1 AND released_at IS NULL
        "#,
    )
    .bind(order_number)
    .fetch_all(&mut *conn)
    .await?;

    for (purchase_id, flash_sale_id, quantity) in &claims {
        sqlx::query("UPDATE flash_sales SET sold_count = MAX(sold_count - ?1, 0) WHERE id = ?2")
            .bind(quantity)
            .bind(flash_sale_id)
            .execute(&mut *conn)
            .await?;

        sqlx::query("UPDATE flash_sale_purchases SET released_at = ?1 WHERE id = ?2")
            .bind(at)
            .bind(purchase_id)
            .execute(&mut *conn)
            .await?;
    }

    if !claims.is_empty() {
        debug!(order_number, released = claims.len(), "Flash sale units released");
    }
    Ok(claims.len() as u64)
}

fn validate_non_negative(field: &str, value: i64) -> Result<(), ValidationError> {
    if value < 0 {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: i64::MAX,
        });
    }
    Ok(())
}

/// Helper to generate a new catalog ID.
pub fn generate_id() -> String {
    Uuid::new_v4().to_string()
}

/// Builds an active product with no variants, stamped now.
pub fn new_product(
    sku: impl Into<String>,
    name: impl Into<String>,
    base_price: Money,
    weight_grams: i64,
    stock: i64,
) -> Product {
    let now = Utc::now();
    Product {
        id: generate_id(),
        sku: sku.into(),
        name: name.into(),
        base_price,
        weight_grams,
        stock,
        is_active: true,
        created_at: now,
        updated_at: now,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::{Database, DbConfig};
    use chrono::Duration;
    use orderline_core::{ItemRequest, PricingCatalog, ShippingRequest};

    pub(crate) async fn seed_product(db: &Database, id: &str, price: i64, stock: i64) -> Product {
        let mut product = new_product(format!("SKU-{}", id), format!("Product {}", id), Money::from_minor(price), 500, stock);
        product.id = id.to_string();
        db.catalog().insert_product(&product).await.unwrap();
        product
    }

    pub(crate) async fn seed_variant(db: &Database, id: &str, product_id: &str, stock: i64) -> ProductVariant {
        let variant = ProductVariant {
            id: id.to_string(),
            product_id: product_id.to_string(),
            name: format!("Variant {}", id),
            price_override: None,
            weight_override_grams: None,
            stock,
            is_active: true,
        };
        db.catalog().insert_variant(&variant).await.unwrap();
        variant
    }

    pub(crate) async fn seed_flash_sale(
        db: &Database,
        id: &str,
        product_id: &str,
        price: i64,
        per_user_limit: Option<i64>,
        stock_cap: Option<i64>,
    ) -> FlashSale {
        let now = Utc::now();
        let sale = FlashSale {
            id: id.to_string(),
            product_id: product_id.to_string(),
            sale_price: Money::from_minor(price),
            starts_at: now - Duration::hours(1),
            ends_at: now + Duration::hours(1),
            per_user_limit,
            stock_cap,
            sold_count: 0,
        };
        db.catalog().insert_flash_sale(&sale).await.unwrap();
        sale
    }

    fn quote_for(items: Vec<ItemRequest>) -> QuoteRequest {
        QuoteRequest::retail(items, ShippingRequest::new("JKT", "BDG"))
    }

    #[tokio::test]
    async fn test_insert_and_get_product() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let product = seed_product(&db, "A", 50_000, 3).await;

        let loaded = db.catalog().get_product("A").await.unwrap().unwrap();
        assert_eq!(loaded.sku, product.sku);
        assert_eq!(loaded.base_price, Money::from_minor(50_000));
        assert!(loaded.is_active);

        let by_sku = db.catalog().get_product_by_sku("SKU-A").await.unwrap();
        assert_eq!(by_sku.map(|p| p.id), Some("A".to_string()));
    }

    #[tokio::test]
    async fn test_duplicate_sku_rejected() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        seed_product(&db, "A", 50_000, 3).await;

        let mut dup = new_product("SKU-A", "Other", Money::from_minor(1_000), 0, 0);
        dup.id = "B".to_string();
        let err = db.catalog().insert_product(&dup).await.unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { ref value, .. } if value == "SKU-A"));
    }

    #[tokio::test]
    async fn test_invalid_product_rejected_before_sql() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let product = new_product("", "Nameless", Money::from_minor(1_000), 0, 0);

        let err = db.catalog().insert_product(&product).await.unwrap_err();
        assert!(matches!(err, DbError::Validation(_)));
    }

    #[tokio::test]
    async fn test_flash_sale_window_must_be_ordered() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        seed_product(&db, "A", 50_000, 3).await;
        let now = Utc::now();
        let sale = FlashSale {
            id: "FS".to_string(),
            product_id: "A".to_string(),
            sale_price: Money::from_minor(40_000),
            starts_at: now,
            ends_at: now,
            per_user_limit: None,
            stock_cap: None,
            sold_count: 0,
        };

        let err = db.catalog().insert_flash_sale(&sale).await.unwrap_err();
        assert!(matches!(err, DbError::Validation(_)));
    }

    #[tokio::test]
    async fn test_snapshot_contains_requested_rows() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        seed_product(&db, "A", 50_000, 3).await;
        seed_product(&db, "B", 20_000, 3).await;
        seed_variant(&db, "A-L", "A", 2).await;
        seed_flash_sale(&db, "FS", "A", 40_000, Some(2), None).await;

        let request = quote_for(vec![ItemRequest::new("A", 1).with_variant("A-L")]).with_user("u1");
        let snapshot = db.catalog().load_snapshot(&request).await.unwrap();

        assert!(snapshot.product("A").is_some());
        assert!(snapshot.product("B").is_none());
        assert!(snapshot.variant("A-L").is_some());
        assert_eq!(snapshot.flash_sales_for("A").len(), 1);
        assert_eq!(snapshot.flash_sale_purchased_by("FS", "u1"), 0);
    }

    #[tokio::test]
    async fn test_claim_respects_stock_cap() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        seed_product(&db, "A", 50_000, 10).await;
        seed_flash_sale(&db, "FS", "A", 40_000, None, Some(3)).await;

        let mut tx = db.begin().await.unwrap();
        let first = claim_flash_sale(&mut tx, "FS", None, 2, "ORD-1", Utc::now()).await.unwrap();
        let second = claim_flash_sale(&mut tx, "FS", None, 2, "ORD-2", Utc::now()).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(first, FlashClaimOutcome::Claimed);
        assert_eq!(second, FlashClaimOutcome::SoldOut);
        let sale = db.catalog().get_flash_sale("FS").await.unwrap().unwrap();
        assert_eq!(sale.sold_count, 2);
    }

    #[tokio::test]
    async fn test_claim_respects_per_user_limit() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        seed_product(&db, "A", 50_000, 10).await;
        seed_flash_sale(&db, "FS", "A", 40_000, Some(2), None).await;

        let mut tx = db.begin().await.unwrap();
        let first = claim_flash_sale(&mut tx, "FS", Some("u1"), 2, "ORD-1", Utc::now()).await.unwrap();
        let again = claim_flash_sale(&mut tx, "FS", Some("u1"), 1, "ORD-2", Utc::now()).await.unwrap();
        let other = claim_flash_sale(&mut tx, "FS", Some("u2"), 1, "ORD-3", Utc::now()).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(first, FlashClaimOutcome::Claimed);
        assert_eq!(again, FlashClaimOutcome::UserLimitExceeded);
        assert_eq!(other, FlashClaimOutcome::Claimed);
        assert_eq!(db.catalog().flash_sale_purchased_by("FS", "u1").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_release_returns_units_once() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        seed_product(&db, "A", 50_000, 10).await;
        seed_flash_sale(&db, "FS", "A", 40_000, Some(2), Some(5)).await;

        let mut tx = db.begin().await.unwrap();
        claim_flash_sale(&mut tx, "FS", Some("u1"), 2, "ORD-1", Utc::now()).await.unwrap();
        assert_eq!(release_flash_sales(&mut tx, "ORD-1", Utc::now()).await.unwrap(), 1);
        assert_eq!(release_flash_sales(&mut tx, "ORD-1", Utc::now()).await.unwrap(), 0);
        tx.commit().await.unwrap();

        let sale = db.catalog().get_flash_sale("FS").await.unwrap().unwrap();
        assert_eq!(sale.sold_count, 0);
        assert_eq!(db.catalog().flash_sale_purchased_by("FS", "u1").await.unwrap(), 0);
    }
}
