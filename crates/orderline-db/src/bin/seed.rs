//! # Seed Data Generator
//!
//! Populates the database with a demo storefront catalog for development.
//!
//! ## Usage
//! ```bash
//! # Seed ./orderline_dev.db
//! cargo run -p orderline-db --bin seed
//!
//! # Specify database path
//! cargo run -p orderline-db --bin seed -- --db ./data/orderline.db
//!
//! # Verbose SQL-level logging
//! RUST_LOG=orderline_db=debug cargo run -p orderline-db --bin seed
//! ```
//!
//! ## Generated Data
//! - Apparel products with S/M/L/XL variants (XL carries a price override)
//! - One live flash sale (2 per user, 50 units)
//! - Coupons: `HEMAT10` (10% off, capped), `ONGKIRFREE` (free shipping),
//!   `RESELLER50K` (Rp 50.000 off, resellers only)

use chrono::{Duration, Utc};
use std::env;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use orderline_core::{Coupon, CouponStatus, DiscountKind, FlashSale, Money, ProductVariant};
use orderline_db::repository::catalog::{generate_id, new_product};
use orderline_db::{Database, DbConfig};

/// (sku prefix, name, price in rupiah, weight in grams)
const PRODUCTS: &[(&str, &str, i64, i64)] = &[
    ("TEE-BSC", "Kaos Basic Cotton", 89_000, 200),
    ("TEE-OVS", "Kaos Oversize", 119_000, 250),
    ("HOD-ZIP", "Hoodie Zipper Fleece", 259_000, 650),
    ("JKT-DNM", "Jaket Denim", 349_000, 900),
    ("PNT-CHN", "Celana Chino", 199_000, 500),
    ("SHR-LNN", "Kemeja Linen", 179_000, 300),
];

const SIZES: &[&str] = &["S", "M", "L", "XL"];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = env::args().collect();
    let mut db_path = String::from("./orderline_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Orderline Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>    Database file path (default: ./orderline_dev.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    info!(path = %db_path, "Seeding database");
    let db = Database::new(DbConfig::new(&db_path)).await?;

    let existing = db.catalog().count_products().await?;
    if existing > 0 {
        warn!(existing, "Database already has products, skipping seed");
        return Ok(());
    }

    let now = Utc::now();
    let catalog = db.catalog();
    let mut flash_target = None;

    for (sku, name, price, weight) in PRODUCTS {
        let product = new_product(*sku, *name, Money::from_minor(*price), *weight, 0);
        catalog.insert_product(&product).await?;

        for (idx, size) in SIZES.iter().enumerate() {
            let variant = ProductVariant {
                id: generate_id(),
                product_id: product.id.clone(),
                name: format!("Size {}", size),
                // XL uses more fabric
                price_override: (*size == "XL").then(|| Money::from_minor(price + 10_000)),
                weight_override_grams: None,
                stock: 20 + (idx as i64) * 10,
                is_active: true,
            };
            catalog.insert_variant(&variant).await?;
        }

        flash_target.get_or_insert(product.id.clone());
        info!(sku, variants = SIZES.len(), "Product seeded");
    }

    if let Some(product_id) = flash_target {
        let sale = FlashSale {
            id: generate_id(),
            product_id,
            sale_price: Money::from_minor(59_000),
            starts_at: now - Duration::hours(1),
            ends_at: now + Duration::days(2),
            per_user_limit: Some(2),
            stock_cap: Some(50),
            sold_count: 0,
        };
        catalog.insert_flash_sale(&sale).await?;
        info!(flash_sale_id = %sale.id, "Flash sale seeded");
    }

    let coupons = [
        demo_coupon("HEMAT10", "Hemat 10%", DiscountKind::Percentage, 10, |c| {
            c.max_discount = Some(Money::from_minor(50_000));
            c.max_usage_count = Some(100);
            c.max_usage_per_user = Some(1);
        }),
        demo_coupon("ONGKIRFREE", "Gratis Ongkir", DiscountKind::Fixed, 0, |c| {
            c.free_shipping = true;
            c.min_purchase = Money::from_minor(150_000);
        }),
        demo_coupon("RESELLER50K", "Potongan Reseller", DiscountKind::Fixed, 50_000, |c| {
            c.for_retail = false;
            c.min_purchase = Money::from_minor(500_000);
        }),
    ];
    for coupon in &coupons {
        db.coupons().insert(coupon).await?;
        info!(code = %coupon.code, "Coupon seeded");
    }

    info!(
        products = PRODUCTS.len(),
        coupons = coupons.len(),
        "Seed complete"
    );
    Ok(())
}

fn demo_coupon(
    code: &str,
    name: &str,
    kind: DiscountKind,
    value: i64,
    customize: impl FnOnce(&mut Coupon),
) -> Coupon {
    let now = Utc::now();
    let mut coupon = Coupon {
        id: generate_id(),
        code: code.to_string(),
        name: name.to_string(),
        kind,
        value,
        max_discount: None,
        min_purchase: Money::zero(),
        max_usage_count: None,
        max_usage_per_user: None,
        valid_from: now - Duration::days(1),
        valid_until: now + Duration::days(30),
        status: CouponStatus::Active,
        for_retail: true,
        for_reseller: true,
        free_shipping: false,
        usage_count: 0,
    };
    customize(&mut coupon);
    coupon
}
