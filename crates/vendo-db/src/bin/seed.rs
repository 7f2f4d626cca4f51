//! Seeds a database with demo catalog data and coupons.
//!
//! ## Usage
//! ```text
//! cargo run --bin seed [path/to/vendo.db]
//! ```
//! Defaults to `./vendo.db`. Idempotent enough for development: rerunning
//! against an already seeded database fails on the unique coupon codes,
//! which is reported and otherwise harmless.

use chrono::{Duration, Utc};
use tracing::info;
use uuid::Uuid;

use vendo_core::coupon::{Coupon, CouponRestrictions, DiscountRule};
use vendo_core::types::{PackageComponent, Product, ProductType};
use vendo_core::Money;
use vendo_db::{Database, DbConfig, DbResult};

#[tokio::main]
async fn main() -> DbResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "./vendo.db".to_string());

    let db = Database::new(DbConfig::new(&path)).await?;
    seed(&db).await?;
    db.close().await;

    info!(path, "Seed complete");
    Ok(())
}

async fn seed(db: &Database) -> DbResult<()> {
    let products = db.products();
    let now = Utc::now();

    let beans = Product {
        id: Uuid::new_v4().to_string(),
        name: "Espresso Beans 1kg".to_string(),
        description: Some("Dark roast, whole bean".to_string()),
        category: "coffee".to_string(),
        image: None,
        price: Money::from_cents(1899),
        product_type: ProductType::Single,
        package_components: vec![],
        package_savings: None,
        current_stock: 120,
        is_active: true,
        created_at: now,
        updated_at: now,
    };
    let grinder = Product {
        id: Uuid::new_v4().to_string(),
        name: "Burr Grinder".to_string(),
        description: Some("Conical burr, 40 settings".to_string()),
        category: "equipment".to_string(),
        image: None,
        price: Money::from_cents(8900),
        product_type: ProductType::Single,
        package_components: vec![],
        package_savings: None,
        current_stock: 15,
        is_active: true,
        created_at: now,
        updated_at: now,
    };
    products.insert(&beans).await?;
    products.insert(&grinder).await?;

    // A starter bundle: availability derives from the constituents.
    let bundle = Product {
        id: Uuid::new_v4().to_string(),
        name: "Home Barista Starter Kit".to_string(),
        description: Some("Grinder plus two bags of beans".to_string()),
        category: "equipment".to_string(),
        image: None,
        price: Money::from_cents(11000),
        product_type: ProductType::Package,
        package_components: vec![
            PackageComponent {
                product_id: grinder.id.clone(),
                name: grinder.name.clone(),
                quantity: 1,
                price: grinder.price,
            },
            PackageComponent {
                product_id: beans.id.clone(),
                name: beans.name.clone(),
                quantity: 2,
                price: beans.price,
            },
        ],
        package_savings: Some(Money::from_cents(1698)),
        current_stock: 0,
        is_active: true,
        created_at: now,
        updated_at: now,
    };
    products.insert(&bundle).await?;
    info!(count = 3, "Seeded products");

    let coupons = db.coupons();
    coupons
        .insert(&Coupon {
            id: Uuid::new_v4().to_string(),
            code: "WELCOME10".to_string(),
            rule: DiscountRule::Percentage {
                rate_bps: 1000,
                max_discount: Some(Money::from_cents(2000)),
            },
            min_purchase: Money::from_cents(5000),
            usage_limit: None,
            per_customer_limit: Some(1),
            usage_count: 0,
            restrictions: CouponRestrictions::default(),
            starts_at: now - Duration::days(1),
            ends_at: now + Duration::days(90),
            is_active: true,
            created_at: now,
            updated_at: now,
        })
        .await?;
    coupons
        .insert(&Coupon {
            id: Uuid::new_v4().to_string(),
            code: "FREESHIP".to_string(),
            rule: DiscountRule::FreeShipping,
            min_purchase: Money::from_cents(2500),
            usage_limit: Some(500),
            per_customer_limit: None,
            usage_count: 0,
            restrictions: CouponRestrictions::default(),
            starts_at: now - Duration::days(1),
            ends_at: now + Duration::days(30),
            is_active: true,
            created_at: now,
            updated_at: now,
        })
        .await?;
    coupons
        .insert(&Coupon {
            id: Uuid::new_v4().to_string(),
            code: "COFFEE5".to_string(),
            rule: DiscountRule::Fixed {
                amount: Money::from_cents(500),
            },
            min_purchase: Money::zero(),
            usage_limit: None,
            per_customer_limit: None,
            usage_count: 0,
            restrictions: CouponRestrictions {
                categories: vec!["coffee".to_string()],
                product_ids: vec![],
            },
            starts_at: now - Duration::days(1),
            ends_at: now + Duration::days(365),
            is_active: true,
            created_at: now,
            updated_at: now,
        })
        .await?;
    info!(count = 3, "Seeded coupons");

    Ok(())
}
