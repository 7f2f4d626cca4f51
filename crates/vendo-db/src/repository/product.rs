//! # Product Repository
//!
//! Database operations for catalog products and their stock counters.
//!
//! ## Stock Discipline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  current_stock is the ONE racy column in this table.                    │
//! │                                                                         │
//! │  Reads:   anyone, any time (cart refresh, availability checks)          │
//! │  Writes:  ONLY through decrement_stock / increment_stock, which use     │
//! │           conditional UPDATEs:                                          │
//! │                                                                         │
//! │    UPDATE products SET current_stock = current_stock - N                │
//! │    WHERE id = ? AND current_stock >= N                                  │
//! │                                                                         │
//! │  rows_affected = 0 means the guard failed and the caller must roll     │
//! │  back. Two concurrent checkouts serialize on the row; only one wins    │
//! │  the last unit.                                                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use std::collections::HashMap;
use tracing::debug;

use crate::error::{DbError, DbResult};
use vendo_core::types::{PackageComponent, Product, ProductType};
use vendo_core::Money;

/// Repository for product database operations.
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    /// Creates a new ProductRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    /// Gets a product by ID (including inactive ones).
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Product>> {
        let row = sqlx::query(
            r#"
            SELECT id, name, description, category, image, price_cents,
                   product_type, package_components, package_savings_cents,
                   current_stock, is_active, created_at, updated_at
            FROM products
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| map_product(&r)).transpose()
    }

    /// Gets a product that must exist and be active.
    pub async fn require_active(&self, id: &str) -> DbResult<Product> {
        match self.get_by_id(id).await? {
            Some(p) if p.is_active => Ok(p),
            _ => Err(vendo_core::CoreError::ProductNotFound(id.to_string()).into()),
        }
    }

    /// Lists active products by category (all categories when None).
    pub async fn list_active(&self, category: Option<&str>) -> DbResult<Vec<Product>> {
        let rows = match category {
            Some(cat) => {
                sqlx::query(
                    r#"
                    SELECT id, name, description, category, image, price_cents,
                           product_type, package_components, package_savings_cents,
                           current_stock, is_active, created_at, updated_at
                    FROM products
                    WHERE is_active = 1 AND category = ?1
                    ORDER BY name
                    "#,
                )
                .bind(cat)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    r#"
                    SELECT id, name, description, category, image, price_cents,
                           product_type, package_components, package_savings_cents,
                           current_stock, is_active, created_at, updated_at
                    FROM products
                    WHERE is_active = 1
                    ORDER BY name
                    "#,
                )
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.iter().map(map_product).collect()
    }

    /// Inserts a product.
    pub async fn insert(&self, product: &Product) -> DbResult<()> {
        debug!(id = %product.id, name = %product.name, "Inserting product");

        let components = serde_json::to_string(&product.package_components)
            .map_err(|e| DbError::bad_json("package_components", e))?;

        sqlx::query(
            r#"
            INSERT INTO products (
                id, name, description, category, image, price_cents,
                product_type, package_components, package_savings_cents,
                current_stock, is_active, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
        )
        .bind(&product.id)
        .bind(&product.name)
        .bind(&product.description)
        .bind(&product.category)
        .bind(&product.image)
        .bind(product.price)
        .bind(product.product_type)
        .bind(components)
        .bind(product.package_savings)
        .bind(product.current_stock)
        .bind(product.is_active)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Updates a product's catalog fields (everything except stock).
    pub async fn update(&self, product: &Product) -> DbResult<()> {
        let components = serde_json::to_string(&product.package_components)
            .map_err(|e| DbError::bad_json("package_components", e))?;
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE products SET
                name = ?2, description = ?3, category = ?4, image = ?5,
                price_cents = ?6, product_type = ?7, package_components = ?8,
                package_savings_cents = ?9, is_active = ?10, updated_at = ?11
            WHERE id = ?1
            "#,
        )
        .bind(&product.id)
        .bind(&product.name)
        .bind(&product.description)
        .bind(&product.category)
        .bind(&product.image)
        .bind(product.price)
        .bind(product.product_type)
        .bind(components)
        .bind(product.package_savings)
        .bind(product.is_active)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", &product.id));
        }

        Ok(())
    }

    /// Loads the products backing a set of cart/order lines, plus the
    /// constituents of any packages among them.
    ///
    /// The returned map implements [`vendo_core::stock::ProductSource`],
    /// so it can feed a `StockLedger` directly.
    pub async fn product_map(&self, ids: &[String]) -> DbResult<HashMap<String, Product>> {
        let mut map = HashMap::new();
        let mut pending: Vec<String> = ids.to_vec();

        // Packages pull in their constituents; one extra round is enough
        // because packages cannot nest.
        while !pending.is_empty() {
            let mut next = Vec::new();
            for id in pending.drain(..) {
                if map.contains_key(&id) {
                    continue;
                }
                if let Some(product) = self.get_by_id(&id).await? {
                    for component in &product.package_components {
                        if !map.contains_key(&component.product_id) {
                            next.push(component.product_id.clone());
                        }
                    }
                    map.insert(id, product);
                }
            }
            pending = next;
        }

        Ok(map)
    }

    // =========================================================================
    // Stock guards (transactional)
    // =========================================================================

    /// Atomically decrements stock if sufficient units remain.
    ///
    /// Returns `false` when the guard fails (insufficient stock); the
    /// caller must roll back its transaction.
    pub async fn decrement_stock(
        conn: &mut SqliteConnection,
        product_id: &str,
        quantity: i64,
        now: DateTime<Utc>,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE products SET
                current_stock = current_stock - ?2,
                updated_at = ?3
            WHERE id = ?1 AND current_stock >= ?2
            "#,
        )
        .bind(product_id)
        .bind(quantity)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Restores stock (cancellation / return).
    pub async fn increment_stock(
        conn: &mut SqliteConnection,
        product_id: &str,
        quantity: i64,
        now: DateTime<Utc>,
    ) -> DbResult<()> {
        sqlx::query(
            r#"
            UPDATE products SET
                current_stock = current_stock + ?2,
                updated_at = ?3
            WHERE id = ?1
            "#,
        )
        .bind(product_id)
        .bind(quantity)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Reads the current stock of a product (0 when absent).
    pub async fn current_stock(conn: &mut SqliteConnection, product_id: &str) -> DbResult<i64> {
        let stock: Option<i64> =
            sqlx::query_scalar("SELECT current_stock FROM products WHERE id = ?1")
                .bind(product_id)
                .fetch_optional(&mut *conn)
                .await?;

        Ok(stock.unwrap_or(0))
    }
}

/// Maps a products row into the domain type.
fn map_product(row: &SqliteRow) -> DbResult<Product> {
    let components: String = row.try_get("package_components")?;
    let package_components: Vec<PackageComponent> = serde_json::from_str(&components)
        .map_err(|e| DbError::bad_json("package_components", e))?;

    Ok(Product {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        category: row.try_get("category")?,
        image: row.try_get("image")?,
        price: row.try_get::<Money, _>("price_cents")?,
        product_type: row.try_get::<ProductType, _>("product_type")?,
        package_components,
        package_savings: row.try_get::<Option<Money>, _>("package_savings_cents")?,
        current_stock: row.try_get("current_stock")?,
        is_active: row.try_get("is_active")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
