//! # Cart Repository
//!
//! Database operations for carts and cart items.
//!
//! ## Persistence Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Carts are created lazily: the first read for an account creates an    │
//! │  empty row. One cart per account (UNIQUE on account_id).               │
//! │                                                                         │
//! │  The summary is NOT stored: it is recomputed from the lines after      │
//! │  every load, so a stale summary can never be served.                   │
//! │                                                                         │
//! │  Saves replace the line set wholesale (delete + insert in one          │
//! │  transaction): the cart aggregate in vendo-core is the source of       │
//! │  truth and arrives fully validated.                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use vendo_core::cart::Cart;
use vendo_core::coupon::CouponSnapshot;
use vendo_core::types::{
    Address, CartItem, PackageComponent, ProductType, ShippingSelection, TaxRate,
};
use vendo_core::Money;

/// Repository for cart database operations.
#[derive(Debug, Clone)]
pub struct CartRepository {
    pool: SqlitePool,
}

impl CartRepository {
    /// Creates a new CartRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CartRepository { pool }
    }

    /// Gets an account's cart, creating an empty one if absent.
    pub async fn get_or_create(&self, account_id: &str, tax_rate: TaxRate) -> DbResult<Cart> {
        if let Some(cart) = self.find_by_account(account_id).await? {
            return Ok(cart);
        }

        let cart = Cart::new(Uuid::new_v4().to_string(), account_id, tax_rate);
        debug!(cart_id = %cart.id, account_id = %account_id, "Creating cart");

        sqlx::query(
            r#"
            INSERT INTO carts (id, account_id, tax_rate_bps, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&cart.id)
        .bind(&cart.account_id)
        .bind(cart.tax_rate.bps() as i64)
        .bind(cart.created_at)
        .bind(cart.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(cart)
    }

    /// Loads an account's cart with its lines, if one exists.
    pub async fn find_by_account(&self, account_id: &str) -> DbResult<Option<Cart>> {
        let row = sqlx::query(
            r#"
            SELECT id, account_id, coupon_snapshot, shipping, shipping_address,
                   tax_rate_bps, created_at, updated_at
            FROM carts
            WHERE account_id = ?1
            "#,
        )
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let mut cart = map_cart(&row)?;
        cart.items = self.load_items(&cart.id).await?;
        // Summary is derived, never stored.
        cart.recompute();
        Ok(Some(cart))
    }

    async fn load_items(&self, cart_id: &str) -> DbResult<Vec<CartItem>> {
        let rows = sqlx::query(
            r#"
            SELECT product_id, name, price_cents, quantity, image, category,
                   product_type, package_info
            FROM cart_items
            WHERE cart_id = ?1
            ORDER BY created_at
            "#,
        )
        .bind(cart_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(map_cart_item).collect()
    }

    /// Persists the cart aggregate: row update plus wholesale line replace.
    pub async fn save(&self, cart: &Cart) -> DbResult<()> {
        let coupon = cart
            .coupon
            .as_ref()
            .map(|c| serde_json::to_string(c))
            .transpose()
            .map_err(|e| DbError::bad_json("coupon_snapshot", e))?;
        let shipping = cart
            .shipping
            .as_ref()
            .map(|s| serde_json::to_string(s))
            .transpose()
            .map_err(|e| DbError::bad_json("shipping", e))?;
        let address = cart
            .shipping_address
            .as_ref()
            .map(|a| serde_json::to_string(a))
            .transpose()
            .map_err(|e| DbError::bad_json("shipping_address", e))?;
        let now = Utc::now();

        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE carts SET
                coupon_snapshot = ?2,
                shipping = ?3,
                shipping_address = ?4,
                tax_rate_bps = ?5,
                updated_at = ?6
            WHERE id = ?1
            "#,
        )
        .bind(&cart.id)
        .bind(coupon)
        .bind(shipping)
        .bind(address)
        .bind(cart.tax_rate.bps() as i64)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Cart", &cart.id));
        }

        sqlx::query("DELETE FROM cart_items WHERE cart_id = ?1")
            .bind(&cart.id)
            .execute(&mut *tx)
            .await?;

        for item in &cart.items {
            let package_info = item
                .package_info
                .as_ref()
                .map(|p| serde_json::to_string(p))
                .transpose()
                .map_err(|e| DbError::bad_json("package_info", e))?;

            sqlx::query(
                r#"
                INSERT INTO cart_items (
                    id, cart_id, product_id, name, price_cents, quantity,
                    image, category, product_type, package_info, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(&cart.id)
            .bind(&item.product_id)
            .bind(&item.name)
            .bind(item.price)
            .bind(item.quantity)
            .bind(&item.image)
            .bind(&item.category)
            .bind(item.product_type)
            .bind(package_info)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Deletes a cart and its lines inside an enclosing transaction.
    ///
    /// Used at checkout: consuming the cart commits or rolls back with
    /// the order insert and the stock decrements.
    pub async fn delete(conn: &mut SqliteConnection, cart_id: &str) -> DbResult<()> {
        sqlx::query("DELETE FROM cart_items WHERE cart_id = ?1")
            .bind(cart_id)
            .execute(&mut *conn)
            .await?;
        sqlx::query("DELETE FROM carts WHERE id = ?1")
            .bind(cart_id)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }
}

fn map_cart(row: &SqliteRow) -> DbResult<Cart> {
    let coupon: Option<String> = row.try_get("coupon_snapshot")?;
    let coupon: Option<CouponSnapshot> = coupon
        .map(|s| serde_json::from_str(&s))
        .transpose()
        .map_err(|e| DbError::bad_json("coupon_snapshot", e))?;
    let shipping: Option<String> = row.try_get("shipping")?;
    let shipping: Option<ShippingSelection> = shipping
        .map(|s| serde_json::from_str(&s))
        .transpose()
        .map_err(|e| DbError::bad_json("shipping", e))?;
    let address: Option<String> = row.try_get("shipping_address")?;
    let shipping_address: Option<Address> = address
        .map(|s| serde_json::from_str(&s))
        .transpose()
        .map_err(|e| DbError::bad_json("shipping_address", e))?;
    let tax_rate_bps: i64 = row.try_get("tax_rate_bps")?;

    let mut cart = Cart::new(
        row.try_get::<String, _>("id")?,
        row.try_get::<String, _>("account_id")?,
        TaxRate::from_bps(tax_rate_bps as u32),
    );
    cart.coupon = coupon;
    cart.shipping = shipping;
    cart.shipping_address = shipping_address;
    cart.created_at = row.try_get("created_at")?;
    cart.updated_at = row.try_get("updated_at")?;
    Ok(cart)
}

fn map_cart_item(row: &SqliteRow) -> DbResult<CartItem> {
    let package_info: Option<String> = row.try_get("package_info")?;
    let package_info: Option<Vec<PackageComponent>> = package_info
        .map(|s| serde_json::from_str(&s))
        .transpose()
        .map_err(|e| DbError::bad_json("package_info", e))?;

    Ok(CartItem {
        product_id: row.try_get("product_id")?,
        name: row.try_get("name")?,
        price: row.try_get::<Money, _>("price_cents")?,
        quantity: row.try_get("quantity")?,
        image: row.try_get("image")?,
        category: row.try_get("category")?,
        product_type: row.try_get::<ProductType, _>("product_type")?,
        package_info,
        // Refreshed from live stock by the service before any use.
        is_available: true,
        max_quantity: 0,
    })
}
