//! # Order Repository
//!
//! Database operations for orders, order items and order notes.
//!
//! ## Order Lifecycle in the Database
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  1. INSERT (checkout transaction)                                       │
//! │     └── order row + item rows, all frozen snapshots                     │
//! │                                                                         │
//! │  2. UPDATE update_state (lifecycle transitions)                         │
//! │     └── status columns, timestamps, refund/cancellation records;        │
//! │         items and totals NEVER change after insert                      │
//! │                                                                         │
//! │  3. APPEND add_note                                                     │
//! │                                                                         │
//! │  4. SOFT DELETE mark_deleted                                            │
//! │     └── sets deleted_at; reads filter it out, the row survives for      │
//! │         the ledger and the redemption history                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use vendo_core::coupon::CouponSnapshot;
use vendo_core::order::{
    CancellationRecord, Order, OrderItem, OrderNote, OrderPaymentStatus, OrderStatus, OrderTotals,
    RefundRecord,
};
use vendo_core::types::{Address, CustomerSnapshot, PackageComponent, ProductType};
use vendo_core::Money;

const ORDER_COLUMNS: &str = r#"
    id, order_number, account_id, customer,
    subtotal_cents, tax_cents, shipping_cents, discount_cents, total_cents,
    status, payment_status, payment_id, coupon_snapshot,
    shipping_address, billing_address, refund, cancellation,
    created_at, updated_at, confirmed_at, shipped_at, delivered_at,
    returned_at, cancelled_at, deleted_at
"#;

/// Repository for order database operations.
#[derive(Debug, Clone)]
pub struct OrderRepository {
    pool: SqlitePool,
}

impl OrderRepository {
    /// Creates a new OrderRepository.
    pub fn new(pool: SqlitePool) -> Self {
        OrderRepository { pool }
    }

    /// Gets an order by ID (soft-deleted orders are invisible).
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Order>> {
        let row = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = ?1 AND deleted_at IS NULL"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let mut order = map_order(&row)?;
        order.items = self.load_items(&order.id).await?;
        order.notes = self.load_notes(&order.id).await?;
        Ok(Some(order))
    }

    /// Lists an account's orders, newest first.
    pub async fn list_by_account(
        &self,
        account_id: &str,
        limit: i64,
        offset: i64,
    ) -> DbResult<Vec<Order>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {ORDER_COLUMNS} FROM orders
            WHERE account_id = ?1 AND deleted_at IS NULL
            ORDER BY created_at DESC
            LIMIT ?2 OFFSET ?3
            "#
        ))
        .bind(account_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let mut orders = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut order = map_order(row)?;
            order.items = self.load_items(&order.id).await?;
            order.notes = self.load_notes(&order.id).await?;
            orders.push(order);
        }
        Ok(orders)
    }

    async fn load_items(&self, order_id: &str) -> DbResult<Vec<OrderItem>> {
        let rows = sqlx::query(
            r#"
            SELECT product_id, name, price_cents, quantity, image, category,
                   product_type, package_info, line_total_cents
            FROM order_items
            WHERE order_id = ?1
            ORDER BY created_at
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(map_order_item).collect()
    }

    async fn load_notes(&self, order_id: &str) -> DbResult<Vec<OrderNote>> {
        let rows = sqlx::query(
            r#"
            SELECT id, message, author, created_at
            FROM order_notes
            WHERE order_id = ?1
            ORDER BY created_at
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(OrderNote {
                    id: row.try_get("id")?,
                    message: row.try_get("message")?,
                    author: row.try_get("author")?,
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect()
    }

    /// Generates the next order number within the enclosing transaction.
    ///
    /// Format: ORD-YYYYMMDD-NNNN with a daily counter. The UNIQUE index
    /// on order_number backstops a lost race between two checkouts.
    pub async fn next_order_number(
        conn: &mut SqliteConnection,
        now: DateTime<Utc>,
    ) -> DbResult<String> {
        let date_part = now.format("%Y%m%d").to_string();
        let prefix = format!("ORD-{date_part}-%");

        let today: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM orders WHERE order_number LIKE ?1")
                .bind(&prefix)
                .fetch_one(&mut *conn)
                .await?;

        Ok(format!("ORD-{}-{:04}", date_part, today + 1))
    }

    /// Inserts an order and its frozen lines inside an enclosing
    /// transaction (checkout commits this with the stock decrements).
    pub async fn insert(conn: &mut SqliteConnection, order: &Order) -> DbResult<()> {
        debug!(id = %order.id, order_number = %order.order_number, "Inserting order");

        let customer = serde_json::to_string(&order.customer)
            .map_err(|e| DbError::bad_json("customer", e))?;
        let coupon = order
            .coupon
            .as_ref()
            .map(|c| serde_json::to_string(c))
            .transpose()
            .map_err(|e| DbError::bad_json("coupon_snapshot", e))?;
        let shipping_address = serde_json::to_string(&order.shipping_address)
            .map_err(|e| DbError::bad_json("shipping_address", e))?;
        let billing_address = serde_json::to_string(&order.billing_address)
            .map_err(|e| DbError::bad_json("billing_address", e))?;

        sqlx::query(
            r#"
            INSERT INTO orders (
                id, order_number, account_id, customer,
                subtotal_cents, tax_cents, shipping_cents, discount_cents, total_cents,
                status, payment_status, payment_id, coupon_snapshot,
                shipping_address, billing_address,
                created_at, updated_at
            ) VALUES (
                ?1, ?2, ?3, ?4,
                ?5, ?6, ?7, ?8, ?9,
                ?10, ?11, ?12, ?13,
                ?14, ?15,
                ?16, ?17
            )
            "#,
        )
        .bind(&order.id)
        .bind(&order.order_number)
        .bind(&order.account_id)
        .bind(customer)
        .bind(order.totals.subtotal)
        .bind(order.totals.tax)
        .bind(order.totals.shipping)
        .bind(order.totals.discount)
        .bind(order.totals.total)
        .bind(order.status)
        .bind(order.payment_status)
        .bind(&order.payment_id)
        .bind(coupon)
        .bind(shipping_address)
        .bind(billing_address)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *conn)
        .await?;

        for item in &order.items {
            let package_info = item
                .package_info
                .as_ref()
                .map(|p| serde_json::to_string(p))
                .transpose()
                .map_err(|e| DbError::bad_json("package_info", e))?;

            sqlx::query(
                r#"
                INSERT INTO order_items (
                    id, order_id, product_id, name, price_cents, quantity,
                    image, category, product_type, package_info,
                    line_total_cents, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(&order.id)
            .bind(&item.product_id)
            .bind(&item.name)
            .bind(item.price)
            .bind(item.quantity)
            .bind(&item.image)
            .bind(&item.category)
            .bind(item.product_type)
            .bind(package_info)
            .bind(item.line_total)
            .bind(order.created_at)
            .execute(&mut *conn)
            .await?;
        }

        Ok(())
    }

    /// Persists the mutable state of an order after a transition.
    ///
    /// Items, totals, addresses and the customer snapshot are frozen at
    /// insert and deliberately not part of this UPDATE.
    pub async fn update_state(conn: &mut SqliteConnection, order: &Order) -> DbResult<()> {
        let refund = order
            .refund
            .as_ref()
            .map(|r| serde_json::to_string(r))
            .transpose()
            .map_err(|e| DbError::bad_json("refund", e))?;
        let cancellation = order
            .cancellation
            .as_ref()
            .map(|c| serde_json::to_string(c))
            .transpose()
            .map_err(|e| DbError::bad_json("cancellation", e))?;

        let result = sqlx::query(
            r#"
            UPDATE orders SET
                status = ?2,
                payment_status = ?3,
                refund = ?4,
                cancellation = ?5,
                updated_at = ?6,
                confirmed_at = ?7,
                shipped_at = ?8,
                delivered_at = ?9,
                returned_at = ?10,
                cancelled_at = ?11,
                deleted_at = ?12
            WHERE id = ?1
            "#,
        )
        .bind(&order.id)
        .bind(order.status)
        .bind(order.payment_status)
        .bind(refund)
        .bind(cancellation)
        .bind(order.updated_at)
        .bind(order.confirmed_at)
        .bind(order.shipped_at)
        .bind(order.delivered_at)
        .bind(order.returned_at)
        .bind(order.cancelled_at)
        .bind(order.deleted_at)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Order", &order.id));
        }

        Ok(())
    }

    /// Mirrors a ledger-derived payment status onto the order row.
    pub async fn set_payment_status(
        conn: &mut SqliteConnection,
        order_id: &str,
        status: OrderPaymentStatus,
        now: DateTime<Utc>,
    ) -> DbResult<()> {
        let result =
            sqlx::query("UPDATE orders SET payment_status = ?2, updated_at = ?3 WHERE id = ?1")
                .bind(order_id)
                .bind(status)
                .bind(now)
                .execute(&mut *conn)
                .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Order", order_id));
        }
        Ok(())
    }

    /// Appends a note to an order.
    pub async fn add_note(&self, order_id: &str, note: &OrderNote) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO order_notes (id, order_id, message, author, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&note.id)
        .bind(order_id)
        .bind(&note.message)
        .bind(&note.author)
        .bind(note.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn map_order(row: &SqliteRow) -> DbResult<Order> {
    let customer: String = row.try_get("customer")?;
    let customer: CustomerSnapshot =
        serde_json::from_str(&customer).map_err(|e| DbError::bad_json("customer", e))?;
    let coupon: Option<String> = row.try_get("coupon_snapshot")?;
    let coupon: Option<CouponSnapshot> = coupon
        .map(|s| serde_json::from_str(&s))
        .transpose()
        .map_err(|e| DbError::bad_json("coupon_snapshot", e))?;
    let shipping_address: String = row.try_get("shipping_address")?;
    let shipping_address: Address = serde_json::from_str(&shipping_address)
        .map_err(|e| DbError::bad_json("shipping_address", e))?;
    let billing_address: String = row.try_get("billing_address")?;
    let billing_address: Address = serde_json::from_str(&billing_address)
        .map_err(|e| DbError::bad_json("billing_address", e))?;
    let refund: Option<String> = row.try_get("refund")?;
    let refund: Option<RefundRecord> = refund
        .map(|s| serde_json::from_str(&s))
        .transpose()
        .map_err(|e| DbError::bad_json("refund", e))?;
    let cancellation: Option<String> = row.try_get("cancellation")?;
    let cancellation: Option<CancellationRecord> = cancellation
        .map(|s| serde_json::from_str(&s))
        .transpose()
        .map_err(|e| DbError::bad_json("cancellation", e))?;

    Ok(Order {
        id: row.try_get("id")?,
        order_number: row.try_get("order_number")?,
        account_id: row.try_get("account_id")?,
        customer,
        items: Vec::new(),
        totals: OrderTotals {
            subtotal: row.try_get::<Money, _>("subtotal_cents")?,
            tax: row.try_get::<Money, _>("tax_cents")?,
            shipping: row.try_get::<Money, _>("shipping_cents")?,
            discount: row.try_get::<Money, _>("discount_cents")?,
            total: row.try_get::<Money, _>("total_cents")?,
        },
        status: row.try_get::<OrderStatus, _>("status")?,
        payment_status: row.try_get::<OrderPaymentStatus, _>("payment_status")?,
        payment_id: row.try_get("payment_id")?,
        coupon,
        shipping_address,
        billing_address,
        notes: Vec::new(),
        refund,
        cancellation,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        confirmed_at: row.try_get("confirmed_at")?,
        shipped_at: row.try_get("shipped_at")?,
        delivered_at: row.try_get("delivered_at")?,
        returned_at: row.try_get("returned_at")?,
        cancelled_at: row.try_get("cancelled_at")?,
        deleted_at: row.try_get("deleted_at")?,
    })
}

fn map_order_item(row: &SqliteRow) -> DbResult<OrderItem> {
    let package_info: Option<String> = row.try_get("package_info")?;
    let package_info: Option<Vec<PackageComponent>> = package_info
        .map(|s| serde_json::from_str(&s))
        .transpose()
        .map_err(|e| DbError::bad_json("package_info", e))?;

    Ok(OrderItem {
        product_id: row.try_get("product_id")?,
        name: row.try_get("name")?,
        price: row.try_get::<Money, _>("price_cents")?,
        quantity: row.try_get("quantity")?,
        image: row.try_get("image")?,
        category: row.try_get("category")?,
        product_type: row.try_get::<ProductType, _>("product_type")?,
        package_info,
        line_total: row.try_get::<Money, _>("line_total_cents")?,
    })
}
