//! # Coupon Repository
//!
//! Database operations for coupons and their redemption history.
//!
//! ## The Usage Counter
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  coupons.usage_count is racy: two checkouts can both read "4 of 5      │
//! │  used" and both try to take the last slot.                             │
//! │                                                                         │
//! │  The pure pipeline in vendo-core treats its read as advisory. The      │
//! │  authoritative claim happens here, at checkout, inside the checkout    │
//! │  transaction:                                                          │
//! │                                                                         │
//! │    UPDATE coupons SET usage_count = usage_count + 1                    │
//! │    WHERE id = ? AND is_active = 1                                      │
//! │      AND (usage_limit IS NULL OR usage_count < usage_limit)            │
//! │                                                                         │
//! │  rows_affected = 0 → cap already taken → roll the checkout back.       │
//! │                                                                         │
//! │  Per-customer usage is a COUNT over coupon_redemptions, appended in    │
//! │  the same transaction.                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use vendo_core::coupon::{Coupon, CouponRestrictions, DiscountRule};
use vendo_core::Money;

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

    /// Looks up a coupon by code.
    ///
    /// Codes are stored uppercase; the lookup normalizes, so
    /// `save20`, `SAVE20` and ` Save20 ` all find the same coupon.
    pub async fn find_by_code(&self, code: &str) -> DbResult<Option<Coupon>> {
        let normalized = code.trim().to_uppercase();

        let row = sqlx::query(
            r#"
            SELECT id, code, rule, min_purchase_cents, usage_limit,
                   per_customer_limit, usage_count, restrictions,
                   starts_at, ends_at, is_active, created_at, updated_at
            FROM coupons
            WHERE code = ?1
            "#,
        )
        .bind(&normalized)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| map_coupon(&r)).transpose()
    }

    /// Gets a coupon by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Coupon>> {
        let row = sqlx::query(
            r#"
            SELECT id, code, rule, min_purchase_cents, usage_limit,
                   per_customer_limit, usage_count, restrictions,
                   starts_at, ends_at, is_active, created_at, updated_at
            FROM coupons
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| map_coupon(&r)).transpose()
    }

    /// Lists all coupons (admin surface).
    pub async fn list(&self) -> DbResult<Vec<Coupon>> {
        let rows = sqlx::query(
            r#"
            SELECT id, code, rule, min_purchase_cents, usage_limit,
                   per_customer_limit, usage_count, restrictions,
                   starts_at, ends_at, is_active, created_at, updated_at
            FROM coupons
            ORDER BY created_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(map_coupon).collect()
    }

    /// Inserts a coupon. The code is stored uppercase.
    pub async fn insert(&self, coupon: &Coupon) -> DbResult<()> {
        debug!(id = %coupon.id, code = %coupon.code, "Inserting coupon");

        let rule =
            serde_json::to_string(&coupon.rule).map_err(|e| DbError::bad_json("rule", e))?;
        let restrictions = serde_json::to_string(&coupon.restrictions)
            .map_err(|e| DbError::bad_json("restrictions", e))?;

        sqlx::query(
            r#"
            INSERT INTO coupons (
                id, code, rule, min_purchase_cents, usage_limit,
                per_customer_limit, usage_count, restrictions,
                starts_at, ends_at, is_active, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
        )
        .bind(&coupon.id)
        .bind(coupon.code.trim().to_uppercase())
        .bind(rule)
        .bind(coupon.min_purchase)
        .bind(coupon.usage_limit)
        .bind(coupon.per_customer_limit)
        .bind(coupon.usage_count)
        .bind(restrictions)
        .bind(coupon.starts_at)
        .bind(coupon.ends_at)
        .bind(coupon.is_active)
        .bind(coupon.created_at)
        .bind(coupon.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Updates a coupon's rule fields. The usage counter is untouched:
    /// it only moves through [`CouponRepository::try_consume`].
    pub async fn update(&self, coupon: &Coupon) -> DbResult<()> {
        let rule =
            serde_json::to_string(&coupon.rule).map_err(|e| DbError::bad_json("rule", e))?;
        let restrictions = serde_json::to_string(&coupon.restrictions)
            .map_err(|e| DbError::bad_json("restrictions", e))?;
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE coupons SET
                code = ?2, rule = ?3, min_purchase_cents = ?4, usage_limit = ?5,
                per_customer_limit = ?6, restrictions = ?7, starts_at = ?8,
                ends_at = ?9, is_active = ?10, updated_at = ?11
            WHERE id = ?1
            "#,
        )
        .bind(&coupon.id)
        .bind(coupon.code.trim().to_uppercase())
        .bind(rule)
        .bind(coupon.min_purchase)
        .bind(coupon.usage_limit)
        .bind(coupon.per_customer_limit)
        .bind(restrictions)
        .bind(coupon.starts_at)
        .bind(coupon.ends_at)
        .bind(coupon.is_active)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Coupon", &coupon.id));
        }

        Ok(())
    }

    /// Deactivates a coupon (soft delete; redemption history survives).
    pub async fn deactivate(&self, id: &str) -> DbResult<()> {
        let now = Utc::now();
        let result =
            sqlx::query("UPDATE coupons SET is_active = 0, updated_at = ?2 WHERE id = ?1")
                .bind(id)
                .bind(now)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Coupon", id));
        }
        Ok(())
    }

    /// How many times an account has redeemed a coupon.
    pub async fn customer_uses(&self, coupon_id: &str, account_id: &str) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM coupon_redemptions
            WHERE coupon_id = ?1 AND account_id = ?2
            "#,
        )
        .bind(coupon_id)
        .bind(account_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    // =========================================================================
    // Checkout-time claims (transactional)
    // =========================================================================

    /// Atomically claims one redemption slot.
    ///
    /// Returns `false` when the coupon is inactive or its global cap is
    /// already taken; the caller must roll back.
    pub async fn try_consume(conn: &mut SqliteConnection, coupon_id: &str) -> DbResult<bool> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE coupons SET
                usage_count = usage_count + 1,
                updated_at = ?2
            WHERE id = ?1
              AND is_active = 1
              AND (usage_limit IS NULL OR usage_count < usage_limit)
            "#,
        )
        .bind(coupon_id)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Records a redemption for per-customer accounting.
    pub async fn record_redemption(
        conn: &mut SqliteConnection,
        coupon_id: &str,
        account_id: &str,
        order_id: &str,
        now: DateTime<Utc>,
    ) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO coupon_redemptions (id, coupon_id, account_id, order_id, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(coupon_id)
        .bind(account_id)
        .bind(order_id)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }
}

fn map_coupon(row: &SqliteRow) -> DbResult<Coupon> {
    let rule: String = row.try_get("rule")?;
    let rule: DiscountRule =
        serde_json::from_str(&rule).map_err(|e| DbError::bad_json("rule", e))?;
    let restrictions: String = row.try_get("restrictions")?;
    let restrictions: CouponRestrictions =
        serde_json::from_str(&restrictions).map_err(|e| DbError::bad_json("restrictions", e))?;

    Ok(Coupon {
        id: row.try_get("id")?,
        code: row.try_get("code")?,
        rule,
        min_purchase: row.try_get::<Money, _>("min_purchase_cents")?,
        usage_limit: row.try_get("usage_limit")?,
        per_customer_limit: row.try_get("per_customer_limit")?,
        usage_count: row.try_get("usage_count")?,
        restrictions,
        starts_at: row.try_get("starts_at")?,
        ends_at: row.try_get("ends_at")?,
        is_active: row.try_get("is_active")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
