//! # Payment Repository
//!
//! Database operations for payments and their transaction ledger.
//!
//! ## Derived Columns
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  transactions is the ledger: append-only rows, status moves through    │
//! │  the machine in vendo-core::payment.                                   │
//! │                                                                         │
//! │  payments.status / payments.refunded_cents are projections of that     │
//! │  history. They are rewritten via update_derived after every ledger     │
//! │  change, always inside the same transaction as the change itself, so   │
//! │  a reader can never observe a payment inconsistent with its ledger.    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use vendo_core::payment::{
    Payment, PaymentStatus, Transaction, TransactionKind, TransactionStatus,
};
use vendo_core::Money;

/// Repository for payment database operations.
#[derive(Debug, Clone)]
pub struct PaymentRepository {
    pool: SqlitePool,
}

impl PaymentRepository {
    /// Creates a new PaymentRepository.
    pub fn new(pool: SqlitePool) -> Self {
        PaymentRepository { pool }
    }

    /// Gets a payment by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Payment>> {
        let row = sqlx::query(
            r#"
            SELECT id, order_id, amount_cents, status, refunded_cents,
                   created_at, updated_at
            FROM payments
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| map_payment(&r)).transpose()
    }

    /// Gets the payment for an order.
    pub async fn get_by_order(&self, order_id: &str) -> DbResult<Option<Payment>> {
        let row = sqlx::query(
            r#"
            SELECT id, order_id, amount_cents, status, refunded_cents,
                   created_at, updated_at
            FROM payments
            WHERE order_id = ?1
            "#,
        )
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| map_payment(&r)).transpose()
    }

    /// Lists a payment's ledger, oldest first.
    pub async fn list_transactions(&self, payment_id: &str) -> DbResult<Vec<Transaction>> {
        let rows = sqlx::query(
            r#"
            SELECT id, payment_id, kind, amount_cents, status,
                   gateway_reference, processed_at, created_at
            FROM transactions
            WHERE payment_id = ?1
            ORDER BY created_at
            "#,
        )
        .bind(payment_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(map_transaction).collect()
    }

    // =========================================================================
    // Transactional writes
    // =========================================================================

    /// Inserts a payment inside an enclosing transaction.
    pub async fn insert(conn: &mut SqliteConnection, payment: &Payment) -> DbResult<()> {
        debug!(id = %payment.id, order_id = %payment.order_id, "Inserting payment");

        sqlx::query(
            r#"
            INSERT INTO payments (
                id, order_id, amount_cents, status, refunded_cents,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&payment.id)
        .bind(&payment.order_id)
        .bind(payment.amount)
        .bind(payment.status)
        .bind(payment.refunded_amount)
        .bind(payment.created_at)
        .bind(payment.updated_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Rewrites the derived columns of a payment from its record.
    pub async fn update_derived(conn: &mut SqliteConnection, payment: &Payment) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE payments SET
                status = ?2,
                refunded_cents = ?3,
                updated_at = ?4
            WHERE id = ?1
            "#,
        )
        .bind(&payment.id)
        .bind(payment.status)
        .bind(payment.refunded_amount)
        .bind(payment.updated_at)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Payment", &payment.id));
        }
        Ok(())
    }

    /// Appends a ledger entry.
    pub async fn insert_transaction(
        conn: &mut SqliteConnection,
        transaction: &Transaction,
    ) -> DbResult<()> {
        debug!(
            id = %transaction.id,
            payment_id = %transaction.payment_id,
            kind = ?transaction.kind,
            "Appending transaction"
        );

        sqlx::query(
            r#"
            INSERT INTO transactions (
                id, payment_id, kind, amount_cents, status,
                gateway_reference, processed_at, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&transaction.id)
        .bind(&transaction.payment_id)
        .bind(transaction.kind)
        .bind(transaction.amount)
        .bind(transaction.status)
        .bind(&transaction.gateway_reference)
        .bind(transaction.processed_at)
        .bind(transaction.created_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Persists a ledger entry's resolution (status, processed_at,
    /// gateway reference). Amount and kind never change.
    pub async fn update_transaction(
        conn: &mut SqliteConnection,
        transaction: &Transaction,
    ) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE transactions SET
                status = ?2,
                gateway_reference = ?3,
                processed_at = ?4
            WHERE id = ?1
            "#,
        )
        .bind(&transaction.id)
        .bind(transaction.status)
        .bind(&transaction.gateway_reference)
        .bind(transaction.processed_at)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Transaction", &transaction.id));
        }
        Ok(())
    }

    /// Loads a payment's ledger inside an enclosing transaction.
    pub async fn transactions_for_update(
        conn: &mut SqliteConnection,
        payment_id: &str,
    ) -> DbResult<Vec<Transaction>> {
        let rows = sqlx::query(
            r#"
            SELECT id, payment_id, kind, amount_cents, status,
                   gateway_reference, processed_at, created_at
            FROM transactions
            WHERE payment_id = ?1
            ORDER BY created_at
            "#,
        )
        .bind(payment_id)
        .fetch_all(&mut *conn)
        .await?;

        rows.iter().map(map_transaction).collect()
    }

    /// Loads a payment inside an enclosing transaction.
    pub async fn get_for_update(
        conn: &mut SqliteConnection,
        payment_id: &str,
    ) -> DbResult<Payment> {
        let row = sqlx::query(
            r#"
            SELECT id, order_id, amount_cents, status, refunded_cents,
                   created_at, updated_at
            FROM payments
            WHERE id = ?1
            "#,
        )
        .bind(payment_id)
        .fetch_optional(&mut *conn)
        .await?;

        match row {
            Some(row) => map_payment(&row),
            None => Err(vendo_core::CoreError::PaymentNotFound(payment_id.to_string()).into()),
        }
    }
}

fn map_payment(row: &SqliteRow) -> DbResult<Payment> {
    Ok(Payment {
        id: row.try_get("id")?,
        order_id: row.try_get("order_id")?,
        amount: row.try_get::<Money, _>("amount_cents")?,
        status: row.try_get::<PaymentStatus, _>("status")?,
        refunded_amount: row.try_get::<Money, _>("refunded_cents")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn map_transaction(row: &SqliteRow) -> DbResult<Transaction> {
    Ok(Transaction {
        id: row.try_get("id")?,
        payment_id: row.try_get("payment_id")?,
        kind: row.try_get::<TransactionKind, _>("kind")?,
        amount: row.try_get::<Money, _>("amount_cents")?,
        status: row.try_get::<TransactionStatus, _>("status")?,
        gateway_reference: row.try_get("gateway_reference")?,
        processed_at: row.try_get("processed_at")?,
        created_at: row.try_get("created_at")?,
    })
}
