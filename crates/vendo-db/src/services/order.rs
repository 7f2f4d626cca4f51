//! # Order Service
//!
//! Lifecycle transitions and their side effects.
//!
//! ## Transition Handling
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  transition(order_id, next)                                             │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  core status machine ── invalid? reject, nothing persisted              │
//! │       │                                                                 │
//! │       ▼  TransitionEffects                                              │
//! │  ONE transaction:                                                       │
//! │    status update                                                        │
//! │    + restore stock          (cancel/return; packages cascade)           │
//! │    + full refund ledger row (cancel/return of a PAID order)             │
//! │  COMMIT                                                                 │
//! │                                                                         │
//! │  Inventory comes back whether or not the payment ever landed; the       │
//! │  refund row only exists when there is captured money to return.         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use vendo_core::order::{CancellationRecord, Order, OrderNote, OrderStatus, RefundRecord};
use vendo_core::payment::{plan_refund, reconcile, Transaction, TransactionKind, TransactionStatus};
use vendo_core::validation::validate_note;
use vendo_core::CoreError;

use crate::error::DbResult;
use crate::pool::Database;
use crate::repository::order::OrderRepository;
use crate::repository::payment::PaymentRepository;
use crate::repository::product::ProductRepository;
use crate::services::stock_moves;

/// Order lifecycle operations.
#[derive(Debug, Clone)]
pub struct OrderService {
    db: Database,
}

impl OrderService {
    pub fn new(db: Database) -> Self {
        OrderService { db }
    }

    /// Gets an order (soft-deleted orders are invisible).
    pub async fn get(&self, order_id: &str) -> DbResult<Order> {
        self.db
            .orders()
            .get_by_id(order_id)
            .await?
            .ok_or_else(|| CoreError::OrderNotFound(order_id.to_string()).into())
    }

    /// Lists an account's orders, newest first.
    pub async fn list(&self, account_id: &str, limit: i64, offset: i64) -> DbResult<Vec<Order>> {
        self.db
            .orders()
            .list_by_account(account_id, limit, offset)
            .await
    }

    /// Moves an order through its status machine, applying the
    /// transition's side effects atomically with the status change.
    ///
    /// `reason` is recorded on the cancellation/refund records when the
    /// transition produces them.
    pub async fn transition(
        &self,
        order_id: &str,
        next: OrderStatus,
        reason: Option<String>,
    ) -> DbResult<Order> {
        let mut order = self.get(order_id).await?;
        let now = Utc::now();

        // Pure check first: an invalid move fails before any I/O.
        let effects = order.transition(next, now)?;
        if next == OrderStatus::Cancelled {
            order.cancellation = Some(CancellationRecord {
                reason: reason.clone(),
                cancelled_at: now,
            });
        }

        let mut tx = self.db.pool().begin().await?;

        if effects.restore_inventory {
            for item in &order.items {
                for (product_id, units) in stock_moves(
                    &item.product_id,
                    item.product_type,
                    item.package_info.as_deref(),
                    item.quantity,
                ) {
                    ProductRepository::increment_stock(&mut tx, &product_id, units, now).await?;
                }
            }
        }

        if effects.initiate_refund {
            let mut payment =
                PaymentRepository::get_for_update(&mut tx, &order.payment_id).await?;
            let mut ledger =
                PaymentRepository::transactions_for_update(&mut tx, &payment.id).await?;

            let amount = plan_refund(&ledger, None)?;
            let refund = Transaction {
                id: Uuid::new_v4().to_string(),
                payment_id: payment.id.clone(),
                kind: TransactionKind::Refund,
                amount,
                status: TransactionStatus::Success,
                gateway_reference: None,
                processed_at: Some(now),
                created_at: now,
            };
            PaymentRepository::insert_transaction(&mut tx, &refund).await?;
            ledger.push(refund);

            let reconciliation = reconcile(&ledger);
            payment.apply(&reconciliation, now);
            PaymentRepository::update_derived(&mut tx, &payment).await?;

            order.payment_status = reconciliation.order_payment_status;
            order.refund = Some(RefundRecord {
                amount,
                reason,
                refunded_at: now,
            });
        }

        OrderRepository::update_state(&mut tx, &order).await?;
        tx.commit().await?;

        info!(order_id, status = ?order.status, "Order transitioned");
        Ok(order)
    }

    /// Soft-deletes an order (pending or cancelled only).
    pub async fn delete(&self, order_id: &str) -> DbResult<()> {
        let mut order = self.get(order_id).await?;
        order.mark_deleted(Utc::now())?;

        let mut tx = self.db.pool().begin().await?;
        OrderRepository::update_state(&mut tx, &order).await?;
        tx.commit().await?;

        info!(order_id, "Order soft-deleted");
        Ok(())
    }

    /// Appends a note to an order.
    pub async fn add_note(
        &self,
        order_id: &str,
        message: &str,
        author: Option<String>,
    ) -> DbResult<OrderNote> {
        let message = validate_note(message)?;
        // Existence check; also rejects soft-deleted orders.
        self.get(order_id).await?;

        let note = OrderNote {
            id: Uuid::new_v4().to_string(),
            message,
            author,
            created_at: Utc::now(),
        };
        self.db.orders().add_note(order_id, &note).await?;
        Ok(note)
    }
}
