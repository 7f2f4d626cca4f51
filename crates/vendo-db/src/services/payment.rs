//! # Payment Service
//!
//! Capture resolution and refunds against the transaction ledger.
//!
//! ## Resolution Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  checkout leaves a PENDING sale transaction on the ledger.              │
//! │                                                                         │
//! │  capture()        pending sale → success        (gateway confirmed)     │
//! │  fail_capture()   pending sale → failed         (gateway declined)      │
//! │  retry_capture()  failed sale  → pending        (new attempt)           │
//! │                   no failed sale? cancelled one → fresh pending sale    │
//! │  cancel_capture() pending sale → cancelled      (customer backed out)   │
//! │  refund()         append a success refund row, ceiling-checked;         │
//! │                   a refund exhausting the capture also moves the        │
//! │                   order to RETURNED and restores its stock              │
//! │                                                                         │
//! │  After every change: reconcile the ledger, rewrite the payment's        │
//! │  derived columns and mirror the result onto the order - all in the      │
//! │  same transaction.                                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use vendo_core::order::{OrderStatus, RefundRecord};
use vendo_core::payment::{
    plan_refund, reconcile, Payment, PaymentStatus, Transaction, TransactionKind,
    TransactionStatus,
};
use vendo_core::{CoreError, Money};

use crate::error::{DbError, DbResult};
use crate::pool::Database;
use crate::repository::order::OrderRepository;
use crate::repository::payment::PaymentRepository;
use crate::repository::product::ProductRepository;
use crate::services::stock_moves;

/// Payment and refund operations.
#[derive(Debug, Clone)]
pub struct PaymentService {
    db: Database,
}

impl PaymentService {
    pub fn new(db: Database) -> Self {
        PaymentService { db }
    }

    /// Gets a payment by ID.
    pub async fn get(&self, payment_id: &str) -> DbResult<Payment> {
        self.db
            .payments()
            .get_by_id(payment_id)
            .await?
            .ok_or_else(|| CoreError::PaymentNotFound(payment_id.to_string()).into())
    }

    /// Gets the payment backing an order.
    pub async fn get_by_order(&self, order_id: &str) -> DbResult<Payment> {
        self.db
            .payments()
            .get_by_order(order_id)
            .await?
            .ok_or_else(|| CoreError::PaymentNotFound(order_id.to_string()).into())
    }

    /// Lists a payment's ledger, oldest first.
    pub async fn transactions(&self, payment_id: &str) -> DbResult<Vec<Transaction>> {
        self.db.payments().list_transactions(payment_id).await
    }

    /// Marks the pending capture successful.
    pub async fn capture(
        &self,
        payment_id: &str,
        gateway_reference: Option<String>,
    ) -> DbResult<Payment> {
        self.resolve_sale(payment_id, TransactionStatus::Pending, |t, now| {
            t.gateway_reference = gateway_reference.clone();
            t.set_status(TransactionStatus::Success, now)
        })
        .await
    }

    /// Marks the pending capture failed (gateway declined).
    pub async fn fail_capture(&self, payment_id: &str) -> DbResult<Payment> {
        self.resolve_sale(payment_id, TransactionStatus::Pending, |t, now| {
            t.set_status(TransactionStatus::Failed, now)
        })
        .await
    }

    /// Re-opens a failed capture for another attempt. A cancelled
    /// capture is terminal, so retrying one appends a fresh pending
    /// sale for the same amount instead.
    pub async fn retry_capture(&self, payment_id: &str) -> DbResult<Payment> {
        let now = Utc::now();
        let mut tx = self.db.pool().begin().await?;

        let mut payment = PaymentRepository::get_for_update(&mut tx, payment_id).await?;
        let mut ledger = PaymentRepository::transactions_for_update(&mut tx, &payment.id).await?;

        let failed = ledger
            .iter()
            .rposition(|t| t.kind == TransactionKind::Sale && t.status == TransactionStatus::Failed);
        match failed {
            Some(position) => {
                ledger[position].set_status(TransactionStatus::Pending, now)?;
                PaymentRepository::update_transaction(&mut tx, &ledger[position]).await?;
            }
            None => {
                let amount = ledger
                    .iter()
                    .rfind(|t| t.kind == TransactionKind::Sale)
                    .filter(|t| t.status == TransactionStatus::Cancelled)
                    .map(|t| t.amount)
                    .ok_or_else(|| {
                        DbError::not_found("retryable sale transaction", payment_id)
                    })?;
                let sale = Transaction {
                    id: Uuid::new_v4().to_string(),
                    payment_id: payment.id.clone(),
                    kind: TransactionKind::Sale,
                    amount,
                    status: TransactionStatus::Pending,
                    gateway_reference: None,
                    processed_at: None,
                    created_at: now,
                };
                PaymentRepository::insert_transaction(&mut tx, &sale).await?;
                ledger.push(sale);
            }
        }

        let reconciliation = reconcile(&ledger);
        payment.apply(&reconciliation, now);
        PaymentRepository::update_derived(&mut tx, &payment).await?;
        OrderRepository::set_payment_status(
            &mut tx,
            &payment.order_id,
            reconciliation.order_payment_status,
            now,
        )
        .await?;

        tx.commit().await?;

        info!(
            payment_id,
            status = ?payment.status,
            "Payment ledger updated"
        );
        Ok(payment)
    }

    /// Cancels the pending capture (order stays payable by a new sale).
    pub async fn cancel_capture(&self, payment_id: &str) -> DbResult<Payment> {
        self.resolve_sale(payment_id, TransactionStatus::Pending, |t, now| {
            t.set_status(TransactionStatus::Cancelled, now)
        })
        .await
    }

    /// Refunds against an order's payment.
    ///
    /// `amount = None` refunds the full remaining ceiling. The request
    /// is validated against successful captures minus prior successful
    /// refunds; over-ceiling requests are rejected with both figures.
    pub async fn refund(
        &self,
        order_id: &str,
        amount: Option<Money>,
        reason: Option<String>,
    ) -> DbResult<Payment> {
        let mut order = self
            .db
            .orders()
            .get_by_id(order_id)
            .await?
            .ok_or_else(|| CoreError::OrderNotFound(order_id.to_string()))?;
        let now = Utc::now();

        let mut tx = self.db.pool().begin().await?;

        let mut payment = PaymentRepository::get_for_update(&mut tx, &order.payment_id).await?;
        let mut ledger = PaymentRepository::transactions_for_update(&mut tx, &payment.id).await?;

        let amount = plan_refund(&ledger, amount)?;
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
        order.updated_at = now;

        // Exhausting the captured amount is a return: the order leaves
        // its commitment and the stock it held comes back.
        if reconciliation.payment_status == PaymentStatus::Refunded && !order.status.is_terminal() {
            let effects = order.transition(OrderStatus::Returned, now)?;
            if effects.restore_inventory {
                for item in &order.items {
                    for (product_id, units) in stock_moves(
                        &item.product_id,
                        item.product_type,
                        item.package_info.as_deref(),
                        item.quantity,
                    ) {
                        ProductRepository::increment_stock(&mut tx, &product_id, units, now)
                            .await?;
                    }
                }
            }
        }

        OrderRepository::update_state(&mut tx, &order).await?;

        tx.commit().await?;

        info!(order_id, amount = %amount, "Refund recorded");
        Ok(payment)
    }

    /// Shared resolution path: move the newest sale transaction in
    /// `expected` state through the status machine, then reconcile.
    async fn resolve_sale<F>(&self, payment_id: &str, expected: TransactionStatus, mutate: F) -> DbResult<Payment>
    where
        F: FnOnce(&mut Transaction, chrono::DateTime<Utc>) -> vendo_core::CoreResult<()>,
    {
        let now = Utc::now();
        let mut tx = self.db.pool().begin().await?;

        let mut payment = PaymentRepository::get_for_update(&mut tx, payment_id).await?;
        let mut ledger = PaymentRepository::transactions_for_update(&mut tx, &payment.id).await?;

        let position = ledger
            .iter()
            .rposition(|t| t.kind == TransactionKind::Sale && t.status == expected)
            .ok_or_else(|| {
                DbError::not_found(format!("{expected:?} sale transaction"), payment_id)
            })?;

        mutate(&mut ledger[position], now)?;
        PaymentRepository::update_transaction(&mut tx, &ledger[position]).await?;

        let reconciliation = reconcile(&ledger);
        payment.apply(&reconciliation, now);
        PaymentRepository::update_derived(&mut tx, &payment).await?;
        OrderRepository::set_payment_status(
            &mut tx,
            &payment.order_id,
            reconciliation.order_payment_status,
            now,
        )
        .await?;

        tx.commit().await?;

        info!(
            payment_id,
            status = ?payment.status,
            "Payment ledger updated"
        );
        Ok(payment)
    }
}
