//! # Payment Ledger
//!
//! The payment record and its append-only transaction history.
//!
//! ## Ledger Shape
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Order ──► Payment ──► [Transaction, Transaction, ...]                  │
//! │                                                                         │
//! │  Transactions are rows, never edits: a new refund is a new row.         │
//! │  Terminal rows (success/cancelled) are never mutated again.             │
//! │                                                                         │
//! │  Transaction status machine:                                            │
//! │      pending ──► success | failed | cancelled                           │
//! │      failed  ──► pending              (retry)                           │
//! │      success, cancelled: terminal                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Payment.status and Order.payment_status are *derived* state. The one
//! pure function [`reconcile`] computes both from the transaction
//! history; every db path that touches transactions calls it, so the
//! two can never fall out of sync. It also owns the refund invariant:
//! the sum of successful refunds never exceeds the sum of successful
//! sales.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::order::OrderPaymentStatus;

// =============================================================================
// Enumerations
// =============================================================================

/// Payment status, derived from the transaction history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
    PartiallyRefunded,
    Cancelled,
}

impl Default for PaymentStatus {
    fn default() -> Self {
        PaymentStatus::Pending
    }
}

/// Kind of ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Sale,
    Refund,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Success,
    Failed,
    Cancelled,
}

impl TransactionStatus {
    /// `pending` fans out to any terminal-or-failed state; `failed` may
    /// retry back to `pending`; `success`/`cancelled` are terminal.
    pub fn can_transition_to(self, next: TransactionStatus) -> bool {
        use TransactionStatus::*;
        matches!(
            (self, next),
            (Pending, Success | Failed | Cancelled) | (Failed, Pending)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TransactionStatus::Success | TransactionStatus::Cancelled)
    }
}

// =============================================================================
// Records
// =============================================================================

/// The capture record for an order's charge. One per order.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Payment {
    pub id: String,
    pub order_id: String,
    /// Authorized amount (the order total at checkout).
    pub amount: Money,
    pub status: PaymentStatus,
    /// Running total of successful refunds, derived alongside `status`.
    pub refunded_amount: Money,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

/// One append-only ledger entry against a payment.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Transaction {
    pub id: String,
    pub payment_id: String,
    pub kind: TransactionKind,
    pub amount: Money,
    pub status: TransactionStatus,
    /// External processor reference (auth code, refund id).
    pub gateway_reference: Option<String>,
    #[ts(as = "Option<String>")]
    pub processed_at: Option<DateTime<Utc>>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    /// Moves the transaction through its status machine, stamping
    /// `processed_at` on every resolution.
    pub fn set_status(&mut self, next: TransactionStatus, now: DateTime<Utc>) -> CoreResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(CoreError::InvalidTransactionTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        if next != TransactionStatus::Pending {
            self.processed_at = Some(now);
        }
        Ok(())
    }
}

// =============================================================================
// Reconciliation
// =============================================================================

/// Derived view of a payment's transaction history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reconciliation {
    /// Sum of successful sale transactions.
    pub captured: Money,
    /// Sum of successful refund transactions.
    pub refunded: Money,
    pub payment_status: PaymentStatus,
    pub order_payment_status: OrderPaymentStatus,
}

impl Reconciliation {
    /// The maximum amount still refundable (captured minus refunded).
    pub fn refundable_ceiling(&self) -> Money {
        (self.captured - self.refunded).clamp_non_negative()
    }
}

/// Derives Payment.status and Order.payment_status from the transaction
/// history. The single source of derived payment state: every caller
/// that appends or resolves a transaction reconciles through here.
pub fn reconcile(transactions: &[Transaction]) -> Reconciliation {
    let successful = |kind: TransactionKind| -> Money {
        transactions
            .iter()
            .filter(|t| t.kind == kind && t.status == TransactionStatus::Success)
            .map(|t| t.amount)
            .sum()
    };
    let captured = successful(TransactionKind::Sale);
    let refunded = successful(TransactionKind::Refund);

    let payment_status = if captured.is_positive() {
        if refunded >= captured {
            PaymentStatus::Refunded
        } else if refunded.is_positive() {
            PaymentStatus::PartiallyRefunded
        } else {
            PaymentStatus::Completed
        }
    } else {
        // No capture landed yet; classify by the sale attempts.
        let sales = transactions
            .iter()
            .filter(|t| t.kind == TransactionKind::Sale)
            .collect::<Vec<_>>();
        if sales.iter().any(|t| t.status == TransactionStatus::Pending) || sales.is_empty() {
            PaymentStatus::Pending
        } else if sales.iter().any(|t| t.status == TransactionStatus::Failed) {
            PaymentStatus::Failed
        } else {
            PaymentStatus::Cancelled
        }
    };

    Reconciliation {
        captured,
        refunded,
        payment_status,
        order_payment_status: mirror_to_order(payment_status),
    }
}

/// Projects a payment status onto the order's payment-status vocabulary.
/// A cancelled capture leaves the order awaiting payment: a fresh sale
/// transaction can still pay it.
fn mirror_to_order(status: PaymentStatus) -> OrderPaymentStatus {
    match status {
        PaymentStatus::Pending | PaymentStatus::Cancelled => OrderPaymentStatus::Pending,
        PaymentStatus::Completed => OrderPaymentStatus::Paid,
        PaymentStatus::Failed => OrderPaymentStatus::Failed,
        PaymentStatus::Refunded => OrderPaymentStatus::Refunded,
        PaymentStatus::PartiallyRefunded => OrderPaymentStatus::PartiallyRefunded,
    }
}

/// Validates a refund request against the history and resolves the
/// amount to refund (the full ceiling when unspecified).
///
/// This is the gate for the ledger invariant: after appending a refund
/// planned here, successful refunds still sum to at most the successful
/// sales.
pub fn plan_refund(transactions: &[Transaction], requested: Option<Money>) -> CoreResult<Money> {
    let ceiling = reconcile(transactions).refundable_ceiling();
    let amount = requested.unwrap_or(ceiling);

    if !amount.is_positive() {
        return Err(ValidationError::MustBePositive {
            field: "refund amount".to_string(),
        }
        .into());
    }
    if amount > ceiling {
        return Err(CoreError::ExceedsRefundable {
            requested: amount,
            refundable: ceiling,
        });
    }
    Ok(amount)
}

impl Payment {
    /// Applies a reconciliation result to the stored record.
    pub fn apply(&mut self, reconciliation: &Reconciliation, now: DateTime<Utc>) {
        self.status = reconciliation.payment_status;
        self.refunded_amount = reconciliation.refunded;
        self.updated_at = now;
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
