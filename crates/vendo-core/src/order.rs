//! # Order Lifecycle
//!
//! The immutable order snapshot and its status state machine.
//!
//! ## Status Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   pending ──► confirmed ──► processing ──► shipped ──► delivered        │
//! │      │    └───────────────────►│              │            │            │
//! │      │                         │              │            ▼            │
//! │      │                         │              │        completed        │
//! │      ▼                         ▼              ▼            │            │
//! │   cancelled ◄──────────────────┴──────────────┘            │            │
//! │   returned  ◄──────────────────────────────────────────────┘            │
//! │                                                                         │
//! │   delivered/completed may only reach returned, never cancelled.         │
//! │   Each transition stamps a status-specific timestamp.                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Transitions into `cancelled`/`returned` report side effects
//! ([`TransitionEffects`]): inventory restoration always, refund
//! initiation when the order was paid. The db OrderService applies the
//! transition and its effects as one atomic unit.
//!
//! An order is never physically removed: deletion is a `deleted_at`
//! stamp, permitted only from `pending` or `cancelled`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::coupon::CouponSnapshot;
use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::types::{Address, CustomerSnapshot, PackageComponent, ProductType};

// =============================================================================
// Status Enumerations
// =============================================================================

/// Order status. Wire names are contract, stable and case-sensitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Processing,
    Shipped,
    Delivered,
    Completed,
    Cancelled,
    Returned,
}

impl OrderStatus {
    /// Whether the machine permits `self -> next`.
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, Confirmed | Processing | Cancelled | Returned)
                | (Confirmed, Processing | Shipped | Cancelled | Returned)
                | (Processing, Shipped | Cancelled | Returned)
                | (Shipped, Delivered | Cancelled | Returned)
                | (Delivered, Completed | Returned)
                | (Completed, Returned)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Cancelled | OrderStatus::Returned)
    }
}

impl Default for OrderStatus {
    fn default() -> Self {
        OrderStatus::Pending
    }
}

/// Payment status as mirrored onto the order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum OrderPaymentStatus {
    Pending,
    Paid,
    Failed,
    Refunded,
    PartiallyRefunded,
}

impl Default for OrderPaymentStatus {
    fn default() -> Self {
        OrderPaymentStatus::Pending
    }
}

// =============================================================================
// Order Records
// =============================================================================

/// A line of an order. Snapshot pattern: name/price/image/package_info
/// are frozen at checkout so later catalog edits cannot retroactively
/// alter a past order.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct OrderItem {
    pub product_id: String,
    pub name: String,
    pub price: Money,
    pub quantity: i64,
    pub image: Option<String>,
    pub category: String,
    pub product_type: ProductType,
    pub package_info: Option<Vec<PackageComponent>>,
    pub line_total: Money,
}

/// Frozen totals, copied from the cart's last summary at checkout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct OrderTotals {
    pub subtotal: Money,
    pub tax: Money,
    pub shipping: Money,
    pub discount: Money,
    pub total: Money,
}

/// An append-only note on an order.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct OrderNote {
    pub id: String,
    pub message: String,
    pub author: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// Record of a refund against this order.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RefundRecord {
    pub amount: Money,
    pub reason: Option<String>,
    #[ts(as = "String")]
    pub refunded_at: DateTime<Utc>,
}

/// Record of this order's cancellation.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CancellationRecord {
    pub reason: Option<String>,
    #[ts(as = "String")]
    pub cancelled_at: DateTime<Utc>,
}

/// An immutable record of a completed checkout.
///
/// Only the status fields, notes and the refund/cancellation records
/// change after creation; items, totals and addresses are frozen.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Order {
    pub id: String,
    /// Human-readable business identifier (ORD-YYYYMMDD-NNNN).
    pub order_number: String,
    pub account_id: String,
    pub customer: CustomerSnapshot,
    pub items: Vec<OrderItem>,
    pub totals: OrderTotals,
    pub status: OrderStatus,
    pub payment_status: OrderPaymentStatus,
    pub payment_id: String,
    pub coupon: Option<CouponSnapshot>,
    pub shipping_address: Address,
    pub billing_address: Address,
    pub notes: Vec<OrderNote>,
    pub refund: Option<RefundRecord>,
    pub cancellation: Option<CancellationRecord>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub confirmed_at: Option<DateTime<Utc>>,
    #[ts(as = "Option<String>")]
    pub shipped_at: Option<DateTime<Utc>>,
    #[ts(as = "Option<String>")]
    pub delivered_at: Option<DateTime<Utc>>,
    #[ts(as = "Option<String>")]
    pub returned_at: Option<DateTime<Utc>>,
    #[ts(as = "Option<String>")]
    pub cancelled_at: Option<DateTime<Utc>>,
    #[ts(as = "Option<String>")]
    pub deleted_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Transition Effects
// =============================================================================

/// Side effects a status transition requires of the persistence layer.
///
/// Reported rather than executed because the core has no I/O; the
/// OrderService applies the transition and these effects in a single
/// database transaction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransitionEffects {
    /// Initiate a full refund of the order total (order was paid).
    pub initiate_refund: bool,
    /// Restore each line's stock, cascading through package components.
    pub restore_inventory: bool,
}

impl Order {
    /// Moves the order to `next`, stamping the status timestamp.
    ///
    /// Returns the side effects the caller must apply atomically with
    /// the status change. Invalid moves fail without touching the order.
    pub fn transition(&mut self, next: OrderStatus, now: DateTime<Utc>) -> CoreResult<TransitionEffects> {
        if !self.status.can_transition_to(next) {
            return Err(CoreError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }

        self.status = next;
        self.updated_at = now;
        match next {
            OrderStatus::Confirmed => self.confirmed_at = Some(now),
            OrderStatus::Shipped => self.shipped_at = Some(now),
            OrderStatus::Delivered => self.delivered_at = Some(now),
            OrderStatus::Returned => self.returned_at = Some(now),
            OrderStatus::Cancelled => self.cancelled_at = Some(now),
            OrderStatus::Pending | OrderStatus::Processing | OrderStatus::Completed => {}
        }

        let leaving_commitment = matches!(next, OrderStatus::Cancelled | OrderStatus::Returned);
        Ok(TransitionEffects {
            initiate_refund: leaving_commitment
                && self.payment_status == OrderPaymentStatus::Paid,
            // Stock was committed at checkout, so it comes back whether
            // or not the payment ever landed.
            restore_inventory: leaving_commitment,
        })
    }

    /// Whether deletion is permitted from the current status.
    pub fn can_delete(&self) -> bool {
        matches!(self.status, OrderStatus::Pending | OrderStatus::Cancelled)
    }

    /// Soft-deletes the order (status flip plus stamp, never removal).
    pub fn mark_deleted(&mut self, now: DateTime<Utc>) -> CoreResult<()> {
        if !self.can_delete() {
            return Err(CoreError::OrderNotDeletable {
                order_id: self.id.clone(),
                status: self.status,
            });
        }
        self.deleted_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Appends a note. Notes are append-only; there is no removal.
    pub fn add_note(&mut self, note: OrderNote) {
        self.notes.push(note);
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn address() -> Address {
        Address {
            full_name: "Ada Lovelace".to_string(),
            line1: "1 Analytical Way".to_string(),
            line2: None,
            city: "London".to_string(),
            state: None,
            postal_code: "N1 9GU".to_string(),
            country: "GB".to_string(),
            phone: None,
        }
    }

    fn order() -> Order {
        let now = Utc::now();
        Order {
            id: "o1".to_string(),
            order_number: "ORD-20260830-0001".to_string(),
            account_id: "acct1".to_string(),
            customer: CustomerSnapshot {
                account_id: "acct1".to_string(),
                name: "Ada Lovelace".to_string(),
                email: "ada@example.com".to_string(),
                phone: None,
            },
            items: vec![],
            totals: OrderTotals::default(),
            status: OrderStatus::Pending,
            payment_status: OrderPaymentStatus::Pending,
            payment_id: "pay1".to_string(),
            coupon: None,
            shipping_address: address(),
            billing_address: address(),
            notes: vec![],
            refund: None,
            cancellation: None,
            created_at: now,
            updated_at: now,
            confirmed_at: None,
            shipped_at: None,
            delivered_at: None,
            returned_at: None,
            cancelled_at: None,
            deleted_at: None,
        }
    }

    #[test]
    fn test_happy_path_transitions() {
        let mut o = order();
        let now = Utc::now();
        for next in [
            OrderStatus::Confirmed,
            OrderStatus::Processing,
            OrderStatus::Shipped,
            OrderStatus::Delivered,
            OrderStatus::Completed,
        ] {
            let effects = o.transition(next, now).unwrap();
            assert_eq!(effects, TransitionEffects::default());
        }
        assert!(o.confirmed_at.is_some());
        assert!(o.shipped_at.is_some());
        assert!(o.delivered_at.is_some());
    }

    #[test]
    fn test_delivered_cannot_cancel_only_return() {
        let mut o = order();
        o.status = OrderStatus::Delivered;
        assert!(o.transition(OrderStatus::Cancelled, Utc::now()).is_err());
        assert!(o.transition(OrderStatus::Returned, Utc::now()).is_ok());
        assert!(o.returned_at.is_some());
    }

    #[test]
    fn test_invalid_transition_leaves_order_unchanged() {
        let mut o = order();
        let err = o.transition(OrderStatus::Delivered, Utc::now()).unwrap_err();
        assert!(matches!(err, CoreError::InvalidTransition { .. }));
        assert_eq!(o.status, OrderStatus::Pending);
    }

    #[test]
    fn test_terminal_states_reject_everything() {
        for terminal in [OrderStatus::Cancelled, OrderStatus::Returned] {
            let mut o = order();
            o.status = terminal;
            for next in [
                OrderStatus::Pending,
                OrderStatus::Confirmed,
                OrderStatus::Completed,
                OrderStatus::Cancelled,
                OrderStatus::Returned,
            ] {
                assert!(o.transition(next, Utc::now()).is_err());
            }
        }
    }

    #[test]
    fn test_cancel_paid_order_triggers_refund_and_restore() {
        // Scenario E: pending + paid, cancelled.
        let mut o = order();
        o.payment_status = OrderPaymentStatus::Paid;
        let effects = o.transition(OrderStatus::Cancelled, Utc::now()).unwrap();
        assert!(effects.initiate_refund);
        assert!(effects.restore_inventory);
        assert!(o.cancelled_at.is_some());
    }

    #[test]
    fn test_cancel_unpaid_order_restores_without_refund() {
        let mut o = order();
        let effects = o.transition(OrderStatus::Cancelled, Utc::now()).unwrap();
        assert!(!effects.initiate_refund);
        assert!(effects.restore_inventory);
    }

    #[test]
    fn test_delete_rules() {
        let mut o = order();
        assert!(o.can_delete());
        o.mark_deleted(Utc::now()).unwrap();
        assert!(o.deleted_at.is_some());

        let mut shipped = order();
        shipped.status = OrderStatus::Shipped;
        assert!(shipped.mark_deleted(Utc::now()).is_err());
        assert!(shipped.deleted_at.is_none());

        let mut cancelled = order();
        cancelled.status = OrderStatus::Cancelled;
        assert!(cancelled.mark_deleted(Utc::now()).is_ok());
    }
}
