//! # Error Types
//!
//! Domain errors for the transaction core.
//!
//! ## Error Taxonomy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Validation  - malformed input, rejected before touching state         │
//! │  NotFound    - cart/order/payment/product absent                        │
//! │  Conflict    - insufficient stock, coupon rule violated, invalid        │
//! │                status transition, refund over the ceiling               │
//! │  Internal    - persistence or unexpected failure                        │
//! │                                                                         │
//! │  Validation and Conflict are always retryable with corrected input     │
//! │  and never leave partial state. Internal is the only class for which   │
//! │  the caller must check resulting state before retrying.                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Errors are enum variants with context, never strings; `thiserror`
//! provides the Display impls.

use thiserror::Error;

use crate::coupon::CouponRejection;
use crate::money::Money;
use crate::order::OrderStatus;
use crate::payment::TransactionStatus;

// =============================================================================
// Error Kind
// =============================================================================

/// The coarse class of a [`CoreError`], for callers (HTTP layers,
/// admin tooling) that map classes to response codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    Internal,
}

// =============================================================================
// Core Error
// =============================================================================

/// Business rule violations and domain failures.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Product missing from the catalog or soft-deleted.
    #[error("Product not found: {0}")]
    ProductNotFound(String),

    #[error("Cart not found for account: {0}")]
    CartNotFound(String),

    #[error("Order not found: {0}")]
    OrderNotFound(String),

    #[error("Payment not found: {0}")]
    PaymentNotFound(String),

    /// Requested quantity exceeds what stock allows.
    ///
    /// `max_can_add` reports how many units the caller could still take,
    /// so the storefront can offer the corrected quantity.
    #[error("Insufficient stock for {name}: requested {requested}, can add {max_can_add}")]
    InsufficientStock {
        product_id: String,
        name: String,
        requested: i64,
        max_can_add: i64,
    },

    /// Coupon failed one of the eligibility checks.
    #[error("Coupon rejected: {0}")]
    Coupon(#[from] CouponRejection),

    /// Order status machine rejected the move.
    #[error("Invalid order transition: {from:?} -> {to:?}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    /// Transaction status machine rejected the move.
    #[error("Invalid transaction transition: {from:?} -> {to:?}")]
    InvalidTransactionTransition {
        from: TransactionStatus,
        to: TransactionStatus,
    },

    /// Refund request above the refundable ceiling.
    #[error("Refund {requested} exceeds refundable amount {refundable}")]
    ExceedsRefundable {
        requested: Money,
        refundable: Money,
    },

    /// Orders may only be deleted from pending or cancelled.
    #[error("Order {order_id} is {status:?} and cannot be deleted")]
    OrderNotDeletable {
        order_id: String,
        status: OrderStatus,
    },

    /// Checkout against an empty cart.
    #[error("Cart is empty")]
    EmptyCart,

    /// Cart has exceeded the maximum number of distinct lines.
    #[error("Cart cannot have more than {max} items")]
    CartTooLarge { max: usize },

    /// Item quantity exceeds the per-line maximum.
    #[error("Quantity {requested} exceeds maximum allowed ({max})")]
    QuantityTooLarge { requested: i64, max: i64 },

    /// Input validation failure (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Unexpected failure; surfaced generically, logged with context.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Classifies the error per the taxonomy above.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::Validation(_) => ErrorKind::Validation,
            CoreError::ProductNotFound(_)
            | CoreError::CartNotFound(_)
            | CoreError::OrderNotFound(_)
            | CoreError::PaymentNotFound(_) => ErrorKind::NotFound,
            CoreError::InsufficientStock { .. }
            | CoreError::Coupon(_)
            | CoreError::InvalidTransition { .. }
            | CoreError::InvalidTransactionTransition { .. }
            | CoreError::ExceedsRefundable { .. }
            | CoreError::OrderNotDeletable { .. }
            | CoreError::EmptyCart
            | CoreError::CartTooLarge { .. }
            | CoreError::QuantityTooLarge { .. } => ErrorKind::Conflict,
            CoreError::Internal(_) => ErrorKind::Internal,
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors, raised before business logic runs.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("{field} is required")]
    Required { field: String },

    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    #[error("{field} must be positive")]
    MustBePositive { field: String },

    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::InsufficientStock {
            product_id: "p1".to_string(),
            name: "Espresso Beans 1kg".to_string(),
            requested: 10,
            max_can_add: 5,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient stock for Espresso Beans 1kg: requested 10, can add 5"
        );
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            CoreError::ProductNotFound("x".into()).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(CoreError::EmptyCart.kind(), ErrorKind::Conflict);
        assert_eq!(
            CoreError::Internal("boom".into()).kind(),
            ErrorKind::Internal
        );
        let v: CoreError = ValidationError::Required {
            field: "quantity".into(),
        }
        .into();
        assert_eq!(v.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_exceeds_refundable_message() {
        let err = CoreError::ExceedsRefundable {
            requested: Money::from_cents(15000),
            refundable: Money::from_cents(10000),
        };
        assert_eq!(
            err.to_string(),
            "Refund $150.00 exceeds refundable amount $100.00"
        );
    }
}
