//! # Checkout Service
//!
//! Converts a cart into an order, a payment and a pending capture in one
//! database transaction.
//!
//! ## The Checkout Transaction
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  BEFORE the transaction (pool reads):                                   │
//! │    load cart ── refresh against live stock ── re-evaluate coupon        │
//! │                                                                         │
//! │  INSIDE one transaction:                                                │
//! │    1. decrement stock per line (conditional UPDATE guard;               │
//! │       packages cascade to their constituents)          ──► fail: abort  │
//! │    2. claim the coupon slot (conditional UPDATE guard)  ──► fail: abort │
//! │    3. insert order + frozen item snapshots                              │
//! │    4. insert payment + pending sale transaction                         │
//! │    5. delete the cart                                                   │
//! │    COMMIT                                                               │
//! │                                                                         │
//! │  Any failure rolls everything back: stock, coupon count, order,         │
//! │  payment and cart are untouched. No partial checkouts exist.            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

use vendo_core::cart::Cart;
use vendo_core::coupon::{CouponEngine, CouponRejection};
use vendo_core::order::{Order, OrderItem, OrderPaymentStatus, OrderStatus, OrderTotals};
use vendo_core::payment::{
    Payment, PaymentStatus, Transaction, TransactionKind, TransactionStatus,
};
use vendo_core::types::{Address, CustomerSnapshot};
use vendo_core::{CoreError, ValidationError};

use crate::error::DbResult;
use crate::pool::Database;
use crate::repository::cart::CartRepository;
use crate::repository::coupon::CouponRepository;
use crate::repository::order::OrderRepository;
use crate::repository::payment::PaymentRepository;
use crate::repository::product::ProductRepository;
use crate::services::stock_moves;

/// Everything checkout needs beyond the cart itself.
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub account_id: String,
    /// Denormalized onto the order; later account edits don't touch it.
    pub customer: CustomerSnapshot,
    /// Overrides the cart's shipping address when set.
    pub shipping_address: Option<Address>,
    /// Defaults to the shipping address when absent.
    pub billing_address: Option<Address>,
}

/// Cart-to-order conversion.
#[derive(Debug, Clone)]
pub struct CheckoutService {
    db: Database,
}

impl CheckoutService {
    pub fn new(db: Database) -> Self {
        CheckoutService { db }
    }

    /// Runs a checkout for an account. On success the cart is consumed
    /// and the returned order carries a pending payment.
    pub async fn checkout(&self, request: CheckoutRequest) -> DbResult<Order> {
        let account_id = request.account_id.as_str();

        // Pool reads first; the transaction below only touches its own
        // connection.
        let mut cart = self
            .db
            .carts()
            .find_by_account(account_id)
            .await?
            .ok_or_else(|| CoreError::CartNotFound(account_id.to_string()))?;

        let ids: Vec<String> = cart.items.iter().map(|i| i.product_id.clone()).collect();
        let source = self.db.products().product_map(&ids).await?;
        cart.refresh_stock(&source);

        if cart.is_empty() {
            return Err(CoreError::EmptyCart.into());
        }
        if let Some(line) = cart.items.iter().find(|i| !i.is_available) {
            return Err(CoreError::InsufficientStock {
                product_id: line.product_id.clone(),
                name: line.name.clone(),
                requested: line.quantity,
                max_can_add: 0,
            }
            .into());
        }

        let shipping_address = request
            .shipping_address
            .clone()
            .or_else(|| cart.shipping_address.clone())
            .ok_or(ValidationError::Required {
                field: "shipping address".to_string(),
            })?;
        let billing_address = request
            .billing_address
            .clone()
            .unwrap_or_else(|| shipping_address.clone());

        // Re-run the coupon pipeline against the live coupon so a
        // coupon that expired since apply-time fails checkout cleanly.
        let now = Utc::now();
        let live_coupon = match &cart.coupon {
            Some(snapshot) => {
                let live = self.db.coupons().get_by_id(&snapshot.coupon_id).await?;
                let uses = match &live {
                    Some(c) => self.db.coupons().customer_uses(&c.id, account_id).await?,
                    None => 0,
                };
                CouponEngine::evaluate(live.as_ref(), uses, now, cart.subtotal(), &cart.items)?;
                live
            }
            None => None,
        };

        let order_id = Uuid::new_v4().to_string();
        let payment_id = Uuid::new_v4().to_string();

        let mut tx = self.db.pool().begin().await?;

        // 1. Commit stock. The conditional UPDATE is the authoritative
        //    guard; the refresh above was only advisory.
        for item in &cart.items {
            for (product_id, units) in stock_moves(
                &item.product_id,
                item.product_type,
                item.package_info.as_deref(),
                item.quantity,
            ) {
                if !ProductRepository::decrement_stock(&mut tx, &product_id, units, now).await? {
                    let remaining = ProductRepository::current_stock(&mut tx, &product_id).await?;
                    let per_unit = units / item.quantity;
                    return Err(CoreError::InsufficientStock {
                        product_id: item.product_id.clone(),
                        name: item.name.clone(),
                        requested: item.quantity,
                        max_can_add: if per_unit > 0 { remaining / per_unit } else { 0 },
                    }
                    .into());
                }
            }
        }

        // 2. Claim the coupon slot.
        if let Some(coupon) = &live_coupon {
            if !CouponRepository::try_consume(&mut tx, &coupon.id).await? {
                return Err(CoreError::Coupon(CouponRejection::Depleted).into());
            }
            CouponRepository::record_redemption(&mut tx, &coupon.id, account_id, &order_id, now)
                .await?;
        }

        // 3. Freeze the order.
        let order_number = OrderRepository::next_order_number(&mut tx, now).await?;
        let order = build_order(
            &cart,
            &request,
            order_id,
            order_number,
            payment_id.clone(),
            shipping_address,
            billing_address,
            now,
        );
        OrderRepository::insert(&mut tx, &order).await?;

        // 4. Open the ledger. A zero-total order (fully discounted) has
        //    nothing to capture and settles immediately.
        let total = order.totals.total;
        let mut payment = Payment {
            id: payment_id.clone(),
            order_id: order.id.clone(),
            amount: total,
            status: PaymentStatus::Pending,
            refunded_amount: vendo_core::Money::zero(),
            created_at: now,
            updated_at: now,
        };
        let mut order = order;
        if total.is_positive() {
            let sale = Transaction {
                id: Uuid::new_v4().to_string(),
                payment_id: payment_id.clone(),
                kind: TransactionKind::Sale,
                amount: total,
                status: TransactionStatus::Pending,
                gateway_reference: None,
                processed_at: None,
                created_at: now,
            };
            PaymentRepository::insert(&mut tx, &payment).await?;
            PaymentRepository::insert_transaction(&mut tx, &sale).await?;
        } else {
            payment.status = PaymentStatus::Completed;
            PaymentRepository::insert(&mut tx, &payment).await?;
            order.payment_status = OrderPaymentStatus::Paid;
            OrderRepository::set_payment_status(&mut tx, &order.id, order.payment_status, now)
                .await?;
        }

        // 5. Consume the cart.
        CartRepository::delete(&mut tx, &cart.id).await?;

        tx.commit().await?;

        info!(
            order_id = %order.id,
            order_number = %order.order_number,
            total = %order.totals.total,
            "Checkout complete"
        );
        Ok(order)
    }
}

#[allow(clippy::too_many_arguments)]
fn build_order(
    cart: &Cart,
    request: &CheckoutRequest,
    order_id: String,
    order_number: String,
    payment_id: String,
    shipping_address: Address,
    billing_address: Address,
    now: chrono::DateTime<Utc>,
) -> Order {
    let items: Vec<OrderItem> = cart
        .items
        .iter()
        .map(|item| {
            debug!(product_id = %item.product_id, quantity = item.quantity, "Freezing order line");
            OrderItem {
                product_id: item.product_id.clone(),
                name: item.name.clone(),
                price: item.price,
                quantity: item.quantity,
                image: item.image.clone(),
                category: item.category.clone(),
                product_type: item.product_type,
                package_info: item.package_info.clone(),
                line_total: item.line_total(),
            }
        })
        .collect();

    Order {
        id: order_id,
        order_number,
        account_id: cart.account_id.clone(),
        customer: request.customer.clone(),
        items,
        totals: OrderTotals {
            subtotal: cart.summary.total_price,
            tax: cart.summary.tax_amount,
            shipping: cart.summary.shipping_fee,
            discount: cart.summary.total_discount,
            total: cart.summary.grand_total,
        },
        status: OrderStatus::Pending,
        payment_status: OrderPaymentStatus::Pending,
        payment_id,
        coupon: cart.coupon.clone(),
        shipping_address,
        billing_address,
        notes: Vec::new(),
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
