//! End-to-end flows against an in-memory database: cart to checkout,
//! capture, refunds and lifecycle side effects.

use chrono::{Duration, Utc};
use uuid::Uuid;

use vendo_core::coupon::{Coupon, CouponRestrictions, DiscountRule};
use vendo_core::order::{OrderPaymentStatus, OrderStatus};
use vendo_core::payment::{PaymentStatus, TransactionKind, TransactionStatus};
use vendo_core::types::{Address, CustomerSnapshot, PackageComponent, Product, ProductType, TaxRate};
use vendo_core::{CoreError, Money};
use vendo_db::{
    CartService, CheckoutRequest, CheckoutService, Database, DbConfig, DbError, OrderService,
    PaymentService,
};

// =============================================================================
// Helpers
// =============================================================================

async fn database() -> Database {
    Database::new(DbConfig::in_memory()).await.unwrap()
}

fn product(name: &str, price_cents: i64, stock: i64) -> Product {
    let now = Utc::now();
    Product {
        id: Uuid::new_v4().to_string(),
        name: name.to_string(),
        description: None,
        category: "coffee".to_string(),
        image: None,
        price: Money::from_cents(price_cents),
        product_type: ProductType::Single,
        package_components: vec![],
        package_savings: None,
        current_stock: stock,
        is_active: true,
        created_at: now,
        updated_at: now,
    }
}

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

fn checkout_request(account_id: &str) -> CheckoutRequest {
    CheckoutRequest {
        account_id: account_id.to_string(),
        customer: CustomerSnapshot {
            account_id: account_id.to_string(),
            name: "Ada Lovelace".to_string(),
            email: "ada@example.com".to_string(),
            phone: None,
        },
        shipping_address: Some(address()),
        billing_address: None,
    }
}

fn coupon(code: &str, rule: DiscountRule, usage_limit: Option<i64>) -> Coupon {
    let now = Utc::now();
    Coupon {
        id: Uuid::new_v4().to_string(),
        code: code.to_string(),
        rule,
        min_purchase: Money::zero(),
        usage_limit,
        per_customer_limit: None,
        usage_count: 0,
        restrictions: CouponRestrictions::default(),
        starts_at: now - Duration::days(1),
        ends_at: now + Duration::days(30),
        is_active: true,
        created_at: now,
        updated_at: now,
    }
}

// =============================================================================
// Checkout
// =============================================================================

#[tokio::test]
async fn test_checkout_creates_order_and_decrements_stock() {
    let db = database().await;
    let p = product("Espresso Beans 1kg", 1899, 10);
    db.products().insert(&p).await.unwrap();

    let carts = CartService::new(db.clone(), TaxRate::zero());
    carts.add_item("acct1", &p.id, 3).await.unwrap();

    let order = CheckoutService::new(db.clone())
        .checkout(checkout_request("acct1"))
        .await
        .unwrap();

    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.payment_status, OrderPaymentStatus::Pending);
    assert_eq!(order.totals.total.cents(), 3 * 1899);
    assert!(order.order_number.starts_with("ORD-"));
    assert_eq!(order.items.len(), 1);
    assert_eq!(order.items[0].quantity, 3);

    // Stock was committed.
    let fresh = db.products().get_by_id(&p.id).await.unwrap().unwrap();
    assert_eq!(fresh.current_stock, 7);

    // The cart was consumed.
    assert!(db.carts().find_by_account("acct1").await.unwrap().is_none());

    // The ledger holds one pending sale for the grand total.
    let txs = PaymentService::new(db.clone())
        .transactions(&order.payment_id)
        .await
        .unwrap();
    assert_eq!(txs.len(), 1);
    assert_eq!(txs[0].kind, TransactionKind::Sale);
    assert_eq!(txs[0].status, TransactionStatus::Pending);
    assert_eq!(txs[0].amount, order.totals.total);
}

#[tokio::test]
async fn test_checkout_empty_cart_rejected() {
    let db = database().await;
    let carts = CartService::new(db.clone(), TaxRate::zero());
    carts.get("acct1").await.unwrap();

    let err = CheckoutService::new(db.clone())
        .checkout(checkout_request("acct1"))
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::Domain(CoreError::EmptyCart)));
}

#[tokio::test]
async fn test_second_checkout_loses_the_last_unit() {
    let db = database().await;
    let p = product("Burr Grinder", 8900, 1);
    db.products().insert(&p).await.unwrap();

    let carts = CartService::new(db.clone(), TaxRate::zero());
    carts.add_item("acct1", &p.id, 1).await.unwrap();
    carts.add_item("acct2", &p.id, 1).await.unwrap();

    let checkout = CheckoutService::new(db.clone());
    checkout.checkout(checkout_request("acct1")).await.unwrap();

    // acct2's cart still holds the line, but the stock is gone.
    let err = checkout
        .checkout(checkout_request("acct2"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DbError::Domain(CoreError::InsufficientStock { .. })
    ));

    // The failed checkout left nothing behind.
    let fresh = db.products().get_by_id(&p.id).await.unwrap().unwrap();
    assert_eq!(fresh.current_stock, 0);
    assert!(db.carts().find_by_account("acct2").await.unwrap().is_some());
    assert!(OrderService::new(db.clone())
        .list("acct2", 10, 0)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_package_checkout_cascades_to_constituents() {
    let db = database().await;
    let beans = product("Beans", 1000, 10);
    let grinder = product("Grinder", 5000, 4);
    db.products().insert(&beans).await.unwrap();
    db.products().insert(&grinder).await.unwrap();

    let now = Utc::now();
    let bundle = Product {
        product_type: ProductType::Package,
        package_components: vec![
            PackageComponent {
                product_id: beans.id.clone(),
                name: beans.name.clone(),
                quantity: 2,
                price: beans.price,
            },
            PackageComponent {
                product_id: grinder.id.clone(),
                name: grinder.name.clone(),
                quantity: 1,
                price: grinder.price,
            },
        ],
        package_savings: Some(Money::from_cents(500)),
        created_at: now,
        updated_at: now,
        ..product("Starter Kit", 6500, 0)
    };
    db.products().insert(&bundle).await.unwrap();

    let carts = CartService::new(db.clone(), TaxRate::zero());
    carts.add_item("acct1", &bundle.id, 2).await.unwrap();

    CheckoutService::new(db.clone())
        .checkout(checkout_request("acct1"))
        .await
        .unwrap();

    // 2 bundles = 4 beans + 2 grinders.
    let beans = db.products().get_by_id(&beans.id).await.unwrap().unwrap();
    let grinder = db.products().get_by_id(&grinder.id).await.unwrap().unwrap();
    assert_eq!(beans.current_stock, 6);
    assert_eq!(grinder.current_stock, 2);
}

// =============================================================================
// Coupons at checkout
// =============================================================================

#[tokio::test]
async fn test_coupon_cap_enforced_across_checkouts() {
    let db = database().await;
    let p = product("Beans", 10000, 10);
    db.products().insert(&p).await.unwrap();
    let c = coupon(
        "LASTONE",
        DiscountRule::Fixed {
            amount: Money::from_cents(1000),
        },
        Some(1),
    );
    db.coupons().insert(&c).await.unwrap();

    let carts = CartService::new(db.clone(), TaxRate::zero());
    let checkout = CheckoutService::new(db.clone());

    carts.add_item("acct1", &p.id, 1).await.unwrap();
    carts.apply_coupon("acct1", "LASTONE").await.unwrap();
    let order = checkout.checkout(checkout_request("acct1")).await.unwrap();
    assert_eq!(order.totals.discount.cents(), 1000);
    assert_eq!(order.totals.total.cents(), 9000);

    // The slot is taken; the second cart already fails to apply it,
    // and a stale snapshot would fail again at checkout.
    carts.add_item("acct2", &p.id, 1).await.unwrap();
    let err = carts.apply_coupon("acct2", "LASTONE").await.unwrap_err();
    assert!(matches!(
        err,
        DbError::Domain(CoreError::Coupon(
            vendo_core::CouponRejection::Depleted
        ))
    ));
}

#[tokio::test]
async fn test_coupon_code_lookup_is_case_insensitive() {
    let db = database().await;
    let p = product("Beans", 10000, 10);
    db.products().insert(&p).await.unwrap();
    db.coupons()
        .insert(&coupon(
            "Save20",
            DiscountRule::Percentage {
                rate_bps: 2000,
                max_discount: None,
            },
            None,
        ))
        .await
        .unwrap();

    let carts = CartService::new(db.clone(), TaxRate::zero());
    carts.add_item("acct1", &p.id, 1).await.unwrap();

    let info = carts.apply_coupon("acct1", "  save20 ").await.unwrap();
    assert_eq!(info.discount.cents(), 2000);
}

// =============================================================================
// Payment capture & refunds
// =============================================================================

async fn paid_order(db: &Database, price_cents: i64) -> vendo_core::order::Order {
    let p = product("Beans", price_cents, 10);
    db.products().insert(&p).await.unwrap();
    CartService::new(db.clone(), TaxRate::zero())
        .add_item("acct1", &p.id, 1)
        .await
        .unwrap();
    let order = CheckoutService::new(db.clone())
        .checkout(checkout_request("acct1"))
        .await
        .unwrap();
    PaymentService::new(db.clone())
        .capture(&order.payment_id, Some("auth-123".to_string()))
        .await
        .unwrap();
    OrderService::new(db.clone()).get(&order.id).await.unwrap()
}

#[tokio::test]
async fn test_capture_marks_order_paid() {
    let db = database().await;
    let order = paid_order(&db, 10000).await;

    assert_eq!(order.payment_status, OrderPaymentStatus::Paid);
    let payment = PaymentService::new(db.clone())
        .get(&order.payment_id)
        .await
        .unwrap();
    assert_eq!(payment.status, PaymentStatus::Completed);
}

#[tokio::test]
async fn test_failed_capture_can_be_retried() {
    let db = database().await;
    let p = product("Beans", 10000, 10);
    db.products().insert(&p).await.unwrap();
    CartService::new(db.clone(), TaxRate::zero())
        .add_item("acct1", &p.id, 1)
        .await
        .unwrap();
    let order = CheckoutService::new(db.clone())
        .checkout(checkout_request("acct1"))
        .await
        .unwrap();

    let payments = PaymentService::new(db.clone());
    let payment = payments.fail_capture(&order.payment_id).await.unwrap();
    assert_eq!(payment.status, PaymentStatus::Failed);
    let order = OrderService::new(db.clone()).get(&order.id).await.unwrap();
    assert_eq!(order.payment_status, OrderPaymentStatus::Failed);

    payments.retry_capture(&order.payment_id).await.unwrap();
    let payment = payments
        .capture(&order.payment_id, Some("auth-2".to_string()))
        .await
        .unwrap();
    assert_eq!(payment.status, PaymentStatus::Completed);
}

#[tokio::test]
async fn test_cancelled_capture_can_be_reopened() {
    let db = database().await;
    let p = product("Beans", 10000, 10);
    db.products().insert(&p).await.unwrap();
    CartService::new(db.clone(), TaxRate::zero())
        .add_item("acct1", &p.id, 1)
        .await
        .unwrap();
    let order = CheckoutService::new(db.clone())
        .checkout(checkout_request("acct1"))
        .await
        .unwrap();

    let payments = PaymentService::new(db.clone());
    let payment = payments.cancel_capture(&order.payment_id).await.unwrap();
    assert_eq!(payment.status, PaymentStatus::Cancelled);
    // The order stays payable.
    let order = OrderService::new(db.clone()).get(&order.id).await.unwrap();
    assert_eq!(order.payment_status, OrderPaymentStatus::Pending);

    // No failed sale to re-open, so retry appends a fresh pending sale
    // for the same amount.
    let payment = payments.retry_capture(&order.payment_id).await.unwrap();
    assert_eq!(payment.status, PaymentStatus::Pending);
    let ledger = payments.transactions(&payment.id).await.unwrap();
    let sales: Vec<_> = ledger
        .iter()
        .filter(|t| t.kind == TransactionKind::Sale)
        .collect();
    assert_eq!(sales.len(), 2);
    assert_eq!(sales[0].status, TransactionStatus::Cancelled);
    assert_eq!(sales[1].status, TransactionStatus::Pending);
    assert_eq!(sales[1].amount, sales[0].amount);

    let payment = payments
        .capture(&order.payment_id, Some("auth-2".to_string()))
        .await
        .unwrap();
    assert_eq!(payment.status, PaymentStatus::Completed);
    let order = OrderService::new(db.clone()).get(&order.id).await.unwrap();
    assert_eq!(order.payment_status, OrderPaymentStatus::Paid);
}

#[tokio::test]
async fn test_partial_refund_flow() {
    let db = database().await;
    // Capture $100.00.
    let order = paid_order(&db, 10000).await;
    let payments = PaymentService::new(db.clone());

    // $150.00 exceeds the $100.00 ceiling: rejected, nothing recorded.
    let err = payments
        .refund(&order.id, Some(Money::from_cents(15000)), None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DbError::Domain(CoreError::ExceedsRefundable {
            requested,
            refundable,
        }) if requested.cents() == 15000 && refundable.cents() == 10000
    ));

    // $40.00 is accepted; $60.00 remains refundable.
    let payment = payments
        .refund(&order.id, Some(Money::from_cents(4000)), Some("damaged item".to_string()))
        .await
        .unwrap();
    assert_eq!(payment.status, PaymentStatus::PartiallyRefunded);
    assert_eq!(payment.refunded_amount.cents(), 4000);

    let order = OrderService::new(db.clone()).get(&order.id).await.unwrap();
    assert_eq!(order.payment_status, OrderPaymentStatus::PartiallyRefunded);
    assert_eq!(order.refund.as_ref().unwrap().amount.cents(), 4000);
    // A partial refund leaves the order in place.
    assert_eq!(order.status, OrderStatus::Pending);

    // Unspecified amount takes the remaining ceiling.
    let payment = payments.refund(&order.id, None, None).await.unwrap();
    assert_eq!(payment.status, PaymentStatus::Refunded);
    assert_eq!(payment.refunded_amount.cents(), 10000);

    // Exhausting the capture is a return: the order moves to Returned
    // and the stock it held comes back.
    let order = OrderService::new(db.clone()).get(&order.id).await.unwrap();
    assert_eq!(order.status, OrderStatus::Returned);
    assert!(order.returned_at.is_some());
    assert_eq!(order.payment_status, OrderPaymentStatus::Refunded);
    let restocked = db
        .products()
        .get_by_id(&order.items[0].product_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(restocked.current_stock, 10);

    // Nothing left to refund.
    let err = payments.refund(&order.id, None, None).await.unwrap_err();
    assert!(matches!(err, DbError::Domain(CoreError::Validation(_))));
}

// =============================================================================
// Order lifecycle side effects
// =============================================================================

#[tokio::test]
async fn test_cancel_paid_order_refunds_and_restores_stock() {
    let db = database().await;
    let order = paid_order(&db, 10000).await;
    let product_id = order.items[0].product_id.clone();

    let order = OrderService::new(db.clone())
        .transition(&order.id, OrderStatus::Cancelled, Some("changed my mind".to_string()))
        .await
        .unwrap();

    assert_eq!(order.status, OrderStatus::Cancelled);
    assert!(order.cancelled_at.is_some());
    assert_eq!(
        order.cancellation.as_ref().unwrap().reason.as_deref(),
        Some("changed my mind")
    );

    // Full refund landed on the ledger.
    assert_eq!(order.payment_status, OrderPaymentStatus::Refunded);
    assert_eq!(order.refund.as_ref().unwrap().amount.cents(), 10000);
    let payment = PaymentService::new(db.clone())
        .get(&order.payment_id)
        .await
        .unwrap();
    assert_eq!(payment.status, PaymentStatus::Refunded);

    // Stock came back.
    let p = db.products().get_by_id(&product_id).await.unwrap().unwrap();
    assert_eq!(p.current_stock, 10);
}

#[tokio::test]
async fn test_cancel_unpaid_order_restores_stock_without_refund() {
    let db = database().await;
    let p = product("Beans", 10000, 10);
    db.products().insert(&p).await.unwrap();
    CartService::new(db.clone(), TaxRate::zero())
        .add_item("acct1", &p.id, 2)
        .await
        .unwrap();
    let order = CheckoutService::new(db.clone())
        .checkout(checkout_request("acct1"))
        .await
        .unwrap();

    let order = OrderService::new(db.clone())
        .transition(&order.id, OrderStatus::Cancelled, None)
        .await
        .unwrap();

    assert!(order.refund.is_none());
    assert_eq!(order.payment_status, OrderPaymentStatus::Pending);
    let fresh = db.products().get_by_id(&p.id).await.unwrap().unwrap();
    assert_eq!(fresh.current_stock, 10);
}

#[tokio::test]
async fn test_shipped_order_cannot_be_deleted_but_cancelled_can() {
    let db = database().await;
    let order = paid_order(&db, 10000).await;
    let orders = OrderService::new(db.clone());

    orders
        .transition(&order.id, OrderStatus::Confirmed, None)
        .await
        .unwrap();
    orders
        .transition(&order.id, OrderStatus::Shipped, None)
        .await
        .unwrap();

    let err = orders.delete(&order.id).await.unwrap_err();
    assert!(matches!(
        err,
        DbError::Domain(CoreError::OrderNotDeletable { .. })
    ));

    orders
        .transition(&order.id, OrderStatus::Cancelled, None)
        .await
        .unwrap();
    orders.delete(&order.id).await.unwrap();

    // Soft-deleted: gone from reads, row still priced into the ledger.
    let err = orders.get(&order.id).await.unwrap_err();
    assert!(matches!(err, DbError::Domain(CoreError::OrderNotFound(_))));
}

#[tokio::test]
async fn test_order_notes_append() {
    let db = database().await;
    let order = paid_order(&db, 10000).await;
    let orders = OrderService::new(db.clone());

    orders
        .add_note(&order.id, "customer asked for gift wrap", Some("support".to_string()))
        .await
        .unwrap();
    orders.add_note(&order.id, "wrapped", None).await.unwrap();

    let order = orders.get(&order.id).await.unwrap();
    assert_eq!(order.notes.len(), 2);
    assert_eq!(order.notes[0].message, "customer asked for gift wrap");
}

// =============================================================================
// Cart persistence round-trips
// =============================================================================

#[tokio::test]
async fn test_cart_persists_across_loads() {
    let db = database().await;
    let p = product("Beans", 1899, 10);
    db.products().insert(&p).await.unwrap();

    let carts = CartService::new(db.clone(), TaxRate::from_bps(825));
    carts.add_item("acct1", &p.id, 2).await.unwrap();

    let cart = carts.get("acct1").await.unwrap();
    assert_eq!(cart.items.len(), 1);
    assert_eq!(cart.items[0].quantity, 2);
    assert_eq!(cart.summary.total_price.cents(), 3798);
    // 8.25% tax on $37.98.
    assert_eq!(cart.summary.tax_amount.cents(), 313);
}

#[tokio::test]
async fn test_cart_reflects_stock_shrinking_behind_it() {
    let db = database().await;
    let p = product("Beans", 1000, 10);
    db.products().insert(&p).await.unwrap();

    let carts = CartService::new(db.clone(), TaxRate::zero());
    carts.add_item("acct1", &p.id, 8).await.unwrap();

    // Someone else takes 7 units.
    let mut conn = db.pool().acquire().await.unwrap();
    vendo_db::ProductRepository::decrement_stock(&mut *conn, &p.id, 7, Utc::now())
        .await
        .unwrap();
    drop(conn);

    let cart = carts.get("acct1").await.unwrap();
    assert_eq!(cart.items[0].quantity, 3);
    assert_eq!(cart.items[0].max_quantity, 3);
}
